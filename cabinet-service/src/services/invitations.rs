//! Invitation and onboarding state machine.
//!
//! An invitation moves pending -> accepted exactly once. Acceptance is a chain of
//! idempotent steps (profile upsert, cabinet provisioning, membership insert)
//! closed by a conditional consume, so a failed or concurrent attempt can always
//! be retried without duplicating cabinets or memberships.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::authz::PermissionService;
use super::email::{EmailProvider, InvitationEmail};
use super::error::ServiceError;
use super::metrics;
use super::store::CabinetStore;
use crate::config::InvitationConfig;
use crate::models::actor::normalize_email;
use crate::models::{
    cabinet_name, Actor, AuthenticatedActor, Cabinet, ChamberKind, Gender, Invitation,
    InvitationRole, InvitationSummary, Membership,
};

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct IssueInvitationRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,
    pub role: InvitationRole,
    /// Target cabinet for lead and staff invitations.
    pub cabinet_id: Option<Uuid>,
    /// Institution (chamber) for politician invitations.
    pub institution_id: Option<Uuid>,
    #[validate(length(max = 200))]
    pub institution_name: Option<String>,
    pub chamber_kind: Option<ChamberKind>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct ChiefOfStaffInvite {
    #[validate(email(message = "Invalid chief of staff email"))]
    pub email: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
}

/// Profile details supplied by the invitee when accepting.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct AcceptInvitationRequest {
    #[validate(length(min = 1, max = 200))]
    pub display_name: Option<String>,
    pub gender: Option<Gender>,
    /// Explicit cabinet name, used instead of the derived one for new cabinets.
    #[validate(length(min = 1, max = 200))]
    pub cabinet_name: Option<String>,
    #[validate(nested)]
    pub chief_of_staff: Option<ChiefOfStaffInvite>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Sent { dispatch_id: String },
    /// The invitation is stored and its link can still be shared by hand.
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct IssuedInvitation {
    pub invitation: Invitation,
    /// Returned once. Only its hash is stored.
    pub token: String,
    pub accept_url: String,
    pub dispatch: DispatchOutcome,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InvitationDetails {
    pub invitation: InvitationSummary,
    pub cabinet_name: Option<String>,
    pub inviter_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FollowUpOutcome {
    Issued {
        invitation_id: Uuid,
        accept_url: String,
        dispatch: DispatchOutcome,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AcceptedInvitation {
    pub membership: Membership,
    pub cabinet: Cabinet,
    pub cabinet_created: bool,
    pub follow_up: Option<FollowUpOutcome>,
}

// ============================================================================
// Helpers
// ============================================================================

/// Hash a token for storage and lookup.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// 256 random bits, hex encoded.
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Politicians land on onboarding, team members on the team acceptance page.
pub fn accept_url(base_url: &str, token: &str, invitation: &Invitation) -> String {
    let base = base_url.trim_end_matches('/');
    match invitation.invitation_role.link_role() {
        None => format!("{}/onboarding?token={}", base, token),
        Some(role) => format!(
            "{}/aceitar-convite-equipe?token={}&email={}&role={}",
            base,
            token,
            urlencoding::encode(&invitation.email),
            role
        ),
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ============================================================================
// Service
// ============================================================================

#[derive(Clone)]
pub struct InvitationService {
    store: Arc<dyn CabinetStore>,
    email: Arc<dyn EmailProvider>,
    permissions: PermissionService,
    config: InvitationConfig,
}

impl InvitationService {
    pub fn new(
        store: Arc<dyn CabinetStore>,
        email: Arc<dyn EmailProvider>,
        permissions: PermissionService,
        config: InvitationConfig,
    ) -> Self {
        Self {
            store,
            email,
            permissions,
            config,
        }
    }

    fn expiry_hours(&self, role: InvitationRole) -> i64 {
        match role {
            InvitationRole::Politician => self.config.politician_expiry_hours,
            InvitationRole::CabinetLead | InvitationRole::Staff => self.config.team_expiry_hours,
        }
    }

    /// Issue an invitation and dispatch its email.
    ///
    /// Politicians are invited by platform administrators; leads and staff by
    /// the cabinet's owner or lead (or an administrator). A dispatch failure is
    /// reported in the result, never as an error.
    #[tracing::instrument(skip_all, fields(role = request.role.as_str(), inviter = %inviter.actor_id))]
    pub async fn issue_invitation(
        &self,
        inviter: &AuthenticatedActor,
        request: IssueInvitationRequest,
    ) -> Result<IssuedInvitation, ServiceError> {
        request.validate()?;

        let email = normalize_email(&request.email);
        let name = non_blank(Some(&request.name))
            .ok_or_else(|| ServiceError::Validation("name: Name is required".to_string()))?;

        let (cabinet_id, organization) = match request.role {
            InvitationRole::Politician => {
                if request.institution_id.is_none() {
                    return Err(ServiceError::Validation(
                        "institution_id is required for politician invitations".to_string(),
                    ));
                }
                if request.chamber_kind.is_none() {
                    return Err(ServiceError::Validation(
                        "chamber_kind is required for politician invitations".to_string(),
                    ));
                }
                if !self.permissions.is_platform_admin(inviter.actor_id).await {
                    return Err(ServiceError::PermissionDenied(
                        "only platform administrators can invite politicians",
                    ));
                }
                (None, non_blank(request.institution_name.as_deref()))
            }
            InvitationRole::CabinetLead | InvitationRole::Staff => {
                let cabinet_id = request.cabinet_id.ok_or_else(|| {
                    ServiceError::Validation(
                        "cabinet_id is required for team invitations".to_string(),
                    )
                })?;
                self.permissions
                    .require_manager(inviter.actor_id, cabinet_id)
                    .await?;
                let cabinet = self
                    .store
                    .find_cabinet(cabinet_id)
                    .await?
                    .filter(Cabinet::is_active)
                    .ok_or(ServiceError::NotFound("Cabinet"))?;
                (Some(cabinet_id), Some(cabinet.cabinet_name))
            }
        };

        let token = generate_token();
        let expires_in_hours = self.expiry_hours(request.role);
        let invitation = Invitation::new(
            hash_token(&token),
            email,
            name,
            request.role,
            cabinet_id,
            request.institution_id,
            non_blank(request.institution_name.as_deref()),
            request.chamber_kind,
            Some(inviter.actor_id),
            Duration::hours(expires_in_hours),
        );
        self.store.insert_invitation(&invitation).await?;

        let accept_url = accept_url(&self.config.base_url, &token, &invitation);

        let message = InvitationEmail {
            template: invitation.invitation_role.email_template(),
            to: invitation.email.clone(),
            invited_name: invitation.invited_name.clone(),
            organization,
            accept_url: accept_url.clone(),
            expires_in_hours,
        };
        let dispatch = match self.email.send_invitation(&message).await {
            Ok(dispatch_id) => DispatchOutcome::Sent { dispatch_id },
            Err(e) => {
                tracing::warn!(
                    invitation_id = %invitation.invitation_id,
                    error = %e,
                    "Invitation email dispatch failed, link remains valid"
                );
                DispatchOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        metrics::invitation_issued(
            invitation.invitation_role,
            matches!(dispatch, DispatchOutcome::Sent { .. }),
        );
        tracing::info!(
            invitation_id = %invitation.invitation_id,
            expiry_utc = %invitation.expiry_utc,
            "Invitation issued"
        );

        Ok(IssuedInvitation {
            invitation,
            token,
            accept_url,
            dispatch,
        })
    }

    /// Look up a token. Not found, already accepted and expired are distinct errors.
    pub async fn validate_invitation(&self, token: &str) -> Result<Invitation, ServiceError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ServiceError::NotFound("Invitation"));
        }

        let invitation = self
            .store
            .find_invitation_by_token_hash(&hash_token(token))
            .await?
            .ok_or(ServiceError::NotFound("Invitation"))?;

        if invitation.is_accepted() {
            return Err(ServiceError::AlreadyAccepted);
        }
        if invitation.is_expired_at(Utc::now()) {
            return Err(ServiceError::Expired);
        }
        Ok(invitation)
    }

    /// Validated invitation plus the context shown on the accept/decline screen.
    pub async fn invitation_details(&self, token: &str) -> Result<InvitationDetails, ServiceError> {
        let invitation = self.validate_invitation(token).await?;

        let cabinet_name = match invitation.cabinet_id {
            Some(id) => self
                .store
                .find_cabinet(id)
                .await
                .ok()
                .flatten()
                .map(|c| c.cabinet_name),
            None => None,
        };

        let inviter_name = match invitation.invited_by {
            Some(id) => self
                .store
                .find_actor(id)
                .await
                .ok()
                .flatten()
                .and_then(|a| a.display_name),
            None => None,
        };

        Ok(InvitationDetails {
            invitation: InvitationSummary::from(&invitation),
            cabinet_name,
            inviter_name,
        })
    }

    /// Accept an invitation on behalf of the authenticated actor.
    #[tracing::instrument(skip_all, fields(actor_id = %actor.actor_id))]
    pub async fn accept_invitation(
        &self,
        token: &str,
        actor: &AuthenticatedActor,
        request: AcceptInvitationRequest,
    ) -> Result<AcceptedInvitation, ServiceError> {
        request.validate()?;
        let invitation = self.validate_invitation(token).await?;

        if !actor.email_verified {
            return Err(ServiceError::PermissionDenied(
                "email address must be verified before accepting an invitation",
            ));
        }
        let actual = normalize_email(&actor.email);
        if actual != invitation.email {
            return Err(ServiceError::EmailMismatch {
                invited: invitation.email.clone(),
                actual,
            });
        }

        let profile = self
            .store
            .upsert_actor(&Actor::new(
                actor.actor_id,
                &actual,
                non_blank(request.display_name.as_deref())
                    .or_else(|| actor.display_name.clone())
                    .or_else(|| Some(invitation.invited_name.clone())),
                request.gender,
                invitation.invitation_role.actor_role(),
            ))
            .await?;

        let (cabinet, cabinet_created) = self
            .resolve_cabinet(&invitation, &profile, request.cabinet_name.as_deref())
            .await?;

        let membership = self
            .store
            .insert_membership(&Membership::new(
                cabinet.cabinet_id,
                profile.actor_id,
                invitation.invitation_role.member_role(),
            ))
            .await?
            .into_inner();

        let consumed = self
            .store
            .consume_invitation(invitation.invitation_id, profile.actor_id, Utc::now())
            .await?;
        if !consumed {
            tracing::info!(
                invitation_id = %invitation.invitation_id,
                "Invitation consumed by a concurrent acceptance"
            );
            return Err(ServiceError::AlreadyAccepted);
        }

        metrics::invitation_accepted(invitation.invitation_role, cabinet_created);
        tracing::info!(
            invitation_id = %invitation.invitation_id,
            cabinet_id = %cabinet.cabinet_id,
            member_role = membership.member_role.as_str(),
            cabinet_created,
            "Invitation accepted"
        );

        let follow_up = match (invitation.invitation_role, request.chief_of_staff) {
            (InvitationRole::Politician, Some(chief)) => {
                Some(self.invite_chief_of_staff(actor, &cabinet, chief).await)
            }
            _ => None,
        };

        Ok(AcceptedInvitation {
            membership,
            cabinet,
            cabinet_created,
            follow_up,
        })
    }

    /// Existing active cabinet for the invitation, provisioning one for a first-time politician.
    async fn resolve_cabinet(
        &self,
        invitation: &Invitation,
        profile: &Actor,
        explicit_name: Option<&str>,
    ) -> Result<(Cabinet, bool), ServiceError> {
        if invitation.invitation_role.is_team_role() {
            let cabinet_id = invitation.cabinet_id.ok_or_else(|| {
                ServiceError::Internal(anyhow::anyhow!(
                    "team invitation {} has no cabinet",
                    invitation.invitation_id
                ))
            })?;
            let cabinet = self
                .store
                .find_cabinet(cabinet_id)
                .await?
                .filter(Cabinet::is_active)
                .ok_or(ServiceError::NotFound("Cabinet"))?;
            return Ok((cabinet, false));
        }

        if let Some(existing) = self
            .store
            .find_active_cabinet_for_politician(profile.actor_id)
            .await?
        {
            return Ok((existing, false));
        }

        let full_name = profile
            .display_name
            .clone()
            .unwrap_or_else(|| invitation.invited_name.clone());
        let name = non_blank(explicit_name).unwrap_or_else(|| {
            cabinet_name(
                &full_name,
                invitation.chamber_kind.unwrap_or(ChamberKind::Municipal),
                profile.gender,
            )
        });

        let inserted = self
            .store
            .insert_cabinet(&Cabinet::new(
                name,
                profile.actor_id,
                invitation.institution_id,
            ))
            .await?;
        let created = inserted.was_created();
        let cabinet = inserted.into_inner();

        if created {
            tracing::info!(cabinet_id = %cabinet.cabinet_id, cabinet_name = %cabinet.cabinet_name, "Provisioned cabinet");
        } else {
            tracing::info!(cabinet_id = %cabinet.cabinet_id, "Reusing cabinet provisioned concurrently");
        }
        Ok((cabinet, created))
    }

    async fn invite_chief_of_staff(
        &self,
        politician: &AuthenticatedActor,
        cabinet: &Cabinet,
        chief: ChiefOfStaffInvite,
    ) -> FollowUpOutcome {
        let request = IssueInvitationRequest {
            email: chief.email,
            name: chief.name,
            role: InvitationRole::CabinetLead,
            cabinet_id: Some(cabinet.cabinet_id),
            institution_id: None,
            institution_name: None,
            chamber_kind: None,
        };

        match self.issue_invitation(politician, request).await {
            Ok(issued) => FollowUpOutcome::Issued {
                invitation_id: issued.invitation.invitation_id,
                accept_url: issued.accept_url,
                dispatch: issued.dispatch,
            },
            Err(e) => {
                tracing::warn!(cabinet_id = %cabinet.cabinet_id, error = %e, "Chief of staff invitation failed");
                FollowUpOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Delete an unconsumed invitation. Absent or consumed tokens are a no-op.
    pub async fn revoke_invitation(&self, token: &str) -> Result<bool, ServiceError> {
        let removed = self
            .store
            .delete_pending_invitation(&hash_token(token.trim()))
            .await?;
        if removed {
            tracing::info!("Invitation revoked");
        }
        Ok(removed)
    }

    /// Revoke after checking the caller issued the invitation or manages its cabinet.
    pub async fn revoke_invitation_as(
        &self,
        caller: &AuthenticatedActor,
        token: &str,
    ) -> Result<bool, ServiceError> {
        let Some(invitation) = self
            .store
            .find_invitation_by_token_hash(&hash_token(token.trim()))
            .await?
        else {
            return Ok(false);
        };
        if invitation.is_accepted() {
            return Ok(false);
        }

        let allowed = invitation.invited_by == Some(caller.actor_id)
            || self.permissions.is_platform_admin(caller.actor_id).await
            || match invitation.cabinet_id {
                Some(cabinet_id) => {
                    self.permissions
                        .can_manage_team(caller.actor_id, cabinet_id)
                        .await
                }
                None => false,
            };
        if !allowed {
            return Err(ServiceError::PermissionDenied(
                "only the inviter or a cabinet manager can revoke this invitation",
            ));
        }

        self.revoke_invitation(token).await
    }

    /// Invitations sent for a cabinet, newest first. Managers only.
    pub async fn list_cabinet_invitations(
        &self,
        caller: &AuthenticatedActor,
        cabinet_id: Uuid,
    ) -> Result<Vec<InvitationSummary>, ServiceError> {
        self.permissions
            .require_manager(caller.actor_id, cabinet_id)
            .await?;
        let invitations = self.store.list_invitations_for_cabinet(cabinet_id).await?;
        Ok(invitations.iter().map(InvitationSummary::from).collect())
    }

    /// Cancel a pending invitation from the cabinet's sent list. Managers only.
    /// Returns false when the invitation is absent, accepted, or belongs to another cabinet.
    #[tracing::instrument(skip_all, fields(cabinet = %cabinet_id, invitation = %invitation_id))]
    pub async fn revoke_invitation_by_id(
        &self,
        caller: &AuthenticatedActor,
        cabinet_id: Uuid,
        invitation_id: Uuid,
    ) -> Result<bool, ServiceError> {
        self.permissions
            .require_manager(caller.actor_id, cabinet_id)
            .await?;
        let removed = self
            .store
            .delete_pending_invitation_by_id(cabinet_id, invitation_id)
            .await?;
        if removed {
            tracing::info!("Invitation cancelled");
        }
        Ok(removed)
    }

    /// Delete unaccepted invitations that expired more than `retention_days` ago.
    #[tracing::instrument(skip_all)]
    pub async fn prune_expired(&self) -> Result<u64, ServiceError> {
        let cutoff = Utc::now() - Duration::days(self.config.retention_days);
        let removed = self.store.prune_expired_invitations(cutoff).await?;
        if removed > 0 {
            tracing::info!(removed, "Pruned expired invitations");
        }
        Ok(removed)
    }
}
