//! Invitation model - single-use, expiring, token-addressed offers of membership.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{ActorRole, ChamberKind, MemberRole, UnknownVariant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InvitationRole {
    Politician,
    CabinetLead,
    Staff,
}

impl InvitationRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationRole::Politician => "politician",
            InvitationRole::CabinetLead => "cabinet_lead",
            InvitationRole::Staff => "staff",
        }
    }

    pub fn member_role(&self) -> MemberRole {
        match self {
            InvitationRole::Politician => MemberRole::Owner,
            InvitationRole::CabinetLead => MemberRole::Lead,
            InvitationRole::Staff => MemberRole::Staff,
        }
    }

    /// Platform role given to a profile created by accepting this invitation.
    pub fn actor_role(&self) -> ActorRole {
        match self {
            InvitationRole::Politician => ActorRole::Politician,
            InvitationRole::CabinetLead => ActorRole::CabinetLead,
            InvitationRole::Staff => ActorRole::Staff,
        }
    }

    /// Template identifier understood by the email provider.
    pub fn email_template(&self) -> &'static str {
        match self {
            InvitationRole::Politician => "invite_politico",
            InvitationRole::CabinetLead => "invite_chefe",
            InvitationRole::Staff => "invite_assessor",
        }
    }

    /// Role name carried in team acceptance links.
    pub fn link_role(&self) -> Option<&'static str> {
        match self {
            InvitationRole::Politician => None,
            InvitationRole::CabinetLead => Some("chefe"),
            InvitationRole::Staff => Some("assessor"),
        }
    }

    pub fn is_team_role(&self) -> bool {
        !matches!(self, InvitationRole::Politician)
    }
}

impl FromStr for InvitationRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "politician" => Ok(InvitationRole::Politician),
            "cabinet_lead" => Ok(InvitationRole::CabinetLead),
            "staff" => Ok(InvitationRole::Staff),
            other => Err(UnknownVariant::new("invitation role", other)),
        }
    }
}

/// Observable state of an invitation at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Expired,
}

/// Invitation entity. Only the SHA-256 hash of the token is stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Invitation {
    pub invitation_id: Uuid,
    pub token_hash: String,
    pub email: String,
    pub invited_name: String,
    pub invitation_role: InvitationRole,
    pub cabinet_id: Option<Uuid>,
    pub institution_id: Option<Uuid>,
    pub institution_name: Option<String>,
    pub chamber_kind: Option<ChamberKind>,
    pub invited_by: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
    pub accepted_utc: Option<DateTime<Utc>>,
    pub accepted_by: Option<Uuid>,
}

impl Invitation {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        token_hash: String,
        email: String,
        invited_name: String,
        invitation_role: InvitationRole,
        cabinet_id: Option<Uuid>,
        institution_id: Option<Uuid>,
        institution_name: Option<String>,
        chamber_kind: Option<ChamberKind>,
        invited_by: Option<Uuid>,
        expires_in: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            invitation_id: Uuid::new_v4(),
            token_hash,
            email,
            invited_name,
            invitation_role,
            cabinet_id,
            institution_id,
            institution_name,
            chamber_kind,
            invited_by,
            created_utc: now,
            expiry_utc: now + expires_in,
            accepted_utc: None,
            accepted_by: None,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted_utc.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_utc
    }

    /// Consumption wins over expiry: an accepted invitation stays accepted.
    pub fn status_at(&self, now: DateTime<Utc>) -> InvitationStatus {
        if self.is_accepted() {
            InvitationStatus::Accepted
        } else if self.is_expired_at(now) {
            InvitationStatus::Expired
        } else {
            InvitationStatus::Pending
        }
    }
}

/// Invitation as shown to managers and invitees. Never carries the token hash.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InvitationSummary {
    pub invitation_id: Uuid,
    pub email: String,
    pub invited_name: String,
    pub invitation_role: InvitationRole,
    pub cabinet_id: Option<Uuid>,
    pub institution_id: Option<Uuid>,
    pub institution_name: Option<String>,
    pub chamber_kind: Option<ChamberKind>,
    pub status: InvitationStatus,
    pub created_utc: DateTime<Utc>,
    pub expiry_utc: DateTime<Utc>,
    pub accepted_utc: Option<DateTime<Utc>>,
}

impl From<&Invitation> for InvitationSummary {
    fn from(i: &Invitation) -> Self {
        Self {
            invitation_id: i.invitation_id,
            email: i.email.clone(),
            invited_name: i.invited_name.clone(),
            invitation_role: i.invitation_role,
            cabinet_id: i.cabinet_id,
            institution_id: i.institution_id,
            institution_name: i.institution_name.clone(),
            chamber_kind: i.chamber_kind,
            status: i.status_at(Utc::now()),
            created_utc: i.created_utc,
            expiry_utc: i.expiry_utc,
            accepted_utc: i.accepted_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invitation(expires_in: Duration) -> Invitation {
        Invitation::new(
            "hash".to_string(),
            "jane@example.com".to_string(),
            "Jane".to_string(),
            InvitationRole::Staff,
            Some(Uuid::new_v4()),
            None,
            None,
            None,
            None,
            expires_in,
        )
    }

    #[test]
    fn status_follows_acceptance_then_expiry() {
        let now = Utc::now();
        let mut inv = invitation(Duration::hours(1));
        assert_eq!(inv.status_at(now), InvitationStatus::Pending);
        assert_eq!(inv.status_at(now + Duration::hours(2)), InvitationStatus::Expired);

        inv.accepted_utc = Some(now);
        assert_eq!(inv.status_at(now + Duration::hours(2)), InvitationStatus::Accepted);
    }

    #[test]
    fn team_roles_carry_link_roles() {
        assert_eq!(InvitationRole::CabinetLead.link_role(), Some("chefe"));
        assert_eq!(InvitationRole::Staff.link_role(), Some("assessor"));
        assert_eq!(InvitationRole::Politician.link_role(), None);
        assert_eq!(InvitationRole::Politician.member_role(), MemberRole::Owner);
    }
}
