//! Cabinet team management: member listing, staff overrides, removal and cabinet deletion.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::authz::PermissionService;
use super::error::ServiceError;
use super::store::CabinetStore;
use crate::models::{
    AuthenticatedActor, MemberRole, Module, ModulePermission, PermissionOverride, PermissionSet,
};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MemberView {
    pub actor_id: Uuid,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub member_role: MemberRole,
    pub permissions: PermissionSet,
    pub joined_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SetOverridesRequest {
    /// Modules omitted here fall back to the staff row of the capability table.
    #[schema(value_type = Object)]
    pub modules: BTreeMap<Module, ModulePermission>,
}

#[derive(Clone)]
pub struct TeamService {
    store: Arc<dyn CabinetStore>,
    permissions: PermissionService,
}

impl TeamService {
    pub fn new(store: Arc<dyn CabinetStore>, permissions: PermissionService) -> Self {
        Self { store, permissions }
    }

    async fn require_member_or_admin(
        &self,
        actor_id: Uuid,
        cabinet_id: Uuid,
    ) -> Result<(), ServiceError> {
        if self
            .permissions
            .cabinet_access(actor_id, cabinet_id)
            .await?
            .is_some()
            || self.permissions.is_platform_admin(actor_id).await
        {
            Ok(())
        } else {
            Err(ServiceError::PermissionDenied("not a member of this cabinet"))
        }
    }

    pub async fn list_members(
        &self,
        caller: &AuthenticatedActor,
        cabinet_id: Uuid,
    ) -> Result<Vec<MemberView>, ServiceError> {
        self.require_member_or_admin(caller.actor_id, cabinet_id)
            .await?;

        let memberships = self.store.list_memberships(cabinet_id).await?;
        let mut members = Vec::with_capacity(memberships.len());
        for membership in memberships {
            let profile = self.store.find_actor(membership.actor_id).await?;
            let overrides = if membership.member_role == MemberRole::Staff {
                self.store
                    .list_permission_overrides(cabinet_id, membership.actor_id)
                    .await?
            } else {
                Vec::new()
            };
            members.push(MemberView {
                actor_id: membership.actor_id,
                email: profile.as_ref().map(|p| p.email.clone()),
                display_name: profile.and_then(|p| p.display_name),
                member_role: membership.member_role,
                permissions: self.permissions.table().expand(&membership, &overrides),
                joined_utc: membership.created_utc,
            });
        }
        Ok(members)
    }

    /// Replace a staff member's overrides and return the resulting matrix.
    #[tracing::instrument(skip(self, caller, request), fields(caller = %caller.actor_id))]
    pub async fn set_permission_overrides(
        &self,
        caller: &AuthenticatedActor,
        cabinet_id: Uuid,
        member_id: Uuid,
        request: SetOverridesRequest,
    ) -> Result<PermissionSet, ServiceError> {
        self.permissions
            .require_manager(caller.actor_id, cabinet_id)
            .await?;

        let membership = self
            .store
            .find_membership(member_id, cabinet_id)
            .await?
            .ok_or(ServiceError::NotFound("Member"))?;
        if membership.member_role != MemberRole::Staff {
            return Err(ServiceError::Validation(
                "permission overrides apply to staff members only".to_string(),
            ));
        }

        let overrides: Vec<PermissionOverride> = request
            .modules
            .into_iter()
            .map(|(module, permission)| {
                PermissionOverride::new(cabinet_id, member_id, module, permission)
            })
            .collect();
        self.store
            .replace_permission_overrides(cabinet_id, member_id, &overrides)
            .await?;

        tracing::info!(count = overrides.len(), "Permission overrides replaced");
        Ok(self.permissions.table().expand(&membership, &overrides))
    }

    /// Exonerate a member: overrides, membership and their pending invitations go.
    #[tracing::instrument(skip(self, caller), fields(caller = %caller.actor_id))]
    pub async fn remove_member(
        &self,
        caller: &AuthenticatedActor,
        cabinet_id: Uuid,
        member_id: Uuid,
    ) -> Result<(), ServiceError> {
        self.permissions
            .require_manager(caller.actor_id, cabinet_id)
            .await?;

        let membership = self
            .store
            .find_membership(member_id, cabinet_id)
            .await?
            .ok_or(ServiceError::NotFound("Member"))?;
        if membership.member_role == MemberRole::Owner {
            return Err(ServiceError::Conflict(
                "the cabinet owner cannot be removed".to_string(),
            ));
        }

        self.store
            .delete_permission_overrides(cabinet_id, member_id)
            .await?;
        self.store.delete_membership(cabinet_id, member_id).await?;

        let revoked = match self.store.find_actor(member_id).await? {
            Some(profile) => {
                self.store
                    .delete_pending_invitations_for_email(cabinet_id, &profile.email)
                    .await?
            }
            None => 0,
        };

        tracing::info!(revoked_invitations = revoked, "Member removed");
        Ok(())
    }

    /// Owner or platform administrator only. Returns false if the cabinet was already gone.
    #[tracing::instrument(skip(self, caller), fields(caller = %caller.actor_id))]
    pub async fn soft_delete_cabinet(
        &self,
        caller: &AuthenticatedActor,
        cabinet_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let is_owner = matches!(
            self.store.find_membership(caller.actor_id, cabinet_id).await?,
            Some(m) if m.member_role == MemberRole::Owner
        );
        if !is_owner && !self.permissions.is_platform_admin(caller.actor_id).await {
            return Err(ServiceError::PermissionDenied(
                "only the owner can delete a cabinet",
            ));
        }

        let deleted = self
            .store
            .soft_delete_cabinet(cabinet_id, Utc::now())
            .await?;
        if deleted {
            tracing::info!("Cabinet soft-deleted");
        }
        Ok(deleted)
    }
}
