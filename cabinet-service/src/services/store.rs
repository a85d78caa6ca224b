//! Persistence seam shared by the Postgres and in-memory stores.
//!
//! Operations that must happen at most once are conditional writes here, so the
//! services never need a transaction spanning several tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Actor, Cabinet, Invitation, Membership, PermissionOverride, TwoFactorCode,
};

#[derive(Debug, Error)]
#[error(transparent)]
pub struct StoreError(#[from] anyhow::Error);

impl StoreError {
    pub fn msg(message: impl std::fmt::Display) -> Self {
        StoreError(anyhow::anyhow!(message.to_string()))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of an insert that tolerates an existing row.
#[derive(Debug, Clone, PartialEq)]
pub enum Inserted<T> {
    Created(T),
    Existing(T),
}

impl<T> Inserted<T> {
    pub fn was_created(&self) -> bool {
        matches!(self, Inserted::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Inserted::Created(v) | Inserted::Existing(v) => v,
        }
    }
}

#[async_trait]
pub trait CabinetStore: Send + Sync {
    async fn health_check(&self) -> StoreResult<()>;

    // ==================== Actors ====================

    /// Insert or refresh a profile. The stored role is kept when the actor exists.
    async fn upsert_actor(&self, actor: &Actor) -> StoreResult<Actor>;

    async fn find_actor(&self, actor_id: Uuid) -> StoreResult<Option<Actor>>;

    // ==================== Cabinets ====================

    async fn find_cabinet(&self, cabinet_id: Uuid) -> StoreResult<Option<Cabinet>>;

    async fn find_active_cabinet_for_politician(
        &self,
        politician_id: Uuid,
    ) -> StoreResult<Option<Cabinet>>;

    /// Insert an active cabinet unless the politician already has one, which is returned instead.
    async fn insert_cabinet(&self, cabinet: &Cabinet) -> StoreResult<Inserted<Cabinet>>;

    /// Flag an active cabinet as deleted. Returns false if it was not active.
    async fn soft_delete_cabinet(&self, cabinet_id: Uuid, at: DateTime<Utc>) -> StoreResult<bool>;

    // ==================== Memberships ====================

    async fn find_membership(
        &self,
        actor_id: Uuid,
        cabinet_id: Uuid,
    ) -> StoreResult<Option<Membership>>;

    /// Insert unless (actor, cabinet) already has a membership, which is returned instead.
    async fn insert_membership(&self, membership: &Membership) -> StoreResult<Inserted<Membership>>;

    async fn list_memberships(&self, cabinet_id: Uuid) -> StoreResult<Vec<Membership>>;

    async fn delete_membership(&self, cabinet_id: Uuid, actor_id: Uuid) -> StoreResult<bool>;

    // ==================== Permission overrides ====================

    async fn list_permission_overrides(
        &self,
        cabinet_id: Uuid,
        actor_id: Uuid,
    ) -> StoreResult<Vec<PermissionOverride>>;

    async fn replace_permission_overrides(
        &self,
        cabinet_id: Uuid,
        actor_id: Uuid,
        overrides: &[PermissionOverride],
    ) -> StoreResult<()>;

    async fn delete_permission_overrides(&self, cabinet_id: Uuid, actor_id: Uuid)
        -> StoreResult<u64>;

    // ==================== Invitations ====================

    async fn insert_invitation(&self, invitation: &Invitation) -> StoreResult<()>;

    async fn find_invitation_by_token_hash(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<Invitation>>;

    /// Mark an invitation accepted only if it is still unconsumed.
    async fn consume_invitation(
        &self,
        invitation_id: Uuid,
        accepted_by: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Delete an unconsumed invitation. Consumed invitations are kept.
    async fn delete_pending_invitation(&self, token_hash: &str) -> StoreResult<bool>;

    /// Delete an unconsumed invitation of `cabinet_id` by id.
    async fn delete_pending_invitation_by_id(
        &self,
        cabinet_id: Uuid,
        invitation_id: Uuid,
    ) -> StoreResult<bool>;

    async fn delete_pending_invitations_for_email(
        &self,
        cabinet_id: Uuid,
        email: &str,
    ) -> StoreResult<u64>;

    /// Newest first.
    async fn list_invitations_for_cabinet(&self, cabinet_id: Uuid) -> StoreResult<Vec<Invitation>>;

    /// Delete unconsumed invitations that expired before `before`.
    async fn prune_expired_invitations(&self, before: DateTime<Utc>) -> StoreResult<u64>;

    // ==================== Two-factor codes ====================

    async fn count_two_factor_codes_since(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<i64>;

    async fn insert_two_factor_code(&self, code: &TwoFactorCode) -> StoreResult<()>;

    /// Most recent code matching `code_hash`, whatever its state.
    async fn find_latest_two_factor_code(
        &self,
        email: &str,
        code_hash: &str,
    ) -> StoreResult<Option<TwoFactorCode>>;

    /// Most recent matching code that is unused and unexpired at `now`.
    async fn find_latest_valid_two_factor_code(
        &self,
        email: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<TwoFactorCode>>;

    /// Flip `used` only if it is still false.
    async fn mark_two_factor_code_used(&self, code_id: Uuid) -> StoreResult<bool>;

    /// Count a wrong guess against every unused, unexpired code for `email`.
    async fn record_failed_two_factor_attempt(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<u64>;

    /// Delete codes created before `before` that are used or expired at `now`.
    async fn prune_two_factor_codes(
        &self,
        before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<u64>;
}
