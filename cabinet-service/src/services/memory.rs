//! In-memory store used by tests and by `STORE_BACKEND=memory` development runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::store::{CabinetStore, Inserted, StoreError, StoreResult};
use crate::models::{
    Actor, Cabinet, CabinetStatus, Invitation, Membership, PermissionOverride, TwoFactorCode,
};

#[derive(Default)]
struct MemoryState {
    actors: HashMap<Uuid, Actor>,
    cabinets: HashMap<Uuid, Cabinet>,
    memberships: HashMap<(Uuid, Uuid), Membership>,
    overrides: HashMap<(Uuid, Uuid), Vec<PermissionOverride>>,
    invitations: HashMap<Uuid, Invitation>,
    two_factor_codes: Vec<TwoFactorCode>,
}

/// Every method takes the single lock, so each conditional write is atomic.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| StoreError::msg(format!("In-memory store mutex poisoned: {}", e)))
    }

    /// Number of cabinets ever created for a politician, deleted ones included.
    pub fn cabinet_count_for(&self, politician_id: Uuid) -> StoreResult<usize> {
        Ok(self
            .lock()?
            .cabinets
            .values()
            .filter(|c| c.politician_id == politician_id)
            .count())
    }

    pub fn membership_count(&self, cabinet_id: Uuid) -> StoreResult<usize> {
        Ok(self
            .lock()?
            .memberships
            .values()
            .filter(|m| m.cabinet_id == cabinet_id)
            .count())
    }
}

fn latest<'a, I>(codes: I) -> Option<TwoFactorCode>
where
    I: Iterator<Item = &'a TwoFactorCode>,
{
    codes.max_by_key(|c| c.created_utc).cloned()
}

#[async_trait]
impl CabinetStore for InMemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        self.lock().map(|_| ())
    }

    async fn upsert_actor(&self, actor: &Actor) -> StoreResult<Actor> {
        let mut state = self.lock()?;
        let stored = state
            .actors
            .entry(actor.actor_id)
            .and_modify(|existing| {
                existing.email = actor.email.clone();
                if actor.display_name.is_some() {
                    existing.display_name = actor.display_name.clone();
                }
                if actor.gender.is_some() {
                    existing.gender = actor.gender;
                }
            })
            .or_insert_with(|| actor.clone());
        Ok(stored.clone())
    }

    async fn find_actor(&self, actor_id: Uuid) -> StoreResult<Option<Actor>> {
        Ok(self.lock()?.actors.get(&actor_id).cloned())
    }

    async fn find_cabinet(&self, cabinet_id: Uuid) -> StoreResult<Option<Cabinet>> {
        Ok(self.lock()?.cabinets.get(&cabinet_id).cloned())
    }

    async fn find_active_cabinet_for_politician(
        &self,
        politician_id: Uuid,
    ) -> StoreResult<Option<Cabinet>> {
        Ok(self
            .lock()?
            .cabinets
            .values()
            .find(|c| c.politician_id == politician_id && c.is_active())
            .cloned())
    }

    async fn insert_cabinet(&self, cabinet: &Cabinet) -> StoreResult<Inserted<Cabinet>> {
        let mut state = self.lock()?;
        if let Some(existing) = state
            .cabinets
            .values()
            .find(|c| c.politician_id == cabinet.politician_id && c.is_active())
        {
            return Ok(Inserted::Existing(existing.clone()));
        }
        state.cabinets.insert(cabinet.cabinet_id, cabinet.clone());
        Ok(Inserted::Created(cabinet.clone()))
    }

    async fn soft_delete_cabinet(&self, cabinet_id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut state = self.lock()?;
        match state.cabinets.get_mut(&cabinet_id) {
            Some(cabinet) if cabinet.is_active() => {
                cabinet.status = CabinetStatus::Deleted;
                cabinet.deleted_utc = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_membership(
        &self,
        actor_id: Uuid,
        cabinet_id: Uuid,
    ) -> StoreResult<Option<Membership>> {
        Ok(self
            .lock()?
            .memberships
            .get(&(cabinet_id, actor_id))
            .cloned())
    }

    async fn insert_membership(&self, membership: &Membership) -> StoreResult<Inserted<Membership>> {
        let mut state = self.lock()?;
        let key = (membership.cabinet_id, membership.actor_id);
        if let Some(existing) = state.memberships.get(&key) {
            return Ok(Inserted::Existing(existing.clone()));
        }
        state.memberships.insert(key, membership.clone());
        Ok(Inserted::Created(membership.clone()))
    }

    async fn list_memberships(&self, cabinet_id: Uuid) -> StoreResult<Vec<Membership>> {
        let mut members: Vec<Membership> = self
            .lock()?
            .memberships
            .values()
            .filter(|m| m.cabinet_id == cabinet_id)
            .cloned()
            .collect();
        members.sort_by(|a, b| {
            a.member_role
                .cmp(&b.member_role)
                .then(a.created_utc.cmp(&b.created_utc))
        });
        Ok(members)
    }

    async fn delete_membership(&self, cabinet_id: Uuid, actor_id: Uuid) -> StoreResult<bool> {
        Ok(self
            .lock()?
            .memberships
            .remove(&(cabinet_id, actor_id))
            .is_some())
    }

    async fn list_permission_overrides(
        &self,
        cabinet_id: Uuid,
        actor_id: Uuid,
    ) -> StoreResult<Vec<PermissionOverride>> {
        Ok(self
            .lock()?
            .overrides
            .get(&(cabinet_id, actor_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_permission_overrides(
        &self,
        cabinet_id: Uuid,
        actor_id: Uuid,
        overrides: &[PermissionOverride],
    ) -> StoreResult<()> {
        self.lock()?
            .overrides
            .insert((cabinet_id, actor_id), overrides.to_vec());
        Ok(())
    }

    async fn delete_permission_overrides(
        &self,
        cabinet_id: Uuid,
        actor_id: Uuid,
    ) -> StoreResult<u64> {
        Ok(self
            .lock()?
            .overrides
            .remove(&(cabinet_id, actor_id))
            .map(|o| o.len() as u64)
            .unwrap_or(0))
    }

    async fn insert_invitation(&self, invitation: &Invitation) -> StoreResult<()> {
        let mut state = self.lock()?;
        if state
            .invitations
            .values()
            .any(|i| i.token_hash == invitation.token_hash)
        {
            return Err(StoreError::msg("duplicate invitation token"));
        }
        state
            .invitations
            .insert(invitation.invitation_id, invitation.clone());
        Ok(())
    }

    async fn find_invitation_by_token_hash(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<Invitation>> {
        Ok(self
            .lock()?
            .invitations
            .values()
            .find(|i| i.token_hash == token_hash)
            .cloned())
    }

    async fn consume_invitation(
        &self,
        invitation_id: Uuid,
        accepted_by: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.lock()?;
        match state.invitations.get_mut(&invitation_id) {
            Some(inv) if inv.accepted_utc.is_none() => {
                inv.accepted_utc = Some(at);
                inv.accepted_by = Some(accepted_by);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_pending_invitation(&self, token_hash: &str) -> StoreResult<bool> {
        let mut state = self.lock()?;
        let id = state
            .invitations
            .values()
            .find(|i| i.token_hash == token_hash && i.accepted_utc.is_none())
            .map(|i| i.invitation_id);
        Ok(match id {
            Some(id) => state.invitations.remove(&id).is_some(),
            None => false,
        })
    }

    async fn delete_pending_invitation_by_id(
        &self,
        cabinet_id: Uuid,
        invitation_id: Uuid,
    ) -> StoreResult<bool> {
        let mut state = self.lock()?;
        let pending = state.invitations.get(&invitation_id).is_some_and(|i| {
            i.cabinet_id == Some(cabinet_id) && i.accepted_utc.is_none()
        });
        Ok(pending && state.invitations.remove(&invitation_id).is_some())
    }

    async fn delete_pending_invitations_for_email(
        &self,
        cabinet_id: Uuid,
        email: &str,
    ) -> StoreResult<u64> {
        let mut state = self.lock()?;
        let before = state.invitations.len();
        state.invitations.retain(|_, i| {
            !(i.cabinet_id == Some(cabinet_id) && i.email == email && i.accepted_utc.is_none())
        });
        Ok((before - state.invitations.len()) as u64)
    }

    async fn list_invitations_for_cabinet(&self, cabinet_id: Uuid) -> StoreResult<Vec<Invitation>> {
        let mut invitations: Vec<Invitation> = self
            .lock()?
            .invitations
            .values()
            .filter(|i| i.cabinet_id == Some(cabinet_id))
            .cloned()
            .collect();
        invitations.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(invitations)
    }

    async fn prune_expired_invitations(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.lock()?;
        let count = state.invitations.len();
        state
            .invitations
            .retain(|_, i| i.accepted_utc.is_some() || i.expiry_utc >= before);
        Ok((count - state.invitations.len()) as u64)
    }

    async fn count_two_factor_codes_since(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<i64> {
        Ok(self
            .lock()?
            .two_factor_codes
            .iter()
            .filter(|c| c.email == email && c.created_utc >= since)
            .count() as i64)
    }

    async fn insert_two_factor_code(&self, code: &TwoFactorCode) -> StoreResult<()> {
        self.lock()?.two_factor_codes.push(code.clone());
        Ok(())
    }

    async fn find_latest_two_factor_code(
        &self,
        email: &str,
        code_hash: &str,
    ) -> StoreResult<Option<TwoFactorCode>> {
        let state = self.lock()?;
        Ok(latest(
            state
                .two_factor_codes
                .iter()
                .filter(|c| c.email == email && c.code_hash == code_hash),
        ))
    }

    async fn find_latest_valid_two_factor_code(
        &self,
        email: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<TwoFactorCode>> {
        let state = self.lock()?;
        Ok(latest(state.two_factor_codes.iter().filter(|c| {
            c.email == email && c.code_hash == code_hash && !c.used && !c.is_expired_at(now)
        })))
    }

    async fn mark_two_factor_code_used(&self, code_id: Uuid) -> StoreResult<bool> {
        let mut state = self.lock()?;
        match state
            .two_factor_codes
            .iter_mut()
            .find(|c| c.code_id == code_id && !c.used)
        {
            Some(code) => {
                code.used = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_failed_two_factor_attempt(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut state = self.lock()?;
        let mut touched = 0;
        for code in state
            .two_factor_codes
            .iter_mut()
            .filter(|c| c.email == email && !c.used && !c.is_expired_at(now))
        {
            code.attempt_count += 1;
            touched += 1;
        }
        Ok(touched)
    }

    async fn prune_two_factor_codes(
        &self,
        before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut state = self.lock()?;
        let count = state.two_factor_codes.len();
        state
            .two_factor_codes
            .retain(|c| c.created_utc >= before || !(c.used || c.is_expired_at(now)));
        Ok((count - state.two_factor_codes.len()) as u64)
    }
}
