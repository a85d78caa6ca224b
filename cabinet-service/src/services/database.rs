//! PostgreSQL implementation of [`CabinetStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use uuid::Uuid;

use super::store::{CabinetStore, Inserted, StoreError, StoreResult};
use crate::models::{
    Actor, Cabinet, ChamberKind, Gender, Invitation, Membership, ModulePermission,
    PermissionOverride, TwoFactorCode, UnknownVariant,
};

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::from(anyhow::Error::new(err))
    }
}

impl From<UnknownVariant> for StoreError {
    fn from(err: UnknownVariant) -> Self {
        StoreError::msg(format!("corrupt row: {}", err))
    }
}

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ==================== Row mapping ====================

#[derive(FromRow)]
struct ActorRow {
    actor_id: Uuid,
    email: String,
    display_name: Option<String>,
    gender: Option<String>,
    actor_role: String,
    created_utc: DateTime<Utc>,
}

impl TryFrom<ActorRow> for Actor {
    type Error = StoreError;

    fn try_from(row: ActorRow) -> Result<Self, Self::Error> {
        Ok(Actor {
            actor_id: row.actor_id,
            email: row.email,
            display_name: row.display_name,
            gender: row.gender.as_deref().map(str::parse::<Gender>).transpose()?,
            actor_role: row.actor_role.parse()?,
            created_utc: row.created_utc,
        })
    }
}

#[derive(FromRow)]
struct CabinetRow {
    cabinet_id: Uuid,
    cabinet_name: String,
    status: String,
    politician_id: Uuid,
    institution_id: Option<Uuid>,
    plan_id: Option<String>,
    created_utc: DateTime<Utc>,
    deleted_utc: Option<DateTime<Utc>>,
}

impl TryFrom<CabinetRow> for Cabinet {
    type Error = StoreError;

    fn try_from(row: CabinetRow) -> Result<Self, Self::Error> {
        Ok(Cabinet {
            cabinet_id: row.cabinet_id,
            cabinet_name: row.cabinet_name,
            status: row.status.parse()?,
            politician_id: row.politician_id,
            institution_id: row.institution_id,
            plan_id: row.plan_id,
            created_utc: row.created_utc,
            deleted_utc: row.deleted_utc,
        })
    }
}

#[derive(FromRow)]
struct MembershipRow {
    membership_id: Uuid,
    cabinet_id: Uuid,
    actor_id: Uuid,
    member_role: String,
    created_utc: DateTime<Utc>,
}

impl TryFrom<MembershipRow> for Membership {
    type Error = StoreError;

    fn try_from(row: MembershipRow) -> Result<Self, Self::Error> {
        Ok(Membership {
            membership_id: row.membership_id,
            cabinet_id: row.cabinet_id,
            actor_id: row.actor_id,
            member_role: row.member_role.parse()?,
            created_utc: row.created_utc,
        })
    }
}

#[derive(FromRow)]
struct OverrideRow {
    cabinet_id: Uuid,
    actor_id: Uuid,
    module: String,
    can_read: bool,
    can_write: bool,
    can_delete: bool,
    updated_utc: DateTime<Utc>,
}

impl TryFrom<OverrideRow> for PermissionOverride {
    type Error = StoreError;

    fn try_from(row: OverrideRow) -> Result<Self, Self::Error> {
        Ok(PermissionOverride {
            cabinet_id: row.cabinet_id,
            actor_id: row.actor_id,
            module: row.module.parse()?,
            permission: ModulePermission {
                can_read: row.can_read,
                can_write: row.can_write,
                can_delete: row.can_delete,
            },
            updated_utc: row.updated_utc,
        })
    }
}

#[derive(FromRow)]
struct InvitationRow {
    invitation_id: Uuid,
    token_hash: String,
    email: String,
    invited_name: String,
    invitation_role: String,
    cabinet_id: Option<Uuid>,
    institution_id: Option<Uuid>,
    institution_name: Option<String>,
    chamber_kind: Option<String>,
    invited_by: Option<Uuid>,
    created_utc: DateTime<Utc>,
    expiry_utc: DateTime<Utc>,
    accepted_utc: Option<DateTime<Utc>>,
    accepted_by: Option<Uuid>,
}

impl TryFrom<InvitationRow> for Invitation {
    type Error = StoreError;

    fn try_from(row: InvitationRow) -> Result<Self, Self::Error> {
        Ok(Invitation {
            invitation_id: row.invitation_id,
            token_hash: row.token_hash,
            email: row.email,
            invited_name: row.invited_name,
            invitation_role: row.invitation_role.parse()?,
            cabinet_id: row.cabinet_id,
            institution_id: row.institution_id,
            institution_name: row.institution_name,
            chamber_kind: row
                .chamber_kind
                .as_deref()
                .map(str::parse::<ChamberKind>)
                .transpose()?,
            invited_by: row.invited_by,
            created_utc: row.created_utc,
            expiry_utc: row.expiry_utc,
            accepted_utc: row.accepted_utc,
            accepted_by: row.accepted_by,
        })
    }
}

#[derive(FromRow)]
struct TwoFactorCodeRow {
    code_id: Uuid,
    email: String,
    code_hash: String,
    expiry_utc: DateTime<Utc>,
    used: bool,
    attempt_count: i32,
    created_utc: DateTime<Utc>,
}

impl From<TwoFactorCodeRow> for TwoFactorCode {
    fn from(row: TwoFactorCodeRow) -> Self {
        TwoFactorCode {
            code_id: row.code_id,
            email: row.email,
            code_hash: row.code_hash,
            expiry_utc: row.expiry_utc,
            used: row.used,
            attempt_count: row.attempt_count,
            created_utc: row.created_utc,
        }
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl CabinetStore for Database {
    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(|e| {
            tracing::error!("Database health check failed: {}", e);
            StoreError::from(e)
        })?;
        Ok(())
    }

    // ==================== Actor Operations ====================

    async fn upsert_actor(&self, actor: &Actor) -> StoreResult<Actor> {
        let row = sqlx::query_as::<_, ActorRow>(
            r#"
            INSERT INTO actors (actor_id, email, display_name, gender, actor_role, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (actor_id) DO UPDATE SET
                email = EXCLUDED.email,
                display_name = COALESCE(EXCLUDED.display_name, actors.display_name),
                gender = COALESCE(EXCLUDED.gender, actors.gender)
            RETURNING *
            "#,
        )
        .bind(actor.actor_id)
        .bind(&actor.email)
        .bind(&actor.display_name)
        .bind(actor.gender.map(|g| g.as_str()))
        .bind(actor.actor_role.as_str())
        .bind(actor.created_utc)
        .fetch_one(&self.pool)
        .await?;
        Actor::try_from(row)
    }

    async fn find_actor(&self, actor_id: Uuid) -> StoreResult<Option<Actor>> {
        sqlx::query_as::<_, ActorRow>("SELECT * FROM actors WHERE actor_id = $1")
            .bind(actor_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Actor::try_from)
            .transpose()
    }

    // ==================== Cabinet Operations ====================

    async fn find_cabinet(&self, cabinet_id: Uuid) -> StoreResult<Option<Cabinet>> {
        sqlx::query_as::<_, CabinetRow>("SELECT * FROM cabinets WHERE cabinet_id = $1")
            .bind(cabinet_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Cabinet::try_from)
            .transpose()
    }

    async fn find_active_cabinet_for_politician(
        &self,
        politician_id: Uuid,
    ) -> StoreResult<Option<Cabinet>> {
        sqlx::query_as::<_, CabinetRow>(
            "SELECT * FROM cabinets WHERE politician_id = $1 AND status = 'active'",
        )
        .bind(politician_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Cabinet::try_from)
        .transpose()
    }

    async fn insert_cabinet(&self, cabinet: &Cabinet) -> StoreResult<Inserted<Cabinet>> {
        let inserted = sqlx::query_as::<_, CabinetRow>(
            r#"
            INSERT INTO cabinets (cabinet_id, cabinet_name, status, politician_id, institution_id, plan_id, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (politician_id) WHERE status = 'active' DO NOTHING
            RETURNING *
            "#,
        )
        .bind(cabinet.cabinet_id)
        .bind(&cabinet.cabinet_name)
        .bind(cabinet.status.as_str())
        .bind(cabinet.politician_id)
        .bind(cabinet.institution_id)
        .bind(&cabinet.plan_id)
        .bind(cabinet.created_utc)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(Inserted::Created(Cabinet::try_from(row)?));
        }

        self.find_active_cabinet_for_politician(cabinet.politician_id)
            .await?
            .map(Inserted::Existing)
            .ok_or_else(|| StoreError::msg("active cabinet vanished after insert conflict"))
    }

    async fn soft_delete_cabinet(&self, cabinet_id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE cabinets SET status = 'deleted', deleted_utc = $2 WHERE cabinet_id = $1 AND status = 'active'",
        )
        .bind(cabinet_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    // ==================== Membership Operations ====================

    async fn find_membership(
        &self,
        actor_id: Uuid,
        cabinet_id: Uuid,
    ) -> StoreResult<Option<Membership>> {
        sqlx::query_as::<_, MembershipRow>(
            "SELECT * FROM memberships WHERE actor_id = $1 AND cabinet_id = $2",
        )
        .bind(actor_id)
        .bind(cabinet_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Membership::try_from)
        .transpose()
    }

    async fn insert_membership(&self, membership: &Membership) -> StoreResult<Inserted<Membership>> {
        let inserted = sqlx::query_as::<_, MembershipRow>(
            r#"
            INSERT INTO memberships (membership_id, cabinet_id, actor_id, member_role, created_utc)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (actor_id, cabinet_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(membership.membership_id)
        .bind(membership.cabinet_id)
        .bind(membership.actor_id)
        .bind(membership.member_role.as_str())
        .bind(membership.created_utc)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(Inserted::Created(Membership::try_from(row)?));
        }

        self.find_membership(membership.actor_id, membership.cabinet_id)
            .await?
            .map(Inserted::Existing)
            .ok_or_else(|| StoreError::msg("membership vanished after insert conflict"))
    }

    async fn list_memberships(&self, cabinet_id: Uuid) -> StoreResult<Vec<Membership>> {
        let rows = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT * FROM memberships WHERE cabinet_id = $1
            ORDER BY CASE member_role WHEN 'owner' THEN 0 WHEN 'lead' THEN 1 ELSE 2 END, created_utc
            "#,
        )
        .bind(cabinet_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn delete_membership(&self, cabinet_id: Uuid, actor_id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM memberships WHERE cabinet_id = $1 AND actor_id = $2")
            .bind(cabinet_id)
            .bind(actor_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== Permission Override Operations ====================

    async fn list_permission_overrides(
        &self,
        cabinet_id: Uuid,
        actor_id: Uuid,
    ) -> StoreResult<Vec<PermissionOverride>> {
        let rows = sqlx::query_as::<_, OverrideRow>(
            "SELECT * FROM permission_overrides WHERE cabinet_id = $1 AND actor_id = $2",
        )
        .bind(cabinet_id)
        .bind(actor_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn replace_permission_overrides(
        &self,
        cabinet_id: Uuid,
        actor_id: Uuid,
        overrides: &[PermissionOverride],
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM permission_overrides WHERE cabinet_id = $1 AND actor_id = $2")
            .bind(cabinet_id)
            .bind(actor_id)
            .execute(&mut *tx)
            .await?;

        for o in overrides {
            sqlx::query(
                r#"
                INSERT INTO permission_overrides (cabinet_id, actor_id, module, can_read, can_write, can_delete, updated_utc)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(cabinet_id)
            .bind(actor_id)
            .bind(o.module.as_str())
            .bind(o.permission.can_read)
            .bind(o.permission.can_write)
            .bind(o.permission.can_delete)
            .bind(o.updated_utc)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_permission_overrides(
        &self,
        cabinet_id: Uuid,
        actor_id: Uuid,
    ) -> StoreResult<u64> {
        let result =
            sqlx::query("DELETE FROM permission_overrides WHERE cabinet_id = $1 AND actor_id = $2")
                .bind(cabinet_id)
                .bind(actor_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    // ==================== Invitation Operations ====================

    async fn insert_invitation(&self, invitation: &Invitation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO invitations (
                invitation_id, token_hash, email, invited_name, invitation_role, cabinet_id,
                institution_id, institution_name, chamber_kind, invited_by, created_utc, expiry_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(invitation.invitation_id)
        .bind(&invitation.token_hash)
        .bind(&invitation.email)
        .bind(&invitation.invited_name)
        .bind(invitation.invitation_role.as_str())
        .bind(invitation.cabinet_id)
        .bind(invitation.institution_id)
        .bind(&invitation.institution_name)
        .bind(invitation.chamber_kind.map(|c| c.as_str()))
        .bind(invitation.invited_by)
        .bind(invitation.created_utc)
        .bind(invitation.expiry_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_invitation_by_token_hash(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<Invitation>> {
        sqlx::query_as::<_, InvitationRow>("SELECT * FROM invitations WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?
            .map(Invitation::try_from)
            .transpose()
    }

    async fn consume_invitation(
        &self,
        invitation_id: Uuid,
        accepted_by: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE invitations SET accepted_utc = $3, accepted_by = $2
            WHERE invitation_id = $1 AND accepted_utc IS NULL
            "#,
        )
        .bind(invitation_id)
        .bind(accepted_by)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_pending_invitation(&self, token_hash: &str) -> StoreResult<bool> {
        let result =
            sqlx::query("DELETE FROM invitations WHERE token_hash = $1 AND accepted_utc IS NULL")
                .bind(token_hash)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_pending_invitation_by_id(
        &self,
        cabinet_id: Uuid,
        invitation_id: Uuid,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "DELETE FROM invitations WHERE invitation_id = $1 AND cabinet_id = $2 AND accepted_utc IS NULL",
        )
        .bind(invitation_id)
        .bind(cabinet_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_pending_invitations_for_email(
        &self,
        cabinet_id: Uuid,
        email: &str,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM invitations WHERE cabinet_id = $1 AND email = $2 AND accepted_utc IS NULL",
        )
        .bind(cabinet_id)
        .bind(email)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_invitations_for_cabinet(&self, cabinet_id: Uuid) -> StoreResult<Vec<Invitation>> {
        let rows = sqlx::query_as::<_, InvitationRow>(
            "SELECT * FROM invitations WHERE cabinet_id = $1 ORDER BY created_utc DESC",
        )
        .bind(cabinet_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn prune_expired_invitations(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        let result =
            sqlx::query("DELETE FROM invitations WHERE accepted_utc IS NULL AND expiry_utc < $1")
                .bind(before)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    // ==================== Two-Factor Operations ====================

    async fn count_two_factor_codes_since(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM two_factor_codes WHERE email = $1 AND created_utc >= $2",
        )
        .bind(email)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn insert_two_factor_code(&self, code: &TwoFactorCode) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO two_factor_codes (code_id, email, code_hash, expiry_utc, used, attempt_count, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(code.code_id)
        .bind(&code.email)
        .bind(&code.code_hash)
        .bind(code.expiry_utc)
        .bind(code.used)
        .bind(code.attempt_count)
        .bind(code.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_latest_two_factor_code(
        &self,
        email: &str,
        code_hash: &str,
    ) -> StoreResult<Option<TwoFactorCode>> {
        let row = sqlx::query_as::<_, TwoFactorCodeRow>(
            r#"
            SELECT * FROM two_factor_codes
            WHERE email = $1 AND code_hash = $2
            ORDER BY created_utc DESC LIMIT 1
            "#,
        )
        .bind(email)
        .bind(code_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(TwoFactorCode::from))
    }

    async fn find_latest_valid_two_factor_code(
        &self,
        email: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<TwoFactorCode>> {
        let row = sqlx::query_as::<_, TwoFactorCodeRow>(
            r#"
            SELECT * FROM two_factor_codes
            WHERE email = $1 AND code_hash = $2 AND used = FALSE AND expiry_utc >= $3
            ORDER BY created_utc DESC LIMIT 1
            "#,
        )
        .bind(email)
        .bind(code_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(TwoFactorCode::from))
    }

    async fn mark_two_factor_code_used(&self, code_id: Uuid) -> StoreResult<bool> {
        let result =
            sqlx::query("UPDATE two_factor_codes SET used = TRUE WHERE code_id = $1 AND used = FALSE")
                .bind(code_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_failed_two_factor_attempt(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE two_factor_codes SET attempt_count = attempt_count + 1
            WHERE email = $1 AND used = FALSE AND expiry_utc >= $2
            "#,
        )
        .bind(email)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn prune_two_factor_codes(
        &self,
        before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM two_factor_codes WHERE created_utc < $1 AND (used = TRUE OR expiry_utc < $2)",
        )
        .bind(before)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
