//! Shared setup for cabinet-service integration tests: in-memory store,
//! recording email provider and locally signed bearer tokens.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use cabinet_service::{
    build_router,
    config::{
        CabinetConfig, DatabaseConfig, Environment, InvitationConfig, JwtConfig, StoreBackend,
        TwoFactorConfig,
    },
    models::{
        Actor, ActorRole, AuthenticatedActor, Cabinet, ChamberKind, Invitation, InvitationRole,
        MemberRole, Membership, PermissionOverride, TwoFactorCode,
    },
    services::{
        CabinetStore, EmailProvider, InMemoryStore, Inserted, IssueInvitationRequest,
        IssuedInvitation, JwtService, MockEmailService, RoleCapabilityTable, StoreResult,
    },
    AppState,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test-secret-that-is-long-enough-for-hs256";
pub const BASE_URL: &str = "https://app.example.com";

pub fn test_config() -> CabinetConfig {
    CabinetConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "cabinet-service".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        store_backend: StoreBackend::Memory,
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
            min_connections: 1,
        },
        jwt: JwtConfig {
            secret: TEST_JWT_SECRET.to_string(),
            issuer: None,
        },
        smtp: None,
        invitations: InvitationConfig {
            base_url: BASE_URL.to_string(),
            ..InvitationConfig::default()
        },
        two_factor: TwoFactorConfig::default(),
        permissions_table_path: None,
        allowed_origins: vec!["http://localhost:3000".to_string()],
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub mailer: Arc<MockEmailService>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_mailer(MockEmailService::new())
    }

    /// Every email dispatch fails.
    pub fn with_failing_mailer() -> Self {
        Self::with_mailer(MockEmailService::failing())
    }

    pub fn with_config(config: CabinetConfig) -> Self {
        Self::build(config, MockEmailService::new())
    }

    /// Store calls yield to the scheduler first, so joined futures interleave
    /// between their reads and their conditional writes.
    pub fn with_yielding_store() -> Self {
        Self::build_with(test_config(), MockEmailService::new(), |store| {
            Arc::new(YieldingStore(store)) as Arc<dyn CabinetStore>
        })
    }

    fn with_mailer(mailer: MockEmailService) -> Self {
        Self::build(test_config(), mailer)
    }

    fn build(config: CabinetConfig, mailer: MockEmailService) -> Self {
        Self::build_with(config, mailer, |store| store as Arc<dyn CabinetStore>)
    }

    fn build_with(
        config: CabinetConfig,
        mailer: MockEmailService,
        wrap: impl FnOnce(Arc<InMemoryStore>) -> Arc<dyn CabinetStore>,
    ) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let mailer = Arc::new(mailer);
        let jwt = JwtService::new(&config.jwt).expect("jwt service");

        let state = AppState::new(
            config,
            wrap(store.clone()),
            mailer.clone() as Arc<dyn EmailProvider>,
            jwt,
            RoleCapabilityTable::default(),
            None,
        );

        Self {
            state,
            store,
            mailer,
        }
    }

    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Bearer token for `actor`, valid for an hour.
    pub fn token_for(&self, actor: &AuthenticatedActor) -> String {
        self.state
            .jwt
            .issue_token(actor, chrono::Duration::hours(1))
            .expect("token")
    }

    pub async fn seed_actor(&self, email: &str, name: &str, role: ActorRole) -> AuthenticatedActor {
        let actor = Actor::new(Uuid::new_v4(), email, Some(name.to_string()), None, role);
        self.store.upsert_actor(&actor).await.expect("seed actor");
        verified(actor.actor_id, email, name)
    }

    pub async fn seed_admin(&self) -> AuthenticatedActor {
        self.seed_actor("admin@example.com", "Platform Admin", ActorRole::PlatformAdmin)
            .await
    }

    /// An active cabinet and its owner.
    pub async fn seed_cabinet_with_owner(&self) -> (Cabinet, AuthenticatedActor) {
        let owner = self
            .seed_actor("ana.souza@example.com", "Ana Souza", ActorRole::Politician)
            .await;
        let cabinet = self
            .store
            .insert_cabinet(&Cabinet::new(
                "Gabinete da Vereadora Ana Souza".to_string(),
                owner.actor_id,
                None,
            ))
            .await
            .expect("seed cabinet")
            .into_inner();
        self.store
            .insert_membership(&Membership::new(
                cabinet.cabinet_id,
                owner.actor_id,
                MemberRole::Owner,
            ))
            .await
            .expect("seed owner membership");
        (cabinet, owner)
    }

    /// Add `email` to `cabinet` with `role`, bypassing invitations.
    pub async fn seed_member(
        &self,
        cabinet: &Cabinet,
        email: &str,
        name: &str,
        role: MemberRole,
    ) -> AuthenticatedActor {
        let actor_role = match role {
            MemberRole::Owner => ActorRole::Politician,
            MemberRole::Lead => ActorRole::CabinetLead,
            MemberRole::Staff => ActorRole::Staff,
        };
        let member = self.seed_actor(email, name, actor_role).await;
        self.store
            .insert_membership(&Membership::new(cabinet.cabinet_id, member.actor_id, role))
            .await
            .expect("seed membership");
        member
    }

    pub async fn invite_staff(
        &self,
        inviter: &AuthenticatedActor,
        cabinet: &Cabinet,
        email: &str,
    ) -> IssuedInvitation {
        self.state
            .invitations
            .issue_invitation(inviter, team_request(cabinet.cabinet_id, email, InvitationRole::Staff))
            .await
            .expect("issue staff invitation")
    }

    pub async fn invite_politician(
        &self,
        admin: &AuthenticatedActor,
        email: &str,
        name: &str,
    ) -> IssuedInvitation {
        self.state
            .invitations
            .issue_invitation(admin, politician_request(email, name))
            .await
            .expect("issue politician invitation")
    }
}

/// A caller whose identity provider has verified their email.
pub fn verified(actor_id: Uuid, email: &str, name: &str) -> AuthenticatedActor {
    AuthenticatedActor {
        actor_id,
        email: email.to_string(),
        email_verified: true,
        display_name: Some(name.to_string()),
    }
}

/// A brand-new identity that has never been seen by the store.
pub fn new_identity(email: &str, name: &str) -> AuthenticatedActor {
    verified(Uuid::new_v4(), email, name)
}

pub fn team_request(cabinet_id: Uuid, email: &str, role: InvitationRole) -> IssueInvitationRequest {
    IssueInvitationRequest {
        email: email.to_string(),
        name: "Jane Doe".to_string(),
        role,
        cabinet_id: Some(cabinet_id),
        institution_id: None,
        institution_name: None,
        chamber_kind: None,
    }
}

pub fn politician_request(email: &str, name: &str) -> IssueInvitationRequest {
    IssueInvitationRequest {
        email: email.to_string(),
        name: name.to_string(),
        role: InvitationRole::Politician,
        cabinet_id: None,
        institution_id: Some(Uuid::new_v4()),
        institution_name: Some("Câmara Municipal de Campinas".to_string()),
        chamber_kind: Some(ChamberKind::Municipal),
    }
}

/// Delegates to the in-memory store after a `yield_now`.
pub struct YieldingStore(pub Arc<InMemoryStore>);

#[async_trait]
impl CabinetStore for YieldingStore {
    async fn health_check(&self) -> StoreResult<()> {
        tokio::task::yield_now().await;
        self.0.health_check().await
    }

    async fn upsert_actor(&self, actor: &Actor) -> StoreResult<Actor> {
        tokio::task::yield_now().await;
        self.0.upsert_actor(actor).await
    }

    async fn find_actor(&self, actor_id: Uuid) -> StoreResult<Option<Actor>> {
        tokio::task::yield_now().await;
        self.0.find_actor(actor_id).await
    }

    async fn find_cabinet(&self, cabinet_id: Uuid) -> StoreResult<Option<Cabinet>> {
        tokio::task::yield_now().await;
        self.0.find_cabinet(cabinet_id).await
    }

    async fn find_active_cabinet_for_politician(
        &self,
        politician_id: Uuid,
    ) -> StoreResult<Option<Cabinet>> {
        tokio::task::yield_now().await;
        self.0.find_active_cabinet_for_politician(politician_id).await
    }

    async fn insert_cabinet(&self, cabinet: &Cabinet) -> StoreResult<Inserted<Cabinet>> {
        tokio::task::yield_now().await;
        self.0.insert_cabinet(cabinet).await
    }

    async fn soft_delete_cabinet(&self, cabinet_id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
        tokio::task::yield_now().await;
        self.0.soft_delete_cabinet(cabinet_id, at).await
    }

    async fn find_membership(
        &self,
        actor_id: Uuid,
        cabinet_id: Uuid,
    ) -> StoreResult<Option<Membership>> {
        tokio::task::yield_now().await;
        self.0.find_membership(actor_id, cabinet_id).await
    }

    async fn insert_membership(&self, membership: &Membership) -> StoreResult<Inserted<Membership>> {
        tokio::task::yield_now().await;
        self.0.insert_membership(membership).await
    }

    async fn list_memberships(&self, cabinet_id: Uuid) -> StoreResult<Vec<Membership>> {
        tokio::task::yield_now().await;
        self.0.list_memberships(cabinet_id).await
    }

    async fn delete_membership(&self, cabinet_id: Uuid, actor_id: Uuid) -> StoreResult<bool> {
        tokio::task::yield_now().await;
        self.0.delete_membership(cabinet_id, actor_id).await
    }

    async fn list_permission_overrides(
        &self,
        cabinet_id: Uuid,
        actor_id: Uuid,
    ) -> StoreResult<Vec<PermissionOverride>> {
        tokio::task::yield_now().await;
        self.0.list_permission_overrides(cabinet_id, actor_id).await
    }

    async fn replace_permission_overrides(
        &self,
        cabinet_id: Uuid,
        actor_id: Uuid,
        overrides: &[PermissionOverride],
    ) -> StoreResult<()> {
        tokio::task::yield_now().await;
        self.0
            .replace_permission_overrides(cabinet_id, actor_id, overrides)
            .await
    }

    async fn delete_permission_overrides(
        &self,
        cabinet_id: Uuid,
        actor_id: Uuid,
    ) -> StoreResult<u64> {
        tokio::task::yield_now().await;
        self.0.delete_permission_overrides(cabinet_id, actor_id).await
    }

    async fn insert_invitation(&self, invitation: &Invitation) -> StoreResult<()> {
        tokio::task::yield_now().await;
        self.0.insert_invitation(invitation).await
    }

    async fn find_invitation_by_token_hash(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<Invitation>> {
        tokio::task::yield_now().await;
        self.0.find_invitation_by_token_hash(token_hash).await
    }

    async fn consume_invitation(
        &self,
        invitation_id: Uuid,
        accepted_by: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        tokio::task::yield_now().await;
        self.0.consume_invitation(invitation_id, accepted_by, at).await
    }

    async fn delete_pending_invitation(&self, token_hash: &str) -> StoreResult<bool> {
        tokio::task::yield_now().await;
        self.0.delete_pending_invitation(token_hash).await
    }

    async fn delete_pending_invitation_by_id(
        &self,
        cabinet_id: Uuid,
        invitation_id: Uuid,
    ) -> StoreResult<bool> {
        tokio::task::yield_now().await;
        self.0
            .delete_pending_invitation_by_id(cabinet_id, invitation_id)
            .await
    }

    async fn delete_pending_invitations_for_email(
        &self,
        cabinet_id: Uuid,
        email: &str,
    ) -> StoreResult<u64> {
        tokio::task::yield_now().await;
        self.0
            .delete_pending_invitations_for_email(cabinet_id, email)
            .await
    }

    async fn list_invitations_for_cabinet(&self, cabinet_id: Uuid) -> StoreResult<Vec<Invitation>> {
        tokio::task::yield_now().await;
        self.0.list_invitations_for_cabinet(cabinet_id).await
    }

    async fn prune_expired_invitations(&self, before: DateTime<Utc>) -> StoreResult<u64> {
        tokio::task::yield_now().await;
        self.0.prune_expired_invitations(before).await
    }

    async fn count_two_factor_codes_since(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<i64> {
        tokio::task::yield_now().await;
        self.0.count_two_factor_codes_since(email, since).await
    }

    async fn insert_two_factor_code(&self, code: &TwoFactorCode) -> StoreResult<()> {
        tokio::task::yield_now().await;
        self.0.insert_two_factor_code(code).await
    }

    async fn find_latest_two_factor_code(
        &self,
        email: &str,
        code_hash: &str,
    ) -> StoreResult<Option<TwoFactorCode>> {
        tokio::task::yield_now().await;
        self.0.find_latest_two_factor_code(email, code_hash).await
    }

    async fn find_latest_valid_two_factor_code(
        &self,
        email: &str,
        code_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<TwoFactorCode>> {
        tokio::task::yield_now().await;
        self.0
            .find_latest_valid_two_factor_code(email, code_hash, now)
            .await
    }

    async fn mark_two_factor_code_used(&self, code_id: Uuid) -> StoreResult<bool> {
        tokio::task::yield_now().await;
        self.0.mark_two_factor_code_used(code_id).await
    }

    async fn record_failed_two_factor_attempt(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        tokio::task::yield_now().await;
        self.0.record_failed_two_factor_attempt(email, now).await
    }

    async fn prune_two_factor_codes(
        &self,
        before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<u64> {
        tokio::task::yield_now().await;
        self.0.prune_two_factor_codes(before, now).await
    }
}
