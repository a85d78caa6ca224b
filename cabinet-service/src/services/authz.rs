//! Authorization model for cabinets.
//!
//! Permission *loading* never fails: a missing membership, a deleted cabinet or a
//! store error all resolve to [`PermissionSet::denied`]. Enforcement goes through
//! [`PermissionService::require`] on every data-access path.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;

use super::error::ServiceError;
use super::store::{CabinetStore, StoreResult};
use crate::models::{
    Action, Cabinet, MemberRole, Membership, Module, ModulePermission, PermissionOverride,
    PermissionSet,
};

/// Role-to-capability table applied to cabinet memberships.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleCapabilityTable {
    rows: HashMap<MemberRole, PermissionSet>,
}

impl Default for RoleCapabilityTable {
    /// Owner and lead get full access everywhere, staff start read-only.
    fn default() -> Self {
        let rows = HashMap::from([
            (MemberRole::Owner, PermissionSet::uniform(ModulePermission::FULL_ACCESS)),
            (MemberRole::Lead, PermissionSet::uniform(ModulePermission::FULL_ACCESS)),
            (MemberRole::Staff, PermissionSet::uniform(ModulePermission::READ_ONLY)),
        ]);
        Self { rows }
    }
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct RawTable(HashMap<String, HashMap<String, ModulePermission>>);

impl RoleCapabilityTable {
    pub fn new(rows: HashMap<MemberRole, PermissionSet>) -> Self {
        Self { rows }
    }

    /// Load a table from a TOML, YAML or JSON file keyed by role then module:
    ///
    /// ```toml
    /// [staff]
    /// agenda = { can_read = true, can_write = true }
    /// ```
    ///
    /// Roles left out of the file get no access, as do modules left out of a row.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let raw: RawTable = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()?;

        let mut rows = HashMap::new();
        for (role, modules) in raw.0 {
            let role: MemberRole = role
                .parse()
                .map_err(|e| AppError::ConfigError(anyhow::anyhow!("{}: {}", path.display(), e)))?;
            let mut grants = Vec::with_capacity(modules.len());
            for (module, permission) in modules {
                let module: Module = module.parse().map_err(|e| {
                    AppError::ConfigError(anyhow::anyhow!("{}: {}", path.display(), e))
                })?;
                grants.push((module, permission));
            }
            rows.insert(role, PermissionSet::from_grants(grants));
        }

        tracing::info!(path = %path.display(), roles = rows.len(), "Loaded role capability table");
        Ok(Self { rows })
    }

    pub fn row(&self, role: MemberRole) -> PermissionSet {
        self.rows.get(&role).cloned().unwrap_or_default()
    }

    /// Expand a membership into its matrix. Overrides only apply to staff.
    pub fn expand(&self, membership: &Membership, overrides: &[PermissionOverride]) -> PermissionSet {
        let mut set = self.row(membership.member_role);
        if membership.member_role == MemberRole::Staff {
            for o in overrides {
                set.set(o.module, o.permission);
            }
        }
        set
    }
}

/// A caller's standing in one cabinet.
#[derive(Debug, Clone)]
pub struct CabinetAccess {
    pub cabinet: Cabinet,
    pub membership: Membership,
    pub permissions: PermissionSet,
}

#[derive(Clone)]
pub struct PermissionService {
    store: Arc<dyn CabinetStore>,
    table: Arc<RoleCapabilityTable>,
}

impl PermissionService {
    pub fn new(store: Arc<dyn CabinetStore>, table: Arc<RoleCapabilityTable>) -> Self {
        Self { store, table }
    }

    pub fn table(&self) -> &RoleCapabilityTable {
        &self.table
    }

    /// Membership and matrix of `actor_id` in an active cabinet, or `None`.
    pub async fn cabinet_access(
        &self,
        actor_id: Uuid,
        cabinet_id: Uuid,
    ) -> StoreResult<Option<CabinetAccess>> {
        let Some(cabinet) = self.store.find_cabinet(cabinet_id).await? else {
            return Ok(None);
        };
        if !cabinet.is_active() {
            return Ok(None);
        }
        let Some(membership) = self.store.find_membership(actor_id, cabinet_id).await? else {
            return Ok(None);
        };

        let overrides = if membership.member_role == MemberRole::Staff {
            self.store
                .list_permission_overrides(cabinet_id, actor_id)
                .await?
        } else {
            Vec::new()
        };
        let permissions = self.table.expand(&membership, &overrides);

        Ok(Some(CabinetAccess {
            cabinet,
            membership,
            permissions,
        }))
    }

    /// Full matrix for `actor_id` in `cabinet_id`. Fails closed.
    #[tracing::instrument(skip(self))]
    pub async fn load_permissions(&self, actor_id: Uuid, cabinet_id: Uuid) -> PermissionSet {
        match self.cabinet_access(actor_id, cabinet_id).await {
            Ok(Some(access)) => access.permissions,
            Ok(None) => {
                tracing::debug!("No active membership, denying all modules");
                PermissionSet::denied()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Permission lookup failed, denying all modules");
                PermissionSet::denied()
            }
        }
    }

    pub async fn has_permission(
        &self,
        actor_id: Uuid,
        cabinet_id: Uuid,
        module: Module,
        action: Action,
    ) -> bool {
        self.load_permissions(actor_id, cabinet_id)
            .await
            .has_permission(module, action)
    }

    /// Server-side enforcement for data access.
    pub async fn require(
        &self,
        actor_id: Uuid,
        cabinet_id: Uuid,
        module: Module,
        action: Action,
    ) -> Result<PermissionSet, ServiceError> {
        let permissions = self.load_permissions(actor_id, cabinet_id).await;
        if permissions.has_permission(module, action) {
            Ok(permissions)
        } else {
            tracing::info!(
                actor_id = %actor_id,
                cabinet_id = %cabinet_id,
                module = module.as_str(),
                action = action.as_str(),
                "Permission denied"
            );
            Err(ServiceError::PermissionDenied("missing module permission"))
        }
    }

    /// Platform administrators act on any cabinet. Unknown actors are not admins.
    pub async fn is_platform_admin(&self, actor_id: Uuid) -> bool {
        match self.store.find_actor(actor_id).await {
            Ok(actor) => actor.is_some_and(|a| a.is_platform_admin()),
            Err(e) => {
                tracing::warn!(error = %e, actor_id = %actor_id, "Actor lookup failed");
                false
            }
        }
    }

    pub async fn can_manage_team(&self, actor_id: Uuid, cabinet_id: Uuid) -> bool {
        match self.cabinet_access(actor_id, cabinet_id).await {
            Ok(Some(access)) => access.membership.member_role.manages_team(),
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Membership lookup failed, refusing team management");
                false
            }
        }
    }

    /// Owner or lead of the cabinet, or a platform administrator.
    pub async fn require_manager(&self, actor_id: Uuid, cabinet_id: Uuid) -> Result<(), ServiceError> {
        if self.can_manage_team(actor_id, cabinet_id).await || self.is_platform_admin(actor_id).await {
            Ok(())
        } else {
            Err(ServiceError::PermissionDenied("only cabinet managers can do this"))
        }
    }
}

/// Which permission matrix a gate is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GateScope {
    pub actor_id: Uuid,
    pub cabinet_id: Uuid,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateState {
    Unloaded,
    Loading { scope: GateScope },
    Loaded { scope: GateScope, permissions: PermissionSet },
    Denied { scope: GateScope },
}

/// Client-side gate over a permission matrix.
///
/// Nothing is granted until a load for the current scope resolves, and a scope
/// change drops the previous matrix before the new one is fetched.
#[derive(Debug, Clone)]
pub struct PermissionGate {
    state: GateState,
}

impl Default for PermissionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PermissionGate {
    pub fn new() -> Self {
        Self {
            state: GateState::Unloaded,
        }
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, GateState::Loading { .. })
    }

    pub fn begin(&mut self, scope: GateScope) {
        self.state = GateState::Loading { scope };
    }

    /// Apply a load result. Returns false when `scope` is no longer the one being loaded.
    pub fn resolve(&mut self, scope: GateScope, permissions: Option<PermissionSet>) -> bool {
        match self.state {
            GateState::Loading { scope: current } if current == scope => {
                self.state = match permissions {
                    Some(permissions) => GateState::Loaded { scope, permissions },
                    None => GateState::Denied { scope },
                };
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.state = GateState::Unloaded;
    }

    pub fn has_permission(&self, module: Module, action: Action) -> bool {
        match &self.state {
            GateState::Loaded { permissions, .. } => permissions.has_permission(module, action),
            _ => false,
        }
    }

    /// Gated content renders only once read access is known.
    pub fn should_render(&self, module: Module) -> bool {
        self.has_permission(module, Action::Read)
    }

    /// Run a full load cycle for `scope` against the service.
    pub async fn refresh(&mut self, service: &PermissionService, scope: GateScope) {
        self.begin(scope);
        let permissions = match service.cabinet_access(scope.actor_id, scope.cabinet_id).await {
            Ok(access) => access.map(|a| a.permissions),
            Err(e) => {
                tracing::warn!(error = %e, "Permission gate load failed");
                None
            }
        };
        self.resolve(scope, permissions);
    }
}
