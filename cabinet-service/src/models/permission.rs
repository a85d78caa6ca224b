//! Permission model - the module/action capability matrix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::UnknownVariant;

/// Feature areas of a cabinet that permissions are granted on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    Agenda,
    Constituents,
    Demands,
    BillsIdeas,
    Indications,
    PublicPages,
}

impl Module {
    pub const ALL: [Module; 6] = [
        Module::Agenda,
        Module::Constituents,
        Module::Demands,
        Module::BillsIdeas,
        Module::Indications,
        Module::PublicPages,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Agenda => "agenda",
            Module::Constituents => "constituents",
            Module::Demands => "demands",
            Module::BillsIdeas => "bills_ideas",
            Module::Indications => "indications",
            Module::PublicPages => "public_pages",
        }
    }
}

impl FromStr for Module {
    type Err = UnknownVariant;

    /// Also accepts the legacy Portuguese keys still stored by older clients.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agenda" => Ok(Module::Agenda),
            "constituents" | "eleitores" => Ok(Module::Constituents),
            "demands" | "demandas" => Ok(Module::Demands),
            "bills_ideas" | "projetos_lei" => Ok(Module::BillsIdeas),
            "indications" | "indicacoes" => Ok(Module::Indications),
            "public_pages" | "publicos" => Ok(Module::PublicPages),
            other => Err(UnknownVariant::new("module", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Read,
    Write,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Read => "read",
            Action::Write => "write",
            Action::Delete => "delete",
        }
    }
}

impl FromStr for Action {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Action::Read),
            "write" => Ok(Action::Write),
            "delete" => Ok(Action::Delete),
            other => Err(UnknownVariant::new("action", other)),
        }
    }
}

/// Capability triple for one module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ModulePermission {
    #[serde(default)]
    pub can_read: bool,
    #[serde(default)]
    pub can_write: bool,
    #[serde(default)]
    pub can_delete: bool,
}

impl ModulePermission {
    pub const NO_ACCESS: ModulePermission = ModulePermission {
        can_read: false,
        can_write: false,
        can_delete: false,
    };
    pub const READ_ONLY: ModulePermission = ModulePermission {
        can_read: true,
        can_write: false,
        can_delete: false,
    };
    pub const FULL_ACCESS: ModulePermission = ModulePermission {
        can_read: true,
        can_write: true,
        can_delete: true,
    };

    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Read => self.can_read,
            Action::Write => self.can_write,
            Action::Delete => self.can_delete,
        }
    }
}

/// Derived module -> capability matrix for one actor in one cabinet.
///
/// Every module of [`Module::ALL`] is always present; anything not granted is denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PermissionSet {
    #[schema(value_type = Object)]
    modules: BTreeMap<Module, ModulePermission>,
}

impl PermissionSet {
    /// The all-false matrix.
    pub fn denied() -> Self {
        Self::uniform(ModulePermission::NO_ACCESS)
    }

    pub fn uniform(permission: ModulePermission) -> Self {
        Self {
            modules: Module::ALL.iter().map(|m| (*m, permission)).collect(),
        }
    }

    /// Start from denied and grant what `grants` lists.
    pub fn from_grants<I>(grants: I) -> Self
    where
        I: IntoIterator<Item = (Module, ModulePermission)>,
    {
        let mut set = Self::denied();
        for (module, permission) in grants {
            set.modules.insert(module, permission);
        }
        set
    }

    pub fn set(&mut self, module: Module, permission: ModulePermission) {
        self.modules.insert(module, permission);
    }

    pub fn get(&self, module: Module) -> ModulePermission {
        self.modules
            .get(&module)
            .copied()
            .unwrap_or(ModulePermission::NO_ACCESS)
    }

    pub fn has_permission(&self, module: Module, action: Action) -> bool {
        self.get(module).allows(action)
    }

    /// String form used at the HTTP edge. Unknown module or action names are denials.
    pub fn has_permission_str(&self, module: &str, action: Option<&str>) -> bool {
        let Ok(module) = module.parse::<Module>() else {
            return false;
        };
        let action = match action {
            None => Action::default(),
            Some(a) => match a.parse::<Action>() {
                Ok(action) => action,
                Err(_) => return false,
            },
        };
        self.has_permission(module, action)
    }

    pub fn is_denied(&self) -> bool {
        self.modules
            .values()
            .all(|p| *p == ModulePermission::NO_ACCESS)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Module, ModulePermission)> + '_ {
        self.modules.iter().map(|(m, p)| (*m, *p))
    }
}

impl Default for PermissionSet {
    fn default() -> Self {
        Self::denied()
    }
}

/// Per-member capability override set by a cabinet manager for a staff member.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PermissionOverride {
    pub cabinet_id: Uuid,
    pub actor_id: Uuid,
    pub module: Module,
    pub permission: ModulePermission,
    pub updated_utc: DateTime<Utc>,
}

impl PermissionOverride {
    pub fn new(cabinet_id: Uuid, actor_id: Uuid, module: Module, permission: ModulePermission) -> Self {
        Self {
            cabinet_id,
            actor_id,
            module,
            permission,
            updated_utc: Utc::now(),
        }
    }
}
