//! Domain models for cabinets, their members and onboarding records.

pub mod actor;
pub mod cabinet;
pub mod invitation;
pub mod membership;
pub mod permission;
pub mod two_factor_code;

pub use actor::{Actor, ActorRole, AuthenticatedActor, Gender};
pub use cabinet::{cabinet_name, Cabinet, CabinetStatus, ChamberKind};
pub use invitation::{Invitation, InvitationRole, InvitationStatus, InvitationSummary};
pub use membership::{MemberRole, Membership};
pub use permission::{Action, Module, ModulePermission, PermissionOverride, PermissionSet};
pub use two_factor_code::{TwoFactorCode, TwoFactorState};

/// Error returned when a stored or submitted code does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
