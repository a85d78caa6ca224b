pub mod authz;
pub mod database;
pub mod email;
pub mod error;
pub mod invitations;
pub mod jwt;
pub mod memory;
pub mod metrics;
pub mod store;
pub mod team;
pub mod two_factor;

pub use authz::{CabinetAccess, GateScope, GateState, PermissionGate, PermissionService, RoleCapabilityTable};
pub use database::Database;
pub use email::{EmailProvider, EmailService, InvitationEmail, MockEmailService, SentEmail};
pub use error::ServiceError;
pub use invitations::{
    AcceptInvitationRequest, AcceptedInvitation, DispatchOutcome, FollowUpOutcome,
    InvitationDetails, InvitationService, IssueInvitationRequest, IssuedInvitation,
};
pub use jwt::JwtService;
pub use memory::InMemoryStore;
pub use store::{CabinetStore, Inserted, StoreError, StoreResult};
pub use team::{MemberView, SetOverridesRequest, TeamService};
pub use two_factor::{IssuedCode, TwoFactorService};
