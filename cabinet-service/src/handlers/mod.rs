pub mod invitation;
pub mod members;
pub mod metrics;
pub mod permissions;
pub mod two_factor;

use serde::Serialize;
use utoipa::ToSchema;

/// Error body rendered by `service_core::error::AppError`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable machine code, e.g. `invitation_expired`.
    pub code: Option<String>,
    pub details: Option<String>,
}
