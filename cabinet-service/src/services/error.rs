use service_core::error::AppError;
use thiserror::Error;

use super::store::StoreError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Invitation has expired")]
    Expired,

    #[error("Invitation has already been accepted")]
    AlreadyAccepted,

    #[error("Verification code has already been used")]
    AlreadyUsed,

    #[error("Verification code has expired")]
    CodeExpired,

    #[error("Verification code is locked after too many attempts")]
    AttemptsExhausted,

    #[error("Invitation was sent to {invited}, but you are signed in as {actual}")]
    EmailMismatch { invited: String, actual: String },

    #[error("Email dispatch failed: {0}")]
    Dispatch(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(&'static str),

    #[error("Too many requests")]
    TooManyRequests { retry_after_secs: u64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl ServiceError {
    /// Stable machine-readable code rendered in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation_failed",
            ServiceError::NotFound("Invitation") => "invitation_not_found",
            ServiceError::NotFound("Verification code") => "code_not_found",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Expired => "invitation_expired",
            ServiceError::AlreadyAccepted => "invitation_already_accepted",
            ServiceError::AlreadyUsed => "code_already_used",
            ServiceError::CodeExpired => "code_expired",
            ServiceError::AttemptsExhausted => "code_attempts_exhausted",
            ServiceError::EmailMismatch { .. } => "email_mismatch",
            ServiceError::Dispatch(_) => "dispatch_failed",
            ServiceError::PermissionDenied(_) => "permission_denied",
            ServiceError::TooManyRequests { .. } => "too_many_requests",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Store(_) => "store_unavailable",
            ServiceError::Internal(_) => "internal_error",
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let code = err.code();
        let message = err.to_string();
        let app = match err {
            ServiceError::Validation(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(message)),
            ServiceError::Expired | ServiceError::CodeExpired => {
                AppError::Gone(anyhow::anyhow!(message))
            }
            ServiceError::AlreadyAccepted | ServiceError::AlreadyUsed | ServiceError::Conflict(_) => {
                AppError::Conflict(anyhow::anyhow!(message))
            }
            ServiceError::EmailMismatch { .. } | ServiceError::PermissionDenied(_) => {
                AppError::Forbidden(anyhow::anyhow!(message))
            }
            ServiceError::TooManyRequests { retry_after_secs } => AppError::TooManyRequests(
                "Too many verification codes requested. Please try again later.".to_string(),
                Some(retry_after_secs),
            ),
            ServiceError::AttemptsExhausted => AppError::TooManyRequests(message, None),
            ServiceError::Dispatch(e) => AppError::BadGateway(e),
            ServiceError::Store(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        };
        app.with_code(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use service_core::axum::http::StatusCode;

    #[test]
    fn invitation_failures_map_to_distinct_statuses() {
        let not_found: AppError = ServiceError::NotFound("Invitation").into();
        let expired: AppError = ServiceError::Expired.into();
        let accepted: AppError = ServiceError::AlreadyAccepted.into();
        let mismatch: AppError = ServiceError::EmailMismatch {
            invited: "a@x.com".into(),
            actual: "b@x.com".into(),
        }
        .into();

        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(expired.status(), StatusCode::GONE);
        assert_eq!(accepted.status(), StatusCode::CONFLICT);
        assert_eq!(mismatch.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn email_mismatch_names_both_addresses() {
        let err = ServiceError::EmailMismatch {
            invited: "jane@example.com".into(),
            actual: "john@example.com".into(),
        };
        let text = err.to_string();
        assert!(text.contains("jane@example.com"));
        assert!(text.contains("john@example.com"));
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(ServiceError::NotFound("Invitation").code(), "invitation_not_found");
        assert_eq!(ServiceError::Expired.code(), "invitation_expired");
        assert_eq!(ServiceError::CodeExpired.code(), "code_expired");
        assert_eq!(ServiceError::AttemptsExhausted.code(), "code_attempts_exhausted");
    }

    #[test]
    fn locked_code_is_too_many_requests() {
        let locked: AppError = ServiceError::AttemptsExhausted.into();
        assert_eq!(locked.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
