//! Two-factor code model.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle of a code. `Issued` moves to `PendingEntry` as soon as it is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TwoFactorState {
    Issued,
    PendingEntry,
    Verified,
    Expired,
    Consumed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TwoFactorCode {
    pub code_id: Uuid,
    pub email: String,
    pub code_hash: String,
    pub expiry_utc: DateTime<Utc>,
    pub used: bool,
    /// Wrong guesses recorded against the email while this code was live.
    pub attempt_count: i32,
    pub created_utc: DateTime<Utc>,
}

impl TwoFactorCode {
    pub fn new(email: String, code_hash: String, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            code_id: Uuid::new_v4(),
            email,
            code_hash,
            expiry_utc: now + ttl,
            used: false,
            attempt_count: 0,
            created_utc: now,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry_utc
    }

    pub fn attempts_exhausted(&self, max_attempts: i32) -> bool {
        self.attempt_count >= max_attempts
    }

    /// A used code is consumed even when it has also expired since.
    pub fn state_at(&self, now: DateTime<Utc>) -> TwoFactorState {
        if self.used {
            TwoFactorState::Consumed
        } else if self.is_expired_at(now) {
            TwoFactorState::Expired
        } else {
            TwoFactorState::PendingEntry
        }
    }
}
