//! Email two-factor codes: issuance with per-email throttling and single-use verification.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::ValidateEmail;

use super::email::EmailProvider;
use super::error::ServiceError;
use super::metrics;
use super::store::CabinetStore;
use crate::config::TwoFactorConfig;
use crate::models::actor::normalize_email;
use crate::models::TwoFactorCode;

const CODE_LENGTH: usize = 6;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IssuedCode {
    pub code_id: Uuid,
    /// Seconds until the code expires.
    pub expires_in: i64,
}

/// Codes are stored as SHA-256 of `email:code`.
pub fn hash_code(email: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", email, code).as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Clone)]
pub struct TwoFactorService {
    store: Arc<dyn CabinetStore>,
    email: Arc<dyn EmailProvider>,
    config: TwoFactorConfig,
}

impl TwoFactorService {
    pub fn new(
        store: Arc<dyn CabinetStore>,
        email: Arc<dyn EmailProvider>,
        config: TwoFactorConfig,
    ) -> Self {
        Self {
            store,
            email,
            config,
        }
    }

    /// Generate, store and email a fresh code.
    #[tracing::instrument(skip_all)]
    pub async fn issue_code(&self, email: &str) -> Result<IssuedCode, ServiceError> {
        let email = normalize_email(email);
        if !email.validate_email() {
            return Err(ServiceError::Validation(
                "email: Invalid email format".to_string(),
            ));
        }

        let window_start = Utc::now() - Duration::seconds(self.config.window_seconds);
        let recent = self
            .store
            .count_two_factor_codes_since(&email, window_start)
            .await?;
        if recent >= self.config.max_per_window {
            tracing::warn!(recent, "Two-factor issuance throttled");
            return Err(ServiceError::TooManyRequests {
                retry_after_secs: self.config.window_seconds.max(1) as u64,
            });
        }

        let code = generate_code();
        let record = TwoFactorCode::new(
            email.clone(),
            hash_code(&email, &code),
            Duration::seconds(self.config.expiry_seconds),
        );
        self.store.insert_two_factor_code(&record).await?;

        let expires_in_minutes = (self.config.expiry_seconds + 59) / 60;
        self.email
            .send_two_factor_code(&email, &code, expires_in_minutes)
            .await
            .map_err(|e| {
                tracing::error!(code_id = %record.code_id, error = %e, "Two-factor code dispatch failed");
                ServiceError::Dispatch(e.to_string())
            })?;

        metrics::two_factor_issued();
        tracing::info!(code_id = %record.code_id, "Two-factor code issued");

        Ok(IssuedCode {
            code_id: record.code_id,
            expires_in: self.config.expiry_seconds,
        })
    }

    /// Consume a code. Succeeds at most once per code, even under concurrent calls.
    #[tracing::instrument(skip_all)]
    pub async fn verify_code(&self, email: &str, code: &str) -> Result<(), ServiceError> {
        let code = code.trim();
        if !is_well_formed(code) {
            return Err(ServiceError::Validation(
                "code: must be exactly 6 digits".to_string(),
            ));
        }
        let email = normalize_email(email);
        let code_hash = hash_code(&email, code);
        let now = Utc::now();

        if let Some(valid) = self
            .store
            .find_latest_valid_two_factor_code(&email, &code_hash, now)
            .await?
        {
            if valid.attempts_exhausted(self.config.max_attempts) {
                metrics::two_factor_verification("locked");
                tracing::warn!(code_id = %valid.code_id, "Two-factor code locked after repeated guesses");
                return Err(ServiceError::AttemptsExhausted);
            }
            if self.store.mark_two_factor_code_used(valid.code_id).await? {
                metrics::two_factor_verification("verified");
                tracing::info!(code_id = %valid.code_id, "Two-factor code verified");
                return Ok(());
            }
            metrics::two_factor_verification("already_used");
            return Err(ServiceError::AlreadyUsed);
        }

        let latest = self
            .store
            .find_latest_two_factor_code(&email, &code_hash)
            .await?;
        let (outcome, error) = match latest {
            Some(c) if c.used => ("already_used", ServiceError::AlreadyUsed),
            Some(c) if c.is_expired_at(now) => ("expired", ServiceError::CodeExpired),
            _ => {
                let live = self.store.record_failed_two_factor_attempt(&email, now).await?;
                tracing::debug!(live, "Wrong guess counted against outstanding codes");
                ("not_found", ServiceError::NotFound("Verification code"))
            }
        };
        metrics::two_factor_verification(outcome);
        tracing::info!(outcome, "Two-factor verification rejected");
        Err(error)
    }

    /// Drop spent codes once they can no longer count towards the issuance window.
    #[tracing::instrument(skip_all)]
    pub async fn prune_expired(&self) -> Result<u64, ServiceError> {
        let now = Utc::now();
        let keep_for = self.config.window_seconds.max(self.config.expiry_seconds);
        let removed = self
            .store
            .prune_two_factor_codes(now - Duration::seconds(keep_for), now)
            .await?;
        if removed > 0 {
            tracing::info!(removed, "Pruned two-factor codes");
        }
        Ok(removed)
    }
}
