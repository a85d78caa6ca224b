use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::AuthenticatedActor;

/// Validates bearer tokens issued by the identity provider (HS256, shared secret).
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: Option<String>,
}

/// Claims the identity provider puts in its access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorClaims {
    /// Subject (actor ID)
    pub sub: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,
}

impl TryFrom<ActorClaims> for AuthenticatedActor {
    type Error = anyhow::Error;

    fn try_from(claims: ActorClaims) -> Result<Self, Self::Error> {
        let actor_id = Uuid::parse_str(&claims.sub)
            .map_err(|e| anyhow::anyhow!("Token subject is not a valid actor id: {}", e))?;
        Ok(AuthenticatedActor {
            actor_id,
            email: claims.email,
            email_verified: claims.email_verified,
            display_name: claims.name,
        })
    }
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Result<Self, anyhow::Error> {
        if config.secret.is_empty() {
            return Err(anyhow::anyhow!("JWT secret must not be empty"));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;
        // Provider tokens carry an `aud` we do not pin.
        validation.validate_aud = false;
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        tracing::info!("JWT service initialized with HS256 secret");

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
        })
    }

    /// Validate signature, expiry and issuer, then map the claims to an actor.
    pub fn validate_token(&self, token: &str) -> Result<AuthenticatedActor, anyhow::Error> {
        let data = decode::<ActorClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| anyhow::anyhow!("Invalid token: {}", e))?;
        AuthenticatedActor::try_from(data.claims)
    }

    /// Sign a token the same way the identity provider does. Used by tooling and tests.
    pub fn issue_token(
        &self,
        actor: &AuthenticatedActor,
        ttl: Duration,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let claims = ActorClaims {
            sub: actor.actor_id.to_string(),
            email: actor.email.clone(),
            email_verified: actor.email_verified,
            name: actor.display_name.clone(),
            iss: self.issuer.clone(),
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode token: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(issuer: Option<&str>) -> JwtService {
        JwtService::new(&JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hs256".to_string(),
            issuer: issuer.map(str::to_string),
        })
        .unwrap()
    }

    fn actor() -> AuthenticatedActor {
        AuthenticatedActor {
            actor_id: Uuid::new_v4(),
            email: "jane@example.com".to_string(),
            email_verified: true,
            display_name: Some("Jane".to_string()),
        }
    }

    #[test]
    fn issued_token_validates() {
        let jwt = service(Some("https://id.example.com"));
        let actor = actor();
        let token = jwt.issue_token(&actor, Duration::minutes(5)).unwrap();
        assert_eq!(jwt.validate_token(&token).unwrap(), actor);
    }

    #[test]
    fn expired_token_is_rejected() {
        let jwt = service(None);
        let token = jwt.issue_token(&actor(), Duration::minutes(-10)).unwrap();
        assert!(jwt.validate_token(&token).is_err());
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let token = service(Some("https://other.example.com"))
            .issue_token(&actor(), Duration::minutes(5))
            .unwrap();
        assert!(service(Some("https://id.example.com"))
            .validate_token(&token)
            .is_err());
    }
}
