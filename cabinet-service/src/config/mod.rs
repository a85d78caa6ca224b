use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct CabinetConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub store_backend: StoreBackend,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    /// `None` outside production when `SMTP_HOST` is unset; emails are then only recorded.
    pub smtp: Option<SmtpConfig>,
    pub invitations: InvitationConfig,
    pub two_factor: TwoFactorConfig,
    pub permissions_table_path: Option<String>,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// HS256 secret shared with the identity provider.
    pub secret: String,
    pub issuer: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvitationConfig {
    /// Front-end origin used to build acceptance links.
    pub base_url: String,
    pub politician_expiry_hours: i64,
    pub team_expiry_hours: i64,
    /// Unaccepted invitations are deleted this many days after they expire.
    pub retention_days: i64,
}

impl Default for InvitationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            politician_expiry_hours: 24,
            team_expiry_hours: 168,
            retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwoFactorConfig {
    pub expiry_seconds: i64,
    /// Codes issued per email within `window_seconds`.
    pub max_per_window: i64,
    pub window_seconds: i64,
    /// Wrong guesses tolerated before outstanding codes for an email lock.
    pub max_attempts: i32,
    /// Requests per client IP on the /auth/2fa routes within `ip_window_seconds`.
    pub ip_limit: u32,
    pub ip_window_seconds: u64,
}

impl Default for TwoFactorConfig {
    fn default() -> Self {
        Self {
            expiry_seconds: 300,
            max_per_window: 3,
            window_seconds: 900,
            max_attempts: 5,
            ip_limit: 10,
            ip_window_seconds: 60,
        }
    }
}

impl CabinetConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;
        let invitation_defaults = InvitationConfig::default();
        let two_factor_defaults = TwoFactorConfig::default();

        let store_backend: StoreBackend = get_env("STORE_BACKEND", Some("postgres"), false)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let smtp = match env::var("SMTP_HOST") {
            Ok(host) => Some(SmtpConfig {
                host,
                port: parse_env("SMTP_PORT", "587")?,
                user: get_env("SMTP_USER", None, is_prod)?,
                password: get_env("SMTP_PASSWORD", None, is_prod)?,
                from: get_env("EMAIL_FROM", None, is_prod)?,
            }),
            Err(_) if is_prod => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "SMTP_HOST is required in production but not set"
                )))
            }
            Err(_) => None,
        };

        let config = CabinetConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("cabinet-service"), false)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), false)?,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            store_backend,
            database: DatabaseConfig {
                url: if store_backend == StoreBackend::Postgres {
                    get_env("DATABASE_URL", None, is_prod)?
                } else {
                    env::var("DATABASE_URL").unwrap_or_default()
                },
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10")?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1")?,
            },
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET", None, is_prod)?,
                issuer: env::var("JWT_ISSUER").ok().filter(|s| !s.is_empty()),
            },
            smtp,
            invitations: InvitationConfig {
                base_url: get_env("APP_BASE_URL", Some(invitation_defaults.base_url.as_str()), is_prod)?,
                politician_expiry_hours: parse_env("POLITICIAN_INVITE_EXPIRY_HOURS", "24")?,
                team_expiry_hours: parse_env("TEAM_INVITE_EXPIRY_HOURS", "168")?,
                retention_days: parse_env("INVITATION_RETENTION_DAYS", "30")?,
            },
            two_factor: TwoFactorConfig {
                expiry_seconds: parse_env("TWO_FACTOR_EXPIRY_SECONDS", "300")?,
                max_per_window: parse_env("TWO_FACTOR_MAX_PER_WINDOW", "3")?,
                window_seconds: parse_env("TWO_FACTOR_WINDOW_SECONDS", "900")?,
                max_attempts: parse_env("TWO_FACTOR_MAX_ATTEMPTS", "5")?,
                ip_limit: get_env("TWO_FACTOR_IP_LIMIT", Some("10"), false)?
                    .parse()
                    .unwrap_or(two_factor_defaults.ip_limit),
                ip_window_seconds: get_env("TWO_FACTOR_IP_WINDOW_SECONDS", Some("60"), false)?
                    .parse()
                    .unwrap_or(two_factor_defaults.ip_window_seconds),
            },
            permissions_table_path: env::var("PERMISSIONS_TABLE_PATH")
                .ok()
                .filter(|s| !s.is_empty()),
            allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.invitations.politician_expiry_hours <= 0
            || self.invitations.team_expiry_hours <= 0
            || self.invitations.retention_days <= 0
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Invitation expiry hours must be positive"
            )));
        }

        if self.two_factor.expiry_seconds <= 0
            || self.two_factor.window_seconds <= 0
            || self.two_factor.max_per_window <= 0
            || self.two_factor.max_attempts <= 0
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TWO_FACTOR_* settings must be positive"
            )));
        }

        if self.jwt.secret.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!("JWT_SECRET must not be empty")));
        }

        if self.environment == Environment::Prod {
            if self.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.jwt.secret.len() < 32 {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "JWT_SECRET must be at least 32 characters in production"
                )));
            }

            if self.store_backend == StoreBackend::Memory {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "STORE_BACKEND=memory is not allowed in production"
                )));
            }
        }

        Ok(())
    }

    pub fn is_prod(&self) -> bool {
        self.environment == Environment::Prod
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

/// Tunable with a default in every environment. Malformed values are an error.
fn parse_env<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), false)?
        .trim()
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(format!("Invalid store backend: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prod_config() -> CabinetConfig {
        CabinetConfig {
            common: core_config::Config::default(),
            environment: Environment::Prod,
            service_name: "cabinet-service".into(),
            service_version: "test".into(),
            log_level: "info".into(),
            otlp_endpoint: None,
            store_backend: StoreBackend::Postgres,
            database: DatabaseConfig {
                url: "postgres://localhost/cabinet".into(),
                max_connections: 5,
                min_connections: 1,
            },
            jwt: JwtConfig {
                secret: "x".repeat(32),
                issuer: None,
            },
            smtp: None,
            invitations: InvitationConfig::default(),
            two_factor: TwoFactorConfig::default(),
            permissions_table_path: None,
            allowed_origins: vec!["https://app.example.com".into()],
        }
    }

    #[test]
    fn parses_environment_and_backend() {
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Prod));
        assert_eq!("memory".parse::<StoreBackend>(), Ok(StoreBackend::Memory));
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn production_rejects_wildcard_origin() {
        let mut config = prod_config();
        assert!(config.validate().is_ok());
        config.allowed_origins.push("*".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn production_rejects_short_secret_and_memory_store() {
        let mut config = prod_config();
        config.jwt.secret = "short".into();
        assert!(config.validate().is_err());

        let mut config = prod_config();
        config.store_backend = StoreBackend::Memory;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_positive_expiry() {
        let mut config = prod_config();
        config.environment = Environment::Dev;
        config.invitations.team_expiry_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_attempt_budget() {
        let mut config = prod_config();
        config.environment = Environment::Dev;
        config.two_factor.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
