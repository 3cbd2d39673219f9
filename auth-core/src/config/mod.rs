use secrecy::{ExposeSecret, SecretString};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub lockout: LockoutConfig,
    pub tokens: AccountTokenConfig,
    pub audit: AuditConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `None` runs the service on the in-memory store.
    pub url: Option<SecretString>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: SecretString,
    pub refresh_secret: SecretString,
    /// Duration string such as `15m`, `7d`, `3600`.
    pub access_ttl: String,
    pub refresh_ttl: String,
}

#[derive(Debug, Clone, Copy)]
pub struct LockoutConfig {
    pub threshold: i32,
    pub duration_minutes: i64,
}

impl LockoutConfig {
    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.duration_minutes)
    }
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            duration_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AccountTokenConfig {
    pub reset_ttl_minutes: i64,
    pub verification_ttl_hours: i64,
}

impl Default for AccountTokenConfig {
    fn default() -> Self {
        Self {
            reset_ttl_minutes: 60,
            verification_ttl_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AuditConfig {
    pub retention_days: i64,
    pub queue_capacity: usize,
    pub retention_interval_hours: u64,
}

impl AuditConfig {
    pub fn retention_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.retention_interval_hours * 3_600)
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retention_days: 90,
            queue_capacity: 1024,
            retention_interval_hours: 24,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

const DEV_ACCESS_SECRET: &str = "dev-access-secret-change-me-0123456789";
const DEV_REFRESH_SECRET: &str = "dev-refresh-secret-change-me-9876543210";
const MIN_PROD_SECRET_LEN: usize = 32;

// Upper bounds keep every derived duration far from chrono's range limits.
const MAX_LOCKOUT_MINUTES: i64 = 7 * 24 * 60;
const MAX_RESET_TTL_MINUTES: i64 = 7 * 24 * 60;
const MAX_VERIFICATION_TTL_HOURS: i64 = 30 * 24;
const MAX_RETENTION_DAYS: i64 = 100 * 365;
const MAX_RETENTION_INTERVAL_HOURS: u64 = 30 * 24;

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("auth-core"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: if is_prod {
                    Some(SecretString::new(get_env("DATABASE_URL", None, true)?))
                } else {
                    env::var("DATABASE_URL")
                        .ok()
                        .filter(|s| !s.is_empty())
                        .map(SecretString::new)
                },
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10")?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1")?,
            },
            jwt: JwtConfig {
                access_secret: SecretString::new(get_env(
                    "JWT_ACCESS_SECRET",
                    Some(DEV_ACCESS_SECRET),
                    is_prod,
                )?),
                refresh_secret: SecretString::new(get_env(
                    "JWT_REFRESH_SECRET",
                    Some(DEV_REFRESH_SECRET),
                    is_prod,
                )?),
                access_ttl: get_env("JWT_ACCESS_TTL", Some("15m"), is_prod)?,
                refresh_ttl: get_env("JWT_REFRESH_TTL", Some("7d"), is_prod)?,
            },
            lockout: LockoutConfig {
                threshold: parse_env("LOCKOUT_THRESHOLD", "5")?,
                duration_minutes: parse_env("LOCKOUT_DURATION_MINUTES", "30")?,
            },
            tokens: AccountTokenConfig {
                reset_ttl_minutes: parse_env("RESET_TOKEN_TTL_MINUTES", "60")?,
                verification_ttl_hours: parse_env("VERIFICATION_TOKEN_TTL_HOURS", "24")?,
            },
            audit: AuditConfig {
                retention_days: parse_env("AUDIT_RETENTION_DAYS", "90")?,
                queue_capacity: parse_env("AUDIT_QUEUE_CAPACITY", "1024")?,
                retention_interval_hours: parse_env("AUDIT_RETENTION_INTERVAL_HOURS", "24")?,
            },
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would weaken token signing or disable
    /// lockout and retention.
    pub fn validate(&self) -> Result<(), AppError> {
        let access = self.jwt.access_secret.expose_secret();
        let refresh = self.jwt.refresh_secret.expose_secret();

        if access.is_empty() || refresh.is_empty() {
            return Err(config_error("JWT secrets must not be empty"));
        }
        if access == refresh {
            return Err(config_error(
                "JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ",
            ));
        }
        if self.environment == Environment::Prod
            && (access.len() < MIN_PROD_SECRET_LEN || refresh.len() < MIN_PROD_SECRET_LEN)
        {
            return Err(config_error(format!(
                "JWT secrets must be at least {} bytes in production",
                MIN_PROD_SECRET_LEN
            )));
        }
        if self.lockout.threshold <= 0 || self.lockout.duration_minutes <= 0 {
            return Err(config_error("Lockout threshold and duration must be positive"));
        }
        if self.lockout.duration_minutes > MAX_LOCKOUT_MINUTES {
            return Err(config_error(format!(
                "LOCKOUT_DURATION_MINUTES must not exceed {}",
                MAX_LOCKOUT_MINUTES
            )));
        }
        if self.tokens.reset_ttl_minutes <= 0 || self.tokens.verification_ttl_hours <= 0 {
            return Err(config_error("Account token lifetimes must be positive"));
        }
        if self.tokens.reset_ttl_minutes > MAX_RESET_TTL_MINUTES
            || self.tokens.verification_ttl_hours > MAX_VERIFICATION_TTL_HOURS
        {
            return Err(config_error(format!(
                "Account token lifetimes must not exceed {} minutes (reset) and {} hours (verification)",
                MAX_RESET_TTL_MINUTES, MAX_VERIFICATION_TTL_HOURS
            )));
        }
        if self.audit.retention_days <= 0
            || self.audit.queue_capacity == 0
            || self.audit.retention_interval_hours == 0
        {
            return Err(config_error("Audit retention and queue settings must be positive"));
        }
        if self.audit.retention_days > MAX_RETENTION_DAYS
            || self.audit.retention_interval_hours > MAX_RETENTION_INTERVAL_HOURS
        {
            return Err(config_error(format!(
                "AUDIT_RETENTION_DAYS must not exceed {} and AUDIT_RETENTION_INTERVAL_HOURS {}",
                MAX_RETENTION_DAYS, MAX_RETENTION_INTERVAL_HOURS
            )));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(config_error(
                "DATABASE_MIN_CONNECTIONS exceeds DATABASE_MAX_CONNECTIONS",
            ));
        }
        Ok(())
    }
}

fn config_error(msg: impl Into<String>) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(msg.into()))
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(config_error(format!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(config_error(format!("{} is required but not set", key)))
            }
        }
    }
}

/// Numeric settings keep their default in production too.
fn parse_env<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), false)?
        .trim()
        .parse()
        .map_err(|e: T::Err| config_error(format!("{} is invalid: {}", key, e)))
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
