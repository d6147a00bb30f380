//! Service Configuration
//!
//! All configuration values are loaded from environment variables.
//! No hardcoded secrets or sensitive data.

use crate::error::AuthError;
use std::env;

/// Authentication configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret for signing access tokens (from ACCESS_TOKEN_SECRET env var)
    pub access_token_secret: String,

    /// Secret for signing refresh tokens (from REFRESH_TOKEN_SECRET env var)
    pub refresh_token_secret: String,

    /// Key for hashing invite tokens (from INVITE_TOKEN_SECRET env var)
    pub invite_token_secret: String,

    /// Access token lifetime in seconds (from ACCESS_TOKEN_EXPIRATION env var)
    pub access_token_expiration: i64,

    /// Refresh token lifetime in seconds (from REFRESH_TOKEN_EXPIRATION env var)
    pub refresh_token_expiration: i64,

    /// Verification code lifetime in seconds (from VERIFICATION_CODE_EXPIRATION env var)
    pub verification_code_expiration: i64,

    /// How long a verified email may be used to sign up, in seconds
    /// (from VERIFIED_EMAIL_WINDOW env var)
    pub verified_email_window: i64,

    /// Invitation lifetime in seconds (from INVITE_EXPIRATION env var)
    pub invite_expiration: i64,

    /// Link embedded in invitation emails (from INVITE_BASE_URL env var)
    pub invite_base_url: String,

    /// Argon2 memory cost in KiB (from ARGON2_MEMORY_COST env var)
    pub argon2_memory_cost: u32,

    /// Argon2 time cost (iterations) (from ARGON2_TIME_COST env var)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (from ARGON2_PARALLELISM env var)
    pub argon2_parallelism: u32,

    /// Mark session cookies `Secure` (from COOKIE_SECURE env var)
    pub secure_cookies: bool,
}

impl AuthConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AuthError> {
        let access_token_secret = required("ACCESS_TOKEN_SECRET")?;
        let refresh_token_secret = required("REFRESH_TOKEN_SECRET")?;

        let invite_token_secret = env::var("INVITE_TOKEN_SECRET").unwrap_or_else(|_| {
            tracing::warn!("INVITE_TOKEN_SECRET not set; deriving invite key from REFRESH_TOKEN_SECRET");
            format!("invite:{}", refresh_token_secret)
        });

        Ok(Self {
            access_token_secret,
            refresh_token_secret,
            invite_token_secret,

            access_token_expiration: parsed("ACCESS_TOKEN_EXPIRATION", 900), // 15 minutes

            refresh_token_expiration: parsed("REFRESH_TOKEN_EXPIRATION", 604800), // 7 days

            verification_code_expiration: parsed("VERIFICATION_CODE_EXPIRATION", 300), // 5 minutes

            verified_email_window: parsed("VERIFIED_EMAIL_WINDOW", 900),

            invite_expiration: parsed("INVITE_EXPIRATION", 86400), // 24 hours

            invite_base_url: env::var("INVITE_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:5173/invite/accept".to_string()),

            argon2_memory_cost: parsed("ARGON2_MEMORY_COST", 65536), // 64 MiB

            argon2_time_cost: parsed("ARGON2_TIME_COST", 3),

            argon2_parallelism: parsed("ARGON2_PARALLELISM", 4),

            secure_cookies: env::var("COOKIE_SECURE")
                .ok()
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(true),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.access_token_secret.len() < 32 || self.refresh_token_secret.len() < 32 {
            return Err(AuthError::Config(
                "ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must be at least 32 characters"
                    .to_string(),
            ));
        }

        if self.access_token_secret == self.refresh_token_secret {
            return Err(AuthError::Config(
                "ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ".to_string(),
            ));
        }

        if self.invite_token_secret.is_empty() {
            return Err(AuthError::Config(
                "INVITE_TOKEN_SECRET must not be empty".to_string(),
            ));
        }

        if self.access_token_expiration <= 0 {
            return Err(AuthError::Config(
                "ACCESS_TOKEN_EXPIRATION must be positive".to_string(),
            ));
        }

        if self.refresh_token_expiration <= self.access_token_expiration {
            return Err(AuthError::Config(
                "REFRESH_TOKEN_EXPIRATION must be greater than ACCESS_TOKEN_EXPIRATION".to_string(),
            ));
        }

        if self.verification_code_expiration <= 0 || self.invite_expiration <= 0 {
            return Err(AuthError::Config(
                "VERIFICATION_CODE_EXPIRATION and INVITE_EXPIRATION must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Process-level settings for the HTTP server binary
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// PostgreSQL connection string (from DATABASE_URL env var)
    pub database_url: Option<String>,

    /// Listen address (from BIND_ADDRESS env var)
    pub bind_address: String,

    /// Allowed CORS origin (from FRONTEND_URL env var)
    pub frontend_url: Option<String>,

    /// Backing store (from STORE env var)
    pub store: StoreKind,
}

/// Which credential store implementation to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, AuthError> {
        let store = match env::var("STORE").map(|v| v.to_lowercase()).as_deref() {
            Ok("memory") => StoreKind::Memory,
            Ok("postgres") | Err(_) => StoreKind::Postgres,
            Ok(other) => {
                return Err(AuthError::Config(format!("Unknown STORE value: {}", other)));
            }
        };

        let database_url = env::var("DATABASE_URL").ok();
        if store == StoreKind::Postgres && database_url.is_none() {
            return Err(AuthError::Config(
                "DATABASE_URL environment variable must be set".to_string(),
            ));
        }

        Ok(Self {
            database_url,
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
            frontend_url: env::var("FRONTEND_URL").ok(),
            store,
        })
    }
}

/// Settings for the outbound mail relay
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Relay endpoint (from MAIL_API_URL env var); unset means log-only delivery
    pub api_url: Option<String>,

    /// Bearer key for the relay (from MAIL_API_KEY env var)
    pub api_key: Option<String>,

    /// Sender address (from MAIL_FROM env var)
    pub from: String,
}

impl MailConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: env::var("MAIL_API_URL").ok(),
            api_key: env::var("MAIL_API_KEY").ok(),
            from: env::var("MAIL_FROM")
                .unwrap_or_else(|_| "Expense Tracker <no-reply@expense-tracker.local>".to_string()),
        }
    }
}

fn required(key: &str) -> Result<String, AuthError> {
    env::var(key).map_err(|_| AuthError::Config(format!("{} environment variable must be set", key)))
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_config() -> AuthConfig {
        AuthConfig {
            access_token_secret: "a".repeat(32),
            refresh_token_secret: "r".repeat(32),
            invite_token_secret: "i".repeat(32),
            access_token_expiration: 900,
            refresh_token_expiration: 604800,
            verification_code_expiration: 300,
            verified_email_window: 900,
            invite_expiration: 86400,
            invite_base_url: "http://localhost:5173/invite/accept".to_string(),
            argon2_memory_cost: 1024,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
            secure_cookies: true,
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_short_secret() {
        let config = AuthConfig {
            access_token_secret: "short".to_string(),
            ..test_config()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_shared_secret() {
        let config = AuthConfig {
            refresh_token_secret: "a".repeat(32),
            ..test_config()
        };

        assert!(matches!(config.validate(), Err(AuthError::Config(_))));
    }

    #[test]
    fn test_config_refresh_must_outlive_access() {
        let config = AuthConfig {
            refresh_token_expiration: 600,
            ..test_config()
        };

        assert!(config.validate().is_err());
    }
}

#[cfg(test)]
pub(crate) use tests::test_config;
