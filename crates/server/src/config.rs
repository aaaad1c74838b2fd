//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `TABLESIDE_DATABASE_URL` - `PostgreSQL` connection string (unless
//!   `TABLESIDE_STORE=memory`)
//! - `PAYMENTS_SECRET_KEY` - Payment processor API secret
//! - `PAYMENTS_WEBHOOK_SECRET` - Shared secret for webhook signature checks
//! - `MENU_SERVICE_URL` - Base URL of the menu catalog service
//! - `STAFF_SERVICE_URL` - Base URL of the restaurant staff roster service
//! - `NOTIFY_SERVICE_URL` - Base URL of the notification dispatch service
//!
//! ## Optional
//! - `TABLESIDE_HOST` - Bind address (default: 127.0.0.1)
//! - `TABLESIDE_PORT` - Listen port (default: 3000)
//! - `TABLESIDE_STORE` - `postgres` (default) or `memory`
//! - `PAYMENTS_API_BASE` - Processor API base URL (default: production API)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::net::{IpAddr, SocketAddr};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SECRET_LENGTH: usize = 16;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Which store backs carts and orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// Durable Postgres store (production).
    #[default]
    Postgres,
    /// Mutex-guarded in-memory maps (dev, tests).
    Memory,
}

/// Server application configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password). `None`
    /// only when the memory backend is selected.
    pub database_url: Option<SecretString>,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Store backend selection
    pub store_backend: StoreBackend,
    /// Payment processor configuration
    pub payments: PaymentsConfig,
    /// Menu catalog service base URL
    pub menu_service_url: String,
    /// Staff roster service base URL
    pub staff_service_url: String,
    /// Notification dispatch service base URL
    pub notify_service_url: String,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Payment processor configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct PaymentsConfig {
    /// Processor API base URL
    pub api_base: String,
    /// Processor API secret key
    pub secret_key: SecretString,
    /// Shared secret for verifying inbound webhook signatures
    pub webhook_secret: SecretString,
}

impl std::fmt::Debug for PaymentsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentsConfig")
            .field("api_base", &self.api_base)
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail placeholder validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let store_backend = match optional_env("TABLESIDE_STORE").as_deref() {
            None | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::InvalidEnvVar(
                    "TABLESIDE_STORE".to_owned(),
                    format!("expected 'postgres' or 'memory', got '{other}'"),
                ));
            }
        };

        let database_url = match store_backend {
            StoreBackend::Postgres => Some(SecretString::from(required_env(
                "TABLESIDE_DATABASE_URL",
            )?)),
            StoreBackend::Memory => optional_env("TABLESIDE_DATABASE_URL").map(SecretString::from),
        };

        let host: IpAddr = optional_env("TABLESIDE_HOST")
            .unwrap_or_else(|| "127.0.0.1".to_owned())
            .parse()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("TABLESIDE_HOST".to_owned(), format!("{e}"))
            })?;

        let port: u16 = optional_env("TABLESIDE_PORT")
            .unwrap_or_else(|| "3000".to_owned())
            .parse()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("TABLESIDE_PORT".to_owned(), format!("{e}"))
            })?;

        let payments = PaymentsConfig {
            api_base: optional_env("PAYMENTS_API_BASE")
                .unwrap_or_else(|| "https://api.stripe.com".to_owned()),
            secret_key: validated_secret("PAYMENTS_SECRET_KEY")?,
            webhook_secret: validated_secret("PAYMENTS_WEBHOOK_SECRET")?,
        };

        Ok(Self {
            database_url,
            host,
            port,
            store_backend,
            payments,
            menu_service_url: required_env("MENU_SERVICE_URL")?,
            staff_service_url: required_env("STAFF_SERVICE_URL")?,
            notify_service_url: required_env("NOTIFY_SERVICE_URL")?,
            sentry_dsn: optional_env("SENTRY_DSN"),
            sentry_environment: optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// The socket address to bind to.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_owned()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Load a secret and reject obvious placeholder values.
fn validated_secret(name: &str) -> Result<SecretString, ConfigError> {
    let value = required_env(name)?;

    if value.len() < MIN_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            name.to_owned(),
            format!("must be at least {MIN_SECRET_LENGTH} characters"),
        ));
    }

    let lowered = value.to_lowercase();
    for pattern in PLACEHOLDER_PATTERNS {
        if lowered.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                name.to_owned(),
                format!("looks like a placeholder (contains '{pattern}')"),
            ));
        }
    }

    Ok(SecretString::from(value))
}

impl PaymentsConfig {
    /// Expose the webhook secret for signature computation.
    #[must_use]
    pub fn webhook_secret_bytes(&self) -> Vec<u8> {
        self.webhook_secret.expose_secret().as_bytes().to_vec()
    }
}
