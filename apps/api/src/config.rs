//! API server configuration

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use wattline_shared_config::{parse_positive_env, CommonConfig, DatabaseConfig, Environment};

/// Default port devices and operators connect to
const DEFAULT_PORT: u16 = 59002;
/// Default liveness broadcast period in milliseconds
const DEFAULT_BROADCAST_INTERVAL_MS: i64 = 5000;
/// Default bound on store calls made while admitting a device, in milliseconds
const DEFAULT_STORE_TIMEOUT_MS: i64 = 5000;

/// Where device records are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "memory" | "in-memory" | "mem" => Ok(Self::Memory),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgres"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// API server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Common configuration shared with other services
    pub common: CommonConfig,

    /// Server port (default: 59002)
    pub port: u16,

    /// Liveness broadcast period (default: 5s)
    pub broadcast_interval: Duration,

    /// Bound on store calls during admission (default: 5s)
    pub store_timeout: Duration,

    /// Device store backend (default: postgres)
    pub store_backend: StoreBackend,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Fails on a non-positive `BROADCAST_INTERVAL_MS` or `STORE_TIMEOUT_MS`. In
    /// production mode, `DATABASE_URL` must be explicitly set and the memory backend
    /// is refused.
    pub fn from_env() -> Result<Self> {
        let is_production = Environment::from_env().is_production();

        let store_backend = Self::load_store_backend(is_production)?;
        if is_production && store_backend == StoreBackend::Postgres {
            Self::validate_database_url()?;
        }

        let common = CommonConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

        Ok(Self {
            common,

            port: env::var("PORT")
                .unwrap_or_else(|_| DEFAULT_PORT.to_string())
                .parse()
                .context("Invalid PORT value")?,

            broadcast_interval: Self::load_millis(
                "BROADCAST_INTERVAL_MS",
                DEFAULT_BROADCAST_INTERVAL_MS,
            )?,

            store_timeout: Self::load_millis("STORE_TIMEOUT_MS", DEFAULT_STORE_TIMEOUT_MS)?,

            store_backend,
        })
    }

    /// Load a strictly positive millisecond duration
    fn load_millis(name: &str, default: i64) -> Result<Duration> {
        let millis: i64 = parse_positive_env(name, default)?;
        Ok(Duration::from_millis(millis.unsigned_abs()))
    }

    /// Load STORE_BACKEND; the in-memory store loses every record on restart
    fn load_store_backend(is_production: bool) -> Result<StoreBackend> {
        let backend = match env::var("STORE_BACKEND") {
            Ok(raw) if !raw.trim().is_empty() => {
                StoreBackend::from_str(&raw).map_err(|e| anyhow::anyhow!("STORE_BACKEND: {}", e))?
            }
            _ => StoreBackend::default(),
        };

        if is_production && backend == StoreBackend::Memory {
            bail!(
                "STORE_BACKEND=memory is not allowed in production. \
                 Use the postgres backend."
            );
        }
        Ok(backend)
    }

    /// Validate that DATABASE_URL is explicitly set in production
    fn validate_database_url() -> Result<()> {
        match env::var("DATABASE_URL") {
            Ok(url) if !url.is_empty() => Ok(()),
            _ => {
                bail!(
                    "DATABASE_URL environment variable is required in production. \
                     Please set your PostgreSQL connection string."
                );
            }
        }
    }

    /// Get database configuration
    pub fn database(&self) -> &DatabaseConfig {
        &self.common.database
    }

    /// Get environment mode
    pub fn environment(&self) -> Environment {
        self.common.environment
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.common.environment.is_production()
    }
}
