//! Connection and pool configuration.

use secrecy::SecretString;
use serde::Deserialize;

use strata_core::error::{StrataError, StrataResult};

/// Connection pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of pooled connections.
    pub max_size: usize,
    /// Seconds to wait for a free connection.
    pub wait_timeout_secs: u64,
    /// Seconds to wait for a new connection to be established.
    pub create_timeout_secs: u64,
    /// Seconds to wait while recycling a returned connection.
    pub recycle_timeout_secs: u64,
    /// `fast` or `verified`.
    pub recycling_method: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 16,
            wait_timeout_secs: 30,
            create_timeout_secs: 30,
            recycle_timeout_secs: 30,
            recycling_method: "fast".to_string(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    pub url: SecretString,
    #[serde(default)]
    pub pool: PoolConfig,
    /// `SET LOCAL lock_timeout` applied to every operation transaction.
    #[serde(default)]
    pub lock_timeout_ms: Option<u64>,
}

impl DatabaseConfig {
    /// Configuration with default pool settings.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: SecretString::new(url.into()),
            pool: PoolConfig::default(),
            lock_timeout_ms: None,
        }
    }

    /// Set the maximum pool size.
    pub fn max_connections(mut self, max_size: usize) -> Self {
        self.pool.max_size = max_size;
        self
    }

    /// Set the lock timeout for operation transactions.
    pub fn lock_timeout_ms(mut self, millis: u64) -> Self {
        self.lock_timeout_ms = Some(millis);
        self
    }

    /// Load from `DATABASE_URL` and optional `STRATA_POOL_MAX_SIZE` /
    /// `STRATA_LOCK_TIMEOUT_MS` (a `.env` file is read if present).
    pub fn from_env() -> StrataResult<Self> {
        dotenvy::dotenv().ok();

        let url = std::env::var("DATABASE_URL").map_err(|_| {
            StrataError::Configuration("DATABASE_URL environment variable is required".to_string())
        })?;
        let mut config = Self::new(url);

        if let Ok(size) = std::env::var("STRATA_POOL_MAX_SIZE") {
            config.pool.max_size = size.parse().map_err(|_| {
                StrataError::Configuration(format!("STRATA_POOL_MAX_SIZE is not a number: {}", size))
            })?;
        }
        if let Ok(millis) = std::env::var("STRATA_LOCK_TIMEOUT_MS") {
            config.lock_timeout_ms = Some(millis.parse().map_err(|_| {
                StrataError::Configuration(format!(
                    "STRATA_LOCK_TIMEOUT_MS is not a number: {}",
                    millis
                ))
            })?);
        }

        Ok(config)
    }
}
