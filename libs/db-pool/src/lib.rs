//! Database connection pool management
//!
//! Builds and verifies the deadpool-postgres pool used by the entity store.

mod metrics;

pub use metrics::acquire_with_metrics;
use metrics::update_pool_metrics;

use deadpool_postgres::tokio_postgres::{Config as PgConfig, NoTls};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
pub use deadpool_postgres::PoolError;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

pub type PgPool = Pool;

/// Errors raised while building the pool
#[derive(Debug, Error)]
pub enum PoolInitError {
    #[error("invalid database url: {0}")]
    InvalidUrl(String),

    #[error("pool build failed: {0}")]
    Build(String),

    #[error("connection verification failed: {0}")]
    Verify(#[from] PoolError),

    #[error("connection verification timed out after {0}s")]
    Timeout(u64),
}

/// Database connection pool configuration
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Service name for metrics labeling
    pub service_name: String,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// New connection to PostgreSQL
    pub connect_timeout_secs: u64,
    /// Waiting for a free connection from the pool
    pub acquire_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            service_name: String::from("unknown"),
            database_url: String::new(),
            max_connections: 10,
            connect_timeout_secs: 5,
            acquire_timeout_secs: 10,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl DbConfig {
    /// Build a config for `database_url`, applying `DB_*` environment overrides
    pub fn from_env(service_name: &str, database_url: &str) -> Self {
        let defaults = Self::default();
        Self {
            service_name: service_name.to_string(),
            database_url: database_url.to_string(),
            max_connections: env_or("DB_MAX_CONNECTIONS", defaults.max_connections),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", defaults.connect_timeout_secs),
            acquire_timeout_secs: env_or("DB_ACQUIRE_TIMEOUT_SECS", defaults.acquire_timeout_secs),
        }
    }

    pub fn log_config(&self) {
        info!(
            service = %self.service_name,
            max_connections = self.max_connections,
            connect_timeout_secs = self.connect_timeout_secs,
            acquire_timeout_secs = self.acquire_timeout_secs,
            "database pool configuration"
        );
    }
}

/// Build a deadpool-postgres pool and verify it with `SELECT 1`
pub async fn create_pool(config: DbConfig) -> Result<PgPool, PoolInitError> {
    debug!(
        service = %config.service_name,
        max = config.max_connections,
        "creating database pool"
    );

    let pg_config: PgConfig = config
        .database_url
        .parse()
        .map_err(|e: deadpool_postgres::tokio_postgres::Error| {
            PoolInitError::InvalidUrl(e.to_string())
        })?;

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
    let pool = Pool::builder(mgr)
        .max_size(config.max_connections as usize)
        .wait_timeout(Some(Duration::from_secs(config.acquire_timeout_secs)))
        .create_timeout(Some(Duration::from_secs(config.connect_timeout_secs)))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| PoolInitError::Build(e.to_string()))?;

    let verify = async {
        let client = pool.get().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(PoolError::Backend)?;
        Ok::<(), PoolError>(())
    };

    match tokio::time::timeout(Duration::from_secs(config.connect_timeout_secs), verify).await {
        Ok(Ok(())) => {
            info!(service = %config.service_name, "database pool created and verified");
            update_pool_metrics(&pool, &config.service_name);

            let pool_clone = pool.clone();
            let service = config.service_name.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));
                loop {
                    interval.tick().await;
                    update_pool_metrics(&pool_clone, &service);
                }
            });

            Ok(pool)
        }
        Ok(Err(e)) => {
            error!(service = %config.service_name, error = %e, "database connection verification failed");
            Err(PoolInitError::Verify(e))
        }
        Err(_) => {
            error!(
                service = %config.service_name,
                timeout_secs = config.connect_timeout_secs,
                "database connection verification timeout"
            );
            Err(PoolInitError::Timeout(config.connect_timeout_secs))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DbConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.connect_timeout_secs, 5);
        assert_eq!(config.acquire_timeout_secs, 10);
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_without_override() {
        std::env::remove_var("DB_MAX_CONNECTIONS");
        std::env::remove_var("DB_CONNECT_TIMEOUT_SECS");
        std::env::remove_var("DB_ACQUIRE_TIMEOUT_SECS");

        let config = DbConfig::from_env("video-live-service", "postgres://localhost/test");
        assert_eq!(config.service_name, "video-live-service");
        assert_eq!(config.database_url, "postgres://localhost/test");
        assert_eq!(config.max_connections, 10);
    }

    #[test]
    #[serial_test::serial]
    fn test_from_env_override() {
        std::env::set_var("DB_MAX_CONNECTIONS", "42");
        std::env::set_var("DB_ACQUIRE_TIMEOUT_SECS", "not-a-number");

        let config = DbConfig::from_env("video-live-service", "postgres://localhost/test");
        assert_eq!(config.max_connections, 42);
        // Unparseable values fall back to the default
        assert_eq!(config.acquire_timeout_secs, 10);

        std::env::remove_var("DB_MAX_CONNECTIONS");
        std::env::remove_var("DB_ACQUIRE_TIMEOUT_SECS");
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let config = DbConfig {
            database_url: "not a url ::".to_string(),
            ..Default::default()
        };
        let err = create_pool(config).await.unwrap_err();
        assert!(matches!(err, PoolInitError::InvalidUrl(_)));
    }
}
