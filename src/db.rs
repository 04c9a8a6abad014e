use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::store::{EntityStore, MemoryStore, PgStore};
use db_pool::{create_pool as create_pg_pool, DbConfig as DbPoolConfig, PgPool};
use std::sync::Arc;

pub async fn init_pool(database_url: &str) -> AppResult<PgPool> {
    let cfg = DbPoolConfig::from_env("video-live-service", database_url);
    cfg.log_config();
    create_pg_pool(cfg)
        .await
        .map_err(|e| AppError::StartServer(format!("db: {e}")))
}

/// Pick the store backend from configuration
pub async fn init_store(config: &Config) -> AppResult<Arc<dyn EntityStore>> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, using the in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    };

    let store = PgStore::new(init_pool(database_url).await?);
    if config.run_migrations {
        store
            .migrate()
            .await
            .map_err(|e| AppError::StartServer(format!("migrations: {e}")))?;
    }
    Ok(Arc::new(store))
}
