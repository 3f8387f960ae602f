use crate::config::{StoreBackend, StoreConfig};
use crate::error::{AppError, Result};
use crate::state::{IndexStore, InMemoryStore, RedisStore};
use std::sync::Arc;

/// Create an index store based on configuration
pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn IndexStore>> {
    match config.backend {
        StoreBackend::Redis => {
            let redis_url = config.redis_url.as_ref().ok_or_else(|| {
                AppError::Configuration("Redis backend requires 'redis_url' configuration".to_string())
            })?;

            tracing::info!(url = %redis_url, "Initializing Redis index store");

            let store = RedisStore::new(redis_url).await?;
            Ok(Arc::new(store))
        }

        StoreBackend::InMemory => Ok(create_in_memory_store()),
    }
}

/// Create an in-memory store (for testing and development)
pub fn create_in_memory_store() -> Arc<dyn IndexStore> {
    tracing::info!("Initializing in-memory index store");
    Arc::new(InMemoryStore::new())
}
