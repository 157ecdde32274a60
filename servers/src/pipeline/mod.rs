pub mod config;
pub mod shutdown;
pub mod synth;

use std::sync::Arc;

use anyhow::Context;
use lib_telemetry::configs::PipelineSettings;
use lib_telemetry::connections::{MemoryBackend, RedisBackend, StoreBackend};
use lib_telemetry::core::{ReadingStore, StoreOptions};
use tracing::{info, warn};

/// Scheme selecting the in-process backend instead of Redis.
pub const MEMORY_URL: &str = "memory://";

/// Connects the configured backend and checks it answers before returning.
pub async fn open_store(settings: &PipelineSettings) -> anyhow::Result<ReadingStore> {
    let backend: Arc<dyn StoreBackend> = if settings.redis.url.starts_with(MEMORY_URL) {
        warn!("Using the in-memory backend; readings are not shared between processes");
        Arc::new(MemoryBackend::new())
    } else {
        Arc::new(
            RedisBackend::connect(&settings.redis.url)
                .await
                .context("connecting to redis")?,
        )
    };

    let store = ReadingStore::new(backend, StoreOptions::from(&settings.storage));
    store.ping().await.context("storage backend did not answer PING")?;
    info!(ttl_secs = settings.storage.ttl_secs, "Reading store ready");
    Ok(store)
}
