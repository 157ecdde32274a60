//! # Storage Connections
//!
//! The [`StoreBackend`] trait is the seam between the reading store and the
//! key-value server behind it. [`cache_redis::RedisBackend`] talks to Redis;
//! [`cache_memory::MemoryBackend`] keeps everything in process and is used by
//! the tests and for local runs without a server.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

use crate::models::ReadingError;

/// In-process backend with expiry, sorted indexes and broadcast channels.
pub mod cache_memory;
/// Redis backend over a shared `ConnectionManager`.
pub mod cache_redis;

pub use cache_memory::MemoryBackend;
pub use cache_redis::RedisBackend;

/// Errors surfaced by the store, the notifier and their backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no entry for key {0}")]
    NotFound(String),

    #[error("storage transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Codec(#[from] ReadingError),

    #[error("store is closed")]
    Closed,
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Transport(err.to_string())
    }
}

/// Stream of raw payloads received on one pub/sub channel.
pub type MessageStream = BoxStream<'static, String>;

/// One entry write together with its secondary index update.
#[derive(Debug, Clone)]
pub struct EntryWrite {
    pub key: String,
    pub value: String,
    pub ttl: Duration,
    /// Sorted index the key is added to.
    pub index: String,
    pub score: i64,
    /// Members beyond this many (lowest scores first) are trimmed.
    pub index_cap: usize,
}

/// Key-value operations the reading store needs from a server.
///
/// `put_entry` must apply the value, its expiry and the index update as one
/// unit. After `close` every call fails with [`StoreError::Closed`].
#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn put_entry(&self, write: &EntryWrite) -> Result<(), StoreError>;

    async fn get_entry(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Index members ordered by descending score, starting at `offset`.
    async fn index_range(&self, index: &str, offset: usize, count: usize) -> Result<Vec<String>, StoreError>;

    async fn index_remove(&self, index: &str, members: &[String]) -> Result<(), StoreError>;

    async fn publish(&self, channel: &str, message: &str) -> Result<(), StoreError>;

    /// Subscribes to `channel`. The subscription is active when this returns.
    async fn subscribe(&self, channel: &str) -> Result<MessageStream, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    /// Releases the connection. Calling it again is a no-op.
    async fn close(&self);
}
