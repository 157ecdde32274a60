//! # Redis Cache Implementation
//!
//! Async Redis backend. Commands go through one shared `ConnectionManager`
//! that is cloned per operation; pub/sub uses a dedicated connection per
//! subscription since a subscribed connection cannot issue other commands.
//! Closing the backend ends those subscription streams as well.

use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use redis::aio::ConnectionManager;
use redis::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{EntryWrite, MessageStream, StoreBackend, StoreError};

/// A handler for Redis storage and pub/sub.
pub struct RedisBackend {
    client: Client,
    conn: Mutex<Option<ConnectionManager>>,
    closed: CancellationToken,
}

impl RedisBackend {
    /// Opens the client and establishes the managed connection.
    ///
    /// # Arguments
    /// * `url` - The redis URL (e.g., "redis://127.0.0.1/").
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        info!(target: "redis", "Connected to {}", crate::configs::settings::mask_credentials(url));
        Ok(Self {
            client,
            conn: Mutex::new(Some(manager)),
            closed: CancellationToken::new(),
        })
    }

    fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let guard = self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.as_ref().cloned().ok_or(StoreError::Closed)
    }
}

/// Ends `stream` once `closed` is cancelled.
fn until_closed(stream: impl Stream<Item = String> + Send + 'static, closed: &CancellationToken) -> MessageStream {
    stream.take_until(closed.clone().cancelled_owned()).boxed()
}

#[async_trait]
impl StoreBackend for RedisBackend {
    async fn put_entry(&self, write: &EntryWrite) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let ttl_secs = write.ttl.as_secs().max(1);
        let keep_from = -(write.index_cap as i64) - 1;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SET").arg(&write.key).arg(&write.value).arg("EX").arg(ttl_secs).ignore()
            .cmd("ZADD").arg(&write.index).arg(write.score).arg(&write.key).ignore()
            .cmd("ZREMRANGEBYRANK").arg(&write.index).arg(0).arg(keep_from).ignore()
            .cmd("EXPIRE").arg(&write.index).arg(ttl_secs).ignore();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn get_entry(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection()?;
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn index_range(&self, index: &str, offset: usize, count: usize) -> Result<Vec<String>, StoreError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection()?;
        let members: Vec<String> = redis::cmd("ZREVRANGE")
            .arg(index)
            .arg(offset)
            .arg(offset + count - 1)
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn index_remove(&self, index: &str, members: &[String]) -> Result<(), StoreError> {
        if members.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection()?;
        let removed: i64 = redis::cmd("ZREM").arg(index).arg(members.to_vec()).query_async(&mut conn).await?;
        debug!(target: "redis", index, removed, "pruned expired index members");
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let receivers: i64 = redis::cmd("PUBLISH").arg(channel).arg(message).query_async(&mut conn).await?;
        debug!(target: "redis", channel, receivers, "published");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, StoreError> {
        // Fail fast on a closed backend; the pub/sub connection is separate.
        self.connection()?;
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        let channel = channel.to_string();
        let stream = pubsub.into_on_message().filter_map(move |msg| {
            let payload = msg.get_payload::<String>();
            let channel = channel.clone();
            async move {
                match payload {
                    Ok(p) => Some(p),
                    Err(e) => {
                        warn!(target: "redis", %channel, error = %e, "dropping non-text pub/sub payload");
                        None
                    }
                }
            }
        });
        Ok(until_closed(stream, &self.closed))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.connection()?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!(target: "redis", %pong, "ping");
        Ok(())
    }

    async fn close(&self) {
        self.closed.cancel();
        let taken = self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if taken.is_some() {
            info!(target: "redis", "Connection released");
        }
    }
}
