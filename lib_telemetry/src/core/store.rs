//! # Reading Store
//!
//! Keyed storage of readings with per-entry expiry, a per-recipient index
//! ordered by capture time, and a notification published after every write.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::configs::StorageSettings;
use crate::connections::{EntryWrite, StoreBackend, StoreError};
use crate::models::key::recent_index;
use crate::models::{Reading, Recipient, StorageKey};

use super::Notifier;

/// Index members fetched per round trip while listing.
const INDEX_PAGE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    pub ttl: Duration,
    pub index_cap: usize,
    pub notify_buffer: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions::from(&StorageSettings::default())
    }
}

impl From<&StorageSettings> for StoreOptions {
    fn from(settings: &StorageSettings) -> Self {
        Self {
            ttl: settings.ttl(),
            index_cap: settings.index_cap,
            notify_buffer: settings.notify_buffer,
        }
    }
}

/// Cheap to clone; clones share the backend connection.
#[derive(Clone)]
pub struct ReadingStore {
    backend: Arc<dyn StoreBackend>,
    notifier: Notifier,
    options: StoreOptions,
}

impl ReadingStore {
    pub fn new(backend: Arc<dyn StoreBackend>, options: StoreOptions) -> Self {
        let notifier = Notifier::new(Arc::clone(&backend), options.notify_buffer);
        Self {
            backend,
            notifier,
            options,
        }
    }

    /// Notifier sharing this store's backend.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Writes the reading under its storage key, then announces the key to
    /// the recipient's channel. A failed announcement is logged only; the
    /// write has already succeeded.
    pub async fn put(&self, reading: &Reading) -> Result<StorageKey, StoreError> {
        let key = reading.storage_key();
        let write = EntryWrite {
            key: key.to_string(),
            value: reading.to_json()?,
            ttl: self.options.ttl,
            index: recent_index(&reading.recipient),
            score: reading.captured_at,
            index_cap: self.options.index_cap,
        };
        self.backend.put_entry(&write).await?;
        debug!(%key, recipient = %reading.recipient, "stored reading");

        if let Err(e) = self.notifier.publish(&reading.recipient, &key).await {
            warn!(%key, recipient = %reading.recipient, error = %e, "notification publish failed");
        }
        Ok(key)
    }

    pub async fn get(&self, key: &StorageKey) -> Result<Reading, StoreError> {
        let raw = self
            .backend
            .get_entry(&key.to_string())
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Ok(Reading::from_json(raw.as_bytes())?)
    }

    /// Up to `limit` live readings for `recipient`, newest capture time first.
    ///
    /// Index members whose entry has expired are pruned from the index on the
    /// way; entries that fail to decode are skipped. Writes landing between
    /// two pages shift the offsets, so members already seen are skipped.
    pub async fn list_recent(&self, recipient: &Recipient, limit: usize) -> Result<Vec<Reading>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let index = recent_index(recipient);
        let mut readings = Vec::with_capacity(limit.min(INDEX_PAGE));
        let mut stale = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = 0;

        'pages: loop {
            let members = self.backend.index_range(&index, offset, INDEX_PAGE).await?;
            let exhausted = members.len() < INDEX_PAGE;
            offset += members.len();

            for member in members {
                if !seen.insert(member.clone()) {
                    continue;
                }
                let Some(raw) = self.backend.get_entry(&member).await? else {
                    stale.push(member);
                    continue;
                };
                match Reading::from_json(raw.as_bytes()) {
                    Ok(reading) if &reading.recipient == recipient => {
                        readings.push(reading);
                        if readings.len() == limit {
                            break 'pages;
                        }
                    }
                    Ok(reading) => {
                        warn!(key = %member, expected = %recipient, found = %reading.recipient, "index entry belongs to another recipient");
                    }
                    Err(e) => warn!(key = %member, error = %e, "skipping undecodable entry"),
                }
            }

            if exhausted {
                break;
            }
        }

        if !stale.is_empty() {
            debug!(%index, count = stale.len(), "pruning expired index members");
            if let Err(e) = self.backend.index_remove(&index, &stale).await {
                warn!(%index, error = %e, "failed to prune index");
            }
        }
        Ok(readings)
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.backend.ping().await
    }

    /// Releases the backend. Later operations fail with [`StoreError::Closed`].
    pub async fn close(&self) {
        self.backend.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::MemoryBackend;
    use crate::models::SensorType;

    fn store_with(backend: Arc<MemoryBackend>, ttl_secs: u64) -> ReadingStore {
        ReadingStore::new(
            backend,
            StoreOptions {
                ttl: Duration::from_secs(ttl_secs),
                ..StoreOptions::default()
            },
        )
    }

    fn reading(id: &str, ts: i64, recipient: &str) -> Reading {
        Reading::new(SensorType::Temperature, 20.0 + ts as f64, ts, Recipient::new(recipient).unwrap()).with_id(id)
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = store_with(Arc::new(MemoryBackend::new()), 60);
        let r = reading("temperature-1", 100, "R1");
        let key = store.put(&r).await.unwrap();
        assert_eq!(key.to_string(), "sensor:temperature:temperature-1:100");
        assert_eq!(store.get(&key).await.unwrap(), r);
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let store = store_with(Arc::new(MemoryBackend::new()), 60);
        let key: StorageKey = "sensor:pressure:nope:1".parse().unwrap();
        assert!(matches!(store.get(&key).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_recent_is_newest_first_and_per_recipient() {
        let store = store_with(Arc::new(MemoryBackend::new()), 60);
        let r1 = Recipient::new("R1").unwrap();
        for ts in [10, 30, 20] {
            store.put(&reading(&format!("t-{ts}"), ts, "R1")).await.unwrap();
        }
        store.put(&reading("t-99", 99, "R2")).await.unwrap();

        let recent = store.list_recent(&r1, 10).await.unwrap();
        let stamps: Vec<i64> = recent.iter().map(|r| r.captured_at).collect();
        assert_eq!(stamps, vec![30, 20, 10]);
        assert!(recent.iter().all(|r| r.recipient == r1));

        assert_eq!(store.list_recent(&r1, 2).await.unwrap().len(), 2);
        assert!(store.list_recent(&r1, 0).await.unwrap().is_empty());
        assert!(store.list_recent(&Recipient::new("R3").unwrap(), 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_recent_pages_past_the_first_batch() {
        let store = store_with(Arc::new(MemoryBackend::new()), 60);
        for ts in 0..(INDEX_PAGE as i64 * 2 + 5) {
            store.put(&reading(&format!("t-{ts}"), ts, "R1")).await.unwrap();
        }
        let recent = store.list_recent(&Recipient::new("R1").unwrap(), 70).await.unwrap();
        assert_eq!(recent.len(), 69);
        assert_eq!(recent.first().unwrap().captured_at, 68);
        assert_eq!(recent.last().unwrap().captured_at, 0);
    }

    /// Backend that writes a newer reading right before the second page is read.
    struct WriteBetweenPages {
        inner: MemoryBackend,
        pending: std::sync::Mutex<Option<EntryWrite>>,
    }

    #[async_trait::async_trait]
    impl StoreBackend for WriteBetweenPages {
        async fn put_entry(&self, write: &EntryWrite) -> Result<(), StoreError> {
            self.inner.put_entry(write).await
        }
        async fn get_entry(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get_entry(key).await
        }
        async fn index_range(&self, index: &str, offset: usize, count: usize) -> Result<Vec<String>, StoreError> {
            if offset > 0 {
                let pending = self.pending.lock().unwrap().take();
                if let Some(write) = pending {
                    self.inner.put_entry(&write).await?;
                }
            }
            self.inner.index_range(index, offset, count).await
        }
        async fn index_remove(&self, index: &str, members: &[String]) -> Result<(), StoreError> {
            self.inner.index_remove(index, members).await
        }
        async fn publish(&self, channel: &str, message: &str) -> Result<(), StoreError> {
            self.inner.publish(channel, message).await
        }
        async fn subscribe(&self, channel: &str) -> Result<crate::connections::MessageStream, StoreError> {
            self.inner.subscribe(channel).await
        }
        async fn ping(&self) -> Result<(), StoreError> {
            self.inner.ping().await
        }
        async fn close(&self) {
            self.inner.close().await
        }
    }

    #[tokio::test]
    async fn write_between_pages_does_not_repeat_readings() {
        let newer = reading("t-100", 100, "R1");
        let backend = Arc::new(WriteBetweenPages {
            inner: MemoryBackend::new(),
            pending: std::sync::Mutex::new(Some(EntryWrite {
                key: newer.storage_key().to_string(),
                value: newer.to_json().unwrap(),
                ttl: Duration::from_secs(60),
                index: "recent:R1".to_string(),
                score: 100,
                index_cap: 10_000,
            })),
        });
        let store = ReadingStore::new(backend, StoreOptions::default());
        for ts in 0..40 {
            store.put(&reading(&format!("t-{ts}"), ts, "R1")).await.unwrap();
        }

        let recent = store.list_recent(&Recipient::new("R1").unwrap(), 50).await.unwrap();
        let stamps: Vec<i64> = recent.iter().map(|r| r.captured_at).collect();
        assert_eq!(stamps, (0..40).rev().collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_vanish_and_are_pruned_from_the_index() {
        let backend = Arc::new(MemoryBackend::new());
        let short = store_with(Arc::clone(&backend), 5);
        let long = store_with(Arc::clone(&backend), 60);
        let r1 = Recipient::new("R1").unwrap();

        let old = short.put(&reading("old", 1, "R1")).await.unwrap();
        long.put(&reading("new", 2, "R1")).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(matches!(long.get(&old).await, Err(StoreError::NotFound(_))));
        let recent = long.list_recent(&r1, 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "new");
        assert_eq!(backend.index_len("recent:R1"), 1);
    }

    #[tokio::test]
    async fn closed_store_rejects_operations() {
        let store = store_with(Arc::new(MemoryBackend::new()), 60);
        store.close().await;
        store.close().await;
        assert!(matches!(store.put(&reading("x", 1, "R1")).await, Err(StoreError::Closed)));
        assert!(matches!(store.ping().await, Err(StoreError::Closed)));
    }
}
