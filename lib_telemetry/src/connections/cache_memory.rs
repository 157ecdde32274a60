//! # In-Memory Backend
//!
//! Mirrors the Redis semantics the store relies on: per-key expiry, sorted
//! indexes returned highest score first (ties by member, descending) and
//! fan-out pub/sub where every subscriber sees every message. Expiry uses
//! `tokio::time::Instant` so paused-clock tests can advance past a TTL.
//! Expired entries and indexes are swept on write, at most once per
//! [`SWEEP_INTERVAL`].

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use tracing::warn;

use super::{EntryWrite, MessageStream, StoreBackend, StoreError};

const CHANNEL_CAPACITY: usize = 1024;
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Default)]
struct SortedIndex {
    scores: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
    expires_at: Option<Instant>,
}

impl SortedIndex {
    fn insert(&mut self, member: &str, score: i64) {
        if let Some(old) = self.scores.insert(member.to_string(), score) {
            self.ordered.remove(&(old, member.to_string()));
        }
        self.ordered.insert((score, member.to_string()));
    }

    fn remove(&mut self, member: &str) {
        if let Some(score) = self.scores.remove(member) {
            self.ordered.remove(&(score, member.to_string()));
        }
    }

    fn trim_to(&mut self, cap: usize) {
        while self.ordered.len() > cap {
            if let Some((_, member)) = self.ordered.pop_first() {
                self.scores.remove(&member);
            }
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Default)]
struct MemoryState {
    entries: HashMap<String, (String, Instant)>,
    indexes: HashMap<String, SortedIndex>,
    channels: HashMap<String, broadcast::Sender<String>>,
    next_sweep: Option<Instant>,
}

impl MemoryState {
    /// Drops expired entries and indexes, and channels nobody listens to.
    fn sweep(&mut self, now: Instant) {
        if self.next_sweep.is_some_and(|at| at > now) {
            return;
        }
        self.next_sweep = Some(now + SWEEP_INTERVAL);
        self.entries.retain(|_, (_, at)| *at > now);
        self.indexes.retain(|_, idx| idx.is_live(now));
        self.channels.retain(|_, tx| tx.receiver_count() > 0);
    }
}

/// Process-local [`StoreBackend`].
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    closed: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> Result<T, StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(f(&mut state))
    }

    /// Number of entries that have not expired yet.
    pub fn live_entries(&self) -> usize {
        let now = Instant::now();
        self.with_state(|s| s.entries.values().filter(|(_, at)| *at > now).count())
            .unwrap_or(0)
    }

    /// Raw member count of an index, expired entries included.
    pub fn index_len(&self, index: &str) -> usize {
        let now = Instant::now();
        self.with_state(|s| {
            s.indexes
                .get(index)
                .filter(|idx| idx.is_live(now))
                .map_or(0, |idx| idx.ordered.len())
        })
        .unwrap_or(0)
    }

    /// Active receivers on a channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.with_state(|s| s.channels.get(channel).map_or(0, |tx| tx.receiver_count()))
            .unwrap_or(0)
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn put_entry(&self, write: &EntryWrite) -> Result<(), StoreError> {
        let expires_at = Instant::now() + write.ttl.max(Duration::from_secs(1));
        self.with_state(|s| {
            let now = Instant::now();
            s.sweep(now);
            s.entries.insert(write.key.clone(), (write.value.clone(), expires_at));
            let index = s.indexes.entry(write.index.clone()).or_default();
            if !index.is_live(now) {
                *index = SortedIndex::default();
            }
            index.insert(&write.key, write.score);
            index.trim_to(write.index_cap);
            index.expires_at = Some(expires_at);
        })
    }

    async fn get_entry(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        self.with_state(|s| match s.entries.get(key) {
            Some((value, at)) if *at > now => Some(value.clone()),
            Some(_) => {
                s.entries.remove(key);
                None
            }
            None => None,
        })
    }

    async fn index_range(&self, index: &str, offset: usize, count: usize) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        self.with_state(|s| match s.indexes.get(index) {
            Some(idx) if idx.is_live(now) => idx
                .ordered
                .iter()
                .rev()
                .skip(offset)
                .take(count)
                .map(|(_, member)| member.clone())
                .collect(),
            _ => Vec::new(),
        })
    }

    async fn index_remove(&self, index: &str, members: &[String]) -> Result<(), StoreError> {
        self.with_state(|s| {
            if let Some(idx) = s.indexes.get_mut(index) {
                for member in members {
                    idx.remove(member);
                }
            }
        })
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), StoreError> {
        self.with_state(|s| {
            if let Some(tx) = s.channels.get(channel) {
                // No receivers is not an error, same as PUBLISH returning 0.
                let _ = tx.send(message.to_string());
            }
        })
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream, StoreError> {
        let rx = self.with_state(|s| {
            s.channels
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                .subscribe()
        })?;

        let channel = channel.to_string();
        let stream = futures_util::stream::unfold(rx, move |mut rx| {
            let channel = channel.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(message) => return Some((message, rx)),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(%channel, skipped, "subscriber lagged behind channel");
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.with_state(|_| ())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // Dropping the senders ends every open subscription stream.
            state.channels.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(key: &str, score: i64, cap: usize) -> EntryWrite {
        EntryWrite {
            key: key.to_string(),
            value: format!("value-{key}"),
            ttl: Duration::from_secs(60),
            index: "recent:R1".to_string(),
            score,
            index_cap: cap,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn entries_and_index_expire_with_ttl() {
        let backend = MemoryBackend::new();
        backend.put_entry(&write("a", 1, 10)).await.unwrap();
        assert_eq!(backend.get_entry("a").await.unwrap().as_deref(), Some("value-a"));
        assert_eq!(backend.index_range("recent:R1", 0, 10).await.unwrap(), vec!["a"]);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(backend.get_entry("a").await.unwrap(), None);
        assert!(backend.index_range("recent:R1", 0, 10).await.unwrap().is_empty());
        assert_eq!(backend.live_entries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn writes_sweep_expired_entries_and_indexes() {
        let backend = MemoryBackend::new();
        for i in 0..1000 {
            let mut w = write(&format!("k{i}"), i, 10);
            w.ttl = Duration::from_secs(1);
            w.index = format!("recent:R{i}");
            backend.put_entry(&w).await.unwrap();
        }
        tokio::time::advance(Duration::from_secs(10)).await;
        backend.put_entry(&write("fresh", 1, 10)).await.unwrap();

        let state = backend.state.lock().unwrap();
        assert_eq!(state.entries.len(), 1);
        assert_eq!(state.indexes.len(), 1);
        assert!(state.indexes.contains_key("recent:R1"));
        assert!(state.entries.contains_key("fresh"));
    }

    #[tokio::test]
    async fn index_orders_by_score_and_trims_to_cap() {
        let backend = MemoryBackend::new();
        for (key, score) in [("k3", 30), ("k1", 10), ("k4", 40), ("k2", 20)] {
            backend.put_entry(&write(key, score, 3)).await.unwrap();
        }
        assert_eq!(backend.index_range("recent:R1", 0, 10).await.unwrap(), vec!["k4", "k3", "k2"]);
        assert_eq!(backend.index_range("recent:R1", 1, 1).await.unwrap(), vec!["k3"]);

        backend.index_remove("recent:R1", &["k3".to_string()]).await.unwrap();
        assert_eq!(backend.index_len("recent:R1"), 2);
    }

    #[tokio::test]
    async fn every_subscriber_receives_every_message() {
        let backend = MemoryBackend::new();
        let mut first = backend.subscribe("new_data:R1").await.unwrap();
        let mut second = backend.subscribe("new_data:R1").await.unwrap();
        let mut other = backend.subscribe("new_data:R2").await.unwrap();

        backend.publish("new_data:R1", "k1").await.unwrap();
        assert_eq!(first.next().await.as_deref(), Some("k1"));
        assert_eq!(second.next().await.as_deref(), Some("k1"));

        backend.close().await;
        assert!(other.next().await.is_none());
        assert!(matches!(backend.get_entry("k1").await, Err(StoreError::Closed)));
        backend.close().await;
    }
}
