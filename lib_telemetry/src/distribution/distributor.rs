//! # Distributor
//!
//! One bounded queue and one worker per recipient. Workers deliver one
//! reading at a time, so per-recipient order is the enqueue order. A full
//! queue makes `enqueue` wait, which in turn holds back the ingestor and the
//! broker (backpressure). Failed deliveries are logged and discarded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::{Destination, DestinationError};
use crate::models::{Reading, Recipient, RecipientRegistry, RoutingError};

use super::{DeliverySink, DistributorError, HttpSink};

#[derive(Debug, Default)]
struct DeliveryStats {
    delivered: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliverySnapshot {
    pub delivered: u64,
    pub failed: u64,
}

pub struct Distributor {
    queues: RwLock<Option<HashMap<Recipient, mpsc::Sender<Reading>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<DeliveryStats>,
}

impl Distributor {
    /// Spawns one worker per `(recipient, sink)` pair.
    pub fn start(sinks: impl IntoIterator<Item = (Recipient, Arc<dyn DeliverySink>)>, capacity: usize) -> Self {
        let stats = Arc::new(DeliveryStats::default());
        let mut queues = HashMap::new();
        let mut workers = Vec::new();

        for (recipient, sink) in sinks {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            workers.push(tokio::spawn(deliver_loop(recipient.clone(), rx, sink, Arc::clone(&stats))));
            queues.insert(recipient, tx);
        }
        info!(queues = queues.len(), capacity, "distributor started");

        Self {
            queues: RwLock::new(Some(queues)),
            workers: Mutex::new(workers),
            stats,
        }
    }

    /// Builds an [`HttpSink`] for every registered recipient that has a sink
    /// URL. Recipients without one get no queue.
    pub fn from_registry(
        registry: &RecipientRegistry,
        capacity: usize,
        request_timeout: Duration,
    ) -> Result<Self, DistributorError> {
        let mut sinks: Vec<(Recipient, Arc<dyn DeliverySink>)> = Vec::new();
        for (recipient, route) in registry.routes() {
            match &route.sink_url {
                Some(url) => sinks.push((recipient.clone(), Arc::new(HttpSink::new(url.clone(), request_timeout)?))),
                None => warn!(%recipient, "no sink URL configured, readings for it will be refused"),
            }
        }
        Ok(Self::start(sinks, capacity))
    }

    /// Queues `reading` for its recipient, waiting while the queue is full.
    pub async fn enqueue(&self, reading: Reading) -> Result<(), DistributorError> {
        let tx = {
            let guard = self.queues.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            let queues = guard.as_ref().ok_or(DistributorError::ShutDown)?;
            queues
                .get(&reading.recipient)
                .cloned()
                .ok_or_else(|| RoutingError::UnknownRecipient(reading.recipient.to_string()))?
        };
        tx.send(reading).await.map_err(|_| DistributorError::ShutDown)
    }

    pub fn stats(&self) -> DeliverySnapshot {
        DeliverySnapshot {
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
        }
    }

    /// Closes every queue, waits for the workers to drain what is already
    /// queued and returns the final counters. Later `enqueue` calls fail.
    pub async fn shutdown(&self) -> DeliverySnapshot {
        let queues = self
            .queues
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(queues);

        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(|poisoned| poisoned.into_inner()));
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "delivery worker aborted");
            }
        }
        let snapshot = self.stats();
        info!(?snapshot, "distributor stopped");
        snapshot
    }
}

async fn deliver_loop(
    recipient: Recipient,
    mut rx: mpsc::Receiver<Reading>,
    sink: Arc<dyn DeliverySink>,
    stats: Arc<DeliveryStats>,
) {
    while let Some(reading) = rx.recv().await {
        match sink.deliver(&reading).await {
            Ok(()) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(%recipient, id = %reading.id, "reading delivered");
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(%recipient, id = %reading.id, error = %e, "delivery failed, dropping reading");
            }
        }
    }
    debug!(%recipient, "delivery queue closed");
}

#[async_trait]
impl Destination for Distributor {
    async fn accept(&self, reading: &Reading) -> Result<(), DestinationError> {
        self.enqueue(reading.clone()).await?;
        Ok(())
    }
}
