//! # Collector Loop
//!
//! Sequential ingestion: one message is validated, written and settled before
//! the next is read, which keeps per-ingestor ordering and bounds in-flight
//! work to one message. Run several ingestors for more throughput.
//!
//! Settlement rules:
//! - malformed payload: rejected with requeue, nothing written;
//! - recipient not in the registry: rejected without requeue (dead-lettered);
//! - destination failure: rejected with requeue;
//! - success: acknowledged, strictly after the write completed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::Destination;
use crate::models::{Reading, RecipientRegistry};

use super::{IngestError, InboundMessage};

/// How a message was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Acked,
    Requeued,
    DeadLettered,
}

/// Live counters shared between the loop and observers.
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    acked: AtomicU64,
    requeued: AtomicU64,
    dead_lettered: AtomicU64,
    settle_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSnapshot {
    pub received: u64,
    pub acked: u64,
    pub requeued: u64,
    pub dead_lettered: u64,
    /// Ack or reject calls the broker refused.
    pub settle_failures: u64,
}

impl IngestStats {
    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            received: self.received.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            settle_failures: self.settle_failures.load(Ordering::Relaxed),
        }
    }

    fn record(&self, disposition: Disposition) {
        let counter = match disposition {
            Disposition::Acked => &self.acked,
            Disposition::Requeued => &self.requeued,
            Disposition::DeadLettered => &self.dead_lettered,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct Ingestor<D> {
    destination: D,
    registry: Arc<RecipientRegistry>,
    stats: Arc<IngestStats>,
}

impl<D: Destination> Ingestor<D> {
    pub fn new(destination: D, registry: Arc<RecipientRegistry>) -> Self {
        Self {
            destination,
            registry,
            stats: Arc::new(IngestStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<IngestStats> {
        Arc::clone(&self.stats)
    }

    /// Validates, writes and settles a single message.
    pub async fn process<M: InboundMessage + ?Sized>(&self, message: &M) -> Disposition {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let reading = match Reading::from_json(message.body()) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, bytes = message.body().len(), "malformed payload, requeueing");
                return self.settle(message, Disposition::Requeued).await;
            }
        };

        if let Err(e) = self.registry.resolve(&reading.recipient) {
            error!(id = %reading.id, error = %e, "reading addressed to an unregistered recipient, dead-lettering");
            return self.settle(message, Disposition::DeadLettered).await;
        }

        match self.destination.accept(&reading).await {
            Ok(()) => {
                debug!(id = %reading.id, recipient = %reading.recipient, "reading accepted");
                self.settle(message, Disposition::Acked).await
            }
            Err(e) if !e.is_retryable() => {
                error!(id = %reading.id, error = %e, "destination refused reading permanently, dead-lettering");
                self.settle(message, Disposition::DeadLettered).await
            }
            Err(e) => {
                warn!(id = %reading.id, error = %e, "destination write failed, requeueing");
                self.settle(message, Disposition::Requeued).await
            }
        }
    }

    async fn settle<M: InboundMessage + ?Sized>(&self, message: &M, disposition: Disposition) -> Disposition {
        let result = match disposition {
            Disposition::Acked => message.ack().await,
            Disposition::Requeued => message.reject(true).await,
            Disposition::DeadLettered => message.reject(false).await,
        };
        if let Err(e) = result {
            // The broker redelivers unsettled messages; the write is keyed, so
            // a repeat lands on the same entry.
            self.stats.settle_failures.fetch_add(1, Ordering::Relaxed);
            warn!(?disposition, error = %e, "failed to settle message");
        }
        self.stats.record(disposition);
        disposition
    }

    /// Consumes `source` until it ends, fails, or `cancel` fires. Cancellation
    /// is observed between messages only; a message being processed is always
    /// settled first.
    pub async fn run<S, M>(&self, mut source: S, cancel: CancellationToken) -> Result<IngestSnapshot, IngestError>
    where
        S: Stream<Item = Result<M, IngestError>> + Unpin,
        M: InboundMessage,
    {
        info!("ingestor started");
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("ingestor cancelled");
                    break;
                }
                next = source.next() => next,
            };
            match next {
                Some(Ok(message)) => {
                    self.process(&message).await;
                }
                Some(Err(e)) => {
                    error!(error = %e, "inbound source failed");
                    return Err(e);
                }
                None => {
                    info!("inbound source ended");
                    break;
                }
            }
        }
        let snapshot = self.stats.snapshot();
        info!(?snapshot, "ingestor stopped");
        Ok(snapshot)
    }
}
