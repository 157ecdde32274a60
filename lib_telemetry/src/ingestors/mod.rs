//! # Ingestors Module
//!
//! The "front door" of the pipeline. An [`Ingestor`] takes messages one at a
//! time from an inbound source, validates the payload, hands the reading to a
//! [`crate::core::Destination`] and only then settles the message with the
//! broker.
//!
//! ## Contained Modules:
//! - **`collector`**: the sequential consume, persist, ack loop.
//! - **`amqp`**: the lapin-backed queue source and the publisher used by the
//!   generator.

use async_trait::async_trait;
use thiserror::Error;

/// AMQP queue consumer and publisher.
pub mod amqp;
/// The sequential ingest loop and its counters.
pub mod collector;

pub use amqp::{AmqpDelivery, AmqpSession};
pub use collector::{Disposition, IngestSnapshot, IngestStats, Ingestor};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("broker error: {0}")]
    Broker(String),

    #[error("failed to encode outbound message: {0}")]
    Encode(#[from] crate::models::ReadingError),
}

impl From<lapin::Error> for IngestError {
    fn from(err: lapin::Error) -> Self {
        IngestError::Broker(err.to_string())
    }
}

/// A message taken from the inbound channel, settled exactly once.
#[async_trait]
pub trait InboundMessage: Send + Sync {
    fn body(&self) -> &[u8];

    /// Removes the message from the channel.
    async fn ack(&self) -> Result<(), IngestError>;

    /// Returns the message to the channel (`requeue`) or discards it.
    async fn reject(&self, requeue: bool) -> Result<(), IngestError>;
}
