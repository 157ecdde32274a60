//! # Distribution
//!
//! The immediate-delivery topology: instead of being stored, each reading is
//! queued for its recipient and POSTed to that recipient's HTTP sink.

use async_trait::async_trait;
use thiserror::Error;

use crate::core::DestinationError;
use crate::models::{Reading, RoutingError};

/// Per-recipient bounded queues and their delivery workers.
pub mod distributor;
/// reqwest-backed sink.
pub mod http_sink;

pub use distributor::{DeliverySnapshot, Distributor};
pub use http_sink::HttpSink;

#[derive(Debug, Error)]
pub enum DistributorError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("distributor is shut down")]
    ShutDown,

    #[error(transparent)]
    Sink(#[from] DeliveryError),
}

impl From<DistributorError> for DestinationError {
    fn from(err: DistributorError) -> Self {
        match err {
            DistributorError::Routing(e) => DestinationError::Routing(e),
            DistributorError::ShutDown | DistributorError::Sink(_) => DestinationError::Closed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("delivery transport error: {0}")]
    Transport(String),

    #[error("sink answered with status {0}")]
    Status(u16),

    #[error("failed to encode reading: {0}")]
    Encode(String),
}

/// Final hop of the distributor topology.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, reading: &Reading) -> Result<(), DeliveryError>;
}
