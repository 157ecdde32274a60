//! # Core Pipeline
//!
//! The reading store, the per-recipient notifier and the live feed that joins
//! the two, plus the [`Destination`] seam the ingestor writes through.

use async_trait::async_trait;
use thiserror::Error;

use crate::connections::StoreError;
use crate::models::{Reading, RoutingError};

pub mod live;
pub mod notifier;
pub mod store;

pub use live::live_readings;
pub use notifier::{Notifier, Subscription};
pub use store::{ReadingStore, StoreOptions};

/// Why a destination refused a reading.
#[derive(Debug, Error)]
pub enum DestinationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("destination is shut down")]
    Closed,
}

impl DestinationError {
    /// Whether the same reading may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DestinationError::Routing(_))
    }
}

/// Where the ingestor hands validated readings. Returning `Ok` means the
/// reading has been accepted and the inbound message may be acknowledged.
#[async_trait]
pub trait Destination: Send + Sync {
    async fn accept(&self, reading: &Reading) -> Result<(), DestinationError>;
}

#[async_trait]
impl Destination for ReadingStore {
    async fn accept(&self, reading: &Reading) -> Result<(), DestinationError> {
        self.put(reading).await?;
        Ok(())
    }
}

#[async_trait]
impl<D: Destination + ?Sized> Destination for std::sync::Arc<D> {
    async fn accept(&self, reading: &Reading) -> Result<(), DestinationError> {
        (**self).accept(reading).await
    }
}
