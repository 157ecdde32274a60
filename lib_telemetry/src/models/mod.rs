//! # Data Model
//!
//! The unit of work flowing through the pipeline ([`Reading`]), the identity it
//! is addressed to ([`Recipient`]), the deterministic key it is stored under
//! ([`StorageKey`]) and the routing table that decides which recipients exist
//! ([`RecipientRegistry`]).

use thiserror::Error;

/// Sensor readings and their wire format.
pub mod reading;
/// Typed recipient identifiers.
pub mod recipient;
/// Composite storage keys and channel names.
pub mod key;
/// The registered routing table of recipients.
pub mod registry;

pub use key::StorageKey;
pub use reading::{Reading, SensorType};
pub use recipient::Recipient;
pub use registry::{RecipientRegistry, Route, RoutingError};

/// Errors raised while decoding or validating model values.
#[derive(Debug, Error)]
pub enum ReadingError {
    #[error("recipient must not be empty")]
    EmptyRecipient,

    #[error("unknown sensor type: {0}")]
    UnknownSensorType(String),

    #[error("malformed storage key: {0}")]
    MalformedKey(String),

    #[error("malformed reading payload: {0}")]
    Payload(#[from] serde_json::Error),
}
