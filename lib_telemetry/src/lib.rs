//! # lib_telemetry
//!
//! The sensor telemetry pipeline shared by the `servers` binaries: readings flow
//! from an inbound AMQP queue through the [`ingestors::Ingestor`] into the
//! Redis-backed [`core::ReadingStore`], which announces every write on a
//! per-recipient notification channel. Subscribers follow those channels via
//! [`core::Notifier`] and dereference the announced keys through the store.
//! The [`distribution`] module is the alternate topology that forwards readings
//! straight to per-recipient HTTP sinks instead of storing them.
//!
//! Each top-level folder is gated behind a cargo feature of the same name so
//! that thin consumers can compile only the data model.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Reading, recipient, storage key and routing table types.
#[cfg(feature = "models")]
pub mod models;

/// JSON settings with defaults and validation.
#[cfg(feature = "configs")]
pub mod configs;

/// Storage backends behind the [`connections::StoreBackend`] seam.
#[cfg(feature = "connections")]
pub mod connections;

/// Reading store, notifier and live feed built on a storage backend.
#[cfg(feature = "connections")]
pub mod core;

/// tracing-subscriber initialisation.
#[cfg(feature = "loggers")]
pub mod loggers;

/// Inbound message handling: the sequential ingest loop and the AMQP source.
#[cfg(feature = "ingestors")]
pub mod ingestors;

/// Per-recipient HTTP delivery queues.
#[cfg(feature = "distribution")]
pub mod distribution;

#[cfg(feature = "models")]
pub use models::{Reading, Recipient, RecipientRegistry, SensorType, StorageKey};
