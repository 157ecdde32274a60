//! # Configuration Modules
//!
//! Pipeline settings loaded from an optional JSON file. Every field has a
//! default so an absent file yields a runnable local setup; binaries layer
//! their CLI and environment overrides on top.

/// Settings structs, loading and validation.
pub mod settings;

pub use settings::{
    AmqpSettings, ConfigError, DistributorSettings, LoggingSettings, PipelineSettings, RecipientSettings,
    RedisSettings, ServerSettings, StorageSettings,
};
