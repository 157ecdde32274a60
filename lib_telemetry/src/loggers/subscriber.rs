//! # Tracing Setup
//!
//! Installs the global subscriber for a binary: an `EnvFilter` (`RUST_LOG`
//! wins over the configured level), a console layer in text or JSON, and an
//! optional daily-rolling JSON file `{dir}/{app_name}.log.YYYY-MM-DD`.

use std::path::PathBuf;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Filter directive used when `RUST_LOG` is unset (e.g. "info").
    pub level: String,
    /// Directory for rolling log files; console only when `None`.
    pub dir: Option<PathBuf>,
    /// JSON lines on the console instead of human-readable text.
    pub json: bool,
}

/// Builds the filter, falling back to `info` for an empty or invalid level.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialises logging for `app_name`.
///
/// The returned guard flushes the file writer when dropped and must be kept
/// alive for the lifetime of `main`.
pub fn init_tracing(app_name: &str, options: &LogOptions) -> anyhow::Result<Option<WorkerGuard>> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if options.json {
        layers.push(fmt::layer().json().with_target(true).boxed());
    } else {
        layers.push(fmt::layer().with_target(true).boxed());
    }

    let guard = match &options.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, format!("{app_name}.log"));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(fmt::layer().json().with_ansi(false).with_writer(writer).boxed());
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter(&options.level))
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    tracing::info!(app = app_name, "logging initialised");
    Ok(guard)
}
