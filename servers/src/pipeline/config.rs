use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use lib_telemetry::configs::{LoggingSettings, PipelineSettings};
use lib_telemetry::loggers::LogOptions;

/// Overrides shared by every binary. Each one wins over the settings file;
/// clap reads the flag first and the environment variable second.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    #[clap(long, env = "TELEMETRY_CONFIG", help = "Path to the JSON settings file.")]
    pub config: Option<PathBuf>,

    #[clap(long, env = "REDIS_URL", help = "Redis URL, or memory:// for the in-process backend.")]
    pub redis_url: Option<String>,

    #[clap(long, env = "AMQP_URL", help = "AMQP broker URL.")]
    pub amqp_url: Option<String>,

    #[clap(long, env = "AMQP_QUEUE", help = "Inbound queue name.")]
    pub queue: Option<String>,

    #[clap(long, env = "AMQP_PREFETCH", help = "Unacknowledged deliveries per consumer.")]
    pub prefetch: Option<u16>,

    #[clap(long, env = "TELEMETRY_TTL_SECS", help = "Lifetime of stored readings in seconds.")]
    pub ttl_secs: Option<u64>,

    #[clap(long, env = "TELEMETRY_PORT", help = "HTTP port of the dashboard.")]
    pub port: Option<u16>,

    #[clap(long, env = "TELEMETRY_LOG_LEVEL", help = "Log filter when RUST_LOG is unset (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "TELEMETRY_LOG_DIR", help = "Directory for rolling log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "TELEMETRY_LOG_JSON", help = "Emit console logs as JSON lines.")]
    pub log_json: Option<bool>,
}

impl CommonArgs {
    /// Applies every `Some` override on top of `settings`.
    pub fn merge_into(&self, mut settings: PipelineSettings) -> PipelineSettings {
        if let Some(url) = &self.redis_url {
            settings.redis.url = url.clone();
        }
        if let Some(url) = &self.amqp_url {
            settings.amqp.url = url.clone();
        }
        if let Some(queue) = &self.queue {
            settings.amqp.queue = queue.clone();
        }
        settings.amqp.prefetch = self.prefetch.unwrap_or(settings.amqp.prefetch);
        settings.storage.ttl_secs = self.ttl_secs.unwrap_or(settings.storage.ttl_secs);
        settings.server.port = self.port.unwrap_or(settings.server.port);
        if let Some(level) = &self.log_level {
            settings.logging.level = level.clone();
        }
        if self.log_dir.is_some() {
            settings.logging.dir = self.log_dir.clone();
        }
        settings.logging.json = self.log_json.unwrap_or(settings.logging.json);
        settings
    }

    /// Defaults, then the settings file, then flags and environment.
    pub fn resolve(&self) -> anyhow::Result<PipelineSettings> {
        let file = PipelineSettings::load(self.config.as_deref()).context("loading settings file")?;
        let settings = self.merge_into(file);
        settings.validate().context("validating settings")?;
        Ok(settings)
    }
}

/// Loads a `.env` file if present. Missing files are not an error.
pub fn load_dotenv() {
    let _ = dotenvy::dotenv();
}

pub fn log_options(logging: &LoggingSettings) -> LogOptions {
    LogOptions {
        level: logging.level.clone(),
        dir: logging.dir.clone(),
        json: logging.json,
    }
}
