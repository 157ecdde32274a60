//! # Generator
//!
//! Publishes simulated readings for the registered recipients onto the
//! inbound queue at random intervals.

use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use lib_telemetry::Recipient;
use lib_telemetry::ingestors::AmqpSession;
use lib_telemetry::loggers::init_tracing;
use rand::Rng;
use servers::pipeline::{self, config::CommonArgs, shutdown, synth};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Publishes simulated sensor readings to the AMQP queue.")]
struct Cli {
    #[clap(flatten)]
    common: CommonArgs,

    #[clap(long, env = "GENERATOR_MIN_INTERVAL_MS", default_value_t = 1000, help = "Lower bound of the pause between readings.")]
    min_interval_ms: u64,

    #[clap(long, env = "GENERATOR_MAX_INTERVAL_MS", default_value_t = 5000, help = "Upper bound of the pause between readings.")]
    max_interval_ms: u64,

    #[clap(long, env = "GENERATOR_COUNT", help = "Stop after this many readings.")]
    count: Option<u64>,
}

fn next_pause(min_ms: u64, max_ms: u64) -> Duration {
    Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pipeline::config::load_dotenv();
    let cli = Cli::parse();
    if cli.min_interval_ms > cli.max_interval_ms {
        bail!("--min-interval-ms must not exceed --max-interval-ms");
    }
    let settings = cli.common.resolve()?;
    let _guard = init_tracing("generator", &pipeline::config::log_options(&settings.logging))?;

    let registry = settings.registry()?;
    let recipients: Vec<Recipient> = registry.recipients().cloned().collect();
    let root = shutdown::install();

    let session = AmqpSession::connect(&settings.amqp)
        .await
        .context("connecting to the AMQP broker")?;
    info!(recipients = recipients.len(), queue = %settings.amqp.queue, "Generator started");

    let mut sent: u64 = 0;
    while cli.count.is_none_or(|limit| sent < limit) {
        tokio::select! {
            _ = root.cancelled() => break,
            _ = tokio::time::sleep(next_pause(cli.min_interval_ms, cli.max_interval_ms)) => {}
        }

        let Some(reading) = synth::random_reading(&mut rand::rng(), &recipients, chrono::Utc::now().timestamp()) else {
            bail!("no recipients configured");
        };
        match session.publish(&reading).await {
            Ok(()) => {
                sent += 1;
                info!(id = %reading.id, recipient = %reading.recipient, value = reading.value, "Published reading");
            }
            Err(e) => error!(id = %reading.id, error = %e, "Publish failed"),
        }
    }

    session.close().await;
    info!(sent, "Generator stopped");
    Ok(())
}
