//! # Distributor
//!
//! Alternate topology: consumes the inbound queue and POSTs each reading to
//! its recipient's HTTP sink instead of storing it.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use lib_telemetry::distribution::Distributor;
use lib_telemetry::ingestors::{AmqpSession, Ingestor};
use lib_telemetry::loggers::init_tracing;
use servers::pipeline::{self, config::CommonArgs, shutdown};
use tracing::info;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Forwards sensor readings from the AMQP queue to per-recipient HTTP sinks.")]
struct Cli {
    #[clap(flatten)]
    common: CommonArgs,

    #[clap(long, env = "DISTRIBUTOR_QUEUE_CAPACITY", help = "Pending readings per recipient before the consumer waits.")]
    queue_capacity: Option<usize>,

    #[clap(long, env = "DISTRIBUTOR_TIMEOUT_MS", help = "Per-request timeout of sink deliveries.")]
    request_timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pipeline::config::load_dotenv();
    let cli = Cli::parse();
    let mut settings = cli.common.resolve()?;
    settings.distributor.queue_capacity = cli.queue_capacity.unwrap_or(settings.distributor.queue_capacity);
    settings.distributor.request_timeout_ms = cli.request_timeout_ms.unwrap_or(settings.distributor.request_timeout_ms);
    settings.validate()?;

    let _guard = init_tracing("distributor", &pipeline::config::log_options(&settings.logging))?;
    info!("{}", settings);

    let registry = Arc::new(settings.registry()?);
    let distributor = Arc::new(
        Distributor::from_registry(
            &registry,
            settings.distributor.queue_capacity,
            settings.distributor.request_timeout(),
        )
        .context("building delivery sinks")?,
    );
    let root = shutdown::install();

    let session = AmqpSession::connect(&settings.amqp)
        .await
        .context("connecting to the AMQP broker")?;
    let deliveries = session.consume().await.context("starting the consumer")?;

    let ingestor = Ingestor::new(Arc::clone(&distributor), registry);
    let outcome = ingestor.run(deliveries, root.clone()).await;

    session.close().await;
    let delivered = distributor.shutdown().await;
    let snapshot = outcome.context("ingestion stopped on a broker error")?;
    info!(
        received = snapshot.received,
        delivered = delivered.delivered,
        failed = delivered.failed,
        "Distributor stopped"
    );
    Ok(())
}
