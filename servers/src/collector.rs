//! # Collector
//!
//! Consumes the inbound queue with one sequential ingestor and writes every
//! valid reading to the store, acknowledging only after the write.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use lib_telemetry::ingestors::{AmqpSession, Ingestor};
use lib_telemetry::loggers::init_tracing;
use servers::pipeline::{self, config::CommonArgs, shutdown};
use tracing::info;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Moves sensor readings from the AMQP queue into the reading store.")]
struct Cli {
    #[clap(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pipeline::config::load_dotenv();
    let cli = Cli::parse();
    let settings = cli.common.resolve()?;
    let _guard = init_tracing("collector", &pipeline::config::log_options(&settings.logging))?;
    info!("{}", settings);

    let store = pipeline::open_store(&settings).await?;
    let registry = Arc::new(settings.registry()?);
    let root = shutdown::install();

    let session = AmqpSession::connect(&settings.amqp)
        .await
        .context("connecting to the AMQP broker")?;
    let deliveries = session.consume().await.context("starting the consumer")?;

    let ingestor = Ingestor::new(store.clone(), registry);
    let outcome = ingestor.run(deliveries, root.clone()).await;

    session.close().await;
    store.close().await;

    let snapshot = outcome.context("ingestion stopped on a broker error")?;
    info!(
        received = snapshot.received,
        acked = snapshot.acked,
        requeued = snapshot.requeued,
        dead_lettered = snapshot.dead_lettered,
        "Collector stopped"
    );
    Ok(())
}
