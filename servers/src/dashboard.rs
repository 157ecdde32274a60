//! # Dashboard
//!
//! Serves recent readings, single readings by key and a live SSE feed for
//! every registered recipient, and accepts distributor deliveries on
//! `POST /api/{recipient}/data`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use lib_telemetry::loggers::init_tracing;
use servers::pipeline::{self, config::CommonArgs, shutdown};
use servers::web::{self, AppState};
use tracing::info;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Per-recipient telemetry dashboard and HTTP sink.")]
struct Cli {
    #[clap(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pipeline::config::load_dotenv();
    let cli = Cli::parse();
    let settings = cli.common.resolve()?;
    let _guard = init_tracing("dashboard", &pipeline::config::log_options(&settings.logging))?;
    info!("{}", settings);

    let store = pipeline::open_store(&settings).await?;
    let registry = Arc::new(settings.registry()?);
    let root = shutdown::install();

    let app = web::router(AppState {
        store: store.clone(),
        registry,
        shutdown: root.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Starting HTTP server on http://{}", addr);

    let token = root.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
        .context("http server failed")?;

    store.close().await;
    info!("Dashboard stopped");
    Ok(())
}
