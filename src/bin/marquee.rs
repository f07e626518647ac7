//! marquee: standalone booking CDC pipeline host.
//!
//! Runs the full pipeline in a single process: capture log, event store,
//! and the three scheduled stages. Configuration comes from config.yaml
//! and MARQUEE-prefixed environment variables; an optional first argument
//! names an explicit config file.

use tracing::info;

use marquee::config::Config;
use marquee::pipeline::Pipeline;
use marquee::storage::init_storage;
use marquee::utils::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;

    let (change_log, event_store, cursor_store) = init_storage(&config.storage).await?;
    let pipeline = Pipeline::new(
        change_log,
        event_store,
        cursor_store,
        config.scheduler.clone(),
    );

    let runner = pipeline.start();
    info!("marquee pipeline running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runner.shutdown().await;
    Ok(())
}
