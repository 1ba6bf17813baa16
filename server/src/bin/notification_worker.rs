//! Runs queued notification jobs (broadcast fan-out and delivery) until
//! ctrl-c.
use std::error::Error;
use std::sync::Arc;

use dotenvy::dotenv;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use funora_server::config::Config;
use funora_server::jobs::Worker;
use funora_server::services::NotificationPipeline;
use funora_server::state::push_sender;
use funora_server::store::PgStore;

const DB_MAX_CONNECTIONS: u32 = 2;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let store = Arc::new(PgStore::connect(&config.database_url, DB_MAX_CONNECTIONS).await?);
    store.migrate().await?;

    let pipeline = Arc::new(NotificationPipeline::new(
        store.clone(),
        store.clone(),
        store.clone(),
        push_sender(&config.push)?,
        config.worker.retry.max_attempts,
    ));
    let worker = Worker::new(store, pipeline, config.worker.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown requested, finishing current job"),
            Err(e) => tracing::error!(error = %e, "Could not listen for ctrl-c, stopping worker"),
        }
        let _ = shutdown_tx.send(true);
    });

    worker.run(shutdown_rx).await;
    tracing::info!("Worker stopped");
    Ok(())
}
