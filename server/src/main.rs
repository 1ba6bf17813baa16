use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use funora_server::config::Config;
use funora_server::gateway::{FsBlobStore, RazorpayGateway};
use funora_server::routes::create_routes;
use funora_server::state::{push_sender, AppState, Collaborators, ServiceSettings};
use funora_server::store::PgStore;

const DB_MAX_CONNECTIONS: u32 = 5;
const GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

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
    tracing::info!("Successfully connected to database");

    store.migrate().await?;
    tracing::info!("Migrations run successfully");

    if !config.payments.enabled {
        tracing::warn!("ENABLE_PAYMENT_FEATURE is off, payment orders will be refused");
    }
    let http = reqwest::Client::builder().timeout(GATEWAY_TIMEOUT).build()?;
    let collaborators = Collaborators {
        payments: Arc::new(RazorpayGateway::new(
            http,
            config.payments.api_base.clone(),
            config.payments.key_id.clone(),
            config.payments.key_secret.clone(),
        )),
        blobs: Arc::new(FsBlobStore::new(
            config.storage.qr_dir.clone(),
            config.storage.public_base_url.clone(),
        )),
        push: push_sender(&config.push)?,
    };

    let state = AppState::new(store, collaborators, ServiceSettings::from(&config));
    let app = create_routes(
        state,
        config.cors_allowed_origins.as_deref(),
        config.production,
    );

    tracing::info!("🚀 Server running at http://{}", config.bind_addr);
    let listener = TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
