// main.rs
// Loads configuration, connects to MongoDB, starts the maintenance sweeps and serves the API.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use prezio::{app, config::AppConfig, jobs, state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let bind_address = config.bind_address.clone();
    let state = Arc::new(
        state::init_state(config)
            .await
            .context("failed to initialize MongoDB state")?,
    );

    jobs::spawn_sweeps(state.clone());
    let app = app::build_router(state);

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!(address = %bind_address, "prezio listening");
    axum::serve(listener, app).await?;
    Ok(())
}
