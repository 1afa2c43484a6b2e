use anyhow::{Error, Result};
use delivery_service::{config::Config, supervisor::Supervisor};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = Config::load()?;

    let supervisor = Supervisor::start(&config).await?;
    info!("Delivery service started");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    supervisor.shutdown().await;
    info!("Delivery service stopped");

    Ok(())
}
