//! Ticket exchange server binary

use anyhow::Context;
use prometheus::{Encoder, TextEncoder};
use ticket_core::{Config, Exchange};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting ticket exchange server");

    // Load configuration
    let config = match std::env::var("TICKET_CONFIG") {
        Ok(path) => Config::from_file(&path)
            .with_context(|| format!("failed to load config from {}", path))?,
        Err(_) => Config::from_env().context("failed to load config from environment")?,
    };

    // Open exchange
    let exchange = Exchange::open(config)
        .await
        .context("failed to open ticket exchange")?;
    tracing::info!("Ticket exchange opened successfully");

    let mut notifications = exchange.subscribe();
    let log_task = tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(record) => tracing::info!(
                    sequence = record.sequence,
                    notification = %record.to_json(),
                    "Committed {}",
                    record.notification.name()
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Notification log lagged")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down ticket exchange server");

    let metrics = exchange.metrics().clone();
    exchange.shutdown().await.context("failed to shut down exchange")?;
    log_task.abort();

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metrics.registry().gather(), &mut buffer)?;
    tracing::info!(metrics = %String::from_utf8_lossy(&buffer), "Final metrics");

    Ok(())
}
