use std::future::Future;

use anyhow::{Error, Result, anyhow};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info};

use crate::{models::outcome::DeliveryOutcome, worker::OutcomeStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS delivery_outcomes (
    id UUID PRIMARY KEY,
    notification_id TEXT NOT NULL,
    channel TEXT NOT NULL,
    recipient TEXT NOT NULL,
    status TEXT NOT NULL,
    observed_at TIMESTAMPTZ NOT NULL,
    latency_ms BIGINT NOT NULL,
    error_message TEXT
);
CREATE INDEX IF NOT EXISTS idx_delivery_outcomes_status ON delivery_outcomes (status);
CREATE INDEX IF NOT EXISTS idx_delivery_outcomes_channel ON delivery_outcomes (channel);
CREATE INDEX IF NOT EXISTS idx_delivery_outcomes_observed_at ON delivery_outcomes (observed_at);
"#;

/// Append-only store for delivery outcomes. The tokio-postgres client is
/// pipelined and takes `&self`, so one repository handle is shared across all
/// channel workers behind an `Arc` without caller-side locking.
pub struct OutcomeRepository {
    client: Client,
}

impl OutcomeRepository {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        info!("Connecting to PostgreSQL database");

        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| anyhow!("Failed to connect to database: {}", e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection error");
            }
        });

        client
            .batch_execute(SCHEMA)
            .await
            .map_err(|e| anyhow!("Failed to set up outcome schema: {}", e))?;

        info!("PostgreSQL connection established");

        Ok(Self { client })
    }
}

impl OutcomeStore for OutcomeRepository {
    fn save(&self, outcome: &DeliveryOutcome) -> impl Future<Output = Result<(), Error>> + Send {
        async move {
            let channel = outcome.channel.to_string();
            let status = outcome.status.to_string();

            self.client
                .execute(
                    r#"
                    INSERT INTO delivery_outcomes (
                        id,
                        notification_id,
                        channel,
                        recipient,
                        status,
                        observed_at,
                        latency_ms,
                        error_message
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                    &[
                        &outcome.id,
                        &outcome.notification_id,
                        &channel,
                        &outcome.recipient,
                        &status,
                        &outcome.observed_at,
                        &outcome.latency_ms,
                        &outcome.error_message,
                    ],
                )
                .await
                .map_err(|e| anyhow!("Failed to persist delivery outcome: {}", e))?;

            debug!(
                notification_id = %outcome.notification_id,
                status = %status,
                "Delivery outcome written to database"
            );

            Ok(())
        }
    }
}
