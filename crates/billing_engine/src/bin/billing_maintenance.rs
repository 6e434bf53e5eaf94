//! Billing maintenance runner
//!
//! Runs the leave-status sweep and then the invoice-status sweep once and
//! prints both reports as JSON. Meant to be scheduled externally.
//!
//! # Environment Variables
//!
//! * `BILLING_DATABASE_URL` - PostgreSQL connection string
//! * `BILLING_TIMEZONE` - clinic timezone (default: Asia/Riyadh)
//! * `BILLING_LOG_LEVEL` / `RUST_LOG` - log filter
//! * `BILLING_LOG_FORMAT` - `pretty` or `json`

use anyhow::Context;

use billing_engine::{init_tracing, BillingEngine, EngineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EngineConfig::load().context("loading configuration")?;
    init_tracing(&config)?;

    tracing::info!(timezone = %config.timezone, "starting billing maintenance");

    let (engine, pool) = BillingEngine::connect(&config)
        .await
        .context("connecting to the billing database")?;

    let report = engine.run_maintenance().await?;
    tracing::info!(
        leaves_updated = report.leaves.updated,
        leaves_expired = report.leaves.expired,
        invoices_updated = report.invoices.updated,
        "maintenance complete"
    );
    println!("{}", serde_json::to_string_pretty(&report)?);

    pool.close().await;
    Ok(())
}
