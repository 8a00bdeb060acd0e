//! Reseller Billing Daemon - Main Entry Point
//!
//! Drives the billing job runner and the reminder scheduler on periodic ticks.

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use reseller_billing::{BillingConfig, BillingPlatform};
use reseller_common::{Fixture, InMemoryStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Build the in-memory store, seeded from a JSON fixture when one is configured
fn load_store(seed_path: Option<&Path>) -> anyhow::Result<Arc<InMemoryStore>> {
    let Some(path) = seed_path else {
        return Ok(Arc::new(InMemoryStore::new()));
    };
    let content = std::fs::read_to_string(path).with_context(|| format!("reading seed {}", path.display()))?;
    let fixture: Fixture =
        serde_json::from_str(&content).with_context(|| format!("parsing seed {}", path.display()))?;
    info!(
        path = %path.display(),
        software = fixture.software.len(),
        customers = fixture.customers.len(),
        subscriptions = fixture.subscriptions.len(),
        tickets = fixture.tickets.len(),
        "Seeding store"
    );
    Ok(Arc::new(InMemoryStore::from_fixture(fixture)?))
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

async fn billing_tick(platform: &BillingPlatform) {
    match platform.run_billing_cycle(today()).await {
        Ok(report) => {
            for failure in &report.failures {
                warn!(subscription = %failure.subscription, kind = ?failure.kind, error = %failure.error, "Subscription not billed");
            }
        }
        Err(err) => warn!(error = %err, "Billing tick failed"),
    }
}

async fn reminder_tick(platform: &BillingPlatform) {
    if let Err(err) = platform.run_reminder_pass(today()).await {
        warn!(error = %err, "Reminder tick failed");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Reseller billing daemon v{}", env!("CARGO_PKG_VERSION"));

    let config = BillingConfig::from_env()?;
    let store = load_store(config.seed_path.as_deref())?;

    let platform = BillingPlatform::in_memory(store, config)?;
    let mut billing = tokio::time::interval(Duration::from_secs(platform.config().billing_interval_secs));
    let mut reminders = tokio::time::interval(Duration::from_secs(platform.config().reminder_interval_secs));

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = billing.tick() => billing_tick(&platform).await,
            _ = reminders.tick() => reminder_tick(&platform).await,
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_seed_gives_empty_store() {
        let store = load_store(None).unwrap();
        assert_eq!(store.invoice_count(), 0);
    }

    #[test]
    fn test_demo_seed_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/seed.json");
        let store = load_store(Some(path.as_path())).unwrap();
        let platform = BillingPlatform::in_memory(store, BillingConfig::default()).unwrap();

        let report = tokio_test::block_on(platform.run_billing_cycle(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()))
            .unwrap();
        assert!(report.is_clean());
        assert!(!report.invoices.is_empty());
    }

    #[test]
    fn test_missing_seed_is_an_error() {
        assert!(load_store(Some(Path::new("/nonexistent/seed.json"))).is_err());
    }
}
