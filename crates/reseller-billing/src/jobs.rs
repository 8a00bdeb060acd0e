//! Billing Job Runner
//!
//! Bills every subscription whose billing date has passed. Recurring invoices
//! are unpaid, so no commission is attributed here; commissions come from
//! explicit payments only.

use crate::error::{BillingError, BillingResult, ErrorKind};
use crate::ledger::SubscriptionLedger;
use chrono::NaiveDate;
use reseller_common::{Invoice, SubscriptionId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

/// A subscription the pass could not bill
#[derive(Debug, Clone)]
pub struct BillingFailure {
    /// Subscription that failed
    pub subscription: SubscriptionId,
    /// Classification of the error
    pub kind: ErrorKind,
    /// Rendered error message
    pub error: String,
}

/// Outcome of one billing pass
#[derive(Debug, Clone, Default)]
pub struct BillingRunReport {
    /// Every invoice committed by the pass
    pub invoices: Vec<Invoice>,
    /// Subscriptions that received at least one invoice
    pub subscriptions_processed: usize,
    /// Subscriptions that failed, including ones that kept some invoices
    pub failures: Vec<BillingFailure>,
}

impl BillingRunReport {
    /// No subscription failed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record_failure(&mut self, subscription: &SubscriptionId, e: &BillingError) {
        if e.is_invariant_violation() {
            error!(subscription = %subscription, error = %e, "Billing invariant violated");
        } else {
            warn!(subscription = %subscription, error = %e, "Failed to bill subscription");
        }
        self.failures.push(BillingFailure {
            subscription: subscription.clone(),
            kind: e.kind(),
            error: e.to_string(),
        });
    }
}

/// Periodic recurring-billing pass over the ledger
pub struct BillingJobRunner {
    ledger: Arc<SubscriptionLedger>,
}

impl BillingJobRunner {
    /// Runner over `ledger`
    pub fn new(ledger: Arc<SubscriptionLedger>) -> Self {
        Self { ledger }
    }

    /// Run one billing pass for `today`.
    ///
    /// A failure on one subscription is recorded and the pass moves on.
    pub async fn run_billing_cycle(&self, today: NaiveDate) -> BillingResult<BillingRunReport> {
        let due = self.ledger.due_for_billing(today).await?;
        let mut processed = HashSet::with_capacity(due.len());
        let mut report = BillingRunReport::default();

        for subscription in due {
            if !processed.insert(subscription.id.clone()) {
                continue;
            }
            match self.ledger.bill_due_cycles(&subscription.id, today).await {
                Ok(billing) => {
                    if !billing.invoices.is_empty() {
                        report.subscriptions_processed += 1;
                        report.invoices.extend(billing.invoices);
                    }
                    if let Some(e) = billing.interrupted {
                        report.record_failure(&subscription.id, &e);
                    }
                }
                Err(e) => report.record_failure(&subscription.id, &e),
            }
        }

        info!(
            today = %today,
            processed = report.subscriptions_processed,
            invoices = report.invoices.len(),
            failures = report.failures.len(),
            "Billing cycle complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commission::CommissionAttributor;
    use crate::coupons::CouponCatalog;
    use crate::gateway::ApproveAll;
    use reseller_common::{
        Customer, CustomerDirectory, CustomerId, InMemoryStore, Money, Plan, PlanPricing, ProjectStatus, Software,
        SoftwareId, Subscription,
    };
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn subscription(id: &str, start: NaiveDate) -> Subscription {
        Subscription {
            id: SubscriptionId::new(id).unwrap(),
            customer_id: CustomerId::new("cust-1").unwrap(),
            software_id: SoftwareId::new("sw-crm").unwrap(),
            plan: Plan::Monthly,
            start_date: start,
            next_renewal_date: start,
            next_billing_date: start,
            renewal_amount: Money::from_major(1000),
            status: ProjectStatus::Pending,
            onboarding_date: start,
            training_date: start,
            next_action_date: None,
            remarks: None,
            version: 0,
        }
    }

    async fn runner() -> (BillingJobRunner, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        store.seed_software(Software {
            id: SoftwareId::new("sw-crm").unwrap(),
            name: "CRM Pro".into(),
            pricing: PlanPricing {
                monthly: Money::from_major(1000),
                quarterly: Money::from_major(2800),
                yearly: Money::from_major(10000),
            },
            setup_fee: Money::from_major(500),
        });
        store
            .insert_customer(&Customer {
                id: CustomerId::new("cust-1").unwrap(),
                name: "Ravi".into(),
                email: "ravi@customer.com".into(),
                company: "Innovate".into(),
                signup_date: date(2023, 8, 15),
                assigned_to_user_id: None,
                referred_by_user_id: None,
            })
            .await
            .unwrap();
        let coupons = Arc::new(CouponCatalog::new(store.clone(), store.clone()));
        let ledger = Arc::new(SubscriptionLedger::new(
            store.clone(),
            store.clone(),
            store.clone(),
            coupons,
            Arc::new(ApproveAll),
            CommissionAttributor::new(dec!(0.20)),
        ));
        (BillingJobRunner::new(ledger), store)
    }

    #[tokio::test]
    async fn test_pass_bills_due_subscriptions_once() {
        let (runner, store) = runner().await;
        store.seed_subscription(subscription("sub-due", date(2024, 1, 10)));
        store.seed_subscription(subscription("sub-later", date(2024, 3, 1)));

        let report = runner.run_billing_cycle(date(2024, 1, 20)).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.subscriptions_processed, 1);
        assert_eq!(report.invoices.len(), 1);
        assert_eq!(report.invoices[0].subscription_id.as_str(), "sub-due");

        let again = runner.run_billing_cycle(date(2024, 1, 20)).await.unwrap();
        assert!(again.invoices.is_empty());
        assert_eq!(store.invoice_count(), 1);
    }

    #[tokio::test]
    async fn test_interrupted_catch_up_reports_kept_invoices_and_failure() {
        let (runner, store) = runner().await;
        let edge = NaiveDate::MAX - chrono::Duration::days(45);
        store.seed_subscription(subscription("sub-edge", edge));

        // The first cycle commits; the one after it falls off the calendar
        let report = runner.run_billing_cycle(NaiveDate::MAX).await.unwrap();

        assert_eq!(report.invoices.len(), 1);
        assert_eq!(report.invoices[0].cycle_start, Some(edge));
        assert_eq!(report.subscriptions_processed, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].subscription.as_str(), "sub-edge");
        assert_eq!(report.failures[0].kind, ErrorKind::InvalidState);
        assert!(!report.is_clean());
        assert_eq!(store.invoice_count(), 1);
    }
}
