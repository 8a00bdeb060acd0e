//! Subscription Ledger
//!
//! Owns subscription and invoice state transitions. Every mutation of a
//! subscription runs under that subscription's lock and is persisted with an
//! optimistic version check, so overlapping runs cannot bill a cycle twice.

use crate::commission::CommissionAttributor;
use crate::coupons::CouponCatalog;
use crate::error::{BillingError, BillingResult};
use crate::gateway::{ChargeOutcome, PaymentGateway};
use crate::interval::advance;
use chrono::NaiveDate;
use dashmap::DashMap;
use reseller_common::{
    Commission, Customer, CustomerDirectory, CustomerId, Invoice, InvoiceId, InvoiceKind, InvoiceRepository,
    LedgerCommit, LedgerStore, Plan, PriceCatalog, ProjectStatus, RepositoryError, SoftwareId, Subscription,
    SubscriptionId, SubscriptionRepository,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Result of a purchase or an explicit renewal payment
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    /// Subscription as stored after the payment
    pub subscription: Subscription,
    /// Paid invoice
    pub invoice: Invoice,
    /// Referral payout, if the customer was referred
    pub commission: Option<Commission>,
}

/// Outcome of one catch-up pass over a subscription
#[derive(Debug, Default)]
pub struct CycleBilling {
    /// Invoices committed before the pass stopped, oldest cycle first
    pub invoices: Vec<Invoice>,
    /// Error that cut the pass short after at least one invoice was committed
    pub interrupted: Option<BillingError>,
}

/// CRM fields of a subscription; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct SubscriptionDetails {
    pub status: Option<ProjectStatus>,
    pub next_action_date: Option<NaiveDate>,
    pub remarks: Option<String>,
}

/// Subscription ledger
pub struct SubscriptionLedger {
    store: Arc<dyn LedgerStore>,
    prices: Arc<dyn PriceCatalog>,
    directory: Arc<dyn CustomerDirectory>,
    coupons: Arc<CouponCatalog>,
    gateway: Arc<dyn PaymentGateway>,
    attributor: CommissionAttributor,
    locks: DashMap<SubscriptionId, Arc<Mutex<()>>>,
}

impl SubscriptionLedger {
    /// Ledger over the given ports
    pub fn new(
        store: Arc<dyn LedgerStore>,
        prices: Arc<dyn PriceCatalog>,
        directory: Arc<dyn CustomerDirectory>,
        coupons: Arc<CouponCatalog>,
        gateway: Arc<dyn PaymentGateway>,
        attributor: CommissionAttributor,
    ) -> Self {
        Self {
            store,
            prices,
            directory,
            coupons,
            gateway,
            attributor,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, id: &SubscriptionId) -> Arc<Mutex<()>> {
        self.locks.entry(id.clone()).or_default().clone()
    }

    async fn load(&self, id: &SubscriptionId) -> BillingResult<Subscription> {
        SubscriptionRepository::get(&*self.store, id)
            .await?
            .ok_or_else(|| BillingError::SubscriptionNotFound(id.clone()))
    }

    async fn customer(&self, id: &CustomerId) -> BillingResult<Customer> {
        self.directory
            .get_customer(id)
            .await?
            .ok_or_else(|| BillingError::CustomerNotFound(id.clone()))
    }

    async fn commit(&self, commit: LedgerCommit) -> BillingResult<Subscription> {
        let subscription = commit.subscription.id.clone();
        let invoice = commit.invoice.id.clone();
        self.store.commit(commit).await.map_err(|e| {
            let err = BillingError::from(e);
            if err.is_invariant_violation() {
                error!(subscription = %subscription, invoice = %invoice, error = %err, "Ledger invariant violated");
            }
            err
        })
    }

    async fn persist(&self, subscription: &Subscription) -> BillingResult<Subscription> {
        Ok(self.store.update(subscription, subscription.version).await?)
    }

    /// Fetch, failing with `SubscriptionNotFound`
    pub async fn get(&self, id: &SubscriptionId) -> BillingResult<Subscription> {
        self.load(id).await
    }

    /// Every subscription, ordered by id
    pub async fn list(&self) -> BillingResult<Vec<Subscription>> {
        Ok(SubscriptionRepository::list(&*self.store).await?)
    }

    /// Subscriptions owned by `customer`
    pub async fn list_for_customer(&self, customer: &CustomerId) -> BillingResult<Vec<Subscription>> {
        Ok(SubscriptionRepository::list_for_customer(&*self.store, customer).await?)
    }

    /// Subscriptions whose billing date is before `today`
    pub async fn due_for_billing(&self, today: NaiveDate) -> BillingResult<Vec<Subscription>> {
        Ok(self.store.list_billing_due(today).await?)
    }

    /// Invoice history of a subscription, oldest first
    pub async fn invoices_for(&self, id: &SubscriptionId) -> BillingResult<Vec<Invoice>> {
        Ok(self.store.list_for_subscription(id).await?)
    }

    /// Subscribe a customer and record the first invoice as paid.
    ///
    /// The invoice covers plan price plus setup fee (less any coupon on the
    /// plan price). Referred customers earn their referrer a commission in
    /// the same commit.
    pub async fn create(
        &self,
        customer_id: &CustomerId,
        software_id: &SoftwareId,
        plan: Plan,
        coupon_code: Option<&str>,
        today: NaiveDate,
    ) -> BillingResult<PaymentReceipt> {
        let software = self
            .prices
            .get_software(software_id)
            .await?
            .ok_or_else(|| BillingError::SoftwareNotFound(software_id.clone()))?;
        let customer = self.customer(customer_id).await?;
        let quote = self.coupons.quote_purchase(software_id, plan, coupon_code, today).await?;
        let next = advance(today, plan)?;

        let subscription = Subscription {
            id: SubscriptionId::generate(),
            customer_id: customer.id.clone(),
            software_id: software.id.clone(),
            plan,
            start_date: today,
            next_renewal_date: next,
            next_billing_date: next,
            renewal_amount: software.pricing.price(plan),
            status: ProjectStatus::Pending,
            onboarding_date: today,
            training_date: today,
            next_action_date: None,
            remarks: None,
            version: 0,
        };
        let invoice = Invoice {
            id: InvoiceId::generate(),
            subscription_id: subscription.id.clone(),
            customer_id: customer.id.clone(),
            amount: quote.total,
            issue_date: today,
            payment_date: Some(today),
            kind: InvoiceKind::Purchase,
            cycle_start: None,
        };
        let commission = self.attributor.attribute(&invoice, &customer, today);

        let stored = self
            .commit(LedgerCommit {
                subscription,
                expected_version: None,
                invoice: invoice.clone(),
                commission: commission.clone(),
            })
            .await?;

        info!(
            subscription = %stored.id,
            customer = %customer.id,
            software = %software.id,
            plan = %plan,
            amount = %invoice.amount,
            next_renewal = %stored.next_renewal_date,
            "Subscription created"
        );
        Ok(PaymentReceipt { subscription: stored, invoice, commission })
    }

    /// Switch plans from the next cycle on. No invoice, no proration.
    pub async fn change_plan(&self, id: &SubscriptionId, new_plan: Plan) -> BillingResult<Subscription> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut subscription = self.load(id).await?;
        if subscription.plan == new_plan {
            return Err(BillingError::SamePlan { subscription: id.clone(), plan: new_plan });
        }
        let software = self
            .prices
            .get_software(&subscription.software_id)
            .await?
            .ok_or_else(|| BillingError::SoftwareNotFound(subscription.software_id.clone()))?;

        let old_plan = subscription.plan;
        subscription.plan = new_plan;
        subscription.renewal_amount = software.pricing.price(new_plan);
        let stored = self.persist(&subscription).await?;

        info!(
            subscription = %id,
            from = %old_plan,
            to = %new_plan,
            renewal_amount = %stored.renewal_amount,
            "Plan changed"
        );
        Ok(stored)
    }

    /// Issue an unpaid invoice for the due cycle and advance both dates one
    /// interval from the current renewal date.
    pub async fn generate_recurring_invoice(
        &self,
        id: &SubscriptionId,
        today: NaiveDate,
    ) -> BillingResult<(Invoice, Subscription)> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let subscription = self.load(id).await?;
        self.generate_locked(subscription, today).await
    }

    /// Invoice every cycle one billing pass owes: the due cycle, then each
    /// further cycle whose successor has also started by `today`.
    ///
    /// A subscription is billed by at most one pass per calendar day. Returns
    /// no invoices when it is not due or a pass already billed it `today`.
    /// `Err` means nothing was committed; a failure after the first commit is
    /// reported in [`CycleBilling::interrupted`] next to the invoices it kept.
    pub async fn bill_due_cycles(&self, id: &SubscriptionId, today: NaiveDate) -> BillingResult<CycleBilling> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let subscription = self.load(id).await?;
        if !subscription.is_billing_due(today) {
            debug!(subscription = %id, next_billing = %subscription.next_billing_date, "Not due, skipping");
            return Ok(CycleBilling::default());
        }
        let billed_today = self
            .store
            .list_for_subscription(id)
            .await?
            .iter()
            .any(|i| i.kind == InvoiceKind::Recurring && i.issue_date == today);
        if billed_today {
            debug!(subscription = %id, today = %today, "Already billed today, skipping");
            return Ok(CycleBilling::default());
        }

        let (invoice, mut subscription) = self.generate_locked(subscription, today).await?;
        let mut billing = CycleBilling { invoices: vec![invoice], interrupted: None };
        loop {
            match advance(subscription.next_billing_date, subscription.plan) {
                Ok(following) if following > today => break,
                Ok(_) => {}
                Err(e) => {
                    billing.interrupted = Some(e);
                    break;
                }
            }
            match self.generate_locked(subscription, today).await {
                Ok((invoice, next)) => {
                    billing.invoices.push(invoice);
                    subscription = next;
                }
                Err(e) => {
                    billing.interrupted = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = &billing.interrupted {
            warn!(
                subscription = %id,
                committed = billing.invoices.len(),
                error = %e,
                "Catch-up billing stopped early"
            );
        }
        Ok(billing)
    }

    async fn generate_locked(
        &self,
        subscription: Subscription,
        today: NaiveDate,
    ) -> BillingResult<(Invoice, Subscription)> {
        if !subscription.is_billing_due(today) {
            return Err(BillingError::NotDue {
                subscription: subscription.id.clone(),
                next_billing: subscription.next_billing_date,
                today,
            });
        }

        let invoice = Invoice {
            id: InvoiceId::generate(),
            subscription_id: subscription.id.clone(),
            customer_id: subscription.customer_id.clone(),
            amount: subscription.renewal_amount,
            issue_date: today,
            payment_date: None,
            kind: InvoiceKind::Recurring,
            cycle_start: Some(subscription.next_billing_date),
        };

        let expected = subscription.version;
        let next = advance(subscription.next_renewal_date, subscription.plan)?;
        let mut updated = subscription;
        updated.next_renewal_date = next;
        updated.next_billing_date = next;

        let stored = self
            .commit(LedgerCommit {
                subscription: updated,
                expected_version: Some(expected),
                invoice: invoice.clone(),
                commission: None,
            })
            .await?;

        info!(
            subscription = %stored.id,
            invoice = %invoice.id,
            amount = %invoice.amount,
            cycle = ?invoice.cycle_start,
            next_billing = %stored.next_billing_date,
            "Recurring invoice generated"
        );
        Ok((invoice, stored))
    }

    /// Charge the renewal amount and record a paid invoice.
    ///
    /// Dates advance one interval from the later of the renewal date and
    /// `today`, so an overdue subscription restarts from today instead of
    /// settling every missed cycle. A declined charge changes nothing.
    pub async fn record_payment(&self, id: &SubscriptionId, today: NaiveDate) -> BillingResult<PaymentReceipt> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let subscription = self.load(id).await?;
        let customer = self.customer(&subscription.customer_id).await?;
        let amount = subscription.renewal_amount;
        let base = subscription.next_renewal_date.max(today);
        let next = advance(base, subscription.plan)?;

        match self.gateway.charge(&customer.id, amount).await {
            ChargeOutcome::Approved { reference } => {
                debug!(subscription = %id, reference = %reference, "Charge approved");
            }
            ChargeOutcome::Declined { reason } => {
                warn!(subscription = %id, amount = %amount, reason = %reason, "Renewal payment declined");
                return Err(BillingError::PaymentDeclined { amount, reason });
            }
        }

        let invoice = Invoice {
            id: InvoiceId::generate(),
            subscription_id: subscription.id.clone(),
            customer_id: customer.id.clone(),
            amount,
            issue_date: today,
            payment_date: Some(today),
            kind: InvoiceKind::Renewal,
            cycle_start: None,
        };
        let commission = self.attributor.attribute(&invoice, &customer, today);

        let expected = subscription.version;
        let mut updated = subscription;
        updated.next_renewal_date = next;
        updated.next_billing_date = next;

        let stored = self
            .commit(LedgerCommit {
                subscription: updated,
                expected_version: Some(expected),
                invoice: invoice.clone(),
                commission: commission.clone(),
            })
            .await?;

        info!(
            subscription = %id,
            invoice = %invoice.id,
            amount = %amount,
            commission = commission.is_some(),
            next_renewal = %stored.next_renewal_date,
            "Renewal payment recorded"
        );
        Ok(PaymentReceipt { subscription: stored, invoice, commission })
    }

    /// Update delivery status and CRM notes; billing fields are untouched
    pub async fn update_details(
        &self,
        id: &SubscriptionId,
        details: SubscriptionDetails,
    ) -> BillingResult<Subscription> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut subscription = self.load(id).await?;
        if let Some(status) = details.status {
            subscription.status = status;
        }
        if let Some(date) = details.next_action_date {
            subscription.next_action_date = Some(date);
        }
        if let Some(remarks) = details.remarks {
            subscription.remarks = Some(remarks);
        }
        let stored = self.persist(&subscription).await.map_err(|e| match e {
            BillingError::Repository(RepositoryError::NotFound { .. }) => BillingError::SubscriptionNotFound(id.clone()),
            other => other,
        })?;
        debug!(subscription = %id, status = ?stored.status, "Subscription details updated");
        Ok(stored)
    }
}
