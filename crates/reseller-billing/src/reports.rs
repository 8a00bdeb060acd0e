//! Read-side billing reports

use crate::error::{BillingError, BillingResult};
use chrono::NaiveDate;
use reseller_common::{
    Commission, CommissionRepository, Invoice, InvoiceRepository, LedgerStore, Money, Subscription, SubscriptionId,
    SubscriptionRepository, UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Payment standing of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// No unpaid invoices
    Paid,
    /// An unpaid invoice and the billing date has passed
    Overdue,
    /// Unpaid invoices, none overdue yet
    Unpaid,
}

/// Standing of `subscription` given its invoices
pub fn payment_status(subscription: &Subscription, invoices: &[Invoice], today: NaiveDate) -> PaymentStatus {
    let mut unpaid = invoices
        .iter()
        .filter(|i| i.subscription_id == subscription.id && !i.is_paid())
        .peekable();
    if unpaid.peek().is_none() {
        PaymentStatus::Paid
    } else if unpaid.any(|i| i.is_overdue(subscription, today)) {
        PaymentStatus::Overdue
    } else {
        PaymentStatus::Unpaid
    }
}

/// Commissions earned by one sales user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionSummary {
    /// Sales user
    pub user_id: UserId,
    /// Oldest first
    pub commissions: Vec<Commission>,
    /// Sum of `commissions`
    pub total: Money,
}

/// Read-only queries over the ledger
pub struct BillingReports {
    store: Arc<dyn LedgerStore>,
}

impl BillingReports {
    /// Reports over `store`
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Payment standing of one subscription
    pub async fn subscription_status(&self, id: &SubscriptionId, today: NaiveDate) -> BillingResult<PaymentStatus> {
        let subscription = SubscriptionRepository::get(&*self.store, id)
            .await?
            .ok_or_else(|| BillingError::SubscriptionNotFound(id.clone()))?;
        let invoices = self.store.list_for_subscription(id).await?;
        Ok(payment_status(&subscription, &invoices, today))
    }

    /// Unpaid invoices whose subscription's billing date has passed
    pub async fn overdue_invoices(&self, today: NaiveDate) -> BillingResult<Vec<Invoice>> {
        let unpaid = self.store.list_unpaid().await?;
        let mut subscriptions: HashMap<SubscriptionId, Option<Subscription>> = HashMap::new();
        let mut overdue = Vec::new();
        for invoice in unpaid {
            if !subscriptions.contains_key(&invoice.subscription_id) {
                let sub = SubscriptionRepository::get(&*self.store, &invoice.subscription_id).await?;
                subscriptions.insert(invoice.subscription_id.clone(), sub);
            }
            let is_overdue = subscriptions
                .get(&invoice.subscription_id)
                .and_then(Option::as_ref)
                .map(|sub| invoice.is_overdue(sub, today))
                .unwrap_or(false);
            if is_overdue {
                overdue.push(invoice);
            }
        }
        Ok(overdue)
    }

    /// Commissions owed to `user` and their total
    pub async fn commission_summary(&self, user: &UserId) -> BillingResult<CommissionSummary> {
        let commissions = self.store.list_for_user(user).await?;
        let total = Money::checked_sum(commissions.iter().map(|c| c.amount))
            .ok_or_else(|| BillingError::AmountOverflow(format!("commission total for {}", user)))?;
        Ok(CommissionSummary { user_id: user.clone(), commissions, total })
    }

    /// Sum of invoices paid within `from..=to`
    pub async fn revenue_between(&self, from: NaiveDate, to: NaiveDate) -> BillingResult<Money> {
        let paid = self.store.list_paid_between(from, to).await?;
        Money::checked_sum(paid.iter().map(|i| i.amount))
            .ok_or_else(|| BillingError::AmountOverflow(format!("revenue {}..={}", from, to)))
    }

    /// Every commission, oldest first
    pub async fn all_commissions(&self) -> BillingResult<Vec<Commission>> {
        Ok(CommissionRepository::list(&*self.store).await?)
    }

    /// Invoice history of one customer, oldest first
    pub async fn invoices_for_customer(&self, customer: &reseller_common::CustomerId) -> BillingResult<Vec<Invoice>> {
        Ok(InvoiceRepository::list_for_customer(&*self.store, customer).await?)
    }
}
