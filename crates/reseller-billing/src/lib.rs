//! Reseller Billing & Lifecycle Engine
//!
//! Recurring charges, plan changes, referral commissions, coupon discounts
//! and due-date reminders for a SaaS reseller platform.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        BILLING PLATFORM                              │
//! │                                                                      │
//! │  ┌────────────────────┐   ┌──────────────────────────────────────┐   │
//! │  │  Billing Job       │──►│  Subscription Ledger                 │   │
//! │  │  Runner            │   │  create | change plan | recurring |  │   │
//! │  └────────────────────┘   │  payment (gateway ─► commission)     │   │
//! │                           └──────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────┐  ┌───────────┐   │
//! │  │   Interval   │  │   Coupons    │  │  Reminder  │  │  Reports  │   │
//! │  │  Arithmetic  │  │  & Quotes    │  │  Scheduler │  │           │   │
//! │  └──────────────┘  └──────────────┘  └────────────┘  └───────────┘   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commission;
pub mod config;
pub mod coupons;
pub mod error;
pub mod gateway;
pub mod interval;
pub mod jobs;
pub mod ledger;
pub mod notifications;
pub mod notify;
pub mod onboarding;
pub mod reminders;
pub mod reports;

use chrono::NaiveDate;
use reseller_common::{
    CouponRepository, CustomerDirectory, CustomerId, InMemoryStore, LedgerStore, NotificationRepository, Plan,
    PriceCatalog, SoftwareId, Subscription, SubscriptionId, TicketRepository,
};
use std::sync::Arc;
use tracing::info;

pub use commission::CommissionAttributor;
pub use config::BillingConfig;
pub use coupons::{evaluate, CouponCatalog, CouponUpdate, NewCoupon, PurchaseQuote};
pub use error::{BillingError, BillingResult, ErrorKind};
pub use gateway::{ChargeOutcome, PaymentGateway, SimulatedGateway};
pub use interval::advance;
pub use jobs::{BillingFailure, BillingJobRunner, BillingRunReport};
pub use ledger::{CycleBilling, PaymentReceipt, SubscriptionDetails, SubscriptionLedger};
pub use notifications::NotificationCenter;
pub use notify::{LoggingNotificationSink, NotificationSink};
pub use onboarding::{CustomerOnboarding, NewCustomer};
pub use reminders::{ReminderReport, ReminderScheduler};
pub use reports::{BillingReports, CommissionSummary, PaymentStatus};

/// Persistence ports the platform is wired with
#[derive(Clone)]
pub struct Repositories {
    /// Subscriptions, invoices and commissions
    pub ledger: Arc<dyn LedgerStore>,
    /// Software price list
    pub prices: Arc<dyn PriceCatalog>,
    /// Customers and platform users
    pub directory: Arc<dyn CustomerDirectory>,
    /// Discount coupons
    pub coupons: Arc<dyn CouponRepository>,
    /// Support tickets
    pub tickets: Arc<dyn TicketRepository>,
    /// In-app notifications
    pub notifications: Arc<dyn NotificationRepository>,
}

impl Repositories {
    /// Every port backed by one in-memory store
    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            ledger: store.clone(),
            prices: store.clone(),
            directory: store.clone(),
            coupons: store.clone(),
            tickets: store.clone(),
            notifications: store,
        }
    }
}

/// Billing platform
pub struct BillingPlatform {
    /// Subscription ledger
    pub ledger: Arc<SubscriptionLedger>,
    /// Coupon catalog
    pub coupons: Arc<CouponCatalog>,
    /// Recurring billing
    pub jobs: Arc<BillingJobRunner>,
    /// Due-date reminders
    pub reminders: Arc<ReminderScheduler>,
    /// Ticket announcements and inboxes
    pub notifications: Arc<NotificationCenter>,
    /// Customer registration
    pub onboarding: Arc<CustomerOnboarding>,
    /// Read-side reports
    pub reports: Arc<BillingReports>,
    config: BillingConfig,
}

impl BillingPlatform {
    /// Create new billing platform
    pub fn new(
        repos: Repositories,
        gateway: Arc<dyn PaymentGateway>,
        sink: Arc<dyn NotificationSink>,
        config: BillingConfig,
    ) -> BillingResult<Self> {
        config.validate()?;

        let coupons = Arc::new(CouponCatalog::new(repos.coupons.clone(), repos.prices.clone()));
        let ledger = Arc::new(SubscriptionLedger::new(
            repos.ledger.clone(),
            repos.prices.clone(),
            repos.directory.clone(),
            coupons.clone(),
            gateway,
            CommissionAttributor::new(config.commission_rate),
        ));
        let reminders = Arc::new(ReminderScheduler::new(
            repos.tickets.clone(),
            repos.notifications.clone(),
            sink.clone(),
            config.due_soon_window_days,
        ));
        let notifications = Arc::new(NotificationCenter::new(
            repos.notifications.clone(),
            repos.tickets.clone(),
            repos.directory.clone(),
            sink,
        ));

        info!(
            commission_rate = %config.commission_rate,
            decline_rate = config.payment_decline_rate,
            currency = %config.currency,
            "Billing platform initialized"
        );

        Ok(Self {
            jobs: Arc::new(BillingJobRunner::new(ledger.clone())),
            onboarding: Arc::new(CustomerOnboarding::new(repos.directory.clone())),
            reports: Arc::new(BillingReports::new(repos.ledger.clone())),
            ledger,
            coupons,
            reminders,
            notifications,
            config,
        })
    }

    /// In-memory platform with the simulated gateway and logging sink
    pub fn in_memory(store: Arc<InMemoryStore>, config: BillingConfig) -> BillingResult<Self> {
        let gateway = Arc::new(SimulatedGateway::new(config.payment_decline_rate));
        Self::new(Repositories::in_memory(store), gateway, Arc::new(LoggingNotificationSink), config)
    }

    /// Validated configuration the platform was built with
    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    /// Subscribe a customer, paying the first invoice
    pub async fn subscribe(
        &self,
        customer: &CustomerId,
        software: &SoftwareId,
        plan: Plan,
        coupon_code: Option<&str>,
        today: NaiveDate,
    ) -> BillingResult<PaymentReceipt> {
        self.ledger.create(customer, software, plan, coupon_code, today).await
    }

    /// Switch plans from the next cycle on
    pub async fn change_plan(&self, id: &SubscriptionId, plan: Plan) -> BillingResult<Subscription> {
        self.ledger.change_plan(id, plan).await
    }

    /// Explicit renewal payment (charge, paid invoice, commission)
    pub async fn record_payment(&self, id: &SubscriptionId, today: NaiveDate) -> BillingResult<PaymentReceipt> {
        self.ledger.record_payment(id, today).await
    }

    /// One recurring-billing pass
    pub async fn run_billing_cycle(&self, today: NaiveDate) -> BillingResult<BillingRunReport> {
        self.jobs.run_billing_cycle(today).await
    }

    /// One due-date reminder pass
    pub async fn run_reminder_pass(&self, today: NaiveDate) -> BillingResult<ReminderReport> {
        self.reminders.run_pass(today).await
    }
}
