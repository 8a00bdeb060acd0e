//! Repositories - Persistence abstraction for billing records
//!
//! Repository pattern:
//! - Abstracts persistence details
//! - Works with whole aggregates
//! - Create/read/update only; records are never deleted
//! - Ledger writes go through a single atomic commit

use super::aggregates::*;
use super::value_objects::*;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt;

/// Repository result type
pub type RepoResult<T> = Result<T, RepositoryError>;

/// Record collections, used to tag repository errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Entity {
    Subscription,
    Invoice,
    Commission,
    Coupon,
    Ticket,
    Notification,
    Customer,
    User,
    Software,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Subscription => "subscription",
            Entity::Invoice => "invoice",
            Entity::Commission => "commission",
            Entity::Coupon => "coupon",
            Entity::Ticket => "ticket",
            Entity::Notification => "notification",
            Entity::Customer => "customer",
            Entity::User => "user",
            Entity::Software => "software",
        };
        f.write_str(name)
    }
}

/// Repository errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepositoryError {
    /// No record under `key`
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Collection searched
        entity: Entity,
        /// Lookup key
        key: String,
    },

    /// Optimistic version check failed
    #[error("{entity} {key} was modified concurrently (expected version {expected}, found {found})")]
    Conflict {
        /// Collection written
        entity: Entity,
        /// Record key
        key: String,
        /// Version the caller read
        expected: u64,
        /// Version currently stored
        found: u64,
    },

    /// Uniqueness constraint violated
    #[error("duplicate {entity}: {key}")]
    Duplicate {
        /// Collection written
        entity: Entity,
        /// Clashing key
        key: String,
    },

    /// Record rejected before it was stored
    #[error(transparent)]
    Invalid(#[from] DomainError),

    /// Backend failure
    #[error("storage error: {0}")]
    Storage(String),
}

impl RepositoryError {
    /// `NotFound` for `key`
    pub fn not_found(entity: Entity, key: impl fmt::Display) -> Self {
        Self::NotFound { entity, key: key.to_string() }
    }

    /// `Duplicate` for `key`
    pub fn duplicate(entity: Entity, key: impl fmt::Display) -> Self {
        Self::Duplicate { entity, key: key.to_string() }
    }
}

/// Atomic ledger write: an invoice, its commission (if any) and the
/// subscription state that results from it
#[derive(Debug, Clone)]
pub struct LedgerCommit {
    /// Subscription state after the write
    pub subscription: Subscription,
    /// `None` inserts a new subscription, `Some(v)` updates one stored at version `v`
    pub expected_version: Option<u64>,
    /// Invoice to insert
    pub invoice: Invoice,
    /// Commission earned by a paid invoice
    pub commission: Option<Commission>,
}

/// Subscription repository port
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Fetch by id
    async fn get(&self, id: &SubscriptionId) -> RepoResult<Option<Subscription>>;

    /// Update a stored subscription; fails with `Conflict` unless the stored
    /// version equals `expected_version` and with `Invalid` when the billing
    /// or renewal date precedes the start date. Returns the record as stored.
    async fn update(&self, subscription: &Subscription, expected_version: u64) -> RepoResult<Subscription>;

    /// Subscriptions whose next billing date is strictly before `before`
    async fn list_billing_due(&self, before: NaiveDate) -> RepoResult<Vec<Subscription>>;

    /// Subscriptions owned by one customer
    async fn list_for_customer(&self, customer_id: &CustomerId) -> RepoResult<Vec<Subscription>>;

    /// Every subscription
    async fn list(&self) -> RepoResult<Vec<Subscription>>;
}

/// Invoice repository port (read side; writes go through `LedgerStore::commit`)
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Fetch by id
    async fn get(&self, id: &InvoiceId) -> RepoResult<Option<Invoice>>;

    /// Invoices of one subscription, oldest first
    async fn list_for_subscription(&self, subscription_id: &SubscriptionId) -> RepoResult<Vec<Invoice>>;

    /// Invoices of one customer, oldest first
    async fn list_for_customer(&self, customer_id: &CustomerId) -> RepoResult<Vec<Invoice>>;

    /// Invoices without a payment date
    async fn list_unpaid(&self) -> RepoResult<Vec<Invoice>>;

    /// Paid invoices with `from <= payment_date <= to`
    async fn list_paid_between(&self, from: NaiveDate, to: NaiveDate) -> RepoResult<Vec<Invoice>>;
}

/// Commission repository port (read side)
#[async_trait]
pub trait CommissionRepository: Send + Sync {
    /// Commission earned on an invoice
    async fn find_by_invoice(&self, invoice_id: &InvoiceId) -> RepoResult<Option<Commission>>;

    /// Commissions owed to one user
    async fn list_for_user(&self, user_id: &UserId) -> RepoResult<Vec<Commission>>;

    /// Every commission
    async fn list(&self) -> RepoResult<Vec<Commission>>;
}

/// Unit of work over subscriptions, invoices and commissions
#[async_trait]
pub trait LedgerStore: SubscriptionRepository + InvoiceRepository + CommissionRepository {
    /// Apply every part of the commit or none of it.
    ///
    /// Fails with `Duplicate(Invoice)` for a reused invoice id or a second
    /// recurring invoice for the same subscription cycle, `Duplicate(Commission)`
    /// when the invoice already has a commission, `Conflict` on a stale version
    /// and `Invalid` when the subscription dates are out of order.
    async fn commit(&self, commit: LedgerCommit) -> RepoResult<Subscription>;
}

/// Discount coupon repository port
#[async_trait]
pub trait CouponRepository: Send + Sync {
    /// Fails with `Duplicate` when the code is taken (case-insensitive)
    /// and with `Invalid` when the discount is out of range
    async fn insert(&self, coupon: &DiscountCoupon) -> RepoResult<()>;

    /// Replace a stored coupon; same checks as `insert`
    async fn update(&self, coupon: &DiscountCoupon) -> RepoResult<()>;

    /// Fetch by id
    async fn get(&self, id: &CouponId) -> RepoResult<Option<DiscountCoupon>>;

    /// Case-insensitive code lookup
    async fn find_by_code(&self, code: &str) -> RepoResult<Option<DiscountCoupon>>;

    /// Every coupon
    async fn list(&self) -> RepoResult<Vec<DiscountCoupon>>;
}

/// Support ticket repository port
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Store a new ticket
    async fn insert(&self, ticket: &SupportTicket) -> RepoResult<()>;

    /// Fetch by id
    async fn get(&self, id: &TicketId) -> RepoResult<Option<SupportTicket>>;

    /// Tickets with a due date on or before `due_on_or_before`, status other
    /// than closed and an assignee
    async fn list_reminder_candidates(&self, due_on_or_before: NaiveDate) -> RepoResult<Vec<SupportTicket>>;
}

/// Notification repository port
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Insert unless a notification with the same dedup key exists.
    /// Returns whether the record was inserted.
    async fn insert_if_absent(&self, notification: &Notification) -> RepoResult<bool>;

    /// Fetch by id
    async fn get(&self, id: &NotificationId) -> RepoResult<Option<Notification>>;

    /// Notifications of one type about a ticket
    async fn find_for_ticket(&self, ticket_id: &TicketId, kind: NotificationType) -> RepoResult<Vec<Notification>>;

    /// Newest first
    async fn list_for_user(&self, user_id: &UserId) -> RepoResult<Vec<Notification>>;

    /// Set `is_read`; returns the updated record
    async fn mark_read(&self, id: &NotificationId) -> RepoResult<Notification>;
}

/// Read-only price catalog port
#[async_trait]
pub trait PriceCatalog: Send + Sync {
    /// Product with its plan prices
    async fn get_software(&self, id: &SoftwareId) -> RepoResult<Option<Software>>;
}

/// Customer and user directory port
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    /// Fetch a customer
    async fn get_customer(&self, id: &CustomerId) -> RepoResult<Option<Customer>>;

    /// Fails with `Duplicate` when the email is taken
    async fn insert_customer(&self, customer: &Customer) -> RepoResult<()>;

    /// Fetch a platform user
    async fn get_user(&self, id: &UserId) -> RepoResult<Option<User>>;

    /// User owning a referral code
    async fn find_user_by_referral_code(&self, code: &str) -> RepoResult<Option<User>>;

    /// Users with one role
    async fn list_users_by_role(&self, role: UserRole) -> RepoResult<Vec<User>>;
}
