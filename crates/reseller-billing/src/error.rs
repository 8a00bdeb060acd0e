//! Billing error types

use chrono::NaiveDate;
use reseller_common::{
    CustomerId, DomainError, Entity, Money, NotificationId, Plan, RepositoryError, SoftwareId,
    SubscriptionId,
};
use thiserror::Error;

/// Result type for the billing engine
pub type BillingResult<T> = Result<T, BillingError>;

/// Coarse classification of a [`BillingError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced record does not exist; caller error
    NotFound,
    /// The request is not valid for the record's current state; caller error
    InvalidState,
    /// Safe to retry with caller-supplied backoff; nothing was mutated
    Transient,
    /// Ledger guarantee broken (double billing, double payout, corrupt dates); never swallow
    Invariant,
    /// Persistence failure
    Storage,
}

/// Billing engine error
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum BillingError {
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    #[error("software not found: {0}")]
    SoftwareNotFound(SoftwareId),

    #[error("customer not found: {0}")]
    CustomerNotFound(CustomerId),

    #[error("coupon not found: {0}")]
    CouponNotFound(String),

    #[error("notification not found: {0}")]
    NotificationNotFound(NotificationId),

    #[error("subscription {subscription} is already on the {plan} plan")]
    SamePlan { subscription: SubscriptionId, plan: Plan },

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// Percentage outside 0-100 or negative flat amount
    #[error("invalid discount: {0}")]
    InvalidDiscount(String),

    #[error("subscription {subscription} is not due (next billing {next_billing}, today {today})")]
    NotDue {
        subscription: SubscriptionId,
        next_billing: NaiveDate,
        today: NaiveDate,
    },

    #[error("date arithmetic out of range: {0}")]
    DateOutOfRange(NaiveDate),

    /// A total does not fit in `Money`
    #[error("amount overflow: {0}")]
    AmountOverflow(String),

    #[error("payment of {amount} declined: {reason}")]
    PaymentDeclined { amount: Money, reason: String },

    #[error("subscription {0} was modified concurrently")]
    ConcurrentModification(SubscriptionId),

    #[error("duplicate invoice: {0}")]
    DuplicateInvoice(String),

    #[error("duplicate commission for invoice {0}")]
    DuplicateCommission(String),

    /// A record the store refused to persist in its current state
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("coupon code already exists: {0}")]
    DuplicateCouponCode(String),

    #[error(transparent)]
    Repository(RepositoryError),

    #[error("config error: {0}")]
    Config(String),
}

impl BillingError {
    /// Classify for retry and alerting decisions
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SubscriptionNotFound(_)
            | Self::SoftwareNotFound(_)
            | Self::CustomerNotFound(_)
            | Self::CouponNotFound(_)
            | Self::NotificationNotFound(_) => ErrorKind::NotFound,
            Self::SamePlan { .. }
            | Self::InvalidPlan(_)
            | Self::InvalidDiscount(_)
            | Self::NotDue { .. }
            | Self::DateOutOfRange(_)
            | Self::AmountOverflow(_)
            | Self::DuplicateCouponCode(_)
            | Self::Config(_) => ErrorKind::InvalidState,
            Self::PaymentDeclined { .. } | Self::ConcurrentModification(_) => ErrorKind::Transient,
            Self::DuplicateInvoice(_) | Self::DuplicateCommission(_) | Self::InvariantViolation(_) => {
                ErrorKind::Invariant
            }
            Self::Repository(RepositoryError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Repository(RepositoryError::Duplicate { .. }) => ErrorKind::InvalidState,
            Self::Repository(RepositoryError::Invalid(_)) => ErrorKind::InvalidState,
            Self::Repository(RepositoryError::Conflict { .. }) => ErrorKind::Transient,
            Self::Repository(RepositoryError::Storage(_)) => ErrorKind::Storage,
        }
    }

    /// Transient failures only
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Double billing or double payout
    pub fn is_invariant_violation(&self) -> bool {
        self.kind() == ErrorKind::Invariant
    }
}

impl From<RepositoryError> for BillingError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Duplicate { entity: Entity::Invoice, key } => Self::DuplicateInvoice(key),
            RepositoryError::Duplicate { entity: Entity::Commission, key } => Self::DuplicateCommission(key),
            RepositoryError::Duplicate { entity: Entity::Coupon, key } => Self::DuplicateCouponCode(key),
            RepositoryError::Conflict { entity: Entity::Subscription, key, expected, found } => {
                match SubscriptionId::new(key.clone()) {
                    Ok(id) => Self::ConcurrentModification(id),
                    Err(_) => Self::Repository(RepositoryError::Conflict {
                        entity: Entity::Subscription,
                        key,
                        expected,
                        found,
                    }),
                }
            }
            RepositoryError::Invalid(domain) => domain.into(),
            other => Self::Repository(other),
        }
    }
}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidPlan(plan) => Self::InvalidPlan(plan),
            DomainError::InvalidDiscount(reason) => Self::InvalidDiscount(reason),
            DomainError::InvariantViolation(reason) => Self::InvariantViolation(reason),
            other => Self::Config(other.to_string()),
        }
    }
}
