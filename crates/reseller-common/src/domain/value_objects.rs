//! Value Objects - Immutable domain primitives with validation
//!
//! Value Objects are:
//! - Immutable
//! - Comparable by value (not identity)
//! - Self-validating
//! - Side-effect free

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Prefix used for generated identifiers
            pub const PREFIX: &'static str = $prefix;

            /// Create identifier with validation
            pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(DomainError::InvalidId {
                        kind: stringify!($name),
                        reason: "cannot be empty".into(),
                    });
                }
                if id.len() > 128 {
                    return Err(DomainError::InvalidId {
                        kind: stringify!($name),
                        reason: "max 128 characters".into(),
                    });
                }
                Ok(Self(id))
            }

            /// Generate a fresh identifier (`<prefix>-<uuid>`)
            pub fn generate() -> Self {
                Self(format!("{}-{}", $prefix, uuid::Uuid::new_v4().simple()))
            }

            /// Get inner value
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

record_id!(
    /// Subscription identifier
    SubscriptionId, "sub"
);
record_id!(
    /// Invoice identifier
    InvoiceId, "inv"
);
record_id!(
    /// Commission identifier
    CommissionId, "com"
);
record_id!(
    /// Discount coupon identifier
    CouponId, "coupon"
);
record_id!(
    /// Support ticket identifier
    TicketId, "ticket"
);
record_id!(
    /// Notification identifier
    NotificationId, "notif"
);
record_id!(
    /// Customer identifier
    CustomerId, "cust"
);
record_id!(
    /// Platform user identifier (admin, sales user or customer login)
    UserId, "user"
);
record_id!(
    /// Software product identifier
    SoftwareId, "sw"
);

/// Money in integer minor units (paise, cents)
///
/// # Invariants
/// - Arithmetic never goes through floating point
/// - Derived amounts (percentages) truncate toward zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Minor units per major unit
    pub const MINOR_PER_MAJOR: i64 = 100;

    /// Zero amount
    pub const ZERO: Money = Money(0);

    /// Create from minor units
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Create from whole major units
    pub const fn from_major(major: i64) -> Self {
        Self(major * Self::MINOR_PER_MAJOR)
    }

    /// Amount in minor units
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Below zero
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Checked addition
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Sum of `amounts`, `None` on overflow
    pub fn checked_sum<I: IntoIterator<Item = Money>>(amounts: I) -> Option<Money> {
        amounts.into_iter().try_fold(Money::ZERO, Money::checked_add)
    }

    /// Subtract, flooring at zero
    pub fn saturating_sub_floor_zero(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0).max(0))
    }

    /// Multiply by a decimal factor, truncating toward zero
    pub fn mul_truncate(self, factor: Decimal) -> Money {
        let product = (Decimal::from(self.0) * factor).trunc();
        Money(product.to_i64().unwrap_or(if factor.is_sign_negative() { i64::MIN } else { i64::MAX }))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = Self::MINOR_PER_MAJOR as u64;
        write!(f, "{}{}.{:02}", sign, abs / per, abs % per)
    }
}

/// Billing interval tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Plan {
    /// Every month
    Monthly,
    /// Every three months
    Quarterly,
    /// Every twelve months
    Yearly,
}

impl Plan {
    /// Calendar months covered by one interval
    pub const fn months(&self) -> u32 {
        match self {
            Plan::Monthly => 1,
            Plan::Quarterly => 3,
            Plan::Yearly => 12,
        }
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Monthly => "MONTHLY",
            Plan::Quarterly => "QUARTERLY",
            Plan::Yearly => "YEARLY",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MONTHLY" => Ok(Plan::Monthly),
            "QUARTERLY" => Ok(Plan::Quarterly),
            "YEARLY" | "ANNUAL" => Ok(Plan::Yearly),
            other => Err(DomainError::InvalidPlan(other.to_string())),
        }
    }
}

/// Project delivery state of a subscription (independent of billing)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum ProjectStatus {
    Review,
    #[default]
    Pending,
    Training,
    Complete,
}

/// How a coupon reduces a price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    /// Percent off, 0-100
    Percentage(Decimal),
    /// Flat amount off
    FixedAmount(Money),
}

impl DiscountType {
    /// Percentages must lie in 0-100 and flat amounts cannot be negative
    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            Self::Percentage(p) if *p < Decimal::ZERO || *p > Decimal::ONE_HUNDRED => {
                Err(DomainError::InvalidDiscount(format!("percentage {} outside 0-100", p)))
            }
            Self::FixedAmount(m) if m.is_negative() => {
                Err(DomainError::InvalidDiscount(format!("negative amount {}", m)))
            }
            _ => Ok(()),
        }
    }
}

/// Origin of an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceKind {
    /// First invoice at subscribe time, paid immediately
    Purchase,
    /// Generated by the billing job, unpaid
    Recurring,
    /// Explicit renewal payment, paid immediately
    Renewal,
}

/// Support ticket workflow state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    /// Newly opened
    #[default]
    Open,
    /// Picked up by the assignee
    InProgress,
    /// Resolved; no more reminders
    Closed,
}

/// Support ticket priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
}

/// Kind of in-app notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    /// A ticket was opened
    NewTicket,
    /// Ticket due date is within the reminder window
    TaskDueSoon,
    /// Ticket due date has passed
    TaskOverdue,
}

impl NotificationType {
    /// Reminder types are unique per ticket; announcements are unique per recipient
    pub fn is_reminder(&self) -> bool {
        matches!(self, Self::TaskDueSoon | Self::TaskOverdue)
    }
}

/// Platform role of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    /// Platform administrator
    Admin,
    /// Sales / team member
    User,
    /// Customer login
    Customer,
}

/// Domain validation errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    /// Malformed identifier
    #[error("invalid {kind}: {reason}")]
    InvalidId {
        /// Identifier type name
        kind: &'static str,
        /// What was wrong
        reason: String,
    },

    /// Unknown plan name
    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    /// Discount outside its allowed range
    #[error("invalid discount: {0}")]
    InvalidDiscount(String),

    /// Aggregate state that must never be stored
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}
