//! Aggregates - Consistency boundaries for billing records
//!
//! Aggregates are:
//! - Loaded and saved as a unit
//! - Referenced by ID only from outside
//! - Never deleted; mutation happens only through the engine's operations

use super::value_objects::*;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Subscription Aggregate Root
///
/// # Invariants
/// - `next_billing_date` and `next_renewal_date` are never before `start_date`
/// - `renewal_amount` is the plan's catalog price at the last plan change
/// - `version` increases by one on every persisted update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Stable identifier
    pub id: SubscriptionId,
    /// Paying customer
    pub customer_id: CustomerId,
    /// Subscribed product
    pub software_id: SoftwareId,
    /// Current billing interval
    pub plan: Plan,
    /// First day of service
    pub start_date: NaiveDate,
    /// Date the current interval ends
    pub next_renewal_date: NaiveDate,
    /// Date the next recurring invoice is due
    pub next_billing_date: NaiveDate,
    /// Amount charged per interval
    pub renewal_amount: Money,
    /// Delivery progress
    pub status: ProjectStatus,
    /// Scheduled onboarding
    pub onboarding_date: NaiveDate,
    /// Scheduled training
    pub training_date: NaiveDate,
    /// Follow-up reminder for the account team
    #[serde(default)]
    pub next_action_date: Option<NaiveDate>,
    /// Free-form notes
    #[serde(default)]
    pub remarks: Option<String>,
    /// Optimistic concurrency counter
    #[serde(default)]
    pub version: u64,
}

impl Subscription {
    /// Billing date has passed
    pub fn is_billing_due(&self, today: NaiveDate) -> bool {
        self.next_billing_date < today
    }

    /// Check the date ordering invariant
    pub fn dates_consistent(&self) -> bool {
        self.next_billing_date >= self.start_date && self.next_renewal_date >= self.start_date
    }
}

/// A single billing event
///
/// # Invariants
/// - `amount` is fixed at issue time
/// - `payment_date`, once set, never changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    /// Stable identifier
    pub id: InvoiceId,
    /// Billed subscription
    pub subscription_id: SubscriptionId,
    /// Billed customer
    pub customer_id: CustomerId,
    /// Amount due
    pub amount: Money,
    /// Date the invoice was created
    pub issue_date: NaiveDate,
    /// Set once when paid
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    /// What produced the invoice
    pub kind: InvoiceKind,
    /// Billing date settled by a recurring invoice
    #[serde(default)]
    pub cycle_start: Option<NaiveDate>,
}

impl Invoice {
    /// Has a payment date
    pub fn is_paid(&self) -> bool {
        self.payment_date.is_some()
    }

    /// Unpaid and the owning subscription's billing date is in the past
    pub fn is_overdue(&self, subscription: &Subscription, today: NaiveDate) -> bool {
        !self.is_paid() && subscription.next_billing_date < today
    }
}

/// Payout owed to a referring sales user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Commission {
    pub id: CommissionId,
    /// Referring user who earns the payout
    pub user_id: UserId,
    pub customer_id: CustomerId,
    /// Paid invoice the commission was earned on
    pub invoice_id: InvoiceId,
    pub amount: Money,
    pub date: NaiveDate,
}

/// Promotional pricing rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCoupon {
    /// Stable identifier
    pub id: CouponId,
    /// Unique, compared case-insensitively
    pub code: String,
    /// Reduction applied to the price
    pub discount: DiscountType,
    /// First valid day
    pub valid_from: NaiveDate,
    /// Last valid day
    pub valid_until: NaiveDate,
    /// Disabled coupons never apply
    pub is_active: bool,
    /// Empty means every product
    #[serde(default)]
    pub applicable_software_ids: Vec<SoftwareId>,
}

impl DiscountCoupon {
    /// Canonical form of a coupon code for lookups
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }
}

/// Support ticket (only the fields the reminder pass reads are significant here)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct SupportTicket {
    pub id: TicketId,
    pub creator_id: UserId,
    #[serde(default)]
    pub related_customer_id: Option<CustomerId>,
    pub subject: String,
    pub description: String,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Reminder recipient
    #[serde(default)]
    pub assigned_to_id: Option<UserId>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

impl SupportTicket {
    /// Open, assigned and carrying a due date
    pub fn wants_reminders(&self) -> bool {
        self.status != TicketStatus::Closed && self.assigned_to_id.is_some() && self.due_date.is_some()
    }
}

/// Generated alert shown to a platform user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Stable identifier
    pub id: NotificationId,
    /// Recipient
    pub user_id: UserId,
    /// Ticket the alert is about
    pub ticket_id: TicketId,
    /// Short headline
    pub title: String,
    /// Body text
    pub message: String,
    /// Creation instant
    pub created_at: DateTime<Utc>,
    /// Seen by the recipient
    pub is_read: bool,
    /// Notification type
    #[serde(rename = "type")]
    pub kind: NotificationType,
}

/// Uniqueness key of a notification
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NotificationKey {
    /// At most one reminder of each type per ticket
    Reminder(TicketId, NotificationType),
    /// At most one announcement per ticket per recipient
    Announcement(TicketId, NotificationType, UserId),
}

impl Notification {
    /// Key under which duplicates are suppressed
    pub fn dedup_key(&self) -> NotificationKey {
        if self.kind.is_reminder() {
            NotificationKey::Reminder(self.ticket_id.clone(), self.kind)
        } else {
            NotificationKey::Announcement(self.ticket_id.clone(), self.kind, self.user_id.clone())
        }
    }
}

/// Paying customer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    /// Stable identifier
    pub id: CustomerId,
    /// Contact name
    pub name: String,
    /// Unique contact email
    pub email: String,
    /// Company name
    pub company: String,
    /// Registration date
    pub signup_date: NaiveDate,
    /// Account manager
    #[serde(default)]
    pub assigned_to_user_id: Option<UserId>,
    /// Sales user credited with commissions
    #[serde(default)]
    pub referred_by_user_id: Option<UserId>,
}

/// Platform user: admin, sales user or customer login
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    /// Code customers enter at signup to credit this user
    #[serde(default)]
    pub referral_code: Option<String>,
}

/// Catalog price per plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub struct PlanPricing {
    pub monthly: Money,
    pub quarterly: Money,
    pub yearly: Money,
}

impl PlanPricing {
    /// Price of one interval of `plan`
    pub fn price(&self, plan: Plan) -> Money {
        match plan {
            Plan::Monthly => self.monthly,
            Plan::Quarterly => self.quarterly,
            Plan::Yearly => self.yearly,
        }
    }
}

/// Software product in the price catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Software {
    /// Stable identifier
    pub id: SoftwareId,
    /// Display name
    pub name: String,
    /// Recurring price per plan
    pub pricing: PlanPricing,
    /// One-off fee added to the purchase invoice
    pub setup_fee: Money,
}
