//! Reseller domain model
//!
//! - **Value Objects**: ids, `Money`, `Plan`, statuses
//! - **Aggregates**: Subscription, Invoice, Commission, DiscountCoupon, SupportTicket, Notification
//! - **Repositories**: persistence ports; ledger writes are a single atomic commit

pub mod value_objects;
pub mod aggregates;
pub mod repositories;

pub use value_objects::*;
pub use aggregates::*;
pub use repositories::*;
