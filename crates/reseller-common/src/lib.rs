//! Reseller Common - Shared records for the reseller billing platform
//!
//! This crate provides the pieces every other crate agrees on:
//! - Identifiers and integer minor-unit `Money`
//! - Billing records (subscriptions, invoices, commissions, coupons)
//! - Ticket and notification records consumed by the reminder pass
//! - Repository ports and an in-memory adapter
//!
//! # Architecture
//!
//! - **Value Objects**: Immutable, validated primitives (`SubscriptionId`, `Money`, `Plan`)
//! - **Aggregates**: Records loaded and saved as a unit (`Subscription`, `Invoice`)
//! - **Repositories**: Async ports injected into the engine, never process-wide state

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod domain;
pub mod memory;

pub use domain::*;
pub use memory::{Fixture, InMemoryStore};
