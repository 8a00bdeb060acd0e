//! Payment gateway port
//!
//! Real gateway integration is out of scope; [`SimulatedGateway`] declines a
//! configurable share of charges.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reseller_common::{CustomerId, Money};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Outcome of a charge attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargeOutcome {
    /// Funds captured
    Approved {
        /// Gateway transaction reference
        reference: String,
    },
    /// Charge refused; nothing captured
    Declined {
        /// Message safe to show the customer
        reason: String,
    },
}

impl ChargeOutcome {
    /// Funds were captured
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}

/// Payment gateway
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Attempt to charge `amount` to the customer's stored payment method
    async fn charge(&self, customer: &CustomerId, amount: Money) -> ChargeOutcome;
}

fn sanitize(rate: f64) -> f64 {
    if rate.is_finite() {
        rate.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Gateway that declines with a fixed probability
pub struct SimulatedGateway {
    decline_rate: f64,
    rng: Mutex<StdRng>,
}

impl SimulatedGateway {
    /// Entropy-seeded; `decline_rate` is clamped to 0-1, non-finite means never decline
    pub fn new(decline_rate: f64) -> Self {
        Self {
            decline_rate: sanitize(decline_rate),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible decline sequence
    pub fn seeded(decline_rate: f64, seed: u64) -> Self {
        Self {
            decline_rate: sanitize(decline_rate),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, customer: &CustomerId, amount: Money) -> ChargeOutcome {
        let (declined, reference) = {
            let mut rng = self.rng.lock();
            (rng.gen_bool(self.decline_rate), rng.gen::<u64>())
        };
        if declined {
            warn!(customer = %customer, amount = %amount, "Simulated gateway declined charge");
            ChargeOutcome::Declined { reason: "Payment failed. Please try again.".into() }
        } else {
            debug!(customer = %customer, amount = %amount, "Simulated gateway approved charge");
            ChargeOutcome::Approved { reference: format!("sim_{:016x}", reference) }
        }
    }
}

/// Gateway that approves every charge
#[derive(Debug, Default, Clone, Copy)]
pub struct ApproveAll;

#[async_trait]
impl PaymentGateway for ApproveAll {
    async fn charge(&self, _customer: &CustomerId, _amount: Money) -> ChargeOutcome {
        ChargeOutcome::Approved { reference: "approved".into() }
    }
}

/// Gateway that declines every charge
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclineAll;

#[async_trait]
impl PaymentGateway for DeclineAll {
    async fn charge(&self, _customer: &CustomerId, _amount: Money) -> ChargeOutcome {
        ChargeOutcome::Declined { reason: "declined".into() }
    }
}
