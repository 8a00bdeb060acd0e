//! Customer registration with sales referral codes

use crate::error::BillingResult;
use chrono::NaiveDate;
use reseller_common::{Customer, CustomerDirectory, CustomerId, UserRole};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCustomer {
    /// Contact name
    pub name: String,
    /// Must be unique across customers
    pub email: String,
    /// Company name
    pub company: String,
    /// Sales user's referral code, if any
    #[serde(default)]
    pub referral_code: Option<String>,
}

/// Customer registration
pub struct CustomerOnboarding {
    directory: Arc<dyn CustomerDirectory>,
}

impl CustomerOnboarding {
    /// Onboarding over the customer directory
    pub fn new(directory: Arc<dyn CustomerDirectory>) -> Self {
        Self { directory }
    }

    /// Register a customer. A referral code that names a sales user makes that
    /// user both the referrer and the account owner; unknown codes are ignored.
    pub async fn register_customer(&self, request: NewCustomer, today: NaiveDate) -> BillingResult<Customer> {
        let referrer = match request.referral_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => {
                let found = self
                    .directory
                    .find_user_by_referral_code(code)
                    .await?
                    .filter(|u| u.role == UserRole::User);
                if found.is_none() {
                    debug!(code = %code, "Unknown referral code ignored");
                }
                found.map(|u| u.id)
            }
            _ => None,
        };

        let customer = Customer {
            id: CustomerId::generate(),
            name: request.name,
            email: request.email.trim().to_string(),
            company: request.company,
            signup_date: today,
            assigned_to_user_id: referrer.clone(),
            referred_by_user_id: referrer,
        };
        self.directory.insert_customer(&customer).await?;

        info!(
            customer = %customer.id,
            referred_by = ?customer.referred_by_user_id.as_ref().map(|u| u.as_str()),
            "Customer registered"
        );
        Ok(customer)
    }

    /// Fetch a customer
    pub async fn get(&self, id: &CustomerId) -> BillingResult<Option<Customer>> {
        Ok(self.directory.get_customer(id).await?)
    }
}
