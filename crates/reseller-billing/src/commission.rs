//! Referral commission attribution

use chrono::NaiveDate;
use reseller_common::{Commission, CommissionId, Customer, Invoice, Money};
use rust_decimal::Decimal;
use tracing::debug;

/// Builds commission records for paid invoices of referred customers.
///
/// Pure: persistence (and the one-per-invoice guard) belongs to the ledger.
#[derive(Debug, Clone, Copy)]
pub struct CommissionAttributor {
    rate: Decimal,
}

impl CommissionAttributor {
    /// `rate` is the share of each paid invoice, e.g. 0.20
    pub fn new(rate: Decimal) -> Self {
        Self { rate }
    }

    /// Commission owed on `amount`, truncated to minor units
    pub fn commission_on(&self, amount: Money) -> Money {
        amount.mul_truncate(self.rate)
    }

    /// `None` when the customer was not referred
    pub fn attribute(&self, invoice: &Invoice, paying_customer: &Customer, on: NaiveDate) -> Option<Commission> {
        let referrer = paying_customer.referred_by_user_id.as_ref()?;
        let amount = self.commission_on(invoice.amount);
        debug!(invoice = %invoice.id, referrer = %referrer, amount = %amount, "Commission attributed");
        Some(Commission {
            id: CommissionId::generate(),
            user_id: referrer.clone(),
            customer_id: paying_customer.id.clone(),
            invoice_id: invoice.id.clone(),
            amount,
            date: on,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reseller_common::{CustomerId, InvoiceId, InvoiceKind, SubscriptionId, UserId};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn customer(referred_by: Option<&str>) -> Customer {
        Customer {
            id: CustomerId::new("cust-1").unwrap(),
            name: "Ravi".into(),
            email: "ravi@customer.com".into(),
            company: "Innovate".into(),
            signup_date: date(2023, 8, 15),
            assigned_to_user_id: None,
            referred_by_user_id: referred_by.map(|u| UserId::new(u).unwrap()),
        }
    }

    fn invoice(amount: Money) -> Invoice {
        Invoice {
            id: InvoiceId::new("inv-1").unwrap(),
            subscription_id: SubscriptionId::new("sub-1").unwrap(),
            customer_id: CustomerId::new("cust-1").unwrap(),
            amount,
            issue_date: date(2024, 1, 10),
            payment_date: Some(date(2024, 1, 10)),
            kind: InvoiceKind::Purchase,
            cycle_start: None,
        }
    }

    #[test]
    fn test_referred_customer_earns_twenty_percent() {
        let attributor = CommissionAttributor::new(dec!(0.20));
        let commission = attributor
            .attribute(&invoice(Money::from_major(1500)), &customer(Some("user-sales-1")), date(2024, 1, 10))
            .unwrap();
        assert_eq!(commission.amount, Money::from_major(300));
        assert_eq!(commission.user_id.as_str(), "user-sales-1");
        assert_eq!(commission.invoice_id.as_str(), "inv-1");
    }

    #[test]
    fn test_no_referral_no_commission() {
        let attributor = CommissionAttributor::new(dec!(0.20));
        assert!(attributor
            .attribute(&invoice(Money::from_major(1500)), &customer(None), date(2024, 1, 10))
            .is_none());
    }

    #[test]
    fn test_amount_truncates_to_minor_units() {
        let attributor = CommissionAttributor::new(dec!(0.20));
        assert_eq!(attributor.commission_on(Money::from_minor(1999)), Money::from_minor(399));
    }
}
