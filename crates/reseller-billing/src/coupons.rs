//! Discount coupons
//!
//! [`evaluate`] is a filter: an inapplicable coupon returns the amount
//! unchanged. [`CouponCatalog`] manages the coupon records and quotes
//! checkout totals.

use crate::error::{BillingError, BillingResult};
use chrono::NaiveDate;
use reseller_common::{
    CouponId, CouponRepository, DiscountCoupon, DiscountType, Money, Plan, PriceCatalog, SoftwareId,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Whether `coupon` applies to a purchase of `software` on `on`
pub fn applies(coupon: &DiscountCoupon, software: &SoftwareId, on: NaiveDate) -> bool {
    coupon.is_active
        && coupon.valid_from <= on
        && on <= coupon.valid_until
        && (coupon.applicable_software_ids.is_empty() || coupon.applicable_software_ids.contains(software))
}

/// Price of `amount` after `coupon`, never below zero and never above `amount`
pub fn evaluate(coupon: &DiscountCoupon, software: &SoftwareId, amount: Money, on: NaiveDate) -> Money {
    if !applies(coupon, software, on) {
        return amount;
    }
    let discounted = match coupon.discount {
        DiscountType::Percentage(percent) => amount.mul_truncate(Decimal::ONE - percent / dec!(100)),
        DiscountType::FixedAmount(off) => amount.saturating_sub_floor_zero(off),
    };
    // Out-of-range discounts are rejected on write; records built in memory still cannot raise a price
    discounted.min(amount).max(Money::ZERO)
}

/// New coupon request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct NewCoupon {
    /// Stored trimmed; uniqueness ignores case
    pub code: String,
    pub discount: DiscountType,
    pub valid_from: NaiveDate,
    pub valid_until: NaiveDate,
    #[serde(default)]
    pub applicable_software_ids: Vec<SoftwareId>,
}

/// Partial coupon update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct CouponUpdate {
    pub code: Option<String>,
    pub discount: Option<DiscountType>,
    pub valid_from: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub is_active: Option<bool>,
    pub applicable_software_ids: Option<Vec<SoftwareId>>,
}

/// Checkout price breakdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseQuote {
    /// Catalog price of the chosen plan
    pub plan_price: Money,
    /// One-off fee, never discounted
    pub setup_fee: Money,
    /// Amount taken off the plan price
    pub discount: Money,
    /// Discounted plan price plus setup fee
    pub total: Money,
}

/// Coupon catalog
pub struct CouponCatalog {
    coupons: Arc<dyn CouponRepository>,
    prices: Arc<dyn PriceCatalog>,
}

impl CouponCatalog {
    /// Catalog over the coupon store and price list
    pub fn new(coupons: Arc<dyn CouponRepository>, prices: Arc<dyn PriceCatalog>) -> Self {
        Self { coupons, prices }
    }

    /// Add coupon; codes are unique ignoring case
    pub async fn add(&self, request: NewCoupon) -> BillingResult<DiscountCoupon> {
        request.discount.validate()?;
        let coupon = DiscountCoupon {
            id: CouponId::generate(),
            code: request.code.trim().to_string(),
            discount: request.discount,
            valid_from: request.valid_from,
            valid_until: request.valid_until,
            is_active: true,
            applicable_software_ids: request.applicable_software_ids,
        };
        self.coupons.insert(&coupon).await?;
        info!(coupon = %coupon.id, code = %coupon.code, "Coupon added");
        Ok(coupon)
    }

    /// Apply a partial update
    pub async fn update(&self, id: &CouponId, update: CouponUpdate) -> BillingResult<DiscountCoupon> {
        let mut coupon = self.get(id).await?;
        if let Some(code) = update.code {
            coupon.code = code.trim().to_string();
        }
        if let Some(discount) = update.discount {
            discount.validate()?;
            coupon.discount = discount;
        }
        if let Some(from) = update.valid_from {
            coupon.valid_from = from;
        }
        if let Some(until) = update.valid_until {
            coupon.valid_until = until;
        }
        if let Some(active) = update.is_active {
            coupon.is_active = active;
        }
        if let Some(ids) = update.applicable_software_ids {
            coupon.applicable_software_ids = ids;
        }
        self.coupons.update(&coupon).await?;
        info!(coupon = %coupon.id, "Coupon updated");
        Ok(coupon)
    }

    /// Enable or disable without touching other fields
    pub async fn set_active(&self, id: &CouponId, active: bool) -> BillingResult<DiscountCoupon> {
        self.update(id, CouponUpdate { is_active: Some(active), ..Default::default() })
            .await
    }

    /// Fetch by id
    pub async fn get(&self, id: &CouponId) -> BillingResult<DiscountCoupon> {
        self.coupons
            .get(id)
            .await?
            .ok_or_else(|| BillingError::CouponNotFound(id.to_string()))
    }

    /// Lookup ignoring case
    pub async fn find_by_code(&self, code: &str) -> BillingResult<DiscountCoupon> {
        self.coupons
            .find_by_code(code)
            .await?
            .ok_or_else(|| BillingError::CouponNotFound(code.to_string()))
    }

    /// Every coupon, ordered by code
    pub async fn list(&self) -> BillingResult<Vec<DiscountCoupon>> {
        Ok(self.coupons.list().await?)
    }

    /// Price a purchase. The coupon discounts the plan price only, never the setup fee.
    pub async fn quote_purchase(
        &self,
        software_id: &SoftwareId,
        plan: Plan,
        coupon_code: Option<&str>,
        on: NaiveDate,
    ) -> BillingResult<PurchaseQuote> {
        let software = self
            .prices
            .get_software(software_id)
            .await?
            .ok_or_else(|| BillingError::SoftwareNotFound(software_id.clone()))?;
        let plan_price = software.pricing.price(plan);

        let discounted = match coupon_code {
            Some(code) => {
                let coupon = self.find_by_code(code).await?;
                let price = evaluate(&coupon, software_id, plan_price, on);
                if price == plan_price {
                    debug!(code = %coupon.code, software = %software_id, "Coupon does not apply");
                }
                price
            }
            None => plan_price,
        };

        let total = discounted.checked_add(software.setup_fee).ok_or_else(|| {
            BillingError::AmountOverflow(format!("{} + setup fee {}", discounted, software.setup_fee))
        })?;
        Ok(PurchaseQuote {
            plan_price,
            setup_fee: software.setup_fee,
            discount: plan_price.saturating_sub_floor_zero(discounted),
            total,
        })
    }
}
