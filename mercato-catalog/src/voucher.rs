use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pricing;

/// How a voucher reduces its base amount
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountMethod {
    /// `discount_value` is an amount in minor units
    FixedAmount,
    /// `discount_value` is a whole percentage (10 = 10%)
    Percentage,
}

impl DiscountMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountMethod::FixedAmount => "FIXED_AMOUNT",
            DiscountMethod::Percentage => "PERCENTAGE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "FIXED_AMOUNT" => Some(DiscountMethod::FixedAmount),
            "PERCENTAGE" => Some(DiscountMethod::Percentage),
            _ => None,
        }
    }
}

/// What a voucher may be applied to. Shop and shipping scopes are mutually exclusive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "scope", content = "shop_id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoucherTarget {
    Shop(Uuid),
    Shipping,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Voucher {
    pub id: Uuid,
    pub code: String,
    pub target: VoucherTarget,
    pub discount_method: DiscountMethod,
    pub discount_value: i64,
    /// Upper bound on the discount, if any
    pub max_discount: Option<i64>,
    pub min_spend: i64,
    pub remaining_quantity: i32,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub version: i64,
}

impl Voucher {
    /// A voucher is expired once its window has closed or its quantity is used up.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.ends_at || self.remaining_quantity <= 0
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.starts_at
    }

    /// Validate that this voucher can discount `spend` for `target` at `now`.
    ///
    /// Checks run in a fixed order: scope, validity window, minimum spend.
    pub fn check_applicable(
        &self,
        target: VoucherTarget,
        spend: i64,
        now: DateTime<Utc>,
    ) -> Result<(), VoucherError> {
        if self.target != target {
            return Err(VoucherError::NotApplicable(self.code.clone()));
        }

        if self.is_expired(now) {
            return Err(VoucherError::Expired(self.code.clone()));
        }

        if !self.has_started(now) {
            return Err(VoucherError::NotStarted(self.code.clone()));
        }

        if spend < self.min_spend {
            return Err(VoucherError::MinSpendNotMet {
                code: self.code.clone(),
                required: self.min_spend,
                actual: spend,
            });
        }

        Ok(())
    }

    /// Discount this voucher grants against `base`
    pub fn discount_for(&self, base: i64) -> i64 {
        pricing::voucher_discount(self.discount_method, self.discount_value, self.max_discount, base)
    }

    /// Use one unit of this voucher
    pub fn consume(&mut self) -> Result<(), VoucherError> {
        if self.remaining_quantity <= 0 {
            return Err(VoucherError::Expired(self.code.clone()));
        }
        self.remaining_quantity -= 1;
        Ok(())
    }

    /// Give back one unit (order cancelled)
    pub fn restore(&mut self) {
        self.remaining_quantity += 1;
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VoucherError {
    #[error("Voucher {0} cannot be applied to this target")]
    NotApplicable(String),

    #[error("Voucher {0} has expired")]
    Expired(String),

    #[error("Voucher {0} is not valid yet")]
    NotStarted(String),

    #[error("Voucher {code} requires a minimum spend of {required}, got {actual}")]
    MinSpendNotMet {
        code: String,
        required: i64,
        actual: i64,
    },
}
