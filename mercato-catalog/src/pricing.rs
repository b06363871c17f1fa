use crate::voucher::DiscountMethod;

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("Amount exceeds the representable range")]
pub struct AmountOverflow;

/// Gross amount of a cart or order line
pub fn line_total(unit_price: i64, quantity: i32) -> Result<i64, AmountOverflow> {
    unit_price.checked_mul(i64::from(quantity)).ok_or(AmountOverflow)
}

pub fn checked_sum(amounts: impl IntoIterator<Item = i64>) -> Result<i64, AmountOverflow> {
    amounts.into_iter()
        .try_fold(0i64, |acc, amount| acc.checked_add(amount))
        .ok_or(AmountOverflow)
}

/// Discount granted by a voucher against `base`.
///
/// Fixed amounts are capped by `max_discount`; percentages are floored to the
/// minor unit before the cap. The result never exceeds `base` and is never negative.
pub fn voucher_discount(
    method: DiscountMethod,
    value: i64,
    max_discount: Option<i64>,
    base: i64,
) -> i64 {
    if base <= 0 || value <= 0 {
        return 0;
    }

    let raw = match method {
        DiscountMethod::FixedAmount => value,
        // Never more than `base`, so the narrowing cannot truncate
        DiscountMethod::Percentage => (i128::from(base) * i128::from(value.min(100)) / 100) as i64,
    };

    let capped = match max_discount {
        Some(cap) => raw.min(cap.max(0)),
        None => raw,
    };

    capped.min(base)
}

/// Share of `discount` attributable to `part` out of `whole`, rounded down
pub fn prorated_share(discount: i64, part: i64, whole: i64) -> i64 {
    if whole <= 0 || discount <= 0 || part <= 0 {
        return 0;
    }
    // i128 keeps large subtotals from overflowing the intermediate product
    let share = i128::from(discount) * i128::from(part) / i128::from(whole);
    share.min(i128::from(discount)) as i64
}
