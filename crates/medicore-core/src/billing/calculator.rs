//! Bill total computation.
//!
//! All arithmetic is exact decimal. Inputs are rounded to currency
//! precision first; the tax amount is rounded once, after which
//! `total == subtotal - discount + tax_amount` holds exactly.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::round_money;

/// Billing input errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BillingError {
    #[error("a bill needs at least one item")]
    EmptyItems,

    #[error("item {index} has a negative amount ({amount})")]
    NegativeAmount { index: usize, amount: Decimal },

    #[error("discount cannot be negative ({0})")]
    NegativeDiscount(Decimal),

    #[error("discount {discount} exceeds subtotal {subtotal}")]
    DiscountExceedsSubtotal { discount: Decimal, subtotal: Decimal },

    #[error("tax rate cannot be negative ({0})")]
    NegativeTaxRate(Decimal),
}

pub type BillingResult<T> = Result<T, BillingError>;

/// Derived monetary fields of a bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
}

/// Compute bill totals from item amounts, a flat discount and a tax percentage.
///
/// Tax applies to `subtotal - discount`.
pub fn compute_totals(
    amounts: &[Decimal],
    discount: Decimal,
    tax_rate: Decimal,
) -> BillingResult<BillTotals> {
    if amounts.is_empty() {
        return Err(BillingError::EmptyItems);
    }
    if let Some((index, amount)) = amounts
        .iter()
        .enumerate()
        .find(|(_, amount)| **amount < Decimal::ZERO)
    {
        return Err(BillingError::NegativeAmount {
            index,
            amount: *amount,
        });
    }
    if discount < Decimal::ZERO {
        return Err(BillingError::NegativeDiscount(discount));
    }
    if tax_rate < Decimal::ZERO {
        return Err(BillingError::NegativeTaxRate(tax_rate));
    }

    let subtotal = round_money(amounts.iter().map(|a| round_money(*a)).sum());
    let discount = round_money(discount);
    if discount > subtotal {
        return Err(BillingError::DiscountExceedsSubtotal { discount, subtotal });
    }

    let taxable = subtotal - discount;
    let tax_amount = round_money(taxable * tax_rate / Decimal::ONE_HUNDRED);
    let total = round_money(taxable + tax_amount);

    Ok(BillTotals {
        subtotal,
        discount,
        tax_amount,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_discount_and_tax() {
        let totals = compute_totals(&[d("10.00"), d("5.50")], d("1.50"), d("10")).unwrap();
        assert_eq!(totals.subtotal.to_string(), "15.50");
        assert_eq!(totals.discount.to_string(), "1.50");
        assert_eq!(totals.tax_amount.to_string(), "1.40");
        assert_eq!(totals.total.to_string(), "15.40");
    }

    #[test]
    fn test_single_item_no_tax() {
        let totals = compute_totals(&[d("500")], Decimal::ZERO, Decimal::ZERO).unwrap();
        assert_eq!(totals.subtotal.to_string(), "500.00");
        assert_eq!(totals.tax_amount.to_string(), "0.00");
        assert_eq!(totals.total.to_string(), "500.00");
    }

    #[test]
    fn test_tax_rounds_half_away_from_zero() {
        // 0.05 * 10% = 0.005 -> 0.01
        let totals = compute_totals(&[d("0.05")], Decimal::ZERO, d("10")).unwrap();
        assert_eq!(totals.tax_amount.to_string(), "0.01");
        assert_eq!(totals.total.to_string(), "0.06");
    }

    #[test]
    fn test_no_float_drift() {
        let totals = compute_totals(&[d("0.10"), d("0.20")], Decimal::ZERO, Decimal::ZERO).unwrap();
        assert_eq!(totals.total, d("0.30"));
    }

    #[test]
    fn test_rejections() {
        assert_eq!(
            compute_totals(&[], Decimal::ZERO, Decimal::ZERO),
            Err(BillingError::EmptyItems)
        );
        assert!(matches!(
            compute_totals(&[d("1"), d("-2")], Decimal::ZERO, Decimal::ZERO),
            Err(BillingError::NegativeAmount { index: 1, .. })
        ));
        assert!(matches!(
            compute_totals(&[d("1")], d("-0.01"), Decimal::ZERO),
            Err(BillingError::NegativeDiscount(_))
        ));
        assert!(matches!(
            compute_totals(&[d("1")], d("1.01"), Decimal::ZERO),
            Err(BillingError::DiscountExceedsSubtotal { .. })
        ));
        assert!(matches!(
            compute_totals(&[d("1")], Decimal::ZERO, d("-5")),
            Err(BillingError::NegativeTaxRate(_))
        ));
    }

    #[test]
    fn test_full_discount_is_allowed() {
        let totals = compute_totals(&[d("20")], d("20"), d("18")).unwrap();
        assert_eq!(totals.total.to_string(), "0.00");
    }

    proptest! {
        #[test]
        fn prop_total_is_subtotal_minus_discount_plus_tax(
            cents in proptest::collection::vec(0i64..1_000_000, 1..10),
            discount_share in 0u32..=100,
            rate_basis_points in 0i64..5_000,
        ) {
            let amounts: Vec<Decimal> = cents.iter().map(|c| Decimal::new(*c, 2)).collect();
            let sum: i64 = cents.iter().sum();
            let discount = Decimal::new(sum * i64::from(discount_share) / 100, 2);
            let tax_rate = Decimal::new(rate_basis_points, 2);

            let totals = compute_totals(&amounts, discount, tax_rate).unwrap();

            prop_assert_eq!(totals.total, totals.subtotal - totals.discount + totals.tax_amount);
            prop_assert_eq!(totals.subtotal, Decimal::new(sum, 2));
            prop_assert_eq!(totals.total.scale(), 2);
            prop_assert!(totals.tax_amount >= Decimal::ZERO);
        }
    }
}
