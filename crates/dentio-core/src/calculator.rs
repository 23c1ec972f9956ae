//! # Line Calculator
//!
//! Derives the money columns of a treatment line from its inputs.
//!
//! ## The Only Two Formulas That Matter
//! ```text
//! subtotal = quantity × unit_price
//! total    = subtotal − discount
//! ```
//!
//! The calculator is the *single* place these are computed. Repositories
//! never trust a client-supplied subtotal or total; they call
//! [`compute_line`] and persist what it returns. That is how the invariant
//! `subtotal == quantity × unit_price && total == subtotal − discount`
//! holds for every committed row.
//!
//! ## Calculator vs Validator
//! The calculator accepts any *non-negative* quantity and price (quantity 0
//! computes a zero line); the stricter "quantity >= 1" business rule is the
//! validator's job. The two are interleaved by callers: quantity/price are
//! validated, the subtotal is computed, then the discount is validated
//! against that subtotal.

use crate::error::{ValidationError, ValidationResult};
use crate::money::Money;
use crate::types::TreatmentLine;

/// The derived money columns of a treatment line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    /// `quantity × unit_price`, exact.
    pub subtotal: Money,
    /// `subtotal − discount`, never negative for a successful computation.
    pub total: Money,
}

/// Computes subtotal and total for a single line.
///
/// Pure and deterministic: identical inputs always produce identical
/// outputs, with no side effects, so it is safe to call any number of times.
///
/// ## Failure Conditions
/// - [`ValidationError::InvalidQuantity`] when `quantity < 0`
/// - [`ValidationError::InvalidPrice`] when `unit_price < 0`
/// - [`ValidationError::InvalidDiscount`] when `discount < 0` or
///   `discount > subtotal`
///
/// ## Example
/// ```rust
/// use dentio_core::calculator::compute_line;
/// use dentio_core::money::Money;
///
/// let amounts = compute_line(2, Money::from_cents(100_000), Money::from_cents(20_000)).unwrap();
/// assert_eq!(amounts.subtotal.cents(), 200_000);
/// assert_eq!(amounts.total.cents(), 180_000);
///
/// // discount == subtotal is the boundary: accepted, total is zero
/// let free = compute_line(1, Money::from_cents(500), Money::from_cents(500)).unwrap();
/// assert_eq!(free.total, Money::zero());
/// ```
pub fn compute_line(
    quantity: i64,
    unit_price: Money,
    discount: Money,
) -> ValidationResult<LineAmounts> {
    if quantity < 0 {
        return Err(ValidationError::InvalidQuantity { quantity });
    }

    if unit_price.is_negative() {
        return Err(ValidationError::InvalidPrice {
            cents: unit_price.cents(),
        });
    }

    let subtotal = unit_price.multiply_quantity(quantity);

    if discount.is_negative() || discount > subtotal {
        return Err(ValidationError::InvalidDiscount {
            discount_cents: discount.cents(),
            subtotal_cents: subtotal.cents(),
        });
    }

    Ok(LineAmounts {
        subtotal,
        total: subtotal - discount,
    })
}

/// Sums line totals into a visit-level grand total.
///
/// Tolerates the empty set (returns zero). Soft-deleted lines must not be
/// in the input at all: excluding them is the repository's responsibility,
/// not the aggregator's, so this function sums exactly what it is given.
pub fn sum_totals<'a>(lines: impl IntoIterator<Item = &'a TreatmentLine>) -> Money {
    lines
        .into_iter()
        .fold(Money::zero(), |acc, line| acc + line.total())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn line_with_total(total_cents: i64) -> TreatmentLine {
        let now = Utc::now();
        TreatmentLine {
            id: "line".to_string(),
            visit_id: "visit".to_string(),
            treatment_id: "treatment".to_string(),
            quantity: 1,
            unit_price_cents: total_cents,
            discount_cents: 0,
            subtotal_cents: total_cents,
            total_cents,
            note: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_compute_basic() {
        let amounts =
            compute_line(2, Money::from_cents(100_000), Money::from_cents(20_000)).unwrap();
        assert_eq!(amounts.subtotal.cents(), 200_000);
        assert_eq!(amounts.total.cents(), 180_000);
    }

    #[test]
    fn test_compute_is_deterministic() {
        let a = compute_line(3, Money::from_cents(1299), Money::from_cents(100)).unwrap();
        let b = compute_line(3, Money::from_cents(1299), Money::from_cents(100)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_quantity_computes_zero_line() {
        // Calculator only requires non-negative; quantity >= 1 is the
        // validator's rule.
        let amounts = compute_line(0, Money::from_cents(500), Money::zero()).unwrap();
        assert_eq!(amounts.subtotal, Money::zero());
        assert_eq!(amounts.total, Money::zero());
    }

    #[test]
    fn test_negative_quantity_rejected() {
        let err = compute_line(-1, Money::from_cents(500), Money::zero()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidQuantity { quantity: -1 }));
    }

    #[test]
    fn test_negative_price_rejected() {
        let err = compute_line(1, Money::from_cents(-500), Money::zero()).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPrice { cents: -500 }));
    }

    #[test]
    fn test_discount_boundary() {
        // discount == subtotal: accepted, total 0
        let amounts = compute_line(2, Money::from_cents(5000), Money::from_cents(10000)).unwrap();
        assert_eq!(amounts.total, Money::zero());

        // one cent over: rejected
        let err = compute_line(2, Money::from_cents(5000), Money::from_cents(10001)).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidDiscount { .. }));
    }

    #[test]
    fn test_negative_discount_rejected() {
        let err = compute_line(1, Money::from_cents(500), Money::from_cents(-1)).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidDiscount { .. }));
    }

    #[test]
    fn test_sum_totals_empty_is_zero() {
        assert_eq!(
            sum_totals(std::iter::empty::<&TreatmentLine>()),
            Money::zero()
        );
    }

    #[test]
    fn test_sum_totals() {
        let lines = vec![line_with_total(100), line_with_total(250), line_with_total(0)];
        assert_eq!(sum_totals(lines.iter()), Money::from_cents(350));
    }
}
