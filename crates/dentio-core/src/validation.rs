//! # Validation Module
//!
//! Billing rule validation for the Dentio ledger.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                              │
//! │                                                                     │
//! │  Layer 1: Frontend                                                  │
//! │  ├── Basic format checks (empty, length)                            │
//! │  └── Immediate user feedback                                        │
//! │           │                                                         │
//! │           ▼                                                         │
//! │  Layer 2: THIS MODULE - the first gate on every write path          │
//! │  ├── quantity is a positive integer                                 │
//! │  ├── unit price is non-negative                                     │
//! │  └── discount within [0, subtotal]                                  │
//! │           │                                                         │
//! │           ▼                                                         │
//! │  Layer 3: Database (SQLite)                                         │
//! │  ├── CHECK constraints on the money columns                         │
//! │  └── Foreign key constraints                                        │
//! │                                                                     │
//! │  Defense in depth: multiple layers catch different errors           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Interleaving With The Calculator
//! The discount rule needs a subtotal to compare against, so validation and
//! calculation interleave on every create/update path:
//! quantity/price validated → subtotal computed → discount validated.
//! [`validate_line`] performs that full sequence and collects *every*
//! violation rather than stopping at the first.

use crate::error::{ValidationError, ValidationResult};
use crate::money::Money;
use crate::MAX_NOTE_LENGTH;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be a positive integer (>= 1)
///
/// ## Example
/// ```rust
/// use dentio_core::validation::validate_quantity;
///
/// assert!(validate_quantity(1).is_ok());
/// assert!(validate_quantity(0).is_err());
/// assert!(validate_quantity(-3).is_err());
/// ```
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity < 1 {
        return Err(ValidationError::InvalidQuantity { quantity });
    }

    Ok(())
}

/// Validates a unit price.
///
/// ## Rules
/// - Must be non-negative (>= 0)
/// - Zero is allowed (courtesy / warranty treatments)
pub fn validate_unit_price(unit_price: Money) -> ValidationResult<()> {
    if unit_price.is_negative() {
        return Err(ValidationError::InvalidPrice {
            cents: unit_price.cents(),
        });
    }

    Ok(())
}

/// Validates a discount against the subtotal it applies to.
///
/// ## Rules
/// - `0 <= discount <= subtotal`
/// - `discount == subtotal` is legal and produces a zero total
///
/// The subtotal must be computed before this rule can run; see the module
/// docs for the interleaving order.
pub fn validate_discount(discount: Money, subtotal: Money) -> ValidationResult<()> {
    if discount.is_negative() || discount > subtotal {
        return Err(ValidationError::InvalidDiscount {
            discount_cents: discount.cents(),
            subtotal_cents: subtotal.cents(),
        });
    }

    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates an optional free-text note.
///
/// ## Rules
/// - May be absent
/// - At most [`MAX_NOTE_LENGTH`] characters when present
pub fn validate_note(note: Option<&str>) -> ValidationResult<()> {
    if let Some(note) = note {
        if note.chars().count() > MAX_NOTE_LENGTH {
            return Err(ValidationError::TooLong {
                field: "note".to_string(),
                max: MAX_NOTE_LENGTH,
            });
        }
    }

    Ok(())
}

/// Validates a reference id (visit id, treatment id, line id).
///
/// ## Rules
/// - Must not be empty
/// - Must be a valid UUID
///
/// ## Example
/// ```rust
/// use dentio_core::validation::validate_id;
///
/// assert!(validate_id("550e8400-e29b-41d4-a716-446655440000", "visit_id").is_ok());
/// assert!(validate_id("not-a-uuid", "visit_id").is_err());
/// ```
pub fn validate_id(id: &str, field: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Composition
// =============================================================================

/// Runs the full quantity → price → subtotal → discount sequence and
/// collects **every** violation found.
///
/// Returning all problems at once lets a caller report a complete picture
/// for a form (or one request of a bulk submission) in a single response.
///
/// The discount check compares against the raw `quantity × unit_price`
/// product even when quantity or price are themselves invalid, so an
/// absurd discount is still reported alongside the other problems rather
/// than being masked by them.
///
/// ## Example
/// ```rust
/// use dentio_core::money::Money;
/// use dentio_core::validation::validate_line;
///
/// // Three rule violations, three errors - not just the first
/// let errors =
///     validate_line(-1, Money::from_cents(-500), Money::from_cents(100_000_000)).unwrap_err();
/// assert_eq!(errors.len(), 3);
/// ```
pub fn validate_line(
    quantity: i64,
    unit_price: Money,
    discount: Money,
) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Err(e) = validate_quantity(quantity) {
        errors.push(e);
    }

    if let Err(e) = validate_unit_price(unit_price) {
        errors.push(e);
    }

    // Raw product, not the calculator: the calculator refuses negative
    // inputs, and the discount rule must still be reportable here.
    let subtotal = unit_price.multiply_quantity(quantity);
    if let Err(e) = validate_discount(discount, subtotal) {
        errors.push(e);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
