//! # Error Types
//!
//! Domain-specific error types for dentio-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                 │
//! │                                                                     │
//! │  dentio-core errors (this file)                                     │
//! │  ├── ValidationError  - Billing input rule violations               │
//! │  ├── CoreError        - Domain errors (not found, validation)       │
//! │  └── RejectedLine     - Per-index rejection inside a bulk result    │
//! │                                                                     │
//! │  dentio-db errors (separate crate)                                  │
//! │  ├── DbError          - Database operation failures                 │
//! │  └── LedgerError      - Coordinator surface (wraps the above)       │
//! │                                                                     │
//! │  Flow: ValidationError → CoreError → LedgerError → caller           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (the offending value, the bound)
//! 3. Errors are enum variants, never String
//! 4. Rule violations are *values* a caller can collect, so a bulk
//!    submission can report every problem in one response

use thiserror::Error;

// =============================================================================
// Validation Error
// =============================================================================

/// Billing input validation errors.
///
/// These occur when a line-creation or line-update request breaks one of
/// the ledger invariants. They are detected before any calculation is
/// trusted and long before any write is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Quantity must be a positive integer (>= 1).
    #[error("quantity must be a positive integer, got {quantity}")]
    InvalidQuantity { quantity: i64 },

    /// Unit price must be non-negative. Zero is allowed (courtesy treatments).
    #[error("unit price must not be negative, got {cents} cents")]
    InvalidPrice { cents: i64 },

    /// Discount must satisfy 0 <= discount <= subtotal.
    #[error("discount {discount_cents} cents is outside 0..={subtotal_cents} cents")]
    InvalidDiscount {
        discount_cents: i64,
        subtotal_cents: i64,
    },

    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g., a reference id that is not a UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
///
/// These represent business-level failures the caller can act on:
/// fix the input, or point at a catalog entry that actually exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The referenced catalog treatment does not exist (or is retired).
    ///
    /// ## When This Occurs
    /// - Treatment id never existed
    /// - Treatment was soft-deleted from the catalog
    #[error("treatment not found: {0}")]
    TreatmentNotFound(String),

    /// The targeted treatment line does not exist or is already soft-deleted.
    #[error("treatment line not found: {0}")]
    LineNotFound(String),

    /// Validation error (wraps ValidationError).
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Bulk Rejection
// =============================================================================

/// One rejected request inside a bulk submission.
///
/// Rejections are reported by the *original* index of the request so the
/// caller can map each problem back to the line the user typed, and every
/// violation for that line is included, not just the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedLine {
    /// Zero-based index of the request in the submitted batch.
    pub index: usize,
    /// Every problem found with that request.
    pub errors: Vec<CoreError>,
}

impl RejectedLine {
    pub fn new(index: usize, errors: Vec<CoreError>) -> Self {
        RejectedLine { index, errors }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Convenience alias for Results with ValidationError.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Convenience alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
