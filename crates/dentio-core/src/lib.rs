//! # dentio-core: Pure Business Logic for the Dentio Billing Ledger
//!
//! This crate is the **heart** of the billing subsystem. It contains all
//! business logic as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      Dentio Architecture                            │
//! │                                                                     │
//! │  ┌───────────────────────────────────────────────────────────────┐  │
//! │  │                  CRUD layer (out of scope)                    │  │
//! │  │   attach treatment ──► edit line ──► replace visit lines      │  │
//! │  └───────────────────────────────┬───────────────────────────────┘  │
//! │                                  │                                  │
//! │  ┌───────────────────────────────▼───────────────────────────────┐  │
//! │  │              ★ dentio-core (THIS CRATE) ★                     │  │
//! │  │                                                               │  │
//! │  │  ┌──────────┐ ┌────────────┐ ┌────────────┐ ┌────────────┐   │  │
//! │  │  │  types   │ │   money    │ │ calculator │ │ validation │   │  │
//! │  │  │ Treatment│ │   Money    │ │ subtotal   │ │   rules    │   │  │
//! │  │  │   Line   │ │ (cents)    │ │   total    │ │   checks   │   │  │
//! │  │  └──────────┘ └────────────┘ └────────────┘ └────────────┘   │  │
//! │  │                                                               │  │
//! │  │  NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │  │
//! │  └───────────────────────────────┬───────────────────────────────┘  │
//! │                                  │                                  │
//! │  ┌───────────────────────────────▼───────────────────────────────┐  │
//! │  │                  dentio-db (Database Layer)                   │  │
//! │  │       SQLite repositories, ledger transaction coordinator     │  │
//! │  └───────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (TreatmentLine, Treatment, MedicalRecord, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`calculator`] - Subtotal/total derivation and visit-level aggregation
//! - [`validation`] - Billing rule validation
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in cents (i64) to avoid float errors
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use dentio_core::calculator::compute_line;
//! use dentio_core::money::Money;
//!
//! // 2 fillings at $150.00 each, $20.00 off
//! let amounts = compute_line(2, Money::from_cents(15000), Money::from_cents(2000)).unwrap();
//!
//! assert_eq!(amounts.subtotal.cents(), 30000);
//! assert_eq!(amounts.total.cents(), 28000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod calculator;
pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use dentio_core::Money` instead of
// `use dentio_core::money::Money`.

pub use calculator::{compute_line, sum_totals, LineAmounts};
pub use error::{CoreError, RejectedLine, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default quantity when a line-creation request omits it.
pub const DEFAULT_LINE_QUANTITY: i64 = 1;

/// Maximum length of the free-text note on a treatment line.
///
/// ## Business Reason
/// Notes are chairside remarks, not clinical documentation. Anything longer
/// belongs on the medical record itself.
pub const MAX_NOTE_LENGTH: usize = 1000;
