//! # dentio-db: Database Layer for the Dentio Billing Ledger
//!
//! This crate provides database access for the Dentio clinic ledger.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Dentio Ledger Data Flow                          │
//! │                                                                         │
//! │  Caller (CRUD layer, bulk billing endpoint)                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                     dentio-db (THIS CRATE)                      │    │
//! │  │                                                                 │    │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐    │    │
//! │  │   │   Database    │    │    Ledger     │    │ Repositories │    │    │
//! │  │   │   (pool.rs)   │    │  (ledger.rs)  │    │ (catalog,    │    │    │
//! │  │   │               │    │               │    │  visit,      │    │    │
//! │  │   │ SqlitePool    │◄───│ validate →    │◄───│  line)       │    │    │
//! │  │   │ Migrations    │    │ compute →     │    │              │    │    │
//! │  │   │ WAL + FKs     │    │ commit/abort  │    │ reads only   │    │    │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘    │    │
//! │  │                                                                 │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database (soft-deleted rows retained, invisible to reads)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`ledger`] - The write coordinator: validation, recomputation,
//!   all-or-nothing bulk transactions
//! - [`repository`] - Repository implementations (catalog, visit, line)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dentio_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/clinic.db")).await?;
//!
//! // Reads go through repositories
//! let lines = db.lines().list_for_visit(&visit_id).await?;
//!
//! // Writes go through the ledger coordinator
//! let outcome = db.ledger().bulk_create_lines(&requests).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use ledger::{BulkCreateOutcome, CommitHook, Ledger, LedgerError, LedgerEvent, LedgerResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::catalog::{TreatmentCatalog, TreatmentRepository};
pub use repository::line::TreatmentLineRepository;
pub use repository::visit::VisitRepository;
