//! # Repository Module
//!
//! Database repository implementations for the Dentio ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                     │
//! │                                                                     │
//! │  CRUD layer / ledger coordinator                                    │
//! │       │                                                             │
//! │       │  db.lines().list_for_visit(visit_id)                        │
//! │       ▼                                                             │
//! │  TreatmentLineRepository                                            │
//! │  ├── get_by_id(&self, id)                                           │
//! │  ├── list_for_visit(&self, visit_id)                                │
//! │  └── sum_totals_for_visit(&self, visit_id)                          │
//! │       │                                                             │
//! │       │  SQL query                                                  │
//! │       ▼                                                             │
//! │  SQLite database                                                    │
//! │                                                                     │
//! │  Soft delete is enforced HERE: every read filters                   │
//! │  `deleted_at IS NULL`, so deleted rows never reach callers.         │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`catalog::TreatmentRepository`] - Treatment/category catalog and the
//!   [`catalog::TreatmentCatalog`] existence-check seam
//! - [`visit::VisitRepository`] - Medical record (visit) rows
//! - [`line::TreatmentLineRepository`] - Treatment line reads and single-row
//!   write helpers shared with the ledger coordinator

pub mod catalog;
pub mod line;
pub mod visit;
