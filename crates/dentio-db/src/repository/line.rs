//! # Treatment Line Repository
//!
//! Row-level access to the billing ledger table.
//!
//! ## Two Layers of Access
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  TreatmentLineRepository (pool)     │  pub(crate) row helpers       │
//! │  ─────────────────────────────      │  ───────────────────────      │
//! │  read side: get / list / sum        │  write side: insert, update,  │
//! │  one connection per call            │  mark-deleted                 │
//! │                                     │  take &mut SqliteConnection   │
//! │                                     │  so the ledger coordinator    │
//! │                                     │  can run them INSIDE its      │
//! │                                     │  open transaction             │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Soft delete is enforced on every read: `deleted_at IS NULL` appears in
//! each SELECT and each UPDATE's WHERE clause, so deleted rows are invisible
//! to reads, aggregates, and further mutation alike.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::error::DbResult;
use dentio_core::{Money, TreatmentLine};

/// Columns of a full treatment-line row, shared by every SELECT.
const LINE_COLUMNS: &str = r#"
    id, visit_id, treatment_id, quantity,
    unit_price_cents, discount_cents, subtotal_cents, total_cents,
    note, created_at, updated_at, deleted_at
"#;

/// Generates a new treatment line ID.
pub fn generate_line_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Row Helpers (shared with the ledger coordinator)
// =============================================================================

/// Inserts a fully-derived line row.
///
/// The caller (always the ledger coordinator) has already validated the
/// input and computed subtotal/total; this function just persists.
pub(crate) async fn insert_row(conn: &mut SqliteConnection, line: &TreatmentLine) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO treatment_lines (
            id, visit_id, treatment_id, quantity,
            unit_price_cents, discount_cents, subtotal_cents, total_cents,
            note, created_at, updated_at, deleted_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, NULL)
        "#,
    )
    .bind(&line.id)
    .bind(&line.visit_id)
    .bind(&line.treatment_id)
    .bind(line.quantity)
    .bind(line.unit_price_cents)
    .bind(line.discount_cents)
    .bind(line.subtotal_cents)
    .bind(line.total_cents)
    .bind(&line.note)
    .bind(line.created_at)
    .bind(line.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Fetches a live line by id.
pub(crate) async fn fetch_active(
    conn: &mut SqliteConnection,
    id: &str,
) -> DbResult<Option<TreatmentLine>> {
    let line = sqlx::query_as::<_, TreatmentLine>(&format!(
        "SELECT {LINE_COLUMNS} FROM treatment_lines WHERE id = ?1 AND deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(line)
}

/// Rewrites the mutable columns of a live line. Returns false when the row
/// is missing or already soft-deleted (nothing updated).
pub(crate) async fn update_row(conn: &mut SqliteConnection, line: &TreatmentLine) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE treatment_lines SET
            treatment_id = ?2,
            quantity = ?3,
            unit_price_cents = ?4,
            discount_cents = ?5,
            subtotal_cents = ?6,
            total_cents = ?7,
            note = ?8,
            updated_at = ?9
        WHERE id = ?1 AND deleted_at IS NULL
        "#,
    )
    .bind(&line.id)
    .bind(&line.treatment_id)
    .bind(line.quantity)
    .bind(line.unit_price_cents)
    .bind(line.discount_cents)
    .bind(line.subtotal_cents)
    .bind(line.total_cents)
    .bind(&line.note)
    .bind(line.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Soft-deletes one line. Returns false when the row is missing or already
/// deleted; callers decide whether that is an error.
pub(crate) async fn mark_deleted(
    conn: &mut SqliteConnection,
    id: &str,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE treatment_lines
        SET deleted_at = ?2, updated_at = ?2
        WHERE id = ?1 AND deleted_at IS NULL
        "#,
    )
    .bind(id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Soft-deletes every live line of a visit. Returns the count affected.
pub(crate) async fn mark_deleted_for_visit(
    conn: &mut SqliteConnection,
    visit_id: &str,
    now: DateTime<Utc>,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE treatment_lines
        SET deleted_at = ?2, updated_at = ?2
        WHERE visit_id = ?1 AND deleted_at IS NULL
        "#,
    )
    .bind(visit_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Repository (read side)
// =============================================================================

/// Repository for treatment line reads.
///
/// All mutations go through the ledger coordinator so that validation,
/// recomputation, and transactional guarantees cannot be bypassed.
#[derive(Debug, Clone)]
pub struct TreatmentLineRepository {
    pool: SqlitePool,
}

impl TreatmentLineRepository {
    /// Creates a new TreatmentLineRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TreatmentLineRepository { pool }
    }

    /// Gets a live line by ID. Soft-deleted lines are invisible.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<TreatmentLine>> {
        let mut conn = self.pool.acquire().await?;
        fetch_active(&mut conn, id).await
    }

    /// Lists the live lines of a visit in insertion order.
    pub async fn list_for_visit(&self, visit_id: &str) -> DbResult<Vec<TreatmentLine>> {
        let lines = sqlx::query_as::<_, TreatmentLine>(&format!(
            r#"
            SELECT {LINE_COLUMNS}
            FROM treatment_lines
            WHERE visit_id = ?1 AND deleted_at IS NULL
            ORDER BY created_at, id
            "#
        ))
        .bind(visit_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Sums line totals for a visit into a grand total.
    ///
    /// Soft-deleted lines are excluded structurally (they never enter the
    /// sum); a visit with no live lines sums to zero.
    pub async fn sum_totals_for_visit(&self, visit_id: &str) -> DbResult<Money> {
        let total: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(total_cents)
            FROM treatment_lines
            WHERE visit_id = ?1 AND deleted_at IS NULL
            "#,
        )
        .bind(visit_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::from_cents(total.unwrap_or(0)))
    }

    /// Counts the live lines of a visit.
    pub async fn count_for_visit(&self, visit_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM treatment_lines
            WHERE visit_id = ?1 AND deleted_at IS NULL
            "#,
        )
        .bind(visit_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
