//! # Ledger Coordinator
//!
//! The write surface of the billing ledger. Every mutation of
//! `treatment_lines` flows through this module so that validation,
//! server-side recomputation, referential checks, and transactional
//! guarantees cannot be bypassed.
//!
//! ## Bulk Operation State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                                                                     │
//! │  Started                                                            │
//! │     │                                                               │
//! │     ▼                                                               │
//! │  Vet EVERY request (ids → existence → rules → amounts)              │
//! │     │                                                               │
//! │     ├── any rejection? ──► return per-index rejections,             │
//! │     │                      NOTHING written                          │
//! │     ▼                                                               │
//! │  BEGIN ── apply rows in submitted order ──┬── all ok ──► COMMIT     │
//! │                                           │                         │
//! │                                           └── any error ► ROLLBACK, │
//! │                                               cause re-raised       │
//! │                                                                     │
//! │  There is NO partial-commit state observable externally.            │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Error Discipline
//! - Vetting problems (bad input, unknown treatment) are **values**:
//!   structured per-item results a UI can render field by field.
//! - Write-phase problems are **errors**: the transaction is rolled back
//!   and the underlying cause propagates unchanged.
//! - Nothing here retries. Retrying a non-idempotent bulk create without
//!   deduplication would risk double-billing; retry policy belongs to the
//!   caller.
//!
//! ## Concurrency
//! A transaction is exclusively owned by the one operation that opened it
//! and is explicitly closed (committed or rolled back) on every exit path.
//! Conflicting writers on the same visit are serialized by SQLite's
//! transaction isolation; the coordinator adds no locking of its own.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::repository::catalog::TreatmentCatalog;
use crate::repository::line::{
    fetch_active, generate_line_id, insert_row, mark_deleted, mark_deleted_for_visit, update_row,
    TreatmentLineRepository,
};
use dentio_core::{
    calculator::{compute_line, LineAmounts},
    error::{CoreError, RejectedLine, ValidationError},
    validation::{validate_id, validate_line, validate_note},
    Money, NewTreatmentLine, TreatmentLine, TreatmentLinePatch,
};

// =============================================================================
// Errors & Results
// =============================================================================

/// Errors surfaced by the ledger coordinator.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Domain failure: unknown treatment, missing line.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A single-line request broke billing rules. Carries *every*
    /// violation found, not just the first.
    #[error("treatment line failed validation with {} problem(s)", .0.len())]
    Invalid(Vec<ValidationError>),

    /// A bulk submission had rejected requests, reported by original index.
    #[error("{} of the submitted lines were rejected", .0.len())]
    Rejected(Vec<RejectedLine>),

    /// Write-phase or infrastructure failure. The enclosing transaction
    /// was rolled back; the cause is preserved here.
    #[error(transparent)]
    Db(#[from] DbError),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Outcome of a bulk create: strictly all-or-nothing.
///
/// `rejected` non-empty implies `committed` is empty: rejections are found
/// before any write begins, and a write-phase failure surfaces as
/// `Err(LedgerError::Db)` instead.
#[derive(Debug)]
pub struct BulkCreateOutcome {
    /// The lines written, in the order they were submitted.
    pub committed: Vec<TreatmentLine>,
    /// Per-index rejections; empty when the batch committed.
    pub rejected: Vec<RejectedLine>,
}

// =============================================================================
// Post-Commit Notification
// =============================================================================

/// A ledger mutation that reached COMMIT.
///
/// Emitted strictly *after* a successful commit, so a listener can never
/// observe an event for state that was rolled back. Instrumentation only:
/// correctness never depends on a hook being installed.
#[derive(Debug, Clone, serde::Serialize)]
pub enum LedgerEvent {
    LineCreated { line_id: String, visit_id: String },
    LineUpdated { line_id: String, visit_id: String },
    LineDeleted { line_id: String },
    BulkCreated { count: usize },
    BulkDeleted { affected: u64 },
    VisitReplaced { visit_id: String, count: usize },
}

/// Optional hook invoked after each successful commit.
pub type CommitHook = Arc<dyn Fn(&LedgerEvent) + Send + Sync>;

// =============================================================================
// Vetting
// =============================================================================

/// Result of vetting one line-creation request before any write.
enum Vetted {
    /// Request passed; amounts derived and ready to persist.
    Pass(LineAmounts),
    /// Request rejected; every problem found with it.
    Fail(Vec<CoreError>),
}

// =============================================================================
// Coordinator
// =============================================================================

/// The ledger coordinator.
///
/// Generic over the catalog seam so tests can drive it with a double; the
/// production wiring (`Database::ledger()`) uses the real
/// `TreatmentRepository`.
pub struct Ledger<C: TreatmentCatalog> {
    pool: SqlitePool,
    catalog: C,
    on_commit: Option<CommitHook>,
}

impl<C: TreatmentCatalog> Ledger<C> {
    /// Creates a new ledger coordinator.
    pub fn new(pool: SqlitePool, catalog: C) -> Self {
        Ledger {
            pool,
            catalog,
            on_commit: None,
        }
    }

    /// Installs a post-commit notification hook.
    pub fn with_commit_hook(mut self, hook: CommitHook) -> Self {
        self.on_commit = Some(hook);
        self
    }

    // -------------------------------------------------------------------------
    // Single-line operations
    // -------------------------------------------------------------------------

    /// Attaches one treatment to a visit.
    ///
    /// Pipeline: existence check → validate → compute → persist. Subtotal
    /// and total are derived here, never read from the request.
    pub async fn create_line(&self, req: &NewTreatmentLine) -> LedgerResult<TreatmentLine> {
        let amounts = match self.vet(req).await? {
            Vetted::Pass(amounts) => amounts,
            Vetted::Fail(errors) => return Err(fold_rejection(errors)),
        };

        let line = build_line(req, amounts, Utc::now());

        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        insert_row(&mut conn, &line).await?;

        debug!(id = %line.id, visit_id = %line.visit_id, total = %line.total(), "Treatment line created");
        self.notify(LedgerEvent::LineCreated {
            line_id: line.id.clone(),
            visit_id: line.visit_id.clone(),
        });

        Ok(line)
    }

    /// Applies a partial update to a line.
    ///
    /// Absent fields fall back to the persisted row before validation runs,
    /// then subtotal/total are recomputed from the merged values. A patch
    /// that changes `treatment_id` re-runs the existence check.
    pub async fn update_line(
        &self,
        id: &str,
        patch: &TreatmentLinePatch,
    ) -> LedgerResult<TreatmentLine> {
        // The pooled connection must not be held across the catalog
        // existence check below: that check needs its own connection from
        // the same pool (which may have exactly one, as in-memory does).
        let existing = {
            let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
            fetch_active(&mut conn, id).await?
        }
        .ok_or_else(|| CoreError::LineNotFound(id.to_string()))?;

        if patch.is_empty() {
            return Ok(existing);
        }

        // Referential gate, only when the reference actually changes.
        if let Some(treatment_id) = &patch.treatment_id {
            if *treatment_id != existing.treatment_id {
                validate_id(treatment_id, "treatment_id")
                    .map_err(|e| LedgerError::Invalid(vec![e]))?;
                if !self.catalog.exists(treatment_id).await? {
                    return Err(CoreError::TreatmentNotFound(treatment_id.clone()).into());
                }
            }
        }

        // Merge patch over the stored row.
        let quantity = patch.quantity.unwrap_or(existing.quantity);
        let unit_price =
            Money::from_cents(patch.unit_price_cents.unwrap_or(existing.unit_price_cents));
        let discount = Money::from_cents(patch.discount_cents.unwrap_or(existing.discount_cents));
        // Tri-state note: absent keeps the stored note, Some(None) clears.
        let note = match &patch.note {
            Some(change) => change.clone(),
            None => existing.note.clone(),
        };

        let mut errors = validate_line(quantity, unit_price, discount)
            .err()
            .unwrap_or_default();
        if let Err(e) = validate_note(note.as_deref()) {
            errors.push(e);
        }
        if !errors.is_empty() {
            return Err(LedgerError::Invalid(errors));
        }

        let amounts = compute_line(quantity, unit_price, discount)
            .map_err(|e| LedgerError::Invalid(vec![e]))?;

        let updated = TreatmentLine {
            treatment_id: patch
                .treatment_id
                .clone()
                .unwrap_or_else(|| existing.treatment_id.clone()),
            quantity,
            unit_price_cents: unit_price.cents(),
            discount_cents: discount.cents(),
            subtotal_cents: amounts.subtotal.cents(),
            total_cents: amounts.total.cents(),
            note,
            updated_at: Utc::now(),
            ..existing
        };

        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;
        if !update_row(&mut conn, &updated).await? {
            // Row vanished between fetch and write (concurrent delete).
            return Err(CoreError::LineNotFound(id.to_string()).into());
        }

        debug!(id = %updated.id, total = %updated.total(), "Treatment line updated");
        self.notify(LedgerEvent::LineUpdated {
            line_id: updated.id.clone(),
            visit_id: updated.visit_id.clone(),
        });

        Ok(updated)
    }

    /// Soft-deletes one line. The row is retained for audit but excluded
    /// from all subsequent reads and aggregates.
    pub async fn soft_delete_line(&self, id: &str) -> LedgerResult<()> {
        let mut conn = self.pool.acquire().await.map_err(DbError::from)?;

        if !mark_deleted(&mut conn, id, Utc::now()).await? {
            return Err(CoreError::LineNotFound(id.to_string()).into());
        }

        debug!(id = %id, "Treatment line soft-deleted");
        self.notify(LedgerEvent::LineDeleted {
            line_id: id.to_string(),
        });

        Ok(())
    }

    /// Sums the live line totals of a visit. Empty visits sum to zero.
    pub async fn sum_totals_for_visit(&self, visit_id: &str) -> LedgerResult<Money> {
        let total = TreatmentLineRepository::new(self.pool.clone())
            .sum_totals_for_visit(visit_id)
            .await?;
        Ok(total)
    }

    // -------------------------------------------------------------------------
    // Bulk operations
    // -------------------------------------------------------------------------

    /// Creates many lines atomically, possibly for different visits.
    ///
    /// Every request is vetted before anything is written. A single
    /// rejection aborts the whole batch with zero rows written and the
    /// index and reasons of every failing request. Only a fully clean
    /// batch enters the write phase, and a write-phase failure (e.g. a
    /// referenced treatment vanishing concurrently) rolls the entire
    /// batch back: partial success is disallowed by design.
    pub async fn bulk_create_lines(
        &self,
        requests: &[NewTreatmentLine],
    ) -> LedgerResult<BulkCreateOutcome> {
        // Phase 1: vet everything, write nothing. Requests are vetted in
        // the order supplied; rejections keep their original index.
        let mut prepared = Vec::with_capacity(requests.len());
        let mut rejected = Vec::new();
        let now = Utc::now();

        for (index, req) in requests.iter().enumerate() {
            match self.vet(req).await? {
                Vetted::Pass(amounts) => prepared.push(build_line(req, amounts, now)),
                Vetted::Fail(errors) => rejected.push(RejectedLine::new(index, errors)),
            }
        }

        if !rejected.is_empty() {
            debug!(
                submitted = requests.len(),
                rejected = rejected.len(),
                "Bulk create aborted before write phase"
            );
            return Ok(BulkCreateOutcome {
                committed: Vec::new(),
                rejected,
            });
        }

        // Phase 2: one transaction, rows written in submitted order.
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        for line in &prepared {
            if let Err(e) = insert_row(&mut tx, line).await {
                rollback(tx, "bulk create").await;
                return Err(e.into());
            }
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(count = prepared.len(), "Bulk create committed");
        self.notify(LedgerEvent::BulkCreated {
            count: prepared.len(),
        });

        Ok(BulkCreateOutcome {
            committed: prepared,
            rejected: Vec::new(),
        })
    }

    /// Soft-deletes a set of lines atomically.
    ///
    /// Ids that do not exist or are already deleted are not errors; they
    /// simply do not count toward the affected total.
    pub async fn bulk_soft_delete_lines(&self, ids: &[String]) -> LedgerResult<u64> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let mut affected: u64 = 0;
        for id in ids {
            match mark_deleted(&mut tx, id, now).await {
                Ok(true) => affected += 1,
                Ok(false) => {} // missing or already deleted
                Err(e) => {
                    rollback(tx, "bulk soft-delete").await;
                    return Err(e.into());
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(requested = ids.len(), affected, "Bulk soft-delete committed");
        self.notify(LedgerEvent::BulkDeleted { affected });

        Ok(affected)
    }

    /// Re-specifies a visit's entire treatment set as one atomic unit:
    /// soft-deletes every existing line, inserts the fresh set.
    ///
    /// An empty `requests` list is legal and leaves the visit with zero
    /// active lines. If any insert fails, the whole operation (including
    /// the prior deletes) rolls back, leaving the original lines intact.
    pub async fn replace_lines_for_visit(
        &self,
        visit_id: &str,
        requests: &[NewTreatmentLine],
    ) -> LedgerResult<Vec<TreatmentLine>> {
        validate_id(visit_id, "visit_id").map_err(|e| LedgerError::Invalid(vec![e]))?;

        // Vet the replacement set before touching anything.
        let mut prepared = Vec::with_capacity(requests.len());
        let mut rejected = Vec::new();
        let now = Utc::now();

        for (index, req) in requests.iter().enumerate() {
            let mut errors = Vec::new();

            // Each request must target the visit being replaced.
            if req.visit_id != visit_id {
                errors.push(CoreError::Validation(ValidationError::InvalidFormat {
                    field: "visit_id".to_string(),
                    reason: "does not match the visit being replaced".to_string(),
                }));
            }

            match self.vet(req).await? {
                Vetted::Pass(amounts) if errors.is_empty() => {
                    prepared.push(build_line(req, amounts, now));
                }
                Vetted::Pass(_) => rejected.push(RejectedLine::new(index, errors)),
                Vetted::Fail(vet_errors) => {
                    errors.extend(vet_errors);
                    rejected.push(RejectedLine::new(index, errors));
                }
            }
        }

        if !rejected.is_empty() {
            return Err(LedgerError::Rejected(rejected));
        }

        // Delete + insert under one transaction.
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        let deleted = match mark_deleted_for_visit(&mut tx, visit_id, now).await {
            Ok(n) => n,
            Err(e) => {
                rollback(tx, "replace lines").await;
                return Err(e.into());
            }
        };

        for line in &prepared {
            if let Err(e) = insert_row(&mut tx, line).await {
                rollback(tx, "replace lines").await;
                return Err(e.into());
            }
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(
            visit_id = %visit_id,
            deleted,
            inserted = prepared.len(),
            "Visit line set replaced"
        );
        self.notify(LedgerEvent::VisitReplaced {
            visit_id: visit_id.to_string(),
            count: prepared.len(),
        });

        Ok(prepared)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Vets one creation request without writing: id formats, treatment
    /// existence, billing rules, note length (collecting every problem),
    /// then derives the amounts.
    ///
    /// A `DbError` from the existence check is infrastructure failure, not
    /// a rejection, and propagates as `Err`.
    async fn vet(&self, req: &NewTreatmentLine) -> DbResult<Vetted> {
        let mut errors: Vec<CoreError> = Vec::new();

        if let Err(e) = validate_id(&req.visit_id, "visit_id") {
            errors.push(e.into());
        }

        match validate_id(&req.treatment_id, "treatment_id") {
            Err(e) => errors.push(e.into()),
            Ok(()) => {
                if !self.catalog.exists(&req.treatment_id).await? {
                    errors.push(CoreError::TreatmentNotFound(req.treatment_id.clone()));
                }
            }
        }

        let unit_price = Money::from_cents(req.unit_price_cents);
        let discount = Money::from_cents(req.discount_cents);

        if let Err(rule_errors) = validate_line(req.quantity, unit_price, discount) {
            errors.extend(rule_errors.into_iter().map(CoreError::from));
        }

        if let Err(e) = validate_note(req.note.as_deref()) {
            errors.push(e.into());
        }

        if !errors.is_empty() {
            return Ok(Vetted::Fail(errors));
        }

        match compute_line(req.quantity, unit_price, discount) {
            Ok(amounts) => Ok(Vetted::Pass(amounts)),
            Err(e) => Ok(Vetted::Fail(vec![e.into()])),
        }
    }

    /// Emits a post-commit event: debug log always, hook when installed.
    fn notify(&self, event: LedgerEvent) {
        debug!(event = ?event, "Ledger commit event");
        if let Some(hook) = &self.on_commit {
            hook(&event);
        }
    }
}

/// Folds one request's vetting failures into the single-line error
/// surface. An unknown treatment dominates (the reference must be fixed
/// before rule-level feedback means anything); otherwise every rule
/// violation is reported together.
fn fold_rejection(mut errors: Vec<CoreError>) -> LedgerError {
    if let Some(pos) = errors
        .iter()
        .position(|e| matches!(e, CoreError::TreatmentNotFound(_)))
    {
        return LedgerError::Core(errors.swap_remove(pos));
    }

    let violations: Vec<ValidationError> = errors
        .into_iter()
        .filter_map(|e| match e {
            CoreError::Validation(v) => Some(v),
            _ => None,
        })
        .collect();

    LedgerError::Invalid(violations)
}

/// Builds the full row for a vetted request. Amounts come from the
/// calculator, never from the request.
fn build_line(req: &NewTreatmentLine, amounts: LineAmounts, now: DateTime<Utc>) -> TreatmentLine {
    TreatmentLine {
        id: generate_line_id(),
        visit_id: req.visit_id.clone(),
        treatment_id: req.treatment_id.clone(),
        quantity: req.quantity,
        unit_price_cents: req.unit_price_cents,
        discount_cents: req.discount_cents,
        subtotal_cents: amounts.subtotal.cents(),
        total_cents: amounts.total.cents(),
        note: req.note.clone(),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

/// Explicitly rolls back a transaction, logging (not masking) a rollback
/// failure. The original write error is what the caller sees.
async fn rollback(tx: sqlx::Transaction<'_, sqlx::Sqlite>, operation: &str) {
    if let Err(e) = tx.rollback().await {
        warn!(operation, error = %e, "rollback after failed write also failed");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use uuid::Uuid;

    struct Fixture {
        db: Database,
        visit_id: String,
        filling_id: String,
        scaling_id: String,
    }

    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let visit = db.visits().create("patient-1", Utc::now(), None).await.unwrap();
        let filling = db
            .catalog()
            .create_treatment(None, "Composite filling", None, Money::from_cents(100_000))
            .await
            .unwrap();
        let scaling = db
            .catalog()
            .create_treatment(None, "Scaling", None, Money::from_cents(50_000))
            .await
            .unwrap();

        Fixture {
            db,
            visit_id: visit.id,
            filling_id: filling.id,
            scaling_id: scaling.id,
        }
    }

    fn request(
        visit_id: &str,
        treatment_id: &str,
        quantity: i64,
        unit_price_cents: i64,
        discount_cents: i64,
    ) -> NewTreatmentLine {
        NewTreatmentLine {
            visit_id: visit_id.to_string(),
            treatment_id: treatment_id.to_string(),
            quantity,
            unit_price_cents,
            discount_cents,
            note: None,
        }
    }

    /// Catalog double that vouches for any id, so write-phase FK failures
    /// can be provoked deliberately.
    struct VouchingCatalog;

    #[async_trait]
    impl TreatmentCatalog for VouchingCatalog {
        async fn exists(&self, _treatment_id: &str) -> DbResult<bool> {
            Ok(true)
        }
    }

    // -------------------------------------------------------------------------
    // Single-line operations
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_create_then_reject_over_discount_update() {
        let f = fixture().await;
        let ledger = f.db.ledger();

        // quantity=2, unit 100000, discount 20000
        let line = ledger
            .create_line(&request(&f.visit_id, &f.filling_id, 2, 100_000, 20_000))
            .await
            .unwrap();

        assert_eq!(line.subtotal_cents, 200_000);
        assert_eq!(line.total_cents, 180_000);

        // discount > subtotal must be rejected...
        let patch = TreatmentLinePatch {
            discount_cents: Some(250_000),
            ..Default::default()
        };
        let err = ledger.update_line(&line.id, &patch).await.unwrap_err();
        assert!(matches!(err, LedgerError::Invalid(_)));

        // ...and the stored line is unchanged from the first write.
        let stored = f.db.lines().get_by_id(&line.id).await.unwrap().unwrap();
        assert_eq!(stored.subtotal_cents, 200_000);
        assert_eq!(stored.total_cents, 180_000);
        assert_eq!(stored.discount_cents, 20_000);
    }

    #[tokio::test]
    async fn test_create_recomputes_amounts_server_side() {
        let f = fixture().await;
        let line = f
            .db
            .ledger()
            .create_line(&request(&f.visit_id, &f.scaling_id, 3, 50_000, 0))
            .await
            .unwrap();

        assert_eq!(line.subtotal_cents, 150_000);
        assert_eq!(line.total_cents, 150_000);
        assert_eq!(line.subtotal_cents, line.quantity * line.unit_price_cents);
    }

    #[tokio::test]
    async fn test_create_unknown_treatment_rejected_before_write() {
        let f = fixture().await;
        let bogus = Uuid::new_v4().to_string();

        let err = f
            .db
            .ledger()
            .create_line(&request(&f.visit_id, &bogus, 1, 1000, 0))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            LedgerError::Core(CoreError::TreatmentNotFound(_))
        ));
        assert_eq!(f.db.lines().count_for_visit(&f.visit_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_retired_treatment_rejected() {
        let f = fixture().await;
        f.db.catalog().soft_delete(&f.scaling_id).await.unwrap();

        let err = f
            .db
            .ledger()
            .create_line(&request(&f.visit_id, &f.scaling_id, 1, 50_000, 0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::TreatmentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_partial_update_validates_against_stored_fields() {
        let f = fixture().await;
        let ledger = f.db.ledger();

        let line = ledger
            .create_line(&request(&f.visit_id, &f.filling_id, 2, 100_000, 0))
            .await
            .unwrap();

        // Patch only the discount; stored quantity/price define the bound.
        let patch = TreatmentLinePatch {
            discount_cents: Some(200_000), // == stored subtotal, boundary accepted
            ..Default::default()
        };
        let updated = ledger.update_line(&line.id, &patch).await.unwrap();
        assert_eq!(updated.total_cents, 0);
        assert_eq!(updated.quantity, 2);
        assert_eq!(updated.unit_price_cents, 100_000);

        // One cent past the boundary is rejected.
        let patch = TreatmentLinePatch {
            discount_cents: Some(200_001),
            ..Default::default()
        };
        assert!(matches!(
            ledger.update_line(&line.id, &patch).await.unwrap_err(),
            LedgerError::Invalid(_)
        ));
    }

    #[tokio::test]
    async fn test_update_quantity_recomputes_and_revalidates_discount() {
        let f = fixture().await;
        let ledger = f.db.ledger();

        let line = ledger
            .create_line(&request(&f.visit_id, &f.filling_id, 2, 100_000, 150_000))
            .await
            .unwrap();
        assert_eq!(line.total_cents, 50_000);

        // Dropping quantity to 1 would make subtotal 100000 < discount 150000.
        let patch = TreatmentLinePatch {
            quantity: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            ledger.update_line(&line.id, &patch).await.unwrap_err(),
            LedgerError::Invalid(_)
        ));
    }

    #[tokio::test]
    async fn test_create_invalid_input_reports_every_violation() {
        let f = fixture().await;

        // quantity 0, negative price, discount over the (zero) subtotal
        let err = f
            .db
            .ledger()
            .create_line(&request(&f.visit_id, &f.scaling_id, 0, -500, 100))
            .await
            .unwrap_err();

        match err {
            LedgerError::Invalid(violations) => assert_eq!(violations.len(), 3),
            other => panic!("expected validation rejection, got {other:?}"),
        }
        assert_eq!(f.db.lines().count_for_visit(&f.visit_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_unknown_treatment_dominates_rule_errors() {
        let f = fixture().await;
        let bogus = Uuid::new_v4().to_string();

        // Bad quantity AND unknown treatment: the reference problem wins.
        let err = f
            .db
            .ledger()
            .create_line(&request(&f.visit_id, &bogus, 0, 1000, 0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Core(CoreError::TreatmentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_can_change_treatment_reference() {
        let f = fixture().await;
        let ledger = f.db.ledger();

        let line = ledger
            .create_line(&request(&f.visit_id, &f.filling_id, 1, 100_000, 0))
            .await
            .unwrap();

        // Re-point at another live treatment; amounts recompute from the
        // merged fields.
        let patch = TreatmentLinePatch {
            treatment_id: Some(f.scaling_id.clone()),
            unit_price_cents: Some(50_000),
            ..Default::default()
        };
        let updated = ledger.update_line(&line.id, &patch).await.unwrap();
        assert_eq!(updated.treatment_id, f.scaling_id);
        assert_eq!(updated.total_cents, 50_000);

        let stored = f.db.lines().get_by_id(&line.id).await.unwrap().unwrap();
        assert_eq!(stored.treatment_id, f.scaling_id);

        // Re-pointing at an unknown treatment is refused.
        let patch = TreatmentLinePatch {
            treatment_id: Some(Uuid::new_v4().to_string()),
            ..Default::default()
        };
        assert!(matches!(
            ledger.update_line(&line.id, &patch).await.unwrap_err(),
            LedgerError::Core(CoreError::TreatmentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_note_kept_and_cleared() {
        let f = fixture().await;
        let ledger = f.db.ledger();

        let mut req = request(&f.visit_id, &f.filling_id, 1, 100_000, 0);
        req.note = Some("upper left molar".to_string());
        let line = ledger.create_line(&req).await.unwrap();

        // Absent note field leaves the stored note alone.
        let patch = TreatmentLinePatch {
            quantity: Some(2),
            ..Default::default()
        };
        let updated = ledger.update_line(&line.id, &patch).await.unwrap();
        assert_eq!(updated.note.as_deref(), Some("upper left molar"));

        // An explicit clear removes it.
        let patch = TreatmentLinePatch {
            note: Some(None),
            ..Default::default()
        };
        let updated = ledger.update_line(&line.id, &patch).await.unwrap();
        assert!(updated.note.is_none());

        let stored = f.db.lines().get_by_id(&line.id).await.unwrap().unwrap();
        assert!(stored.note.is_none());
    }

    #[tokio::test]
    async fn test_update_missing_line() {
        let f = fixture().await;
        let err = f
            .db
            .ledger()
            .update_line("no-such-line", &TreatmentLinePatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Core(CoreError::LineNotFound(_))));
    }

    #[tokio::test]
    async fn test_soft_delete_excludes_from_reads_and_sums() {
        let f = fixture().await;
        let ledger = f.db.ledger();

        let keep = ledger
            .create_line(&request(&f.visit_id, &f.filling_id, 1, 100_000, 0))
            .await
            .unwrap();
        let drop = ledger
            .create_line(&request(&f.visit_id, &f.scaling_id, 1, 50_000, 5_000))
            .await
            .unwrap();

        let before = ledger.sum_totals_for_visit(&f.visit_id).await.unwrap();
        assert_eq!(before, Money::from_cents(145_000));

        ledger.soft_delete_line(&drop.id).await.unwrap();

        // Invisible to reads...
        assert!(f.db.lines().get_by_id(&drop.id).await.unwrap().is_none());
        let listed = f.db.lines().list_for_visit(&f.visit_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, keep.id);

        // ...and the sum drops by exactly the deleted line's total.
        let after = ledger.sum_totals_for_visit(&f.visit_id).await.unwrap();
        assert_eq!(before - after, drop.total());

        // Deleting again is LineNotFound: already invisible.
        assert!(matches!(
            ledger.soft_delete_line(&drop.id).await.unwrap_err(),
            LedgerError::Core(CoreError::LineNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sum_empty_visit_is_zero() {
        let f = fixture().await;
        assert_eq!(
            f.db.ledger().sum_totals_for_visit(&f.visit_id).await.unwrap(),
            Money::zero()
        );
    }

    // -------------------------------------------------------------------------
    // Bulk create
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_bulk_create_commits_all_in_order() {
        let f = fixture().await;
        let requests = vec![
            request(&f.visit_id, &f.filling_id, 1, 100_000, 0),
            request(&f.visit_id, &f.scaling_id, 2, 50_000, 10_000),
            request(&f.visit_id, &f.filling_id, 1, 100_000, 100_000),
        ];

        let outcome = f.db.ledger().bulk_create_lines(&requests).await.unwrap();

        assert!(outcome.rejected.is_empty());
        assert_eq!(outcome.committed.len(), 3);
        // Written in submitted order.
        assert_eq!(outcome.committed[1].quantity, 2);
        assert_eq!(outcome.committed[2].total_cents, 0);

        assert_eq!(f.db.lines().count_for_visit(&f.visit_id).await.unwrap(), 3);
        assert_eq!(
            f.db.ledger().sum_totals_for_visit(&f.visit_id).await.unwrap(),
            Money::from_cents(100_000 + 90_000)
        );
    }

    #[tokio::test]
    async fn test_bulk_create_one_invalid_aborts_entire_batch() {
        let f = fixture().await;
        let requests = vec![
            request(&f.visit_id, &f.filling_id, 1, 100_000, 0),
            request(&f.visit_id, &f.scaling_id, 1, 50_000, 0),
            request(&f.visit_id, &f.filling_id, 0, 100_000, 0), // quantity 0: invalid
            request(&f.visit_id, &f.scaling_id, 1, 50_000, 0),
            request(&f.visit_id, &f.filling_id, 1, 100_000, 0),
        ];

        let outcome = f.db.ledger().bulk_create_lines(&requests).await.unwrap();

        // Non-empty rejections imply an empty commit, and the store holds
        // none of the five.
        assert!(outcome.committed.is_empty());
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].index, 2);
        assert!(outcome.rejected[0].errors.iter().any(|e| matches!(
            e,
            CoreError::Validation(ValidationError::InvalidQuantity { .. })
        )));
        assert_eq!(f.db.lines().count_for_visit(&f.visit_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bulk_create_reports_every_rejection_with_index() {
        let f = fixture().await;
        let bogus = Uuid::new_v4().to_string();
        let requests = vec![
            request(&f.visit_id, &f.filling_id, 1, 100_000, 0),
            request(&f.visit_id, &bogus, 1, 100_000, 0), // unknown treatment
            request(&f.visit_id, &f.scaling_id, -2, -100, 999_999), // three rule violations
        ];

        let outcome = f.db.ledger().bulk_create_lines(&requests).await.unwrap();

        assert!(outcome.committed.is_empty());
        assert_eq!(outcome.rejected.len(), 2);
        assert_eq!(outcome.rejected[0].index, 1);
        assert!(matches!(
            outcome.rejected[0].errors[0],
            CoreError::TreatmentNotFound(_)
        ));
        assert_eq!(outcome.rejected[1].index, 2);
        assert_eq!(outcome.rejected[1].errors.len(), 3);
    }

    #[tokio::test]
    async fn test_bulk_create_write_failure_rolls_back_everything() {
        let f = fixture().await;

        // The vouching catalog lets a nonexistent treatment through vetting,
        // so the FOREIGN KEY constraint fires mid write phase (request #4).
        let ledger = Ledger::new(f.db.pool().clone(), VouchingCatalog);
        let phantom = Uuid::new_v4().to_string();
        let requests = vec![
            request(&f.visit_id, &f.filling_id, 1, 100_000, 0),
            request(&f.visit_id, &f.scaling_id, 1, 50_000, 0),
            request(&f.visit_id, &f.filling_id, 1, 100_000, 0),
            request(&f.visit_id, &phantom, 1, 25_000, 0),
            request(&f.visit_id, &f.scaling_id, 1, 50_000, 0),
        ];

        let err = ledger.bulk_create_lines(&requests).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Db(DbError::ForeignKeyViolation { .. })
        ));

        // Rows 1-3 were written inside the transaction and must be gone.
        assert_eq!(f.db.lines().count_for_visit(&f.visit_id).await.unwrap(), 0);
    }

    // -------------------------------------------------------------------------
    // Bulk soft-delete
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_bulk_soft_delete_counts_only_live_rows() {
        let f = fixture().await;
        let ledger = f.db.ledger();

        let a = ledger
            .create_line(&request(&f.visit_id, &f.filling_id, 1, 100_000, 0))
            .await
            .unwrap();
        let b = ledger
            .create_line(&request(&f.visit_id, &f.scaling_id, 1, 50_000, 0))
            .await
            .unwrap();
        ledger.soft_delete_line(&b.id).await.unwrap();

        let ids = vec![
            a.id.clone(),
            b.id.clone(),                // already deleted: not counted
            "no-such-line".to_string(),  // missing: not counted, not an error
        ];
        let affected = ledger.bulk_soft_delete_lines(&ids).await.unwrap();

        assert_eq!(affected, 1);
        assert_eq!(f.db.lines().count_for_visit(&f.visit_id).await.unwrap(), 0);
    }

    // -------------------------------------------------------------------------
    // Replace
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_replace_swaps_line_set_atomically() {
        let f = fixture().await;
        let ledger = f.db.ledger();

        for _ in 0..3 {
            ledger
                .create_line(&request(&f.visit_id, &f.filling_id, 1, 100_000, 0))
                .await
                .unwrap();
        }

        let replacement = vec![
            request(&f.visit_id, &f.scaling_id, 2, 50_000, 0),
            request(&f.visit_id, &f.filling_id, 1, 100_000, 20_000),
        ];
        let lines = ledger
            .replace_lines_for_visit(&f.visit_id, &replacement)
            .await
            .unwrap();

        assert_eq!(lines.len(), 2);
        assert_eq!(f.db.lines().count_for_visit(&f.visit_id).await.unwrap(), 2);
        assert_eq!(
            ledger.sum_totals_for_visit(&f.visit_id).await.unwrap(),
            Money::from_cents(100_000 + 80_000)
        );
    }

    #[tokio::test]
    async fn test_replace_with_empty_list_clears_visit() {
        let f = fixture().await;
        let ledger = f.db.ledger();

        for _ in 0..3 {
            ledger
                .create_line(&request(&f.visit_id, &f.filling_id, 1, 100_000, 0))
                .await
                .unwrap();
        }

        let lines = ledger
            .replace_lines_for_visit(&f.visit_id, &[])
            .await
            .unwrap();

        assert!(lines.is_empty());
        assert_eq!(f.db.lines().count_for_visit(&f.visit_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replace_rejection_leaves_originals_untouched() {
        let f = fixture().await;
        let ledger = f.db.ledger();

        let original = ledger
            .create_line(&request(&f.visit_id, &f.filling_id, 1, 100_000, 0))
            .await
            .unwrap();

        let replacement = vec![
            request(&f.visit_id, &f.scaling_id, 1, 50_000, 0),
            request(&f.visit_id, &f.scaling_id, 1, 50_000, 60_000), // over-discount
        ];
        let err = ledger
            .replace_lines_for_visit(&f.visit_id, &replacement)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));

        // Original line still live and alone.
        let listed = f.db.lines().list_for_visit(&f.visit_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, original.id);
    }

    #[tokio::test]
    async fn test_replace_write_failure_restores_prior_lines() {
        let f = fixture().await;
        let real_ledger = f.db.ledger();

        let original = real_ledger
            .create_line(&request(&f.visit_id, &f.filling_id, 1, 100_000, 0))
            .await
            .unwrap();

        // Vouching catalog lets a phantom treatment into the write phase;
        // the insert fails and the deletes must roll back with it.
        let ledger = Ledger::new(f.db.pool().clone(), VouchingCatalog);
        let phantom = Uuid::new_v4().to_string();
        let replacement = vec![request(&f.visit_id, &phantom, 1, 25_000, 0)];

        let err = ledger
            .replace_lines_for_visit(&f.visit_id, &replacement)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Db(_)));

        // The prior line is intact and undeleted.
        let stored = f.db.lines().get_by_id(&original.id).await.unwrap();
        assert!(stored.is_some());
        assert_eq!(f.db.lines().count_for_visit(&f.visit_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replace_rejects_mismatched_visit_reference() {
        let f = fixture().await;
        let other_visit = f
            .db
            .visits()
            .create("patient-2", Utc::now(), None)
            .await
            .unwrap();

        let replacement = vec![request(&other_visit.id, &f.filling_id, 1, 100_000, 0)];
        let err = f
            .db
            .ledger()
            .replace_lines_for_visit(&f.visit_id, &replacement)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));
    }

    // -------------------------------------------------------------------------
    // Post-commit notification
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_commit_hook_fires_only_after_success() {
        let f = fixture().await;
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let ledger = f
            .db
            .ledger()
            .with_commit_hook(Arc::new(move |event: &LedgerEvent| {
                sink.lock().unwrap().push(format!("{event:?}"));
            }));

        ledger
            .create_line(&request(&f.visit_id, &f.filling_id, 1, 100_000, 0))
            .await
            .unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);

        // A rejected batch commits nothing and must notify nothing.
        let bad = vec![request(&f.visit_id, &f.filling_id, 0, 100_000, 0)];
        let outcome = ledger.bulk_create_lines(&bad).await.unwrap();
        assert!(outcome.committed.is_empty());
        assert_eq!(seen.lock().unwrap().len(), 1);

        let good = vec![request(&f.visit_id, &f.scaling_id, 1, 50_000, 0)];
        ledger.bulk_create_lines(&good).await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert!(seen.lock().unwrap()[1].contains("BulkCreated"));
    }
}
