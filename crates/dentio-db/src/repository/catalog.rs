//! # Treatment Catalog Repository
//!
//! Database operations for the treatment catalog: categories and the
//! treatments that billing lines reference.
//!
//! The ledger consumes exactly one capability from this module at write
//! time: [`TreatmentCatalog::exists`]. Everything else is catalog upkeep.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use dentio_core::{Money, Treatment, TreatmentCategory};

// =============================================================================
// Existence-Check Seam
// =============================================================================

/// The one capability the ledger needs from the catalog subsystem.
///
/// Called once per create and once per update-that-changes-treatment_id,
/// before validation and calculation proceed. The ledger does not cache or
/// batch these checks: a bulk operation with N distinct references performs
/// up to N independent calls before committing any writes.
///
/// A trait seam (rather than a concrete repository) lets tests drive the
/// coordinator with a catalog double, e.g. one that claims a treatment
/// exists so a write-phase failure can be provoked.
#[async_trait]
pub trait TreatmentCatalog: Send + Sync {
    /// Whether the treatment id refers to a live (non-retired) catalog row.
    async fn exists(&self, treatment_id: &str) -> DbResult<bool>;
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for treatment catalog operations.
#[derive(Debug, Clone)]
pub struct TreatmentRepository {
    pool: SqlitePool,
}

impl TreatmentRepository {
    /// Creates a new TreatmentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TreatmentRepository { pool }
    }

    /// Creates a new treatment category.
    pub async fn create_category(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> DbResult<TreatmentCategory> {
        let now = Utc::now();
        let category = TreatmentCategory {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        debug!(id = %category.id, name = %category.name, "Creating treatment category");

        sqlx::query(
            r#"
            INSERT INTO treatment_categories (
                id, name, description, created_at, updated_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, NULL)
            "#,
        )
        .bind(&category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.created_at)
        .bind(category.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(category)
    }

    /// Creates a new catalog treatment.
    pub async fn create_treatment(
        &self,
        category_id: Option<&str>,
        name: &str,
        description: Option<&str>,
        price: Money,
    ) -> DbResult<Treatment> {
        let now = Utc::now();
        let treatment = Treatment {
            id: Uuid::new_v4().to_string(),
            category_id: category_id.map(str::to_string),
            name: name.to_string(),
            description: description.map(str::to_string),
            price_cents: price.cents(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        debug!(id = %treatment.id, name = %treatment.name, "Creating treatment");

        sqlx::query(
            r#"
            INSERT INTO treatments (
                id, category_id, name, description, price_cents,
                created_at, updated_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL)
            "#,
        )
        .bind(&treatment.id)
        .bind(&treatment.category_id)
        .bind(&treatment.name)
        .bind(&treatment.description)
        .bind(treatment.price_cents)
        .bind(treatment.created_at)
        .bind(treatment.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(treatment)
    }

    /// Gets a live treatment by ID. Retired treatments are invisible here.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Treatment>> {
        let treatment = sqlx::query_as::<_, Treatment>(
            r#"
            SELECT id, category_id, name, description, price_cents,
                   created_at, updated_at, deleted_at
            FROM treatments
            WHERE id = ?1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(treatment)
    }

    /// Lists live treatments, newest first.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Treatment>> {
        let treatments = sqlx::query_as::<_, Treatment>(
            r#"
            SELECT id, category_id, name, description, price_cents,
                   created_at, updated_at, deleted_at
            FROM treatments
            WHERE deleted_at IS NULL
            ORDER BY created_at DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(treatments)
    }

    /// Retires a treatment (soft delete).
    ///
    /// Existing ledger lines keep referencing the row; only *new* lines are
    /// blocked, because the existence check filters retired treatments.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE treatments
            SET deleted_at = ?2, updated_at = ?2
            WHERE id = ?1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Treatment", id));
        }

        Ok(())
    }
}

#[async_trait]
impl TreatmentCatalog for TreatmentRepository {
    async fn exists(&self, treatment_id: &str) -> DbResult<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM treatments WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(treatment_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
