//! # Visit Repository
//!
//! Minimal database operations for medical records (visits). The ledger
//! only needs visits to exist so treatment lines have an owner; visit
//! scheduling and patient identity live in other subsystems.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use dentio_core::MedicalRecord;

/// Repository for medical record (visit) rows.
#[derive(Debug, Clone)]
pub struct VisitRepository {
    pool: SqlitePool,
}

impl VisitRepository {
    /// Creates a new VisitRepository.
    pub fn new(pool: SqlitePool) -> Self {
        VisitRepository { pool }
    }

    /// Creates a new visit.
    pub async fn create(
        &self,
        patient_id: &str,
        visit_date: DateTime<Utc>,
        note: Option<&str>,
    ) -> DbResult<MedicalRecord> {
        let now = Utc::now();
        let record = MedicalRecord {
            id: Uuid::new_v4().to_string(),
            patient_id: patient_id.to_string(),
            visit_date,
            note: note.map(str::to_string),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        debug!(id = %record.id, patient_id = %record.patient_id, "Creating medical record");

        sqlx::query(
            r#"
            INSERT INTO medical_records (
                id, patient_id, visit_date, note, created_at, updated_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)
            "#,
        )
        .bind(&record.id)
        .bind(&record.patient_id)
        .bind(record.visit_date)
        .bind(&record.note)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    /// Gets a live visit by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<MedicalRecord>> {
        let record = sqlx::query_as::<_, MedicalRecord>(
            r#"
            SELECT id, patient_id, visit_date, note, created_at, updated_at, deleted_at
            FROM medical_records
            WHERE id = ?1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
