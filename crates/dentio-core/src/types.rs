//! # Domain Types
//!
//! Core domain types for the Dentio billing ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                │
//! │                                                                     │
//! │  ┌───────────────────┐   ┌───────────────┐   ┌──────────────────┐   │
//! │  │  MedicalRecord    │   │  Treatment    │   │ TreatmentCategory│   │
//! │  │  ───────────────  │   │  ───────────  │   │  ──────────────  │   │
//! │  │  id (UUID)        │   │  id (UUID)    │   │  id (UUID)       │   │
//! │  │  patient_id       │◄─┐│  category_id ─┼──►│  name            │   │
//! │  │  visit_date       │  ││  price_cents  │   └──────────────────┘   │
//! │  └───────────────────┘  │└───────┬───────┘                          │
//! │                         │        │ non-owning reference             │
//! │          owning         │        ▼                                  │
//! │          reference      │┌───────────────────────────────────────┐  │
//! │                         └┤           TreatmentLine               │  │
//! │                          │  visit_id, treatment_id, quantity,    │  │
//! │                          │  unit_price, discount, subtotal,      │  │
//! │                          │  total, deleted_at (soft delete)      │  │
//! │                          └───────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ownership Rules
//! A `TreatmentLine` is exclusively owned by its visit for lifecycle
//! purposes, but holds a *non-owning* reference to the catalog `Treatment`:
//! many lines may point at one treatment, and retiring a treatment never
//! cascades into the ledger: existence is checked at write time, not
//! cascaded afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::DEFAULT_LINE_QUANTITY;

// =============================================================================
// Treatment Category
// =============================================================================

/// A catalog grouping for treatments ("Preventive", "Restorative", ...).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TreatmentCategory {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name, unique within the catalog.
    pub name: String,

    /// Optional description.
    pub description: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    /// Non-null marks the category retired (soft delete).
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Treatment
// =============================================================================

/// A catalog treatment that can be attached to a visit.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Treatment {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Optional category this treatment belongs to.
    pub category_id: Option<String>,

    /// Display name shown when attaching a treatment.
    pub name: String,

    /// Optional description.
    pub description: Option<String>,

    /// Default price in cents. A line snapshots its own unit price, so a
    /// later catalog price change never rewrites history.
    pub price_cents: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    /// Non-null marks the treatment retired (soft delete). Retired
    /// treatments fail the existence check for new lines but keep their
    /// row so existing lines still resolve.
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Treatment {
    /// Returns the default price as Money.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

// =============================================================================
// Medical Record (Visit)
// =============================================================================

/// A patient visit. Treatment lines attach to exactly one visit.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct MedicalRecord {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Opaque reference to the patient. Patient identity management is a
    /// separate subsystem; the ledger never interprets this value.
    pub patient_id: String,

    /// When the visit took place.
    #[ts(as = "String")]
    pub visit_date: DateTime<Utc>,

    /// Free-text clinical note for the visit.
    pub note: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Treatment Line
// =============================================================================

/// A priced treatment attached to a visit: one row of the billing ledger.
///
/// ## Invariants (hold for every committed row)
/// - `quantity >= 1`
/// - `unit_price_cents >= 0`
/// - `0 <= discount_cents <= subtotal_cents`
/// - `subtotal_cents == quantity * unit_price_cents`
/// - `total_cents == subtotal_cents - discount_cents` (therefore `>= 0`)
///
/// `subtotal_cents` and `total_cents` are always derived server-side by the
/// calculator; they are never accepted from a caller as authoritative.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TreatmentLine {
    /// Unique identifier (UUID v4), immutable.
    pub id: String,

    /// Owning visit (medical record). Immutable after creation.
    pub visit_id: String,

    /// Non-owning reference to the catalog treatment. Checked for
    /// existence at write time.
    pub treatment_id: String,

    /// Positive integer count of the treatment performed.
    pub quantity: i64,

    /// Price per unit in cents, snapshotted when the line is written.
    pub unit_price_cents: i64,

    /// Absolute discount in cents applied to this line.
    pub discount_cents: i64,

    /// Derived: `quantity * unit_price_cents`.
    pub subtotal_cents: i64,

    /// Derived: `subtotal_cents - discount_cents`.
    pub total_cents: i64,

    /// Optional chairside note.
    pub note: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,

    /// Non-null marks the row logically deleted. Soft-deleted lines are
    /// excluded from all reads and aggregates; the row is retained for audit.
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TreatmentLine {
    /// Returns the unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Returns the discount as Money.
    #[inline]
    pub fn discount(&self) -> Money {
        Money::from_cents(self.discount_cents)
    }

    /// Returns the subtotal as Money.
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    /// Returns the line total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Whether the row is soft-deleted.
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Request to attach one treatment to a visit (single or bulk create).
///
/// `subtotal`/`total` are deliberately absent: the server derives them.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewTreatmentLine {
    /// Owning visit.
    pub visit_id: String,

    /// Catalog treatment to attach. Must exist (and not be retired).
    pub treatment_id: String,

    /// Defaults to 1 when omitted.
    #[serde(default = "default_quantity")]
    pub quantity: i64,

    /// Price per unit in cents.
    pub unit_price_cents: i64,

    /// Absolute discount in cents. Defaults to 0 when omitted.
    #[serde(default)]
    pub discount_cents: i64,

    /// Optional chairside note.
    #[serde(default)]
    pub note: Option<String>,
}

fn default_quantity() -> i64 {
    DEFAULT_LINE_QUANTITY
}

/// Partial update for an existing line.
///
/// Only fields present are validated and applied; absent fields fall back
/// to the persisted row before validation runs, so a patch carrying only a
/// new discount is still checked against the stored quantity and price.
/// `visit_id` is absent on purpose: a line never moves between visits.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TreatmentLinePatch {
    /// Re-point the line at a different catalog treatment.
    #[serde(default)]
    pub treatment_id: Option<String>,

    #[serde(default)]
    pub quantity: Option<i64>,

    #[serde(default)]
    pub unit_price_cents: Option<i64>,

    #[serde(default)]
    pub discount_cents: Option<i64>,

    /// Tri-state note change: an absent field leaves the note alone,
    /// an explicit `null` clears it, a string replaces it.
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    #[ts(as = "Option<String>")]
    pub note: Option<Option<String>>,
}

/// Keeps an explicit `null` distinguishable from an absent field: absent
/// stays `None` (via the serde default), `null` becomes `Some(None)`.
fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    serde::Deserialize::deserialize(de).map(Some)
}

impl TreatmentLinePatch {
    /// True when the patch carries no fields at all.
    pub fn is_empty(&self) -> bool {
        self.treatment_id.is_none()
            && self.quantity.is_none()
            && self.unit_price_cents.is_none()
            && self.discount_cents.is_none()
            && self.note.is_none()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_line_defaults_from_json() {
        // quantity and discount are optional on the wire
        let req: NewTreatmentLine = serde_json::from_str(
            r#"{
                "visit_id": "v1",
                "treatment_id": "t1",
                "unit_price_cents": 15000
            }"#,
        )
        .unwrap();

        assert_eq!(req.quantity, 1);
        assert_eq!(req.discount_cents, 0);
        assert!(req.note.is_none());
    }

    #[test]
    fn test_patch_note_is_tristate() {
        // Absent field: leave the note alone.
        let absent: TreatmentLinePatch = serde_json::from_str(r#"{"quantity": 2}"#).unwrap();
        assert!(absent.note.is_none());

        // Explicit null: clear the note.
        let cleared: TreatmentLinePatch = serde_json::from_str(r#"{"note": null}"#).unwrap();
        assert_eq!(cleared.note, Some(None));

        // String: replace the note.
        let replaced: TreatmentLinePatch = serde_json::from_str(r#"{"note": "crown prep"}"#).unwrap();
        assert_eq!(replaced.note, Some(Some("crown prep".to_string())));
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(TreatmentLinePatch::default().is_empty());

        let patch = TreatmentLinePatch {
            discount_cents: Some(500),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_line_money_accessors() {
        let now = Utc::now();
        let line = TreatmentLine {
            id: "l1".to_string(),
            visit_id: "v1".to_string(),
            treatment_id: "t1".to_string(),
            quantity: 2,
            unit_price_cents: 15000,
            discount_cents: 2000,
            subtotal_cents: 30000,
            total_cents: 28000,
            note: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        assert_eq!(line.subtotal(), Money::from_cents(30000));
        assert_eq!(line.total(), Money::from_cents(28000));
        assert!(!line.is_deleted());
    }
}
