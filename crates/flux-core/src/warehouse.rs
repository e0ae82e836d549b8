//! The `Warehouse` trait and the policies it is driven with.
//!
//! The trait is implemented by storage backends (e.g. `flux-store-sqlite`).
//! The pipeline depends on this abstraction, not on any concrete backend.
//! Calls are synchronous: the pipeline is a single-threaded batch job and
//! never has more than one statement in flight.

use std::ops::RangeInclusive;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{dimension::{Dimension, NewMember}, fact::FactRow, family::FactFamily};

/// Production columns maintained by the store itself, never copied from
/// staging.
pub const BOOKKEEPING_COLUMNS: [&str; 4] = ["id", "provisional", "created_at", "updated_at"];

// ─── Policies ────────────────────────────────────────────────────────────────

/// What to do when a staging batch contains the same natural key twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
  /// Insert-or-ignore: the first occurrence wins.
  #[default]
  KeepFirst,
  /// Insert-or-replace: the last occurrence wins.
  KeepLast,
}

/// What a promotion does to a production row whose natural key already
/// exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
  /// Only re-assert the provisional flag; the stored measurement is kept.
  #[default]
  KeepExisting,
  /// Also replace the measurement, but only while the existing row is
  /// still provisional. Confirmed measurements are never overwritten.
  RefreshProvisional,
}

/// Counts produced by one promotion window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeCounts {
  pub inserted:   u64,
  pub reasserted: u64,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the star-schema store.
pub trait Warehouse {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Dimensions ────────────────────────────────────────────────────────

  /// Surrogate key of the member whose natural key is `label`, if any.
  fn find_member(&self, dimension: Dimension, label: &str) -> Result<Option<i64>, Self::Error>;

  /// Insert a new member and return its surrogate key.
  fn insert_member(&self, member: &NewMember) -> Result<i64, Self::Error>;

  /// Attach a commune to its parent department unless it already has one.
  /// Returns whether a link was written.
  fn link_commune_department(&self, commune: i64, department: i64) -> Result<bool, Self::Error>;

  /// Fill a department's region unless it is already set.
  fn enrich_department_region(&self, department: i64, region: &str) -> Result<bool, Self::Error>;

  /// Intermunicipal group of a commune, inferred from previously loaded
  /// location facts.
  fn infer_commune_epci(&self, commune: i64) -> Result<Option<i64>, Self::Error>;

  // ── Staging ───────────────────────────────────────────────────────────

  /// Create the family's staging table from its grain template unless it
  /// exists. Returns whether the table was created.
  fn ensure_staging(&self, family: FactFamily) -> Result<bool, Self::Error>;

  /// Delete every staging row dated on one of `dates`; returns the number
  /// of rows deleted. Runs in one transaction.
  fn delete_staging_dates(&self, family: FactFamily, dates: &[NaiveDate]) -> Result<u64, Self::Error>;

  /// Insert one chunk of rows in one transaction; returns the number of
  /// rows written (ignored duplicates excluded).
  fn insert_staging(
    &self,
    family: FactFamily,
    rows: &[FactRow],
    policy: DuplicatePolicy,
  ) -> Result<u64, Self::Error>;

  /// Read back staging rows in insertion order, up to `limit`.
  fn staging_rows(&self, family: FactFamily, limit: Option<usize>) -> Result<Vec<FactRow>, Self::Error>;

  // ── Tables ────────────────────────────────────────────────────────────

  fn table_exists(&self, table: &str) -> Result<bool, Self::Error>;

  fn table_columns(&self, table: &str) -> Result<Vec<String>, Self::Error>;

  fn count_rows(&self, table: &str) -> Result<u64, Self::Error>;

  // ── Promotion ─────────────────────────────────────────────────────────

  /// Add the `provisional` column to a production table lacking it.
  /// Returns whether the column was added.
  fn ensure_provisional_column(&self, table: &str) -> Result<bool, Self::Error>;

  /// Smallest and largest row ids of a table, `None` when it is empty.
  fn row_id_bounds(&self, table: &str) -> Result<Option<(i64, i64)>, Self::Error>;

  /// Copy the staging rows whose row id falls in `window` into production,
  /// marking them provisional, in one transaction.
  fn promote_window(
    &self,
    family: FactFamily,
    columns: &[String],
    window: RangeInclusive<i64>,
    policy: MergePolicy,
  ) -> Result<MergeCounts, Self::Error>;

  fn count_provisional(&self, table: &str) -> Result<u64, Self::Error>;
}
