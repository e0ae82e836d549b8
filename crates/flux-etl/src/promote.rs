//! Staging → production promotion.
//!
//! Rows are copied in row-id windows, each merged in its own transaction
//! with insert-or-update on the natural key. A failed window is recorded and
//! the next one still attempted. Production rows are never deleted.

use std::time::Instant;

use flux_core::{
  family::FactFamily,
  report::{ChunkFailure, ChunkStage, PromotionReport, PromotionStatus},
  warehouse::{MergePolicy, Warehouse, BOOKKEEPING_COLUMNS},
};
use tracing::{info, warn};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy)]
pub struct PromoteOptions {
  pub chunk_size:   usize,
  pub merge_policy: MergePolicy,
}

/// Columns shared by staging and production, in staging order, without the
/// store-maintained bookkeeping columns.
pub fn shared_columns(staging: &[String], production: &[String]) -> Vec<String> {
  staging
    .iter()
    .filter(|c| !BOOKKEEPING_COLUMNS.contains(&c.as_str()))
    .filter(|c| production.contains(c))
    .cloned()
    .collect()
}

/// Promote one family. Always returns a report; setup failures end up in
/// `status = failed` with a message.
pub fn promote<W: Warehouse>(store: &W, family: FactFamily, opts: &PromoteOptions) -> PromotionReport {
  let started = Instant::now();
  let mut report = PromotionReport::new(family);

  if let Err(e) = run(store, family, opts, &mut report) {
    warn!(%family, error = %e, "promotion failed");
    report.status = PromotionStatus::Failed;
    report.message = Some(e.to_string());
  }

  report.duration_ms = started.elapsed().as_millis() as u64;
  report
}

fn run<W: Warehouse>(
  store:  &W,
  family: FactFamily,
  opts:   &PromoteOptions,
  report: &mut PromotionReport,
) -> Result<()> {
  let staging = family.staging_table();
  let production = family.production_table();

  if !store.table_exists(&staging).map_err(Error::store)? {
    report.message = Some(format!("staging table {staging} does not exist"));
    return Ok(());
  }
  if !store.table_exists(&production).map_err(Error::store)? {
    report.status = PromotionStatus::Failed;
    report.message = Some(format!("production table {production} does not exist"));
    return Ok(());
  }

  store.ensure_provisional_column(&production).map_err(Error::store)?;

  let staging_cols = store.table_columns(&staging).map_err(Error::store)?;
  let production_cols = store.table_columns(&production).map_err(Error::store)?;
  report.columns = shared_columns(&staging_cols, &production_cols);

  report.staging_rows = store.count_rows(&staging).map_err(Error::store)?;
  report.production_rows_before = store.count_rows(&production).map_err(Error::store)?;

  let Some((lo, hi)) = store.row_id_bounds(&staging).map_err(Error::store)? else {
    report.message = Some(format!("staging table {staging} is empty"));
    report.production_rows_after = report.production_rows_before;
    report.provisional_after = store.count_provisional(&production).map_err(Error::store)?;
    return Ok(());
  };

  let step = opts.chunk_size.max(1) as i64;
  let mut start = lo;
  let mut index = 0usize;
  while start <= hi {
    let end = start.saturating_add(step - 1).min(hi);
    match store.promote_window(family, &report.columns, start..=end, opts.merge_policy) {
      Ok(counts) => {
        report.inserted += counts.inserted;
        report.reasserted += counts.reasserted;
      }
      Err(e) => {
        warn!(%family, index, start, end, error = %e, "promotion batch failed");
        report.failed_batches.push(ChunkFailure {
          stage: ChunkStage::Promote,
          index,
          size: (end - start + 1) as usize,
          error: e.to_string(),
        });
      }
    }
    report.batches += 1;
    index += 1;
    if end == hi {
      break;
    }
    start = end + 1;
  }

  report.production_rows_after = store.count_rows(&production).map_err(Error::store)?;
  report.provisional_after = store.count_provisional(&production).map_err(Error::store)?;
  report.status = match report.failed_batches.len() as u64 {
    0 => PromotionStatus::Promoted,
    n if n == report.batches => PromotionStatus::Failed,
    _ => PromotionStatus::Partial,
  };

  info!(
    %family,
    inserted = report.inserted,
    reasserted = report.reasserted,
    failed_batches = report.failed_batches.len(),
    "promoted staging table"
  );
  Ok(())
}

/// Promote every family, skipping those without a staging table.
pub fn promote_all<W: Warehouse>(store: &W, opts: &PromoteOptions) -> Vec<PromotionReport> {
  FactFamily::all().map(|family| promote(store, family, opts)).collect()
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use flux_core::{fact::FactRow, warehouse::DuplicatePolicy};
  use flux_store_sqlite::SqliteWarehouse;

  use super::*;

  fn opts(chunk_size: usize) -> PromoteOptions {
    PromoteOptions { chunk_size, merge_policy: MergePolicy::KeepExisting }
  }

  fn day(d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2024, 7, d).unwrap() }

  fn stage(store: &SqliteWarehouse, family: FactFamily, rows: &[FactRow]) {
    store.ensure_staging(family).unwrap();
    store.insert_staging(family, rows, DuplicatePolicy::KeepFirst).unwrap();
  }

  #[test]
  fn shared_columns_skip_bookkeeping() {
    let staging = ["date", "id_zone", "volume", "created_at"].map(String::from);
    let production = ["id", "date", "id_zone", "volume", "provisional", "created_at"].map(String::from);
    assert_eq!(shared_columns(&staging, &production), ["date", "id_zone", "volume"]);
  }

  #[test]
  fn absent_staging_is_skipped() {
    let store = SqliteWarehouse::open_in_memory().unwrap();
    let report = promote(&store, FactFamily::DiurnesPays, &opts(10));
    assert_eq!(report.status, PromotionStatus::Skipped);
    assert!(report.message.unwrap().contains("does not exist"));
  }

  #[test]
  fn promotes_in_batches() {
    let store = SqliteWarehouse::open_in_memory().unwrap();
    let family = FactFamily::Nuitees;
    let rows: Vec<_> = (1..=5).map(|d| FactRow::new(day(d), 1, 1, 1, d as i64)).collect();
    stage(&store, family, &rows);

    let report = promote(&store, family, &opts(2));
    assert_eq!(report.status, PromotionStatus::Promoted);
    assert_eq!(report.batches, 3);
    assert_eq!(report.inserted, 5);
    assert_eq!(report.staging_rows, 5);
    assert_eq!(report.production_rows_after, 5);
    assert_eq!(report.provisional_after, 5);

    let again = promote(&store, family, &opts(2));
    assert_eq!(again.inserted, 0);
    assert_eq!(again.reasserted, 5);
    assert_eq!(again.production_rows_after, 5);
  }

  #[test]
  fn failed_window_gives_partial_promotion() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("warehouse.db");
    let store = SqliteWarehouse::open(&db).unwrap();
    let family = FactFamily::Nuitees;
    let rows: Vec<_> = [10, 13, 20]
      .into_iter()
      .zip(1..)
      .map(|(volume, d)| FactRow::new(day(d), 1, 1, 1, volume))
      .collect();
    stage(&store, family, &rows);
    rusqlite::Connection::open(&db)
      .unwrap()
      .execute_batch(
        "CREATE TRIGGER refuse_13 BEFORE INSERT ON fact_nuitees
         WHEN NEW.volume = 13 BEGIN SELECT RAISE(ABORT, 'volume 13 refused'); END;",
      )
      .unwrap();

    let report = promote(&store, family, &opts(1));
    assert_eq!(report.status, PromotionStatus::Partial);
    assert_eq!(report.batches, 3);
    assert_eq!(report.inserted, 2);
    assert_eq!(report.failed_batches.len(), 1);
    let failure = &report.failed_batches[0];
    assert_eq!((failure.stage, failure.index, failure.size), (ChunkStage::Promote, 1, 1));
    assert!(failure.error.contains("volume 13 refused"));
    assert_eq!(report.production_rows_after, 2);
    assert_eq!(report.provisional_after, 2);
  }

  #[test]
  fn every_window_failing_is_a_failed_promotion() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("warehouse.db");
    let store = SqliteWarehouse::open(&db).unwrap();
    let family = FactFamily::Diurnes;
    stage(&store, family, &[FactRow::new(day(1), 1, 1, 1, 5), FactRow::new(day(2), 1, 1, 1, 6)]);
    rusqlite::Connection::open(&db)
      .unwrap()
      .execute_batch(
        "CREATE TRIGGER refuse_all BEFORE INSERT ON fact_diurnes
         BEGIN SELECT RAISE(ABORT, 'read only'); END;",
      )
      .unwrap();

    let report = promote(&store, family, &opts(1));
    assert_eq!(report.status, PromotionStatus::Failed);
    assert_eq!(report.failed_batches.len(), 2);
    assert_eq!(report.production_rows_after, 0);
  }

  #[test]
  fn promote_all_reports_every_family() {
    let store = SqliteWarehouse::open_in_memory().unwrap();
    stage(&store, FactFamily::Diurnes, &[FactRow::new(day(1), 1, 1, 1, 3)]);

    let reports = promote_all(&store, &opts(100));
    assert_eq!(reports.len(), 10);
    let promoted: Vec<_> = reports
      .iter()
      .filter(|r| r.status == PromotionStatus::Promoted)
      .map(|r| r.family)
      .collect();
    assert_eq!(promoted, [FactFamily::Diurnes]);
    assert!(reports.iter().all(|r| r.status != PromotionStatus::Failed));
  }
}
