//! [`SqliteWarehouse`]: the SQLite implementation of [`Warehouse`].

use std::{ops::RangeInclusive, path::Path};

use chrono::{NaiveDate, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension as _};
use tracing::{debug, info};

use flux_core::{
  dimension::{Dimension, MemberAttributes, NewMember},
  fact::FactRow,
  family::FactFamily,
  warehouse::{DuplicatePolicy, MergeCounts, MergePolicy, Warehouse},
};

use crate::{
  encode::{encode_date, encode_dt, fact_values, placeholders, quote_ident, RawFact},
  schema::{production_ddl, staging_ddl, SCHEMA},
  Error, Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A FluxVision warehouse backed by a single SQLite file.
pub struct SqliteWarehouse {
  pub(crate) conn: rusqlite::Connection,
}

impl SqliteWarehouse {
  /// Open (or create) a warehouse at `path` and run schema initialisation.
  pub fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = rusqlite::Connection::open(path)?;
    let store = Self { conn };
    store.init_schema()?;
    Ok(store)
  }

  /// Open an in-memory warehouse, for tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn = rusqlite::Connection::open_in_memory()?;
    let store = Self { conn };
    store.init_schema()?;
    Ok(store)
  }

  fn init_schema(&self) -> Result<()> {
    self.conn.execute_batch(SCHEMA)?;
    for family in FactFamily::all() {
      self.conn.execute_batch(&production_ddl(family))?;
    }
    Ok(())
  }

  /// Check that every promoted column belongs to the family's grain and
  /// that the natural key is fully covered.
  fn check_promoted_columns(&self, family: FactFamily, columns: &[String]) -> Result<()> {
    let grain = family.grain();
    let known: Vec<&str> = grain.columns().iter().map(|c| c.name).collect();
    let table = family.production_table();

    if let Some(column) = columns.iter().find(|c| !known.contains(&c.as_str())) {
      return Err(Error::UnknownColumn { table, column: column.clone() });
    }
    if let Some(key) = grain.key_columns().into_iter().find(|k| !columns.iter().any(|c| c == k)) {
      return Err(Error::MissingKeyColumn { table, column: key.to_owned() });
    }
    Ok(())
  }
}

// ─── Warehouse impl ──────────────────────────────────────────────────────────

impl Warehouse for SqliteWarehouse {
  type Error = Error;

  // ── Dimensions ────────────────────────────────────────────────────────────

  fn find_member(&self, dimension: Dimension, label: &str) -> Result<Option<i64>> {
    let sql = format!(
      "SELECT {} FROM {} WHERE {} = ?1",
      dimension.id_column(),
      dimension.table(),
      dimension.label_column(),
    );
    Ok(self.conn.query_row(&sql, params![label], |r| r.get(0)).optional()?)
  }

  fn insert_member(&self, member: &NewMember) -> Result<i64> {
    let dimension = member.dimension;
    let table = dimension.table();
    let label_col = dimension.label_column();
    let now = encode_dt(Utc::now());

    match &member.attributes {
      MemberAttributes::Plain => {
        self.conn.execute(
          &format!("INSERT OR IGNORE INTO {table} ({label_col}, created_at) VALUES (?1, ?2)"),
          params![member.label, now],
        )?;
      }
      MemberAttributes::Calendar(day) => {
        self.conn.execute(
          &format!(
            "INSERT OR IGNORE INTO {table}
               ({label_col}, jour_semaine, mois, annee, trimestre, semaine, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
          ),
          params![
            encode_date(day.date),
            day.weekday,
            day.month,
            day.year,
            day.quarter,
            day.iso_week,
            now,
          ],
        )?;
      }
      MemberAttributes::Duration { nights } => {
        self.conn.execute(
          &format!(
            "INSERT OR IGNORE INTO {table} ({label_col}, nb_nuits, created_at)
             VALUES (?1, ?2, ?3)"
          ),
          params![member.label, nights, now],
        )?;
      }
    }

    // Read back rather than trusting last_insert_rowid(): an ignored insert
    // leaves it pointing at an unrelated row.
    let label = match &member.attributes {
      MemberAttributes::Calendar(day) => encode_date(day.date),
      _ => member.label.clone(),
    };
    let id = self
      .find_member(dimension, &label)?
      .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
    debug!(%dimension, label = %member.label, id, "created dimension member");
    Ok(id)
  }

  fn link_commune_department(&self, commune: i64, department: i64) -> Result<bool> {
    let changed = self.conn.execute(
      "UPDATE dim_communes SET id_departement = ?2
       WHERE id_commune = ?1 AND id_departement IS NULL",
      params![commune, department],
    )?;
    Ok(changed > 0)
  }

  fn enrich_department_region(&self, department: i64, region: &str) -> Result<bool> {
    let changed = self.conn.execute(
      "UPDATE dim_departements SET nom_region = ?2
       WHERE id_departement = ?1 AND (nom_region IS NULL OR nom_region = '')",
      params![department, region],
    )?;
    Ok(changed > 0)
  }

  fn infer_commune_epci(&self, commune: i64) -> Result<Option<i64>> {
    let sql = format!(
      "SELECT id_epci FROM {} WHERE id_commune = ?1 AND id_epci != 0 LIMIT 1",
      FactFamily::LieuActiviteSoir.production_table(),
    );
    Ok(self.conn.query_row(&sql, params![commune], |r| r.get(0)).optional()?)
  }

  // ── Staging ───────────────────────────────────────────────────────────────

  fn ensure_staging(&self, family: FactFamily) -> Result<bool> {
    let table = family.staging_table();
    if self.table_exists(&table)? {
      return Ok(false);
    }
    self.conn.execute_batch(&staging_ddl(family))?;
    info!(%table, "created staging table");
    Ok(true)
  }

  fn delete_staging_dates(&self, family: FactFamily, dates: &[NaiveDate]) -> Result<u64> {
    if dates.is_empty() {
      return Ok(0);
    }
    let sql = format!(
      "DELETE FROM {} WHERE date IN ({})",
      family.staging_table(),
      placeholders(1, dates.len()),
    );

    let tx = self.conn.unchecked_transaction()?;
    let deleted = tx.execute(&sql, params_from_iter(dates.iter().map(|d| encode_date(*d))))?;
    tx.commit()?;
    Ok(deleted as u64)
  }

  fn insert_staging(
    &self,
    family:  FactFamily,
    rows:    &[FactRow],
    policy:  DuplicatePolicy,
  ) -> Result<u64> {
    let columns: Vec<&str> = family.grain().columns().iter().map(|c| c.name).collect();
    let verb = match policy {
      DuplicatePolicy::KeepFirst => "INSERT OR IGNORE",
      DuplicatePolicy::KeepLast => "INSERT OR REPLACE",
    };
    let sql = format!(
      "{verb} INTO {} ({}, created_at) VALUES ({})",
      family.staging_table(),
      columns.join(", "),
      placeholders(1, columns.len() + 1),
    );
    let now = encode_dt(Utc::now());

    let tx = self.conn.unchecked_transaction()?;
    let mut written = 0u64;
    {
      let mut stmt = tx.prepare(&sql)?;
      for row in rows {
        let mut values = fact_values(family, row);
        values.push(rusqlite::types::Value::Text(now.clone()));
        written += stmt.execute(params_from_iter(values))? as u64;
      }
    }
    tx.commit()?;
    Ok(written)
  }

  fn staging_rows(&self, family: FactFamily, limit: Option<usize>) -> Result<Vec<FactRow>> {
    let columns: Vec<&str> = family.grain().columns().iter().map(|c| c.name).collect();
    let sql = format!(
      "SELECT {} FROM {} ORDER BY rowid LIMIT ?1",
      columns.join(", "),
      family.staging_table(),
    );
    // A negative LIMIT means no limit in SQLite.
    let limit = limit.map_or(-1, |l| l as i64);

    let mut stmt = self.conn.prepare(&sql)?;
    let raws = stmt
      .query_map(params![limit], |row| RawFact::from_row(family, row))?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    raws.into_iter().map(RawFact::into_fact).collect()
  }

  // ── Tables ────────────────────────────────────────────────────────────────

  fn table_exists(&self, table: &str) -> Result<bool> {
    Ok(
      self
        .conn
        .query_row(
          "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
          params![table],
          |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false),
    )
  }

  fn table_columns(&self, table: &str) -> Result<Vec<String>> {
    let mut stmt = self.conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let names = stmt
      .query_map(params![table], |r| r.get(0))?
      .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
  }

  fn count_rows(&self, table: &str) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table)?);
    let count: i64 = self.conn.query_row(&sql, [], |r| r.get(0))?;
    Ok(count as u64)
  }

  // ── Promotion ─────────────────────────────────────────────────────────────

  fn ensure_provisional_column(&self, table: &str) -> Result<bool> {
    if self.table_columns(table)?.iter().any(|c| c == "provisional") {
      return Ok(false);
    }
    self.conn.execute_batch(&format!(
      "ALTER TABLE {} ADD COLUMN provisional INTEGER NOT NULL DEFAULT 0",
      quote_ident(table)?,
    ))?;
    info!(%table, "added provisional column");
    Ok(true)
  }

  fn row_id_bounds(&self, table: &str) -> Result<Option<(i64, i64)>> {
    let sql = format!("SELECT MIN(rowid), MAX(rowid) FROM {}", quote_ident(table)?);
    let (lo, hi): (Option<i64>, Option<i64>) =
      self.conn.query_row(&sql, [], |r| Ok((r.get(0)?, r.get(1)?)))?;
    Ok(lo.zip(hi))
  }

  fn promote_window(
    &self,
    family:  FactFamily,
    columns: &[String],
    window:  RangeInclusive<i64>,
    policy:  MergePolicy,
  ) -> Result<MergeCounts> {
    self.check_promoted_columns(family, columns)?;

    let production = family.production_table();
    let staging = family.staging_table();
    let existing = self.table_columns(&production)?;
    let has = |name: &str| existing.iter().any(|c| c == name);
    let stamped = has("created_at") && has("updated_at");

    let cols = columns.join(", ");
    let keys = family.grain().key_columns().join(", ");

    let mut updates = vec!["provisional = 1".to_owned()];
    if stamped {
      updates.push("updated_at = excluded.updated_at".to_owned());
    }
    if policy == MergePolicy::RefreshProvisional && columns.iter().any(|c| c == "volume") {
      updates.push(format!(
        "volume = CASE WHEN {production}.provisional = 1 THEN excluded.volume ELSE {production}.volume END"
      ));
    }
    // Assignments are evaluated against the old row, so the volume CASE
    // sees the pre-merge provisional flag.
    let (insert_cols, select_cols) = if stamped {
      (format!("{cols}, provisional, created_at, updated_at"), format!("{cols}, 1, ?3, ?3"))
    } else {
      (format!("{cols}, provisional"), format!("{cols}, 1"))
    };

    let sql = format!(
      "INSERT INTO {production} ({insert_cols})
       SELECT {select_cols} FROM {staging} WHERE rowid BETWEEN ?1 AND ?2
       ON CONFLICT ({keys}) DO UPDATE SET {}",
      updates.join(", "),
    );

    let tx = self.conn.unchecked_transaction()?;
    let count_sql = format!("SELECT COUNT(*) FROM {production}");
    let before: i64 = tx.query_row(&count_sql, [], |r| r.get(0))?;
    let changed = if stamped {
      let now = encode_dt(Utc::now());
      tx.execute(&sql, params![window.start(), window.end(), now])?
    } else {
      tx.execute(&sql, params![window.start(), window.end()])?
    };
    let after: i64 = tx.query_row(&count_sql, [], |r| r.get(0))?;
    tx.commit()?;

    let inserted = (after - before).max(0) as u64;
    Ok(MergeCounts { inserted, reasserted: (changed as u64).saturating_sub(inserted) })
  }

  fn count_provisional(&self, table: &str) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE provisional = 1", quote_ident(table)?);
    let count: i64 = self.conn.query_row(&sql, [], |r| r.get(0))?;
    Ok(count as u64)
  }
}
