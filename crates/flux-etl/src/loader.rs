//! Row mapping and the incremental staging loader.
//!
//! Mapping turns parsed records into [`FactRow`]s, rejecting rows with a
//! categorised reason. Loading replaces the staging partitions (dates)
//! present in the batch, then inserts the rows in fixed-size chunks; a
//! failed chunk is recorded and skipped.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{Datelike as _, NaiveDate};
use flux_core::{
  dimension::{weekday_label, Dimension},
  fact::FactRow,
  family::{source, FactFamily, GrainColumn},
  normalize::parse_date,
  report::{ChunkFailure, ChunkStage, RejectedRow, RejectionReason, RejectionSummary},
  warehouse::{DuplicatePolicy, Warehouse},
};
use tracing::{debug, warn};

use crate::{
  parse::{ParsedFile, SourceRecord},
  resolve::RunContext,
};

// ─── Column mapping ──────────────────────────────────────────────────────────

/// Positions of the source columns a family reads, looked up by header
/// label (case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
  date:            Option<usize>,
  zone:            Option<usize>,
  origin:          Option<usize>,
  category:        Option<usize>,
  volume:          Option<usize>,
  extras:          Vec<(GrainColumn, Option<usize>)>,
  region:          Option<usize>,
  /// Parent department of a commune, on families keyed by commune only.
  department_hint: Option<usize>,
}

impl ColumnMap {
  pub fn new(family: FactFamily, header: &[String]) -> Self {
    let find = |label: &str| header.iter().position(|h| h.trim().eq_ignore_ascii_case(label));
    let grain = family.grain();
    let department_label = GrainColumn::Department.source_label().unwrap_or_default();

    Self {
      date:            find(source::DATE),
      zone:            find(source::ZONE),
      origin:          find(source::ORIGIN),
      category:        find(source::CATEGORY),
      volume:          find(source::VOLUME),
      extras:          grain
        .extras
        .iter()
        .map(|&c| (c, c.source_label().and_then(find)))
        .collect(),
      region:          find(source::REGION),
      department_hint: (grain.has(GrainColumn::Commune) && !grain.has(GrainColumn::Department))
        .then(|| find(department_label))
        .flatten(),
    }
  }

  fn extra(&self, column: GrainColumn) -> Option<usize> {
    self.extras.iter().find(|(c, _)| *c == column).and_then(|(_, idx)| *idx)
  }
}

/// Non-empty value of a field.
fn field(record: &SourceRecord, idx: Option<usize>) -> Option<&str> {
  idx
    .and_then(|i| record.fields.get(i))
    .map(|s| s.trim())
    .filter(|s| !s.is_empty())
}

fn required<'r>(record: &'r SourceRecord, idx: Option<usize>, name: &str) -> Result<&'r str, RejectionReason> {
  field(record, idx).ok_or_else(|| RejectionReason::missing(name))
}

/// Parse a measurement: an integer, tolerating digit-group spaces and an
/// integral decimal form (`42.0`, `42,0`).
pub fn parse_volume(raw: &str) -> Result<i64, RejectionReason> {
  let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
  let value = compact.parse::<i64>().ok().or_else(|| {
    compact
      .replace(',', ".")
      .parse::<f64>()
      .ok()
      .filter(|f| f.is_finite() && f.fract() == 0.0)
      .map(|f| f as i64)
  });
  match value {
    None => Err(RejectionReason::InvalidVolume { value: raw.to_owned() }),
    Some(v) if v <= 0 => Err(RejectionReason::NonPositiveVolume { value: v }),
    Some(v) => Ok(v),
  }
}

fn resolve_required<W: Warehouse>(
  ctx:       &mut RunContext,
  store:     &W,
  dimension: Dimension,
  raw:       &str,
) -> Result<i64, RejectionReason> {
  ctx.resolve(store, dimension, raw).ok_or_else(|| RejectionReason::UnresolvedDimension {
    dimension,
    label: raw.to_owned(),
  })
}

/// Map one record to a fact row. Fields are validated before any dimension
/// is touched, so syntactically bad rows never create members.
pub fn map_record<W: Warehouse>(
  store:  &W,
  ctx:    &mut RunContext,
  family: FactFamily,
  map:    &ColumnMap,
  record: &SourceRecord,
) -> Result<FactRow, RejectionReason> {
  let date_raw = required(record, map.date, source::DATE)?;
  let zone_raw = required(record, map.zone, source::ZONE)?;
  let origin_raw = required(record, map.origin, source::ORIGIN)?;
  let category_raw = required(record, map.category, source::CATEGORY)?;
  let volume_raw = required(record, map.volume, source::VOLUME)?;
  for (column, idx) in &map.extras {
    if column.is_required() {
      required(record, *idx, column.source_label().unwrap_or_default())?;
    }
  }

  let date = parse_date(date_raw).ok_or_else(|| RejectionReason::InvalidDate {
    value: date_raw.to_owned(),
  })?;
  let volume = parse_volume(volume_raw)?;

  ctx.resolve_date(store, date).ok_or_else(|| RejectionReason::UnresolvedDimension {
    dimension: Dimension::Date,
    label:     date_raw.to_owned(),
  })?;
  let zone = resolve_required(ctx, store, Dimension::Zone, zone_raw)?;
  let origin = resolve_required(ctx, store, Dimension::Origin, origin_raw)?;
  let category = resolve_required(ctx, store, Dimension::Category, category_raw)?;
  let mut row = FactRow::new(date, zone, origin, category, volume);

  for &(column, idx) in &map.extras {
    match column {
      GrainColumn::Department => {
        let raw = required(record, idx, source_label(column))?;
        let id = resolve_required(ctx, store, Dimension::Department, raw)?;
        if let Some(region) = field(record, map.region) {
          ctx.enrich_department(store, id, region);
        }
        row.department = Some(id);
      }
      GrainColumn::Country => {
        let raw = required(record, idx, source_label(column))?;
        row.country = Some(resolve_required(ctx, store, Dimension::Country, raw)?);
      }
      GrainColumn::StayDuration => {
        let raw = required(record, idx, source_label(column))?;
        row.stay_duration = Some(resolve_required(ctx, store, Dimension::StayDuration, raw)?);
      }
      GrainColumn::Commune => {
        let raw = required(record, idx, source_label(column))?;
        let id = resolve_required(ctx, store, Dimension::Commune, raw)?;
        if let Some(dept_raw) = field(record, map.department_hint)
          && let Some(dept) = ctx.resolve(store, Dimension::Department, dept_raw)
        {
          ctx.link_commune(store, id, dept);
        }
        row.commune = Some(id);
      }
      GrainColumn::Weekday => row.weekday = Some(weekday_label(date.weekday()).to_owned()),
      GrainColumn::Epci => {}
    }
  }

  if let Some(commune) = row.commune
    && family.grain().has(GrainColumn::Epci)
  {
    let raw = field(record, map.extra(GrainColumn::Epci));
    row.epci = Some(ctx.resolve_epci(store, commune, raw));
  }

  Ok(row)
}

fn source_label(column: GrainColumn) -> &'static str { column.source_label().unwrap_or_default() }

/// Mapped rows of one file plus its rejections.
#[derive(Debug, Clone)]
pub struct MappedBatch {
  pub rows:       Vec<FactRow>,
  pub rejections: RejectionSummary,
}

/// Map every record of a parsed file. Malformed rows are counted as
/// rejections first, so read = mapped + rejected always holds.
pub fn map_file<W: Warehouse>(
  store:        &W,
  ctx:          &mut RunContext,
  family:       FactFamily,
  parsed:       &ParsedFile,
  sample_limit: usize,
) -> MappedBatch {
  let map = ColumnMap::new(family, &parsed.header);
  let mut rejections = RejectionSummary::with_sample_limit(sample_limit);
  for rejected in &parsed.malformed {
    rejections.record(rejected.clone());
  }

  let mut rows = Vec::with_capacity(parsed.records.len());
  for record in &parsed.records {
    match map_record(store, ctx, family, &map, record) {
      Ok(row) => rows.push(row),
      Err(reason) => {
        debug!(%family, line = record.line, %reason, "row rejected");
        rejections.record(RejectedRow { line: record.line, reason, excerpt: record.excerpt() });
      }
    }
  }

  MappedBatch { rows, rejections }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
  pub chunk_size:       usize,
  pub date_chunk_size:  usize,
  pub duplicate_policy: DuplicatePolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadCounts {
  pub deleted:        u64,
  pub inserted:       u64,
  pub ignored:        u64,
  pub skipped:        u64,
  pub chunk_failures: Vec<ChunkFailure>,
}

/// Collapse rows sharing a natural key according to `policy`, keeping the
/// position of the first occurrence. Returns the rows and the number
/// dropped.
pub fn dedupe(rows: Vec<FactRow>, policy: DuplicatePolicy) -> (Vec<FactRow>, u64) {
  let mut index = HashMap::with_capacity(rows.len());
  let mut kept: Vec<FactRow> = Vec::with_capacity(rows.len());
  let mut dropped = 0;

  for row in rows {
    match index.get(&row.natural_key()) {
      Some(&at) => {
        dropped += 1;
        if policy == DuplicatePolicy::KeepLast {
          kept[at] = row;
        }
      }
      None => {
        index.insert(row.natural_key(), kept.len());
        kept.push(row);
      }
    }
  }
  (kept, dropped)
}

/// Replace the staging partitions present in `rows`, then insert them.
pub fn load<W: Warehouse>(
  store:  &W,
  family: FactFamily,
  rows:   Vec<FactRow>,
  opts:   &LoadOptions,
) -> LoadCounts {
  let mut counts = LoadCounts::default();
  let (rows, dropped) = dedupe(rows, opts.duplicate_policy);
  counts.ignored += dropped;

  let dates: Vec<NaiveDate> = rows.iter().map(|r| r.date).collect::<BTreeSet<_>>().into_iter().collect();
  let mut failed_dates = HashSet::new();
  for (index, chunk) in dates.chunks(opts.date_chunk_size.max(1)).enumerate() {
    match store.delete_staging_dates(family, chunk) {
      Ok(n) => counts.deleted += n,
      Err(e) => {
        warn!(%family, index, dates = chunk.len(), error = %e, "partition delete failed, skipping its rows");
        failed_dates.extend(chunk.iter().copied());
        counts.chunk_failures.push(ChunkFailure {
          stage: ChunkStage::Delete,
          index,
          size: chunk.len(),
          error: e.to_string(),
        });
      }
    }
  }

  let (rows, blocked): (Vec<_>, Vec<_>) = rows.into_iter().partition(|r| !failed_dates.contains(&r.date));
  counts.skipped += blocked.len() as u64;

  for (index, chunk) in rows.chunks(opts.chunk_size.max(1)).enumerate() {
    match store.insert_staging(family, chunk, opts.duplicate_policy) {
      Ok(written) => {
        counts.inserted += written;
        counts.ignored += (chunk.len() as u64).saturating_sub(written);
      }
      Err(e) => {
        warn!(%family, index, rows = chunk.len(), error = %e, "staging insert chunk failed");
        counts.skipped += chunk.len() as u64;
        counts.chunk_failures.push(ChunkFailure {
          stage: ChunkStage::Insert,
          index,
          size: chunk.len(),
          error: e.to_string(),
        });
      }
    }
  }

  counts
}
