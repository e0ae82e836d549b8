//! Structured reports returned by the invocation surface.
//!
//! Row- and chunk-level failures are values here, never errors: a run
//! always produces a report, and the report carries the counts, bounded
//! samples and health verdict an operator needs.

use std::{collections::BTreeMap, fmt, path::PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{dimension::Dimension, family::FactFamily};

// ─── Row rejections ──────────────────────────────────────────────────────────

/// Category of a rejected source row.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
  /// Field count differs from the header's.
  Malformed,
  MissingField,
  InvalidDate,
  InvalidVolume,
  NonPositiveVolume,
  UnresolvedDimension,
}

impl RejectionKind {
  pub fn describe(self) -> &'static str {
    match self {
      Self::Malformed => "malformed row",
      Self::MissingField => "missing required field",
      Self::InvalidDate => "invalid date",
      Self::InvalidVolume => "invalid volume",
      Self::NonPositiveVolume => "non-positive volume",
      Self::UnresolvedDimension => "unresolved dimension key",
    }
  }
}

/// Why a particular row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
  Malformed { expected: usize, found: usize },
  MissingField { field: String },
  InvalidDate { value: String },
  InvalidVolume { value: String },
  NonPositiveVolume { value: i64 },
  UnresolvedDimension { dimension: Dimension, label: String },
}

impl RejectionReason {
  pub fn kind(&self) -> RejectionKind {
    match self {
      Self::Malformed { .. } => RejectionKind::Malformed,
      Self::MissingField { .. } => RejectionKind::MissingField,
      Self::InvalidDate { .. } => RejectionKind::InvalidDate,
      Self::InvalidVolume { .. } => RejectionKind::InvalidVolume,
      Self::NonPositiveVolume { .. } => RejectionKind::NonPositiveVolume,
      Self::UnresolvedDimension { .. } => RejectionKind::UnresolvedDimension,
    }
  }

  pub fn missing(field: impl Into<String>) -> Self {
    Self::MissingField { field: field.into() }
  }
}

impl fmt::Display for RejectionReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Malformed { expected, found } => {
        write!(f, "malformed row: {found} fields instead of {expected}")
      }
      Self::MissingField { field } => write!(f, "missing required field: {field}"),
      Self::InvalidDate { value } => write!(f, "invalid date: {value:?}"),
      Self::InvalidVolume { value } => write!(f, "invalid volume: {value:?}"),
      Self::NonPositiveVolume { value } => write!(f, "non-positive volume: {value}"),
      Self::UnresolvedDimension { dimension, label } => {
        write!(f, "unresolved {dimension} key for {label:?}")
      }
    }
  }
}

/// A rejected row retained as a diagnostic sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRow {
  /// 1-based line number in the source file.
  pub line:    usize,
  pub reason:  RejectionReason,
  /// The raw fields, joined with `;` and truncated.
  pub excerpt: String,
}

/// Rejection counters by category plus a bounded sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionSummary {
  pub total:   u64,
  pub by_kind: BTreeMap<RejectionKind, u64>,
  pub samples: Vec<RejectedRow>,
  #[serde(skip)]
  sample_limit: usize,
}

impl RejectionSummary {
  pub fn with_sample_limit(sample_limit: usize) -> Self {
    Self { sample_limit, ..Self::default() }
  }

  pub fn record(&mut self, rejected: RejectedRow) {
    self.total += 1;
    *self.by_kind.entry(rejected.reason.kind()).or_default() += 1;
    if self.samples.len() < self.sample_limit {
      self.samples.push(rejected);
    }
  }

  pub fn count(&self, kind: RejectionKind) -> u64 {
    self.by_kind.get(&kind).copied().unwrap_or(0)
  }
}

// ─── Chunk failures ──────────────────────────────────────────────────────────

/// The batch operation a chunk failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStage {
  Delete,
  Insert,
  Promote,
}

/// A batch that failed as a whole and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFailure {
  pub stage: ChunkStage,
  /// 0-based chunk index within the stage.
  pub index: usize,
  /// Rows (or dates, for deletes) in the chunk.
  pub size:  usize,
  pub error: String,
}

// ─── Per-file outcome ────────────────────────────────────────────────────────

/// Character encoding detected for a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceEncoding {
  Utf8,
  /// Legacy 8-bit encoding (ISO-8859-1 family, decoded as Windows-1252).
  Windows1252,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcomeStatus {
  /// The file is absent or empty; only the staging schema was ensured.
  NoFile,
  Unchanged,
  Loaded,
  /// Fatal error for this file; other files were still processed.
  Failed,
}

/// What happened to one family's source file during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
  pub family:         FactFamily,
  pub file_name:      String,
  pub table:          String,
  pub status:         FileOutcomeStatus,
  pub path:           Option<PathBuf>,
  pub encoding:       Option<SourceEncoding>,
  pub rows_read:      u64,
  pub rows_mapped:    u64,
  pub rows_rejected:  u64,
  pub deleted:        u64,
  pub inserted:       u64,
  /// Mapped rows whose key was already present in the batch.
  pub ignored:        u64,
  /// Mapped rows not written because their chunk failed.
  pub skipped:        u64,
  pub rejections:     RejectionSummary,
  pub chunk_failures: Vec<ChunkFailure>,
  pub error:          Option<String>,
}

impl FileOutcome {
  pub fn new(family: FactFamily, file_name: impl Into<String>, status: FileOutcomeStatus) -> Self {
    Self {
      family,
      file_name: file_name.into(),
      table: family.staging_table(),
      status,
      path: None,
      encoding: None,
      rows_read: 0,
      rows_mapped: 0,
      rows_rejected: 0,
      deleted: 0,
      inserted: 0,
      ignored: 0,
      skipped: 0,
      rejections: RejectionSummary::default(),
      chunk_failures: Vec::new(),
      error: None,
    }
  }
}

// ─── File status ─────────────────────────────────────────────────────────────

/// Presence and metadata of one expected source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStatus {
  pub family:      FactFamily,
  pub file_name:   String,
  pub table:       String,
  pub present:     bool,
  pub path:        Option<PathBuf>,
  pub size:        u64,
  pub modified:    Option<DateTime<Utc>>,
  /// Data lines, header excluded.
  pub lines:       u64,
  pub ledger_hash: Option<String>,
  /// Whether the current content differs from the ledger; `None` when the
  /// file is missing or unreadable.
  pub changed:     Option<bool>,
}

// ─── Run summary ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalStats {
  pub files_expected:  u64,
  pub files_present:   u64,
  pub files_processed: u64,
  pub total_read:      u64,
  pub total_mapped:    u64,
  pub total_rejected:  u64,
  pub total_inserted:  u64,
  pub total_deleted:   u64,
  /// Mapped / read, in percent with one decimal; `None` when nothing was
  /// read.
  pub success_rate:    Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorSummary {
  pub total_rejected: u64,
  pub by_kind:        BTreeMap<RejectionKind, u64>,
  pub by_table:       BTreeMap<String, u64>,
  pub samples:        Vec<String>,
  pub missing_files:  Vec<String>,
  pub failed_files:   Vec<String>,
  pub chunk_failures: u64,
  pub issues:         Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthVerdict {
  Healthy,
  Partial,
  ProcessingError,
  Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
  Low,
  Medium,
  High,
  Critical,
}

/// Coarse deployment-health verdict for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
  pub verdict:          HealthVerdict,
  pub severity:         Severity,
  pub issues:           Vec<String>,
  pub recommendations:  Vec<String>,
  pub deployment_ready: bool,
}

/// Resolver activity for one dimension during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionCounters {
  pub cache_hits: u64,
  pub lookups:    u64,
  pub created:    u64,
  pub unresolved: u64,
}

/// The result of one `check` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
  pub run_id:           Uuid,
  pub started_at:       DateTime<Utc>,
  pub duration_ms:      u64,
  pub forced:           bool,
  pub changes_detected: bool,
  pub files:            Vec<FileOutcome>,
  pub global:           GlobalStats,
  pub file_status:      Vec<FileStatus>,
  pub errors:           ErrorSummary,
  pub health:           HealthReport,
  pub dimensions:       BTreeMap<Dimension, DimensionCounters>,
}

// ─── Promotion ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionStatus {
  Promoted,
  /// Some batches failed; the others were committed.
  Partial,
  /// Nothing to promote (absent or empty staging table).
  Skipped,
  Failed,
}

/// The result of promoting one family's staging table into production.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionReport {
  pub family:                 FactFamily,
  pub staging_table:          String,
  pub production_table:       String,
  pub status:                 PromotionStatus,
  pub columns:                Vec<String>,
  pub staging_rows:           u64,
  pub inserted:               u64,
  /// Existing production rows whose provisional flag was re-asserted.
  pub reasserted:             u64,
  pub batches:                u64,
  pub failed_batches:         Vec<ChunkFailure>,
  pub production_rows_before: u64,
  pub production_rows_after:  u64,
  pub provisional_after:      u64,
  pub message:                Option<String>,
  pub duration_ms:            u64,
}

impl PromotionReport {
  pub fn new(family: FactFamily) -> Self {
    Self {
      family,
      staging_table: family.staging_table(),
      production_table: family.production_table(),
      status: PromotionStatus::Skipped,
      columns: Vec::new(),
      staging_rows: 0,
      inserted: 0,
      reasserted: 0,
      batches: 0,
      failed_batches: Vec::new(),
      production_rows_before: 0,
      production_rows_after: 0,
      provisional_after: 0,
      message: None,
      duration_ms: 0,
    }
  }
}
