//! Run diagnostics: file status, global counters, error summary and the
//! deployment-health verdict. Read-only over the counters the loader and
//! the locator produce.

use std::fs;

use chrono::{DateTime, Utc};
use flux_core::{
  family::FactFamily,
  report::{
    ErrorSummary, FileOutcome, FileOutcomeStatus, FileStatus, GlobalStats, HealthReport,
    HealthVerdict, Severity,
  },
};

use crate::{ledger::{hash_bytes, HashLedger}, locator::SourceLocator};

/// Present files totalling less than this are suspiciously small.
pub const MIN_TOTAL_SIZE: u64 = 100 * 1024;

/// Below this mapped/read percentage a run is a processing error.
pub const MIN_SUCCESS_RATE: f64 = 50.0;

// ─── File status ─────────────────────────────────────────────────────────────

/// Data lines of a file: non-blank lines after the header.
pub fn count_data_lines(bytes: &[u8]) -> u64 {
  let lines = bytes
    .split(|&b| b == b'\n')
    .filter(|line| line.iter().any(|b| !b.is_ascii_whitespace()))
    .count() as u64;
  lines.saturating_sub(1)
}

/// Presence and metadata of one family's source file. Never mutates the
/// ledger.
pub fn file_status(
  locator:   &SourceLocator,
  ledger:    &HashLedger,
  family:    FactFamily,
  file_name: &str,
) -> FileStatus {
  let mut status = FileStatus {
    family,
    file_name: file_name.to_owned(),
    table: family.staging_table(),
    present: false,
    path: None,
    size: 0,
    modified: None,
    lines: 0,
    ledger_hash: ledger.get(file_name).map(str::to_owned),
    changed: None,
  };

  let Some(path) = locator.locate(file_name) else {
    return status;
  };
  status.present = true;

  if let Ok(meta) = fs::metadata(&path) {
    status.size = meta.len();
    status.modified = meta.modified().ok().map(DateTime::<Utc>::from);
  }
  if let Ok(bytes) = fs::read(&path) {
    status.lines = count_data_lines(&bytes);
    status.changed = Some(ledger.differs(file_name, &hash_bytes(&bytes)));
  }
  status.path = Some(path);
  status
}

// ─── Aggregates ──────────────────────────────────────────────────────────────

/// Mapped / read in percent, one decimal; `None` when nothing was read.
pub fn success_rate(read: u64, mapped: u64) -> Option<f64> {
  (read > 0).then(|| (mapped as f64 / read as f64 * 1000.0).round() / 10.0)
}

pub fn global_stats(files: &[FileOutcome], statuses: &[FileStatus]) -> GlobalStats {
  let mut stats = GlobalStats {
    files_expected: statuses.len() as u64,
    files_present: statuses.iter().filter(|s| s.present).count() as u64,
    ..GlobalStats::default()
  };
  for file in files {
    if file.status == FileOutcomeStatus::Loaded {
      stats.files_processed += 1;
    }
    stats.total_read += file.rows_read;
    stats.total_mapped += file.rows_mapped;
    stats.total_rejected += file.rows_rejected;
    stats.total_inserted += file.inserted;
    stats.total_deleted += file.deleted;
  }
  stats.success_rate = success_rate(stats.total_read, stats.total_mapped);
  stats
}

pub fn error_summary(files: &[FileOutcome], statuses: &[FileStatus], sample_limit: usize) -> ErrorSummary {
  let mut summary = ErrorSummary::default();

  for file in files {
    summary.total_rejected += file.rejections.total;
    for (kind, n) in &file.rejections.by_kind {
      *summary.by_kind.entry(*kind).or_default() += n;
    }
    if file.rejections.total > 0 {
      summary.by_table.insert(file.table.clone(), file.rejections.total);
    }
    for sample in &file.rejections.samples {
      if summary.samples.len() >= sample_limit {
        break;
      }
      summary
        .samples
        .push(format!("{}:{}: {} [{}]", file.file_name, sample.line, sample.reason, sample.excerpt));
    }

    summary.chunk_failures += file.chunk_failures.len() as u64;
    if file.status == FileOutcomeStatus::Failed {
      let error = file.error.as_deref().unwrap_or("unknown error");
      summary.failed_files.push(file.file_name.clone());
      summary.issues.push(format!("{}: {error}", file.file_name));
    }
    if !file.chunk_failures.is_empty() {
      summary
        .issues
        .push(format!("{}: {} failed chunk(s)", file.file_name, file.chunk_failures.len()));
    }
  }

  summary.issues.extend(
    summary.by_kind.iter().map(|(kind, n)| format!("{n} row(s) rejected: {}", kind.describe())),
  );

  summary.missing_files = statuses
    .iter()
    .filter(|s| !s.present)
    .map(|s| s.file_name.clone())
    .collect();
  summary
}

/// Coarse verdict, most severe condition first: nothing present, missing
/// files, failed files or a low success rate, else healthy.
pub fn health(global: &GlobalStats, errors: &ErrorSummary, statuses: &[FileStatus]) -> HealthReport {
  let mut issues = Vec::new();
  let mut recommendations = Vec::new();
  let missing = errors.missing_files.len() as u64;
  let low_rate = global.success_rate.filter(|r| *r < MIN_SUCCESS_RATE);

  let (verdict, severity) = if global.files_present == 0 {
    issues.push("no source file found".to_owned());
    recommendations.push("check the configured data root".to_owned());
    recommendations.push("upload the source exports".to_owned());
    (HealthVerdict::Critical, Severity::Critical)
  } else if missing > 0 {
    issues.push(format!("{missing} of {} source files missing", global.files_expected));
    recommendations.push(format!("upload the missing files: {}", errors.missing_files.join(", ")));
    let severity = if missing * 2 > global.files_expected { Severity::High } else { Severity::Medium };
    (HealthVerdict::Partial, severity)
  } else if !errors.failed_files.is_empty() || low_rate.is_some() {
    if let Some(rate) = low_rate {
      issues.push(format!("low success rate ({rate}%)"));
      recommendations.push("check the quality of the source data".to_owned());
    }
    if !errors.failed_files.is_empty() {
      issues.push(format!("{} file(s) failed to process", errors.failed_files.len()));
      recommendations.push("inspect the error log for the failed files".to_owned());
    }
    let severity = if errors.failed_files.is_empty() { Severity::Medium } else { Severity::High };
    (HealthVerdict::ProcessingError, severity)
  } else {
    (HealthVerdict::Healthy, Severity::Low)
  };

  let total_size: u64 = statuses.iter().filter(|s| s.present).map(|s| s.size).sum();
  if global.files_present > 0 && total_size < MIN_TOTAL_SIZE {
    issues.push("total size of source files is abnormally small".to_owned());
    recommendations.push("check that the source files contain data".to_owned());
  }
  if errors.chunk_failures > 0 {
    issues.push(format!("{} chunk(s) failed and were skipped", errors.chunk_failures));
  }

  HealthReport {
    verdict,
    severity,
    issues,
    recommendations,
    deployment_ready: verdict == HealthVerdict::Healthy,
  }
}

#[cfg(test)]
mod tests {
  use flux_core::report::RejectionKind;

  use super::*;

  fn status(family: FactFamily, present: bool, size: u64) -> FileStatus {
    FileStatus {
      family,
      file_name: family.default_file_name().to_owned(),
      table: family.staging_table(),
      present,
      path: None,
      size,
      modified: None,
      lines: 0,
      ledger_hash: None,
      changed: None,
    }
  }

  fn all_present(size: u64) -> Vec<FileStatus> {
    FactFamily::all().map(|f| status(f, true, size)).collect()
  }

  fn loaded(family: FactFamily, read: u64, mapped: u64) -> FileOutcome {
    let mut outcome = FileOutcome::new(family, family.default_file_name(), FileOutcomeStatus::Loaded);
    outcome.rows_read = read;
    outcome.rows_mapped = mapped;
    outcome.rows_rejected = read - mapped;
    outcome
  }

  fn verdict(files: &[FileOutcome], statuses: &[FileStatus]) -> HealthReport {
    let global = global_stats(files, statuses);
    let errors = error_summary(files, statuses, 10);
    health(&global, &errors, statuses)
  }

  #[test]
  fn counts_data_lines_without_header_or_blanks() {
    assert_eq!(count_data_lines(b"h\na\n\n  \nb\n"), 2);
    assert_eq!(count_data_lines(b""), 0);
    assert_eq!(count_data_lines(b"header only"), 0);
  }

  #[test]
  fn success_rate_has_one_decimal() {
    assert_eq!(success_rate(3, 2), Some(66.7));
    assert_eq!(success_rate(0, 0), None);
  }

  #[test]
  fn nothing_present_is_critical() {
    let statuses: Vec<_> = FactFamily::all().map(|f| status(f, false, 0)).collect();
    let report = verdict(&[], &statuses);
    assert_eq!(report.verdict, HealthVerdict::Critical);
    assert!(!report.deployment_ready);
  }

  #[test]
  fn missing_files_are_partial() {
    let mut statuses = all_present(1 << 20);
    statuses[0].present = false;
    let report = verdict(&[loaded(FactFamily::Nuitees, 10, 10)], &statuses);
    assert_eq!(report.verdict, HealthVerdict::Partial);
    assert_eq!(report.severity, Severity::Medium);
  }

  #[test]
  fn low_success_rate_is_a_processing_error() {
    let report = verdict(&[loaded(FactFamily::Diurnes, 10, 4)], &all_present(1 << 20));
    assert_eq!(report.verdict, HealthVerdict::ProcessingError);
  }

  #[test]
  fn unchanged_run_is_not_penalised() {
    let report = verdict(&[], &all_present(1 << 20));
    assert_eq!(report.verdict, HealthVerdict::Healthy);
    assert!(report.deployment_ready);
    assert!(report.issues.is_empty());
  }

  #[test]
  fn small_total_size_adds_an_issue_only() {
    let report = verdict(&[loaded(FactFamily::Diurnes, 10, 10)], &all_present(100));
    assert_eq!(report.verdict, HealthVerdict::Healthy);
    assert_eq!(report.issues.len(), 1);
  }

  #[test]
  fn summary_aggregates_rejections_per_table() {
    let mut files = vec![loaded(FactFamily::Diurnes, 10, 7), loaded(FactFamily::Nuitees, 5, 5)];
    files[0].rejections.total = 3;
    files[0].rejections.by_kind.insert(RejectionKind::InvalidDate, 2);
    files[0].rejections.by_kind.insert(RejectionKind::NonPositiveVolume, 1);
    let summary = error_summary(&files, &all_present(1), 10);
    assert_eq!(summary.total_rejected, 3);
    assert_eq!(summary.by_table.len(), 1);
    assert_eq!(summary.by_table["fact_diurnes_temp"], 3);
    assert!(summary.issues.contains(&"2 row(s) rejected: invalid date".to_owned()));
    assert!(summary.issues.contains(&"1 row(s) rejected: non-positive volume".to_owned()));
  }
}
