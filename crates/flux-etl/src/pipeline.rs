//! The invocation surface: `check`, `status`, `promote`, `promote_all`.

use std::{fs, time::Instant};

use chrono::Utc;
use flux_core::{
  family::FactFamily,
  report::{FileOutcome, FileOutcomeStatus, FileStatus, PromotionReport, RunReport},
  warehouse::Warehouse,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
  config::PipelineConfig,
  diagnostics,
  ledger::{hash_bytes, HashLedger},
  loader::{self, LoadOptions},
  locator::SourceLocator,
  parse::parse_bytes,
  promote::{self, PromoteOptions},
  resolve::RunContext,
  Error, Result,
};

/// Staging rows logged per loaded family at debug level.
const STAGING_SAMPLE: usize = 5;

/// The ingestion pipeline over a [`Warehouse`] backend.
pub struct Pipeline<W> {
  store:   W,
  config:  PipelineConfig,
  locator: SourceLocator,
  ledger:  HashLedger,
}

impl<W: Warehouse> Pipeline<W> {
  /// Build a pipeline; loads the hash ledger from the configured path.
  pub fn new(store: W, config: PipelineConfig) -> Self {
    let locator = SourceLocator::new(&config.data_root);
    let ledger = HashLedger::load(config.ledger_path());
    Self { store, config, locator, ledger }
  }

  pub fn store(&self) -> &W { &self.store }

  pub fn config(&self) -> &PipelineConfig { &self.config }

  pub fn ledger(&self) -> &HashLedger { &self.ledger }

  fn load_options(&self) -> LoadOptions {
    let (chunk_size, date_chunk_size) = self.config.chunk_sizes();
    LoadOptions { chunk_size, date_chunk_size, duplicate_policy: self.config.duplicate_policy }
  }

  fn promote_options(&self) -> PromoteOptions {
    let (chunk_size, _) = self.config.chunk_sizes();
    PromoteOptions { chunk_size, merge_policy: self.config.merge_policy }
  }

  // ── Invocation surface ────────────────────────────────────────────────────

  /// Presence and metadata of every expected source file.
  pub fn status(&self) -> Vec<FileStatus> {
    FactFamily::all()
      .map(|family| {
        diagnostics::file_status(&self.locator, &self.ledger, family, self.config.file_name(family))
      })
      .collect()
  }

  /// Load every changed (or, with `force`, every present) source file into
  /// its staging table and report on the run.
  pub fn check(&mut self, force: bool) -> RunReport {
    let started_at = Utc::now();
    let clock = Instant::now();
    let run_id = Uuid::new_v4();
    info!(%run_id, force, root = %self.locator.root().display(), "starting ingestion run");

    let file_status = self.status();
    let mut ctx = RunContext::new(self.config.alias_tables());
    let files: Vec<FileOutcome> = FactFamily::all()
      .map(|family| self.process_family(&mut ctx, family, force))
      .collect();

    let global = diagnostics::global_stats(&files, &file_status);
    let errors =
      diagnostics::error_summary(&files, &file_status, self.config.rejection_sample_limit);
    let health = diagnostics::health(&global, &errors, &file_status);
    let changes_detected = files.iter().any(|f| f.status == FileOutcomeStatus::Loaded);

    info!(
      %run_id,
      read = global.total_read,
      mapped = global.total_mapped,
      rejected = global.total_rejected,
      inserted = global.total_inserted,
      verdict = ?health.verdict,
      "ingestion run finished"
    );

    RunReport {
      run_id,
      started_at,
      duration_ms: clock.elapsed().as_millis() as u64,
      forced: force,
      changes_detected,
      files,
      global,
      file_status,
      errors,
      health,
      dimensions: ctx.counters().clone(),
    }
  }

  /// Promote one family's staging table into production.
  pub fn promote(&self, family: FactFamily) -> PromotionReport {
    promote::promote(&self.store, family, &self.promote_options())
  }

  /// Promote every family, skipping those without a staging table.
  pub fn promote_all(&self) -> Vec<PromotionReport> {
    promote::promote_all(&self.store, &self.promote_options())
  }

  // ── Per-family processing ─────────────────────────────────────────────────

  fn process_family(&mut self, ctx: &mut RunContext, family: FactFamily, force: bool) -> FileOutcome {
    let file_name = self.config.file_name(family).to_owned();
    match self.try_process_family(ctx, family, &file_name, force) {
      Ok(outcome) => outcome,
      Err(e) => {
        error!(%family, file = %file_name, error = %e, "file processing failed");
        let mut outcome = FileOutcome::new(family, file_name.as_str(), FileOutcomeStatus::Failed);
        outcome.path = self.locator.locate(&file_name);
        outcome.error = Some(e.to_string());
        outcome
      }
    }
  }

  fn try_process_family(
    &mut self,
    ctx:       &mut RunContext,
    family:    FactFamily,
    file_name: &str,
    force:     bool,
  ) -> Result<FileOutcome> {
    self.store.ensure_staging(family).map_err(Error::store)?;

    let Some(path) = self.locator.locate(file_name) else {
      warn!(%family, file = file_name, "source file not found");
      return Ok(FileOutcome::new(family, file_name, FileOutcomeStatus::NoFile));
    };
    let bytes = fs::read(&path).map_err(|e| Error::io(&path, e))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
      info!(%family, path = %path.display(), "source file is empty");
      let mut outcome = FileOutcome::new(family, file_name, FileOutcomeStatus::NoFile);
      outcome.path = Some(path);
      return Ok(outcome);
    }

    let hash = hash_bytes(&bytes);
    let changed = self.ledger.has_changed(file_name, &hash);
    if changed && let Err(e) = self.ledger.save() {
      warn!(path = %self.ledger.path().display(), error = %e, "could not persist hash ledger");
    }
    if !changed && !force {
      debug!(%family, file = file_name, "unchanged, skipping");
      let mut outcome = FileOutcome::new(family, file_name, FileOutcomeStatus::Unchanged);
      outcome.path = Some(path);
      return Ok(outcome);
    }

    let parsed = parse_bytes(&bytes)?;
    info!(
      %family,
      path = %path.display(),
      encoding = ?parsed.encoding,
      rows = parsed.rows_read(),
      "loading source file"
    );

    let batch = loader::map_file(
      &self.store,
      ctx,
      family,
      &parsed,
      self.config.rejection_sample_limit,
    );
    let mut outcome = FileOutcome::new(family, file_name, FileOutcomeStatus::Loaded);
    outcome.path = Some(path);
    outcome.encoding = Some(parsed.encoding);
    outcome.rows_read = parsed.rows_read();
    outcome.rows_mapped = batch.rows.len() as u64;
    outcome.rows_rejected = batch.rejections.total;
    outcome.rejections = batch.rejections;

    let counts = loader::load(&self.store, family, batch.rows, &self.load_options());
    outcome.deleted = counts.deleted;
    outcome.inserted = counts.inserted;
    outcome.ignored = counts.ignored;
    outcome.skipped = counts.skipped;
    outcome.chunk_failures = counts.chunk_failures;

    info!(
      %family,
      read = outcome.rows_read,
      mapped = outcome.rows_mapped,
      rejected = outcome.rows_rejected,
      deleted = outcome.deleted,
      inserted = outcome.inserted,
      "loaded staging table"
    );
    self.log_staging_sample(family);
    Ok(outcome)
  }

  fn log_staging_sample(&self, family: FactFamily) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
      return;
    }
    match self.store.staging_rows(family, Some(STAGING_SAMPLE)) {
      Ok(rows) => {
        for row in rows {
          debug!(%family, ?row, "staging sample");
        }
      }
      Err(e) => debug!(%family, error = %e, "could not read staging sample"),
    }
  }
}
