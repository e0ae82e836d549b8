//! Pipeline configuration, deserialised from `fluxvision.toml` and `FLUX_*`
//! environment variables by the binary.

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
};

use flux_core::{
  alias::AliasTable,
  dimension::Dimension,
  family::FactFamily,
  warehouse::{DuplicatePolicy, MergePolicy},
};
use serde::{Deserialize, Serialize};

/// Name of the ledger file when `ledger_path` is not set.
pub const DEFAULT_LEDGER_FILE: &str = ".flux_ledger.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// Directory searched (recursively) for the source exports.
  pub data_root:              PathBuf,
  /// Hash ledger location; defaults to a file inside `data_root`.
  pub ledger_path:            Option<PathBuf>,
  /// Rows per staging insert transaction and per promotion batch.
  pub chunk_size:             usize,
  /// Dates per partition-delete transaction.
  pub date_chunk_size:        usize,
  /// Rejected rows kept as samples, per file.
  pub rejection_sample_limit: usize,
  pub duplicate_policy:       DuplicatePolicy,
  pub merge_policy:           MergePolicy,
  /// Source file name overrides.
  pub files:                  BTreeMap<FactFamily, String>,
  /// Extra alias entries (raw → canonical), merged over the built-ins.
  pub aliases:                BTreeMap<Dimension, BTreeMap<String, String>>,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      data_root:              PathBuf::from("data"),
      ledger_path:            None,
      chunk_size:             1000,
      date_chunk_size:        500,
      rejection_sample_limit: 20,
      duplicate_policy:       DuplicatePolicy::default(),
      merge_policy:           MergePolicy::default(),
      files:                  BTreeMap::new(),
      aliases:                BTreeMap::new(),
    }
  }
}

impl PipelineConfig {
  pub fn with_data_root(data_root: impl Into<PathBuf>) -> Self {
    Self { data_root: data_root.into(), ..Self::default() }
  }

  /// Expand a leading `~` in every configured path.
  pub fn expand_paths(mut self) -> Self {
    self.data_root = expand_tilde(&self.data_root);
    self.ledger_path = self.ledger_path.as_deref().map(expand_tilde);
    self
  }

  pub fn ledger_path(&self) -> PathBuf {
    self
      .ledger_path
      .clone()
      .unwrap_or_else(|| self.data_root.join(DEFAULT_LEDGER_FILE))
  }

  /// Source file name of `family`, honouring overrides.
  pub fn file_name(&self, family: FactFamily) -> &str {
    self
      .files
      .get(&family)
      .map_or(family.default_file_name(), String::as_str)
  }

  /// Built-in alias tables extended with the configured entries.
  pub fn alias_tables(&self) -> BTreeMap<Dimension, AliasTable> {
    Dimension::all()
      .map(|dimension| {
        let mut table = AliasTable::builtin(dimension);
        if let Some(extra) = self.aliases.get(&dimension) {
          table.extend(extra);
        }
        (dimension, table)
      })
      .collect()
  }

  /// Clamp sizes that would make chunking degenerate.
  pub(crate) fn chunk_sizes(&self) -> (usize, usize) {
    (self.chunk_size.max(1), self.date_chunk_size.max(1))
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
