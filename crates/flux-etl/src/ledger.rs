//! Change detection against a persisted hash ledger.
//!
//! The ledger maps a source file name to the hex SHA-256 of the content
//! last seen. It is updated as soon as a change is detected, before the load
//! is known to succeed, which gives at-least-once reprocessing.

use std::{
  collections::BTreeMap,
  fs,
  path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::{Error, Result};

/// Hex SHA-256 of a file's content.
pub fn hash_bytes(bytes: &[u8]) -> String { hex::encode(Sha256::digest(bytes)) }

#[derive(Debug, Clone)]
pub struct HashLedger {
  path:    PathBuf,
  entries: BTreeMap<String, String>,
}

impl HashLedger {
  /// Load the ledger at `path`. A missing file yields an empty ledger; an
  /// unreadable or corrupt one is logged and treated as empty.
  pub fn load(path: impl Into<PathBuf>) -> Self {
    let path = path.into();
    let entries = match fs::read(&path) {
      Ok(bytes) => match serde_json::from_slice(&bytes) {
        Ok(entries) => entries,
        Err(e) => {
          warn!(path = %path.display(), error = %e, "corrupt hash ledger, starting empty");
          BTreeMap::new()
        }
      },
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
      Err(e) => {
        warn!(path = %path.display(), error = %e, "unreadable hash ledger, starting empty");
        BTreeMap::new()
      }
    };
    Self { path, entries }
  }

  pub fn path(&self) -> &Path { &self.path }

  pub fn get(&self, file_name: &str) -> Option<&str> {
    self.entries.get(file_name).map(String::as_str)
  }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  /// Whether `hash` differs from the recorded entry, without mutating.
  pub fn differs(&self, file_name: &str, hash: &str) -> bool {
    self.get(file_name) != Some(hash)
  }

  /// Compare against the recorded entry and record `hash` on mismatch or
  /// absence. Returns whether the content changed.
  pub fn has_changed(&mut self, file_name: &str, hash: &str) -> bool {
    if !self.differs(file_name, hash) {
      return false;
    }
    self.record(file_name, hash);
    true
  }

  pub fn record(&mut self, file_name: &str, hash: &str) {
    self.entries.insert(file_name.to_owned(), hash.to_owned());
  }

  /// Persist through a temporary sibling file and a rename.
  pub fn save(&self) -> Result<()> {
    if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
      fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let json = serde_json::to_vec_pretty(&self.entries)?;
    let tmp = self.path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| Error::io(&tmp, e))?;
    fs::rename(&tmp, &self.path).map_err(|e| Error::io(&self.path, e))?;
    debug!(path = %self.path.display(), entries = self.entries.len(), "saved hash ledger");
    Ok(())
  }
}
