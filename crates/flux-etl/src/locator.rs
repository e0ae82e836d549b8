//! Finds source exports under the data root.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

/// Locates a named file directly under the root, or anywhere below it with
/// a case-insensitive name match.
#[derive(Debug, Clone)]
pub struct SourceLocator {
  root: PathBuf,
}

impl SourceLocator {
  pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

  pub fn root(&self) -> &Path { &self.root }

  /// Path of `file_name`, or `None` when no such file exists.
  ///
  /// Symbolic links are not followed. The shallowest match wins; ties at
  /// the same depth go to the first in name order.
  pub fn locate(&self, file_name: &str) -> Option<PathBuf> {
    let direct = self.root.join(file_name);
    if direct.is_file() {
      return Some(direct);
    }

    let found = WalkDir::new(&self.root)
      .sort_by_file_name()
      .into_iter()
      .filter_map(|entry| match entry {
        Ok(entry) => Some(entry),
        Err(e) => {
          if e.depth() > 0 {
            warn!(error = %e, "cannot read directory entry");
          }
          None
        }
      })
      .filter(|entry| {
        entry.file_type().is_file()
          && entry.file_name().to_string_lossy().eq_ignore_ascii_case(file_name)
      })
      .min_by_key(|entry| entry.depth())?;

    debug!(file = file_name, path = %found.path().display(), "located source file");
    Some(found.into_path())
  }
}
