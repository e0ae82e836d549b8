//! Error type for `flux-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] rusqlite::Error),

  #[error("date parse error: {0}")]
  DateParse(String),

  /// A column outside the family's grain template was requested.
  #[error("column {column:?} is not part of table {table}")]
  UnknownColumn { table: String, column: String },

  /// A natural-key column is missing from the promoted column set.
  #[error("natural key column {column:?} missing for table {table}")]
  MissingKeyColumn { table: String, column: String },

  #[error("invalid SQL identifier: {0:?}")]
  InvalidIdentifier(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
