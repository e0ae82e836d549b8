//! Error types for `flux-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown fact family: {0:?}")]
  UnknownFamily(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
