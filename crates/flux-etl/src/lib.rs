//! The FluxVision ingestion pipeline: source discovery, change detection,
//! parsing, dimension resolution, incremental staging loads, promotion and
//! run diagnostics.
//!
//! Generic over [`flux_core::warehouse::Warehouse`]; the binary wires it to
//! the SQLite backend.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod ledger;
pub mod loader;
pub mod locator;
pub mod parse;
pub mod pipeline;
pub mod promote;
pub mod resolve;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use pipeline::Pipeline;
