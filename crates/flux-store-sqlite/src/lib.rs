//! SQLite backend for the FluxVision star schema.
//!
//! Implements [`flux_core::warehouse::Warehouse`] over a single
//! [`rusqlite::Connection`]. Dimension and production tables are created at
//! open time; staging tables are provisioned on demand from each family's
//! grain template.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteWarehouse;

#[cfg(test)]
mod tests;
