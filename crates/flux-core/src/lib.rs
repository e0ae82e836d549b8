//! Core types and trait definitions for the FluxVision ingestion pipeline.
//!
//! This crate has no database or file-format dependencies. The store
//! backend and the pipeline both depend on it.

pub mod alias;
pub mod dimension;
pub mod error;
pub mod fact;
pub mod family;
pub mod normalize;
pub mod report;
pub mod warehouse;

pub use error::{Error, Result};
