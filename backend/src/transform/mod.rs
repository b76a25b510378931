//! Transformation module.
//!
//! This module turns a parsed table into dashboard-ready numbers:
//! - Clean: raw rows to typed, deduplicated records
//! - Aggregate: grouped totals, series and changes per selection
//! - Pipeline: parse, validate and clean in one call

pub mod aggregate;
pub mod clean;
pub mod pipeline;

pub use aggregate::{aggregate, AggregateResult, Change};
pub use clean::{clean, CleanOptions, CleanReport, MissingValuePolicy};
pub use pipeline::*;
