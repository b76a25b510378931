//! # Influx - quarterly hospital patient influx analysis
//!
//! Influx loads patient-count CSV exports (one row per department, quarter
//! and year), validates and cleans them, and aggregates the result into
//! chart-ready numbers for a dashboard.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│  Validator  │────▶│   Cleaner   │────▶│   Dataset   │
//! │  (ISO/UTF8) │     │  (auto-enc) │     │  (columns)  │     │ (typed rows)│     │ (immutable) │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                                                        │ selection
//!                                         ┌─────────────┐     ┌─────────────┐     ┌──────▼──────┐
//!                                         │  Dashboard  │◀────│  Presenter  │◀────│ Aggregator  │
//!                                         │  JSON / CSV │     │  (charts)   │     │  (cached)   │
//!                                         └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use influx::{FilterSelection, LoadOptions, Session};
//!
//! let mut session = Session::new();
//! let loaded = session.load(&std::fs::read("patients.csv")?, &LoadOptions::default())?;
//! println!("{}", loaded.report.summary());
//!
//! session.select(FilterSelection::for_departments(["ER", "ICU"]));
//! let dashboard = session.view()?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Domain models (Record, Dataset, FilterSelection)
//! - [`parser`] - CSV parsing with auto-detection
//! - [`validation`] - Column binding, value coercion, record schema
//! - [`transform`] - Cleaning, aggregation and the load pipeline
//! - [`cache`] - Aggregate memoization
//! - [`present`] - Chart series and CSV export
//! - [`session`] - Per-user state
//! - [`config`] - Server configuration
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Validation
pub mod validation;

// Transformation
pub mod transform;

// Caching
pub mod cache;

// Presentation
pub mod present;

// State and configuration
pub mod config;
pub mod session;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    CsvError,
    DropReason,
    EmptySelectionError,
    PipelineError,
    PipelineResult,
    RowCoercionWarning,
    SchemaError,
    ServerError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    department_key,
    Dataset,
    DepartmentFilter,
    FilterSelection,
    Period,
    Quarter,
    Record,
};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_content,
    detect_delimiter,
    detect_encoding,
    is_supported_delimiter,
    parse_bytes_auto,
    parse_file_auto,
    RawTable,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{
    detect_columns,
    is_valid_record,
    validate_record,
    validate_records,
    validate_schema,
    ColumnMap,
    ColumnOverrides,
    Field,
};

// =============================================================================
// Re-exports - Cleaning and aggregation
// =============================================================================

pub use transform::{
    aggregate,
    clean,
    AggregateResult,
    Change,
    CleanOptions,
    CleanReport,
    MissingValuePolicy,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    load_bytes,
    load_csv,
    load_table,
    view,
    ColumnBinding,
    CsvInfo,
    LoadOptions,
    LoadResult,
};

// =============================================================================
// Re-exports - Cache, presentation, session
// =============================================================================

pub use cache::AggregateCache;

pub use present::{
    export_csv_string,
    export_table,
    write_export_csv,
    DashboardView,
};

pub use session::Session;

pub use config::ServerConfig;

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{
    error_response,
    DatasetResponse,
    LoadReport,
};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server, AppState};
}
