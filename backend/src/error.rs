//! Error types for the patient influx pipeline.
//!
//! - [`CsvError`] - reading and parsing the uploaded file
//! - [`SchemaError`] - required columns missing or unusable (fatal for a load)
//! - [`RowCoercionWarning`] - a single row dropped during cleaning (non-fatal)
//! - [`EmptySelectionError`] - a filter selection matched no rows (non-fatal)
//! - [`PipelineError`] - top-level wrapper used by the pipeline and session
//! - [`ServerError`] - HTTP layer errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use serde::Serialize;
use thiserror::Error;

use crate::models::FilterSelection;

// =============================================================================
// CSV Parsing Errors
// =============================================================================

/// Errors while reading or parsing a CSV file.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to decode the file content.
    #[error("Failed to decode content as {encoding}: {message}")]
    EncodingError { encoding: String, message: String },

    /// Invalid CSV format.
    #[error("Invalid CSV format at line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,

    /// Delimiter outside `, ; TAB |`.
    #[error("Unsupported delimiter {0:?} (expected one of , ; TAB |)")]
    UnsupportedDelimiter(char),
}

impl From<csv::Error> for CsvError {
    fn from(err: csv::Error) -> Self {
        let line = err
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(0);
        CsvError::ParseError {
            line,
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Schema Errors
// =============================================================================

/// Required columns are missing or carry no usable values.
///
/// Fatal for the upload: nothing is loaded.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("{}", schema_message(.missing, .invalid))]
pub struct SchemaError {
    /// Required fields with no matching column.
    pub missing: Vec<String>,
    /// Required numeric fields whose column holds no integer values.
    pub invalid: Vec<String>,
    /// Headers present in the file, for user feedback.
    pub available: Vec<String>,
}

fn schema_message(missing: &[String], invalid: &[String]) -> String {
    match (missing.is_empty(), invalid.is_empty()) {
        (false, true) => format!("Missing required columns: {}", missing.join(", ")),
        (true, false) => format!("Columns without integer values: {}", invalid.join(", ")),
        _ => format!(
            "Missing required columns: {}; columns without integer values: {}",
            missing.join(", "),
            invalid.join(", ")
        ),
    }
}

// =============================================================================
// Row Warnings
// =============================================================================

/// Why a data row was dropped during cleaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DropReason {
    MissingDepartment,
    MissingPatientCount,
    InvalidPatientCount { value: String },
    NegativePatientCount { value: String },
    PatientCountTooLarge { value: String },
    InvalidYear { value: String },
    InvalidQuarter { value: String },
    /// More non-empty cells than header columns, e.g. an unquoted `1,200`.
    ExtraFields { expected: usize, found: usize },
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::MissingDepartment => write!(f, "missing department"),
            DropReason::MissingPatientCount => write!(f, "missing patient count"),
            DropReason::InvalidPatientCount { value } => {
                write!(f, "patient count '{}' is not an integer", value)
            }
            DropReason::NegativePatientCount { value } => {
                write!(f, "patient count '{}' is negative", value)
            }
            DropReason::PatientCountTooLarge { value } => {
                write!(f, "patient count '{}' is out of range", value)
            }
            DropReason::InvalidYear { value } => write!(f, "year '{}' is not a 4-digit integer", value),
            DropReason::InvalidQuarter { value } => write!(f, "quarter '{}' is not one of Q1-Q4", value),
            DropReason::ExtraFields { expected, found } => {
                write!(f, "expected {} fields, saw {}", expected, found)
            }
        }
    }
}

/// A data row dropped during cleaning.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("Line {line}: {reason}")]
pub struct RowCoercionWarning {
    /// 1-based line in the source file.
    pub line: usize,
    pub reason: DropReason,
}

// =============================================================================
// Selection Errors
// =============================================================================

/// A filter selection matched zero cleaned rows.
///
/// Surfaced as a "no data for this selection" state, never as a failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("No data for this selection")]
pub struct EmptySelectionError {
    pub selection: FilterSelection,
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// CSV reading or parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Schema validation failed.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Export serialization failed.
    #[error("Export error: {0}")]
    Export(String),

    /// Operation requires a loaded dataset.
    #[error("No dataset loaded")]
    NoDataset,
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Unknown dataset id.
    #[error("Dataset not found: {0}")]
    NotFound(String),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// IO error while binding or serving.
    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
