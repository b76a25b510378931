//! REST API types for dashboard clients.
//!
//! Field names are camelCase throughout so a JavaScript client can use the
//! payloads as-is.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{RowCoercionWarning, SchemaError};
use crate::transform::pipeline::{ColumnBinding, CsvInfo, LoadResult};

/// Dropped rows listed individually in a response.
const MAX_REPORTED_DROPS: usize = 100;

/// Response sent after a CSV upload, and by `GET /api/datasets/{id}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetResponse {
    pub dataset_id: Uuid,

    /// "ready" when every row was kept, "warning" when rows were dropped
    pub status: String,

    pub loaded_at: DateTime<Utc>,

    /// Departments available for selection, sorted
    pub departments: Vec<String>,

    pub years: Vec<i32>,

    pub metadata: ResponseMetadata,
}

/// Metadata about the load
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub csv_info: CsvMetadata,

    /// Source header bound to each required field
    pub columns: ColumnBinding,

    pub report: LoadReport,
}

/// CSV file metadata
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvMetadata {
    pub encoding: String,
    pub delimiter: String,
    pub row_count: usize,
    pub columns: Vec<String>,
}

impl From<&CsvInfo> for CsvMetadata {
    fn from(info: &CsvInfo) -> Self {
        Self {
            encoding: info.encoding.clone(),
            delimiter: info.delimiter.to_string(),
            row_count: info.row_count,
            columns: info.headers.clone(),
        }
    }
}

/// Cleaning statistics
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub input_rows: usize,
    pub kept_rows: usize,
    pub duplicates_removed: usize,
    pub imputed_rows: usize,
    pub dropped_rows: usize,
    /// First dropped rows with their reason
    pub dropped: Vec<RowCoercionWarning>,
    pub summary: String,
}

impl DatasetResponse {
    pub fn new(id: Uuid, loaded: &LoadResult) -> Self {
        let report = &loaded.report;
        let status = if report.dropped.is_empty() { "ready" } else { "warning" };

        Self {
            dataset_id: id,
            status: status.to_string(),
            loaded_at: loaded.dataset.loaded_at(),
            departments: loaded.dataset.departments(),
            years: loaded.dataset.years(),
            metadata: ResponseMetadata {
                csv_info: CsvMetadata::from(&loaded.csv_info),
                columns: loaded.columns.clone(),
                report: LoadReport {
                    input_rows: report.input_rows,
                    kept_rows: report.kept_rows,
                    duplicates_removed: report.duplicates_removed,
                    imputed_rows: report.imputed_rows,
                    dropped_rows: report.dropped_count(),
                    dropped: report.dropped.iter().take(MAX_REPORTED_DROPS).cloned().collect(),
                    summary: report.summary(),
                },
            },
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}

/// Error response for a rejected file, naming the missing columns.
pub fn schema_error_response(err: &SchemaError) -> Value {
    json!({
        "status": "error",
        "error": err.to_string(),
        "missingColumns": err.missing,
        "invalidColumns": err.invalid,
        "availableColumns": err.available,
    })
}
