//! Schema validation for uploaded patient tables.
//!
//! Two levels of checking live here:
//!
//! ## Table schema
//! [`validate_schema`] binds the four required fields (`Department`,
//! `Quarter`, `Year`, `Patient_Count`) to columns of a [`RawTable`] and
//! checks that the numeric columns actually hold integers. Header matching
//! is case-insensitive and tolerant of spaces, dots and dashes, with a short
//! alias list per field (`dept`, `ward`, `qtr`, `yr`, `patients`, ...).
//!
//! ## Record schema
//! [`validate_record`] checks one exported record against the embedded
//! JSON Schema (`schemas/patient-record.json`, draft 7).
//!
//! # Example
//!
//! ```rust,ignore
//! use influx::{parse_bytes_auto, validate_schema, ColumnOverrides};
//!
//! let table = parse_bytes_auto(b"Dept,Qtr,Yr,No. of Patients\nER,Q1,2022,100")?;
//! let columns = validate_schema(&table, &ColumnOverrides::default())?;
//! assert_eq!(columns.header(&table, Field::PatientCount), "No. of Patients");
//! ```

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchemaError;
use crate::parser::RawTable;

// =============================================================================
// Fields
// =============================================================================

/// A required field of the patient table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Department,
    Quarter,
    Year,
    PatientCount,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::Department, Field::Quarter, Field::Year, Field::PatientCount];

    /// Header name used on export.
    pub fn column_name(&self) -> &'static str {
        match self {
            Field::Department => "Department",
            Field::Quarter => "Quarter",
            Field::Year => "Year",
            Field::PatientCount => "Patient_Count",
        }
    }

    /// Normalized header names accepted for this field, best match first.
    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Field::Department => &["department", "dept", "dep", "ward", "unit", "division", "section"],
            Field::Quarter => &["quarter", "qtr", "quarters", "q", "period"],
            Field::Year => &["year", "yr", "years", "date_year", "time_year"],
            Field::PatientCount => &[
                "patient_count",
                "patients",
                "no_of_patients",
                "num_patients",
                "patient_total",
                "number_of_patients",
                "patient",
                "count",
                "total",
                "number",
            ],
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, Field::Year | Field::PatientCount)
    }
}

/// Normalize a header for matching: lowercase, separators folded to `_`.
pub fn normalize_header(header: &str) -> String {
    let folded: String = header
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();

    folded
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

// =============================================================================
// Column binding
// =============================================================================

/// User-supplied header names that replace auto-detection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnOverrides {
    pub department: Option<String>,
    pub quarter: Option<String>,
    pub year: Option<String>,
    pub patient_count: Option<String>,
}

impl ColumnOverrides {
    fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::Department => self.department.as_deref(),
            Field::Quarter => self.quarter.as_deref(),
            Field::Year => self.year.as_deref(),
            Field::PatientCount => self.patient_count.as_deref(),
        }
    }
}

/// Column index of every required field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub department: usize,
    pub quarter: usize,
    pub year: usize,
    pub patient_count: usize,
}

impl ColumnMap {
    pub fn index(&self, field: Field) -> usize {
        match field {
            Field::Department => self.department,
            Field::Quarter => self.quarter,
            Field::Year => self.year,
            Field::PatientCount => self.patient_count,
        }
    }

    /// Source header bound to `field`.
    pub fn header<'a>(&self, table: &'a RawTable, field: Field) -> &'a str {
        table
            .headers
            .get(self.index(field))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Bind each field to a column. Fields without a match are absent.
///
/// Exact alias matches are resolved for every field before token matches
/// (`"Total Patients"` contains the token `patients`), and a column is never
/// bound twice.
pub fn detect_columns(headers: &[String]) -> Vec<(Field, usize)> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    let mut bound: Vec<(Field, usize)> = Vec::new();

    let is_taken = |bound: &[(Field, usize)], idx: usize| bound.iter().any(|(_, i)| *i == idx);
    let is_bound = |bound: &[(Field, usize)], field: Field| bound.iter().any(|(f, _)| *f == field);

    // Pass 1: whole-header alias match, in alias priority order
    for field in Field::ALL {
        for alias in field.aliases() {
            let hit = normalized
                .iter()
                .enumerate()
                .find(|(idx, h)| h.as_str() == *alias && !is_taken(&bound, *idx));
            if let Some((idx, _)) = hit {
                bound.push((field, idx));
                break;
            }
        }
    }

    // Pass 2: alias appears as a token of a longer header
    for field in Field::ALL {
        if is_bound(&bound, field) {
            continue;
        }
        'aliases: for alias in field.aliases().iter().filter(|a| a.len() > 1) {
            for (idx, header) in normalized.iter().enumerate() {
                if is_taken(&bound, idx) {
                    continue;
                }
                let has_token = header.split('_').any(|token| token == *alias)
                    || (alias.contains('_') && header.contains(*alias));
                if has_token {
                    bound.push((field, idx));
                    break 'aliases;
                }
            }
        }
    }

    bound
}

/// Validate a table's schema and bind the required columns.
///
/// Fails with every missing or invalid field listed; never recovers
/// partially.
pub fn validate_schema(table: &RawTable, overrides: &ColumnOverrides) -> Result<ColumnMap, SchemaError> {
    let detected = detect_columns(&table.headers);
    let mut missing = Vec::new();
    let mut indices = [0usize; 4];

    for (slot, field) in Field::ALL.iter().enumerate() {
        let index = match overrides.get(*field) {
            Some(name) => {
                let wanted = normalize_header(name);
                table.headers.iter().position(|h| normalize_header(h) == wanted)
            }
            None => detected.iter().find(|(f, _)| f == field).map(|(_, i)| *i),
        };

        match index {
            Some(i) => indices[slot] = i,
            None => missing.push(field.column_name().to_string()),
        }
    }

    let invalid: Vec<String> = if missing.is_empty() && !table.rows.is_empty() {
        Field::ALL
            .iter()
            .enumerate()
            .filter(|(_, field)| field.is_numeric())
            .filter(|(slot, _)| {
                !table
                    .rows
                    .iter()
                    .any(|row| coerce_integer(table.cell(row, indices[*slot])).is_some())
            })
            .map(|(_, field)| field.column_name().to_string())
            .collect()
    } else {
        Vec::new()
    };

    if !missing.is_empty() || !invalid.is_empty() {
        return Err(SchemaError {
            missing,
            invalid,
            available: table.headers.clone(),
        });
    }

    Ok(ColumnMap {
        department: indices[0],
        quarter: indices[1],
        year: indices[2],
        patient_count: indices[3],
    })
}

// =============================================================================
// Value coercion
// =============================================================================

/// Spellings treated as an empty numeric cell. Department names are only
/// missing when blank, so a department called `NA` survives.
const MISSING_MARKERS: &[&str] = &["", "na", "n/a", "#n/a", "nan", "null", "none", "<na>", "-"];

/// Whether a numeric cell counts as missing.
pub fn is_missing(value: &str) -> bool {
    let lowered = value.trim().to_lowercase();
    MISSING_MARKERS.contains(&lowered.as_str())
}

/// Coerce a cell to an integer.
///
/// Thousands separators and inner spaces are ignored; integral decimals
/// such as `"120.0"` are accepted, fractional ones are not.
pub fn coerce_integer(value: &str) -> Option<i64> {
    let cleaned: String = value
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    if let Ok(n) = cleaned.parse::<i64>() {
        return Some(n);
    }

    match cleaned.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(f as i64),
        _ => None,
    }
}

// =============================================================================
// Record schema (JSON Schema)
// =============================================================================

static RECORD_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/patient-record.json"))
        .expect("Invalid embedded schema")
});

static RECORD_VALIDATOR: Lazy<jsonschema::Validator> =
    Lazy::new(|| jsonschema::draft7::new(&RECORD_SCHEMA).expect("Invalid embedded schema"));

/// Validate one record against the embedded patient record schema.
pub fn validate_record(data: &Value) -> Result<(), Vec<String>> {
    let errors: Vec<String> = RECORD_VALIDATOR
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick check against the patient record schema.
pub fn is_valid_record(data: &Value) -> bool {
    RECORD_VALIDATOR.is_valid(data)
}

/// Validate a batch of records, keeping at most `max_reported` error lists.
///
/// Returns `(valid, invalid, errors by record index)`.
pub fn validate_records(records: &[Value], max_reported: usize) -> (usize, usize, Vec<(usize, Vec<String>)>) {
    let mut valid = 0;
    let mut invalid = 0;
    let mut errors = Vec::new();

    for (i, record) in records.iter().enumerate() {
        match validate_record(record) {
            Ok(()) => valid += 1,
            Err(errs) => {
                invalid += 1;
                if errors.len() < max_reported {
                    errors.push((i, errs));
                }
            }
        }
    }

    (valid, invalid, errors)
}
