//! Data cleaning: raw table rows into typed [`Record`]s.
//!
//! Rules, applied per row in input order:
//!
//! 0. A row with non-empty cells past the last header is dropped; an unquoted
//!    `1,200` would otherwise load as `1`.
//! 1. `department` is trimmed and inner whitespace collapsed; spellings that
//!    differ only in case collapse to the first spelling seen. Only an empty
//!    cell is missing: `NA` or `-` are kept as department names.
//! 2. `quarter` is normalized (`q1`, `1`, `first`, `Quarter 1` → `Q1`);
//!    anything else drops the row.
//! 3. `year` must coerce to a 4-digit integer.
//! 4. `patient_count` must coerce to an integer in `0..=MAX_PATIENT_COUNT`.
//!    A missing value is dropped or imputed according to [`MissingValuePolicy`].
//! 5. Rows identical after normalization are kept once.
//!
//! Malformed rows never fail the clean; each one becomes a
//! [`RowCoercionWarning`] in the [`CleanReport`].

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{DropReason, RowCoercionWarning};
use crate::models::{department_key, Dataset, Quarter, Record};
use crate::parser::{RawRow, RawTable};
use crate::validation::{coerce_integer, is_missing, ColumnMap};

/// Largest accepted patient count. Keeps every sum of counts within `u64`.
pub const MAX_PATIENT_COUNT: u64 = u32::MAX as u64;

/// What to do with a row whose patient count is missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingValuePolicy {
    /// Drop the row and report it.
    #[default]
    Drop,
    /// Keep the row with a patient count of zero.
    Zero,
}

/// Options for [`clean`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanOptions {
    #[serde(default)]
    pub missing_patient_count: MissingValuePolicy,
}

/// Summary of one cleaning run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanReport {
    /// Data rows read from the file.
    pub input_rows: usize,
    /// Rows kept in the dataset.
    pub kept_rows: usize,
    /// Exact duplicates removed.
    pub duplicates_removed: usize,
    /// Rows whose missing patient count was imputed as zero.
    pub imputed_rows: usize,
    /// Rows dropped for invalid or missing values.
    pub dropped: Vec<RowCoercionWarning>,
}

impl CleanReport {
    pub fn dropped_count(&self) -> usize {
        self.dropped.len()
    }

    /// Dropped rows grouped by reason kind, with their line numbers.
    pub fn drops_by_reason(&self) -> Vec<(String, Vec<usize>)> {
        let mut grouped: Vec<(String, Vec<usize>)> = Vec::new();
        for warning in &self.dropped {
            let key = reason_kind(&warning.reason).to_string();
            match grouped.iter_mut().find(|(k, _)| *k == key) {
                Some((_, lines)) => lines.push(warning.line),
                None => grouped.push((key, vec![warning.line])),
            }
        }
        grouped
    }

    /// One-line summary for user-facing messages.
    pub fn summary(&self) -> String {
        format!(
            "Kept {} of {} rows ({} dropped, {} duplicates removed, {} imputed)",
            self.kept_rows,
            self.input_rows,
            self.dropped.len(),
            self.duplicates_removed,
            self.imputed_rows
        )
    }
}

fn reason_kind(reason: &DropReason) -> &'static str {
    match reason {
        DropReason::MissingDepartment => "missing department",
        DropReason::MissingPatientCount => "missing patient count",
        DropReason::InvalidPatientCount { .. } => "non-integer patient count",
        DropReason::NegativePatientCount { .. } => "negative patient count",
        DropReason::PatientCountTooLarge { .. } => "patient count out of range",
        DropReason::InvalidYear { .. } => "invalid year",
        DropReason::InvalidQuarter { .. } => "invalid quarter",
        DropReason::ExtraFields { .. } => "extra fields",
    }
}

/// Maps department spellings onto the first spelling seen.
#[derive(Debug, Default)]
struct DepartmentNames {
    canonical: HashMap<String, String>,
}

impl DepartmentNames {
    fn canonicalize(&mut self, raw: &str) -> Option<String> {
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            return None;
        }
        let name = self
            .canonical
            .entry(department_key(&collapsed))
            .or_insert(collapsed);
        Some(name.clone())
    }
}

/// Clean a validated table into a dataset.
pub fn clean(table: &RawTable, columns: &ColumnMap, options: &CleanOptions) -> (Dataset, CleanReport) {
    let mut names = DepartmentNames::default();
    let mut seen: HashSet<Record> = HashSet::new();
    let mut records = Vec::new();
    let mut report = CleanReport {
        input_rows: table.rows.len(),
        ..CleanReport::default()
    };

    for row in &table.rows {
        let (record, imputed) = match clean_row(table, row, columns, options, &mut names) {
            Ok(cleaned) => cleaned,
            Err(reason) => {
                report.dropped.push(RowCoercionWarning { line: row.line, reason });
                continue;
            }
        };

        if !seen.insert(record.clone()) {
            report.duplicates_removed += 1;
            continue;
        }

        if imputed {
            report.imputed_rows += 1;
        }
        records.push(record);
    }

    report.kept_rows = records.len();
    (Dataset::new(records), report)
}

/// Clean one row; the flag is set when the patient count was imputed.
fn clean_row(
    table: &RawTable,
    row: &RawRow,
    columns: &ColumnMap,
    options: &CleanOptions,
    names: &mut DepartmentNames,
) -> Result<(Record, bool), DropReason> {
    let expected = table.headers.len();
    if row.cells.iter().skip(expected).any(|cell| !cell.is_empty()) {
        return Err(DropReason::ExtraFields {
            expected,
            found: row.cells.len(),
        });
    }

    let department_raw = table.cell(row, columns.department);
    let quarter_raw = table.cell(row, columns.quarter);
    let year_raw = table.cell(row, columns.year);
    let count_raw = table.cell(row, columns.patient_count);

    let quarter = Quarter::from_label(quarter_raw).ok_or_else(|| DropReason::InvalidQuarter {
        value: quarter_raw.to_string(),
    })?;

    let year = coerce_year(year_raw).ok_or_else(|| DropReason::InvalidYear {
        value: year_raw.to_string(),
    })?;

    let (patient_count, imputed) = if is_missing(count_raw) {
        match options.missing_patient_count {
            MissingValuePolicy::Drop => return Err(DropReason::MissingPatientCount),
            MissingValuePolicy::Zero => (0, true),
        }
    } else {
        (coerce_patient_count(count_raw)?, false)
    };

    // Last, so a dropped row never claims a canonical department spelling.
    let department = names
        .canonicalize(department_raw)
        .ok_or(DropReason::MissingDepartment)?;

    Ok((Record::new(department, quarter, year, patient_count), imputed))
}

fn coerce_year(value: &str) -> Option<i32> {
    coerce_integer(value)
        .filter(|y| (1000..=9999).contains(y))
        .map(|y| y as i32)
}

fn coerce_patient_count(value: &str) -> Result<u64, DropReason> {
    match coerce_integer(value) {
        Some(n) if n < 0 => Err(DropReason::NegativePatientCount {
            value: value.to_string(),
        }),
        Some(n) => u64::try_from(n)
            .ok()
            .filter(|n| *n <= MAX_PATIENT_COUNT)
            .ok_or_else(|| DropReason::PatientCountTooLarge {
                value: value.to_string(),
            }),
        None => Err(DropReason::InvalidPatientCount {
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;
    use crate::validation::{validate_schema, ColumnOverrides};

    fn run(csv: &str, options: CleanOptions) -> (Dataset, CleanReport) {
        let table = parse_str(csv, ',', "utf-8".to_string()).unwrap();
        let columns = validate_schema(&table, &ColumnOverrides::default()).unwrap();
        clean(&table, &columns, &options)
    }

    const HEADER: &str = "Department,Quarter,Year,Patient_Count";

    #[test]
    fn test_exact_duplicates_removed() {
        let csv = format!("{HEADER}\nER,Q1,2022,100\nER,Q1,2022,100\nICU,Q2,2022,50");
        let (dataset, report) = run(&csv, CleanOptions::default());

        assert_eq!(dataset.len(), 2);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.dropped_count(), 0);
        assert_eq!(dataset.records()[0], Record::new("ER", Quarter::Q1, 2022, 100));
        assert_eq!(dataset.records()[1], Record::new("ICU", Quarter::Q2, 2022, 50));
    }

    #[test]
    fn test_not_available_count_dropped_and_reported() {
        let csv = format!("{HEADER}\nER,Q1,2022,N/A\nICU,Q2,2022,50");
        let (dataset, report) = run(&csv, CleanOptions::default());

        assert_eq!(dataset.len(), 1);
        assert_eq!(report.dropped_count(), 1);
        assert_eq!(report.dropped[0].line, 2);
        assert_eq!(report.dropped[0].reason, DropReason::MissingPatientCount);
    }

    #[test]
    fn test_zero_policy_imputes_missing_counts() {
        let csv = format!("{HEADER}\nER,Q1,2022,\nICU,Q2,2022,50");
        let options = CleanOptions {
            missing_patient_count: MissingValuePolicy::Zero,
        };
        let (dataset, report) = run(&csv, options);

        assert_eq!(dataset.len(), 2);
        assert_eq!(report.imputed_rows, 1);
        assert_eq!(dataset.records()[0].patient_count, 0);
    }

    #[test]
    fn test_department_variants_collapse_to_first_spelling() {
        let csv = format!(
            "{HEADER}\n Emergency  Room ,Q1,2022,10\nEMERGENCY ROOM,Q2,2022,20\nemergency room,Q1,2022,10"
        );
        let (dataset, report) = run(&csv, CleanOptions::default());

        assert_eq!(dataset.departments(), vec!["Emergency Room"]);
        assert_eq!(report.duplicates_removed, 1);
    }

    #[test]
    fn test_coercions_and_drop_reasons() {
        let csv = format!(
            "{HEADER}\nER,quarter 3,2022.0,\"1,200\"\nER,Q5,2022,1\nER,Q1,22,1\nER,Q1,2022,-4\nER,Q1,2022,12.5\n,Q1,2022,3"
        );
        let (dataset, report) = run(&csv, CleanOptions::default());

        assert_eq!(dataset.records(), &[Record::new("ER", Quarter::Q3, 2022, 1200)]);
        let reasons: Vec<&DropReason> = report.dropped.iter().map(|w| &w.reason).collect();
        assert!(matches!(reasons[0], DropReason::InvalidQuarter { value } if value == "Q5"));
        assert!(matches!(reasons[1], DropReason::InvalidYear { value } if value == "22"));
        assert!(matches!(reasons[2], DropReason::NegativePatientCount { .. }));
        assert!(matches!(reasons[3], DropReason::InvalidPatientCount { .. }));
        assert_eq!(reasons[4], &DropReason::MissingDepartment);
        assert_eq!(report.input_rows, 6);
        assert_eq!(report.kept_rows, 1);
    }

    #[test]
    fn test_drops_grouped_by_reason() {
        let csv = format!("{HEADER}\nER,Q9,2022,1\nER,Q1,2022,x\nER,Q0,2022,1");
        let (_, report) = run(&csv, CleanOptions::default());

        let grouped = report.drops_by_reason();
        assert_eq!(grouped[0], ("invalid quarter".to_string(), vec![2, 4]));
        assert_eq!(grouped[1], ("non-integer patient count".to_string(), vec![3]));
    }

    #[test]
    fn test_unquoted_thousands_separator_dropped() {
        let csv = format!("{HEADER}\nER,Q1,2022,1,200\nICU,Q2,2022,50");
        let (dataset, report) = run(&csv, CleanOptions::default());

        assert_eq!(dataset.records(), &[Record::new("ICU", Quarter::Q2, 2022, 50)]);
        assert_eq!(report.dropped_count(), 1);
        assert_eq!(report.dropped[0].line, 2);
        assert_eq!(report.dropped[0].reason, DropReason::ExtraFields { expected: 4, found: 5 });
        assert_eq!(report.drops_by_reason()[0].0, "extra fields");
    }

    #[test]
    fn test_trailing_empty_cells_tolerated() {
        let csv = format!("{HEADER}\nER,Q1,2022,7,,");
        let (dataset, report) = run(&csv, CleanOptions::default());

        assert_eq!(dataset.records(), &[Record::new("ER", Quarter::Q1, 2022, 7)]);
        assert_eq!(report.dropped_count(), 0);
    }

    #[test]
    fn test_patient_count_upper_bound() {
        let csv = format!("{HEADER}\nER,Q1,2022,9000000000000000000\nER,Q2,2022,4294967296\nICU,Q1,2022,4294967295");
        let (dataset, report) = run(&csv, CleanOptions::default());

        assert_eq!(dataset.records(), &[Record::new("ICU", Quarter::Q1, 2022, MAX_PATIENT_COUNT)]);
        assert_eq!(report.dropped_count(), 2);
        assert!(report
            .dropped
            .iter()
            .all(|w| matches!(w.reason, DropReason::PatientCountTooLarge { .. })));
    }

    #[test]
    fn test_missing_markers_are_valid_department_names() {
        let csv = format!("{HEADER}\nNA,Q1,2022,5\n-,Q1,2022,6\nNone,Q2,2022,7\n   ,Q1,2022,8");
        let (dataset, report) = run(&csv, CleanOptions::default());

        assert_eq!(dataset.departments(), vec!["-", "NA", "None"]);
        assert_eq!(report.dropped_count(), 1);
        assert_eq!(report.dropped[0].reason, DropReason::MissingDepartment);
    }

    #[test]
    fn test_dropped_row_does_not_claim_spelling() {
        let csv = format!("{HEADER}\nCARDIOLOGY,Q9,2022,1\nCardiology,Q1,2022,5");
        let (dataset, _) = run(&csv, CleanOptions::default());
        assert_eq!(dataset.departments(), vec!["Cardiology"]);
    }
}
