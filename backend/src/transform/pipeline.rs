//! High-level pipeline API: bytes or file in, cleaned dataset out.
//!
//! Combines the stages in order: parsing (encoding and delimiter
//! detection), schema validation, cleaning. Aggregation and presentation
//! run per selection on the resulting dataset, see [`view`].
//!
//! # Example
//!
//! ```rust,ignore
//! use influx::{load_csv, view, FilterSelection, LoadOptions};
//! use std::path::Path;
//!
//! let loaded = load_csv(Path::new("patients.csv"), &LoadOptions::default())?;
//! println!("{}", loaded.report.summary());
//!
//! let dashboard = view(&loaded.dataset, &FilterSelection::for_departments(["ER"]));
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::aggregate::aggregate;
use super::clean::{clean, CleanOptions, CleanReport};
use crate::api::logs::{log_info, log_info_indent, log_success, log_warning, log_warning_indent};
use crate::error::PipelineResult;
use crate::models::{Dataset, FilterSelection};
use crate::parser::{parse_bytes_auto, parse_bytes_with_delimiter, RawTable};
use crate::present::DashboardView;
use crate::validation::{validate_schema, ColumnMap, ColumnOverrides, Field};

/// How many dropped rows are listed individually in the log.
const MAX_LOGGED_REASONS: usize = 5;

/// Options for loading a CSV.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadOptions {
    /// Force a delimiter instead of detecting it.
    #[serde(default)]
    pub delimiter: Option<char>,
    /// Header names replacing column auto-detection.
    #[serde(default)]
    pub overrides: ColumnOverrides,
    #[serde(default)]
    pub clean: CleanOptions,
}

/// CSV file information
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// Source header bound to each required field.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnBinding {
    pub department: String,
    pub quarter: String,
    pub year: String,
    pub patient_count: String,
}

impl ColumnBinding {
    fn new(table: &RawTable, columns: &ColumnMap) -> Self {
        Self {
            department: columns.header(table, Field::Department).to_string(),
            quarter: columns.header(table, Field::Quarter).to_string(),
            year: columns.header(table, Field::Year).to_string(),
            patient_count: columns.header(table, Field::PatientCount).to_string(),
        }
    }
}

/// Result of loading one file.
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub dataset: Dataset,
    pub report: CleanReport,
    pub csv_info: CsvInfo,
    pub columns: ColumnBinding,
}

/// Load a CSV file.
pub fn load_csv(path: &Path, options: &LoadOptions) -> PipelineResult<LoadResult> {
    log_info(format!("Reading {}", path.display()));
    let bytes = std::fs::read(path).map_err(crate::error::CsvError::from)?;
    load_bytes(&bytes, options)
}

/// Load CSV bytes.
pub fn load_bytes(bytes: &[u8], options: &LoadOptions) -> PipelineResult<LoadResult> {
    let table = match options.delimiter {
        Some(d) => parse_bytes_with_delimiter(bytes, d)?,
        None => parse_bytes_auto(bytes)?,
    };
    load_table(table, options)
}

/// Validate and clean an already-parsed table.
pub fn load_table(table: RawTable, options: &LoadOptions) -> PipelineResult<LoadResult> {
    log_success(format!("Detected encoding: {}", table.encoding));
    log_success(format!("Detected separator: '{}'", format_delimiter(table.delimiter)));
    log_success(format!("Read {} data rows, {} columns", table.rows.len(), table.headers.len()));

    let csv_info = CsvInfo {
        encoding: table.encoding.clone(),
        delimiter: table.delimiter,
        headers: table.headers.clone(),
        row_count: table.rows.len(),
    };

    log_info("Checking required columns...");
    let columns = match validate_schema(&table, &options.overrides) {
        Ok(columns) => columns,
        Err(err) => {
            log_warning(err.to_string());
            log_info_indent(format!("Available columns: {}", err.available.join(", ")), 1);
            return Err(err.into());
        }
    };

    let binding = ColumnBinding::new(&table, &columns);
    log_info_indent(format!("{} → Department", binding.department), 1);
    log_info_indent(format!("{} → Quarter", binding.quarter), 1);
    log_info_indent(format!("{} → Year", binding.year), 1);
    log_info_indent(format!("{} → Patient_Count", binding.patient_count), 1);

    log_info("Cleaning rows...");
    let (dataset, report) = clean(&table, &columns, &options.clean);
    log_clean_report(&report);

    Ok(LoadResult {
        dataset,
        report,
        csv_info,
        columns: binding,
    })
}

/// Aggregate and present one selection. An empty selection yields
/// [`DashboardView::Empty`].
pub fn view(dataset: &Dataset, selection: &FilterSelection) -> DashboardView {
    DashboardView::from(aggregate(dataset, selection))
}

fn log_clean_report(report: &CleanReport) {
    log_success(report.summary());

    if report.duplicates_removed > 0 {
        log_info_indent(format!("{} exact duplicate rows removed", report.duplicates_removed), 1);
    }

    for (reason, lines) in report.drops_by_reason().iter().take(MAX_LOGGED_REASONS) {
        let sample: Vec<String> = lines.iter().take(5).map(|l| l.to_string()).collect();
        let more = if lines.len() > 5 {
            format!(" ... +{}", lines.len() - 5)
        } else {
            String::new()
        };
        log_warning_indent(format!("{} (lines: {}{})", reason, sample.join(", "), more), 1);
    }

    if report.kept_rows == 0 && report.input_rows > 0 {
        log_warning("No valid rows left after cleaning");
    }
}

fn format_delimiter(d: char) -> &'static str {
    match d {
        ';' => ";",
        ',' => ",",
        '\t' => "TAB",
        '|' => "|",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::models::{Quarter, Record};
    use crate::present::export_csv_string;
    use crate::validation::is_valid_record;
    use std::io::Write;

    fn load(csv: &str) -> LoadResult {
        load_bytes(csv.as_bytes(), &LoadOptions::default()).unwrap()
    }

    const MESSY: &str = "Dept;Qtr;Yr;No. of Patients
 ER ;Q1;2022;100
ER;Q1;2022;100
er;2;2022;1,250
ICU;Q2;2022;50
ICU;Q3;2022;N/A
Radiology;Q5;2022;10
Maternity;quarter 4;2023.0;75
";

    #[test]
    fn test_duplicate_scenario_totals() {
        let loaded = load("Department,Quarter,Year,Patient_Count\nER,Q1,2022,100\nER,Q1,2022,100\nICU,Q2,2022,50\n");

        assert_eq!(loaded.report.duplicates_removed, 1);
        let result = aggregate(&loaded.dataset, &FilterSelection::all()).unwrap();
        let totals: Vec<(String, u64)> = result
            .department_totals
            .iter()
            .map(|t| (t.department.clone(), t.total))
            .collect();
        assert_eq!(totals, vec![("ER".to_string(), 100), ("ICU".to_string(), 50)]);
    }

    #[test]
    fn test_not_available_scenario() {
        let loaded = load("Department,Quarter,Year,Patient_Count\nER,Q1,2022,N/A\nER,Q2,2022,40\nICU,Q2,2022,50\n");

        assert_eq!(loaded.report.dropped_count(), 1);
        let result = aggregate(&loaded.dataset, &FilterSelection::all()).unwrap();
        assert_eq!(result.grand_total(), 90);
        assert_eq!(result.department_totals[0].total, 40);
    }

    #[test]
    fn test_absent_department_yields_empty_view() {
        let loaded = load("Department,Quarter,Year,Patient_Count\nER,Q1,2022,100\n");
        let dashboard = view(&loaded.dataset, &FilterSelection::for_departments(["Oncology"]));
        assert!(dashboard.is_empty());
    }

    #[test]
    fn test_schema_failure_names_missing_column() {
        let err = load_bytes(b"Department,Quarter,Patient_Count\nER,Q1,100\n", &LoadOptions::default()).unwrap_err();
        match err {
            PipelineError::Schema(schema) => assert_eq!(schema.missing, vec!["Year".to_string()]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_messy_file_loads() {
        let loaded = load(MESSY);

        assert_eq!(loaded.csv_info.delimiter, ';');
        assert_eq!(loaded.columns.patient_count, "No. of Patients");
        assert_eq!(loaded.report.input_rows, 7);
        assert_eq!(loaded.report.duplicates_removed, 1);
        assert_eq!(loaded.report.dropped_count(), 2);
        assert_eq!(
            loaded.dataset.records(),
            &[
                Record::new("ER", Quarter::Q1, 2022, 100),
                Record::new("ER", Quarter::Q2, 2022, 1250),
                Record::new("ICU", Quarter::Q2, 2022, 50),
                Record::new("Maternity", Quarter::Q4, 2023, 75),
            ]
        );
    }

    #[test]
    fn test_cleaning_is_idempotent() {
        let first = load(MESSY);
        let exported = export_csv_string(&first.dataset, &FilterSelection::all()).unwrap();
        let second = load(&exported);
        let exported_again = export_csv_string(&second.dataset, &FilterSelection::all()).unwrap();
        let third = load(&exported_again);

        assert_eq!(second.report.dropped_count(), 0);
        assert_eq!(second.report.duplicates_removed, 0);
        assert_eq!(third.dataset, second.dataset);
        assert_eq!(exported, exported_again);
    }

    #[test]
    fn test_filtered_export_round_trip() {
        let loaded = load(MESSY);
        let selection = FilterSelection::for_departments(["er", "Maternity"]).with_years(Some(2022), Some(2023));

        let exported = export_csv_string(&loaded.dataset, &selection).unwrap();
        let reloaded = load(&exported);

        assert_eq!(reloaded.report.dropped_count(), 0);
        assert_eq!(reloaded.report.duplicates_removed, 0);
        let expected: Vec<Record> = crate::present::export_table(&loaded.dataset, &selection);
        assert_eq!(reloaded.dataset.records(), expected.as_slice());

        let original = aggregate(&loaded.dataset, &selection).unwrap();
        let again = aggregate(&reloaded.dataset, &FilterSelection::all()).unwrap();
        assert_eq!(original.department_totals, again.department_totals);
    }

    #[test]
    fn test_cleaned_records_match_record_schema() {
        let loaded = load(MESSY);
        for record in loaded.dataset.records() {
            let json = serde_json::to_value(record).unwrap();
            assert!(is_valid_record(&json), "{json}");
        }
    }

    #[test]
    fn test_forced_delimiter() {
        let options = LoadOptions {
            delimiter: Some('|'),
            ..LoadOptions::default()
        };
        let loaded = load_bytes(b"Department|Quarter|Year|Patient_Count\nER, Adult|Q1|2022|5\n", &options).unwrap();
        assert_eq!(loaded.dataset.departments(), vec!["ER, Adult"]);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Department,Quarter,Year,Patient_Count\nICU,Q4,2021,12\n").unwrap();

        let loaded = load_csv(file.path(), &LoadOptions::default()).unwrap();
        assert_eq!(loaded.dataset.len(), 1);
    }

    #[test]
    fn test_missing_file_is_csv_error() {
        let err = load_csv(Path::new("/nonexistent/patients.csv"), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Csv(_)));
    }
}
