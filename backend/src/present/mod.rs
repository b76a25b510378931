//! Presentation adapter: aggregate results into chart-ready shapes.
//!
//! Pure mapping, no business logic. The chart renderer and the UI live
//! outside this crate; they receive:
//!
//! - bar pairs `(label, value)` for per-department totals,
//! - trend triples `(x = "YYYY-Qn", y, series = department)`,
//! - grouped quarter bars and a year × quarter pivot table,
//! - a flat export table, serialized as CSV by [`write_export_csv`].

use serde::Serialize;
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::io::Write;

use crate::error::{EmptySelectionError, PipelineError, PipelineResult};
use crate::models::{Dataset, FilterSelection, Quarter, Record};
use crate::transform::aggregate::{AggregateResult, QuarterChange, Summary, YearChange};
use crate::validation::Field;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BarPoint {
    pub label: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub x: String,
    pub y: u64,
    pub series: String,
}

/// One bar of the grouped "year by quarter" chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuarterBar {
    pub year: i32,
    pub quarter: Quarter,
    pub value: u64,
}

/// Years as rows, Q1..Q4 as columns, missing cells filled with 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PivotTable {
    pub columns: Vec<String>,
    pub rows: Vec<PivotRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PivotRow {
    pub year: i32,
    pub values: [u64; 4],
}

/// Per-department totals in display order.
pub fn bar_series(result: &AggregateResult) -> Vec<BarPoint> {
    result
        .department_totals
        .iter()
        .map(|t| BarPoint {
            label: t.department.clone(),
            value: t.total,
        })
        .collect()
}

/// One trend line per department.
pub fn trend_series(result: &AggregateResult) -> Vec<TrendPoint> {
    result
        .series
        .iter()
        .map(|p| TrendPoint {
            x: p.period.label(),
            y: p.patient_count,
            series: p.department.clone(),
        })
        .collect()
}

/// Patients per (year, quarter) across the selected departments.
pub fn quarter_bars(result: &AggregateResult) -> Vec<QuarterBar> {
    let mut by_period: BTreeMap<(i32, Quarter), u64> = BTreeMap::new();
    for point in &result.series {
        *by_period
            .entry((point.period.year, point.period.quarter))
            .or_insert(0) += point.patient_count;
    }

    by_period
        .into_iter()
        .map(|((year, quarter), value)| QuarterBar { year, quarter, value })
        .collect()
}

pub fn pivot_table(result: &AggregateResult) -> PivotTable {
    let mut rows: BTreeMap<i32, [u64; 4]> = BTreeMap::new();
    for bar in quarter_bars(result) {
        rows.entry(bar.year).or_insert([0; 4])[usize::from(bar.quarter.number() - 1)] += bar.value;
    }

    PivotTable {
        columns: Quarter::ALL.iter().map(|q| q.label().to_string()).collect(),
        rows: rows
            .into_iter()
            .map(|(year, values)| PivotRow { year, values })
            .collect(),
    }
}

// =============================================================================
// Dashboard view
// =============================================================================

/// Everything a dashboard pane needs for one selection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum DashboardView {
    #[serde(rename_all = "camelCase")]
    Ready {
        summary: Summary,
        bars: Vec<BarPoint>,
        ranked: Vec<BarPoint>,
        trend: Vec<TrendPoint>,
        quarter_bars: Vec<QuarterBar>,
        pivot: PivotTable,
        quarter_changes: Vec<QuarterChange>,
        year_changes: Vec<YearChange>,
    },
    /// The selection matched no rows.
    Empty {
        message: String,
        selection: FilterSelection,
    },
}

impl DashboardView {
    pub fn from_result(result: &AggregateResult) -> Self {
        DashboardView::Ready {
            summary: result.summary.clone(),
            bars: bar_series(result),
            ranked: result
                .ranked()
                .into_iter()
                .map(|t| BarPoint {
                    label: t.department,
                    value: t.total,
                })
                .collect(),
            trend: trend_series(result),
            quarter_bars: quarter_bars(result),
            pivot: pivot_table(result),
            quarter_changes: result.quarter_changes.clone(),
            year_changes: result.year_changes.clone(),
        }
    }

    pub fn empty(err: &EmptySelectionError) -> Self {
        DashboardView::Empty {
            message: err.to_string(),
            selection: err.selection.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, DashboardView::Empty { .. })
    }
}

impl<R: Borrow<AggregateResult>> From<Result<R, EmptySelectionError>> for DashboardView {
    fn from(outcome: Result<R, EmptySelectionError>) -> Self {
        match outcome {
            Ok(result) => DashboardView::from_result(result.borrow()),
            Err(err) => DashboardView::empty(&err),
        }
    }
}

// =============================================================================
// Export
// =============================================================================

#[derive(Serialize)]
struct ExportRow<'a> {
    #[serde(rename = "Department")]
    department: &'a str,
    #[serde(rename = "Quarter")]
    quarter: &'static str,
    #[serde(rename = "Year")]
    year: i32,
    #[serde(rename = "Patient_Count")]
    patient_count: u64,
}

/// Records inside the selection in export order: department, year, quarter.
pub fn export_table(dataset: &Dataset, selection: &FilterSelection) -> Vec<Record> {
    let mut rows: Vec<Record> = dataset.select(selection).cloned().collect();
    rows.sort_by(|a, b| {
        a.department
            .cmp(&b.department)
            .then_with(|| a.period().cmp(&b.period()))
    });
    rows
}

/// Write records as CSV with the canonical header row.
pub fn write_export_csv<W: Write>(records: &[Record], writer: W) -> PipelineResult<()> {
    let mut csv_writer = csv::WriterBuilder::new().has_headers(false).from_writer(writer);

    csv_writer
        .write_record(Field::ALL.iter().map(|f| f.column_name()))
        .map_err(|e| PipelineError::Export(e.to_string()))?;

    for record in records {
        csv_writer
            .serialize(ExportRow {
                department: &record.department,
                quarter: record.quarter.label(),
                year: record.year,
                patient_count: record.patient_count,
            })
            .map_err(|e| PipelineError::Export(e.to_string()))?;
    }

    csv_writer
        .flush()
        .map_err(|e| PipelineError::Export(e.to_string()))?;
    Ok(())
}

/// Export the selection to an in-memory CSV string.
pub fn export_csv_string(dataset: &Dataset, selection: &FilterSelection) -> PipelineResult<String> {
    let mut buffer = Vec::new();
    write_export_csv(&export_table(dataset, selection), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| PipelineError::Export(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::aggregate::aggregate;

    fn dataset() -> Dataset {
        Dataset::new(vec![
            Record::new("ICU", Quarter::Q2, 2022, 50),
            Record::new("ER", Quarter::Q3, 2022, 70),
            Record::new("ER", Quarter::Q1, 2022, 100),
            Record::new("ER", Quarter::Q1, 2023, 80),
        ])
    }

    #[test]
    fn test_bar_and_trend_series() {
        let result = aggregate(&dataset(), &FilterSelection::all()).unwrap();

        assert_eq!(
            bar_series(&result),
            vec![
                BarPoint { label: "ER".into(), value: 250 },
                BarPoint { label: "ICU".into(), value: 50 },
            ]
        );

        let trend = trend_series(&result);
        assert_eq!(trend.len(), 4);
        assert_eq!(
            trend[0],
            TrendPoint { x: "2022-Q1".into(), y: 100, series: "ER".into() }
        );
        assert_eq!(trend[3].series, "ICU");
    }

    #[test]
    fn test_pivot_fills_missing_quarters() {
        let result = aggregate(&dataset(), &FilterSelection::for_departments(["ER"])).unwrap();
        let pivot = pivot_table(&result);

        assert_eq!(pivot.columns, vec!["Q1", "Q2", "Q3", "Q4"]);
        assert_eq!(pivot.rows[0], PivotRow { year: 2022, values: [100, 0, 70, 0] });
        assert_eq!(pivot.rows[1], PivotRow { year: 2023, values: [80, 0, 0, 0] });
    }

    #[test]
    fn test_view_serializes_status() {
        let ds = dataset();
        let ready = DashboardView::from(aggregate(&ds, &FilterSelection::all()));
        let json = serde_json::to_value(&ready).unwrap();
        assert_eq!(json["status"], "ready");
        assert_eq!(json["summary"]["totalPatients"], 300);

        let empty = DashboardView::from(aggregate(&ds, &FilterSelection::for_departments(["Oncology"])));
        assert!(empty.is_empty());
        let json = serde_json::to_value(&empty).unwrap();
        assert_eq!(json["status"], "empty");
        assert_eq!(json["message"], "No data for this selection");
    }

    #[test]
    fn test_export_csv_order_and_header() {
        let csv = export_csv_string(&dataset(), &FilterSelection::all()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "Department,Quarter,Year,Patient_Count");
        assert_eq!(lines[1], "ER,Q1,2022,100");
        assert_eq!(lines[2], "ER,Q3,2022,70");
        assert_eq!(lines[3], "ER,Q1,2023,80");
        assert_eq!(lines[4], "ICU,Q2,2022,50");
    }

    #[test]
    fn test_export_empty_selection_writes_header_only() {
        let csv = export_csv_string(&dataset(), &FilterSelection::for_departments(["Oncology"])).unwrap();
        assert_eq!(csv.trim_end(), "Department,Quarter,Year,Patient_Count");
    }
}
