//! Grouped summaries of a cleaned dataset under a filter selection.
//!
//! # Architecture
//!
//! ```text
//! Records (filtered)                 →  AggregateResult
//! ┌─────────────────────────────┐       ┌──────────────────────────────┐
//! │ ER   2022 Q1  100           │       │ totals:  ER 250, ICU 50      │
//! │ ER   2022 Q2  150           │  →    │ series:  ER 2022-Q1 100, ... │
//! │ ICU  2022 Q2   50           │       │ q/q:     ER 2022-Q2 +50%     │
//! └─────────────────────────────┘       │ y/y, per-year totals, summary│
//!                                       └──────────────────────────────┘
//! ```
//!
//! Departments are ordered by name, periods chronologically. Percentage
//! changes against a zero prior value are [`Change::Undefined`].

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::EmptySelectionError;
use crate::models::{Dataset, FilterSelection, Period};

/// Relative change between two consecutive values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Change {
    /// Percentage change, e.g. `50.0` for +50%.
    Percent(f64),
    /// Prior value was zero.
    Undefined,
}

impl Change {
    pub fn between(previous: u64, current: u64) -> Self {
        if previous == 0 {
            Change::Undefined
        } else {
            Change::Percent((current as f64 - previous as f64) / previous as f64 * 100.0)
        }
    }
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Change::Percent(p) => write!(f, "{:+.1}%", p),
            Change::Undefined => write!(f, "n/a"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentTotal {
    pub department: String,
    pub total: u64,
}

/// Patients for one department in one quarter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesPoint {
    pub department: String,
    pub period: Period,
    pub patient_count: u64,
}

/// Quarter-over-quarter change for one department.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarterChange {
    pub department: String,
    pub period: Period,
    pub previous: u64,
    pub current: u64,
    pub change: Change,
}

/// Year-over-year change of a department's annual total.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearChange {
    pub department: String,
    pub year: i32,
    pub previous: u64,
    pub current: u64,
    pub change: Change,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearTotal {
    pub year: i32,
    pub total: u64,
}

/// Headline numbers for a selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_patients: u64,
    pub departments: usize,
    pub years: usize,
    /// Matching records.
    pub data_points: usize,
}

/// Everything the dashboard needs for one selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub selection: FilterSelection,
    /// Alphabetical by department.
    pub department_totals: Vec<DepartmentTotal>,
    /// Sorted by department, then period.
    pub series: Vec<SeriesPoint>,
    pub quarter_changes: Vec<QuarterChange>,
    pub year_changes: Vec<YearChange>,
    pub year_totals: Vec<YearTotal>,
    pub summary: Summary,
}

impl AggregateResult {
    /// Department totals, largest first; ties by name ascending.
    pub fn ranked(&self) -> Vec<DepartmentTotal> {
        let mut ranked = self.department_totals.clone();
        ranked.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.department.cmp(&b.department)));
        ranked
    }

    pub fn grand_total(&self) -> u64 {
        self.summary.total_patients
    }
}

/// Aggregate the records inside `selection`.
///
/// Fails with [`EmptySelectionError`] when nothing matches; callers
/// present that as a "no data" state.
pub fn aggregate(dataset: &Dataset, selection: &FilterSelection) -> Result<AggregateResult, EmptySelectionError> {
    let mut by_period: BTreeMap<(String, Period), u64> = BTreeMap::new();
    let mut data_points = 0usize;

    for record in dataset.select(selection) {
        *by_period
            .entry((record.department.clone(), record.period()))
            .or_insert(0) += record.patient_count;
        data_points += 1;
    }

    if data_points == 0 {
        return Err(EmptySelectionError {
            selection: selection.clone(),
        });
    }

    let mut totals: BTreeMap<&str, u64> = BTreeMap::new();
    let mut annual: BTreeMap<(&str, i32), u64> = BTreeMap::new();
    let mut year_totals: BTreeMap<i32, u64> = BTreeMap::new();

    for ((department, period), count) in &by_period {
        *totals.entry(department.as_str()).or_insert(0) += count;
        *annual.entry((department.as_str(), period.year)).or_insert(0) += count;
        *year_totals.entry(period.year).or_insert(0) += count;
    }

    let series: Vec<SeriesPoint> = by_period
        .iter()
        .map(|((department, period), count)| SeriesPoint {
            department: department.clone(),
            period: *period,
            patient_count: *count,
        })
        .collect();

    let quarter_changes: Vec<QuarterChange> = by_period
        .iter()
        .filter_map(|((department, period), current)| {
            let previous = by_period.get(&(department.clone(), period.previous()))?;
            Some(QuarterChange {
                department: department.clone(),
                period: *period,
                previous: *previous,
                current: *current,
                change: Change::between(*previous, *current),
            })
        })
        .collect();

    let year_changes: Vec<YearChange> = annual
        .iter()
        .filter_map(|((department, year), current)| {
            let previous = annual.get(&(*department, year - 1))?;
            Some(YearChange {
                department: department.to_string(),
                year: *year,
                previous: *previous,
                current: *current,
                change: Change::between(*previous, *current),
            })
        })
        .collect();

    let distinct_years: BTreeSet<i32> = year_totals.keys().copied().collect();
    let summary = Summary {
        total_patients: totals.values().sum(),
        departments: totals.len(),
        years: distinct_years.len(),
        data_points,
    };

    Ok(AggregateResult {
        selection: selection.clone(),
        department_totals: totals
            .into_iter()
            .map(|(department, total)| DepartmentTotal {
                department: department.to_string(),
                total,
            })
            .collect(),
        series,
        quarter_changes,
        year_changes,
        year_totals: year_totals
            .into_iter()
            .map(|(year, total)| YearTotal { year, total })
            .collect(),
        summary,
    })
}
