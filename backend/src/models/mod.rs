//! Domain models for the patient influx pipeline.
//!
//! - [`Quarter`] - ordinal quarter label (Q1..Q4)
//! - [`Period`] - a (year, quarter) pair, ordered chronologically
//! - [`Record`] - one cleaned row
//! - [`Dataset`] - immutable cleaned table for one upload
//! - [`FilterSelection`] - departments and time range chosen by the user

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

// =============================================================================
// Quarter
// =============================================================================

/// `Q1`, `1`, `1ST`, `1STQ` after uppercasing and whitespace removal.
static QUARTER_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Q?([1-4])(ST|ND|RD|TH)?Q?$").expect("valid quarter pattern"));

/// Quarter of a year, in natural Q1-Q4 order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub const ALL: [Quarter; 4] = [Quarter::Q1, Quarter::Q2, Quarter::Q3, Quarter::Q4];

    /// Parse a quarter label.
    ///
    /// Accepts `Q1`, `q1`, `1`, `1st`, `first`, `Quarter 1` and the like.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .to_uppercase()
            .replace("QUARTER", "Q")
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        if let Some(caps) = QUARTER_LABEL.captures(&normalized) {
            return match &caps[1] {
                "1" => Some(Quarter::Q1),
                "2" => Some(Quarter::Q2),
                "3" => Some(Quarter::Q3),
                _ => Some(Quarter::Q4),
            };
        }

        match normalized.trim_matches('Q') {
            "FIRST" => Some(Quarter::Q1),
            "SECOND" => Some(Quarter::Q2),
            "THIRD" => Some(Quarter::Q3),
            "FOURTH" => Some(Quarter::Q4),
            _ => None,
        }
    }

    /// Canonical label (`"Q1"`..`"Q4"`).
    pub fn label(&self) -> &'static str {
        match self {
            Quarter::Q1 => "Q1",
            Quarter::Q2 => "Q2",
            Quarter::Q3 => "Q3",
            Quarter::Q4 => "Q4",
        }
    }

    /// Position within the year, 1-based.
    pub fn number(&self) -> u8 {
        match self {
            Quarter::Q1 => 1,
            Quarter::Q2 => 2,
            Quarter::Q3 => 3,
            Quarter::Q4 => 4,
        }
    }
}

impl std::fmt::Display for Quarter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Period
// =============================================================================

/// A calendar quarter of a specific year.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub year: i32,
    pub quarter: Quarter,
}

impl Period {
    pub fn new(year: i32, quarter: Quarter) -> Self {
        Self { year, quarter }
    }

    /// The calendar quarter immediately before this one.
    pub fn previous(&self) -> Self {
        match self.quarter {
            Quarter::Q1 => Period::new(self.year - 1, Quarter::Q4),
            Quarter::Q2 => Period::new(self.year, Quarter::Q1),
            Quarter::Q3 => Period::new(self.year, Quarter::Q2),
            Quarter::Q4 => Period::new(self.year, Quarter::Q3),
        }
    }

    /// Axis label used by trend charts, e.g. `2022-Q3`.
    pub fn label(&self) -> String {
        format!("{}-{}", self.year, self.quarter)
    }
}

// =============================================================================
// Record
// =============================================================================

/// One cleaned row: patients seen by a department in a quarter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub department: String,
    pub quarter: Quarter,
    pub year: i32,
    pub patient_count: u64,
}

impl Record {
    pub fn new(department: impl Into<String>, quarter: Quarter, year: i32, patient_count: u64) -> Self {
        Self {
            department: department.into(),
            quarter,
            year,
            patient_count,
        }
    }

    pub fn period(&self) -> Period {
        Period::new(self.year, self.quarter)
    }
}

/// Case- and whitespace-insensitive key for a department name.
pub fn department_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// =============================================================================
// Dataset
// =============================================================================

/// Cleaned records for one upload.
///
/// Never mutated after construction; a new upload builds a new dataset.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    id: Uuid,
    loaded_at: DateTime<Utc>,
    records: Vec<Record>,
}

impl Dataset {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            id: Uuid::new_v4(),
            loaded_at: Utc::now(),
            records,
        }
    }

    /// Identity used for cache keys.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct department names, alphabetical.
    pub fn departments(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.records.iter().map(|r| r.department.as_str()).collect();
        set.into_iter().map(String::from).collect()
    }

    /// Distinct years, ascending.
    pub fn years(&self) -> Vec<i32> {
        let set: BTreeSet<i32> = self.records.iter().map(|r| r.year).collect();
        set.into_iter().collect()
    }

    /// Records inside the selection, in input order.
    pub fn select<'a>(&'a self, selection: &'a FilterSelection) -> impl Iterator<Item = &'a Record> + 'a {
        self.records.iter().filter(move |r| selection.matches(r))
    }
}

impl PartialEq for Dataset {
    /// Content equality; identity and load time are ignored.
    fn eq(&self, other: &Self) -> bool {
        self.records == other.records
    }
}

// =============================================================================
// Filter Selection
// =============================================================================

/// Which departments a selection covers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase", tag = "mode", content = "names")]
pub enum DepartmentFilter {
    #[default]
    All,
    /// Department names, compared through [`department_key`].
    Only(BTreeSet<String>),
}

/// User-chosen subset of the dataset. All bounds are inclusive.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct FilterSelection {
    #[serde(default)]
    pub departments: DepartmentFilter,
    #[serde(default)]
    pub year_from: Option<i32>,
    #[serde(default)]
    pub year_to: Option<i32>,
    #[serde(default)]
    pub quarter_from: Option<Quarter>,
    #[serde(default)]
    pub quarter_to: Option<Quarter>,
}

impl FilterSelection {
    /// Everything in the dataset.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to the given departments (case-insensitive).
    pub fn for_departments<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            departments: DepartmentFilter::Only(
                names.into_iter().map(|n| department_key(n.as_ref())).collect(),
            ),
            ..Self::default()
        }
    }

    pub fn with_years(mut self, from: Option<i32>, to: Option<i32>) -> Self {
        self.year_from = from;
        self.year_to = to;
        self
    }

    pub fn with_quarters(mut self, from: Option<Quarter>, to: Option<Quarter>) -> Self {
        self.quarter_from = from;
        self.quarter_to = to;
        self
    }

    /// Whether a record falls inside this selection.
    pub fn matches(&self, record: &Record) -> bool {
        let department_ok = match &self.departments {
            DepartmentFilter::All => true,
            DepartmentFilter::Only(names) => {
                let key = department_key(&record.department);
                names.iter().any(|name| department_key(name) == key)
            }
        };

        department_ok
            && self.year_from.map_or(true, |y| record.year >= y)
            && self.year_to.map_or(true, |y| record.year <= y)
            && self.quarter_from.map_or(true, |q| record.quarter >= q)
            && self.quarter_to.map_or(true, |q| record.quarter <= q)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarter_from_label() {
        assert_eq!(Quarter::from_label("Q1"), Some(Quarter::Q1));
        assert_eq!(Quarter::from_label(" q2 "), Some(Quarter::Q2));
        assert_eq!(Quarter::from_label("3"), Some(Quarter::Q3));
        assert_eq!(Quarter::from_label("Fourth"), Some(Quarter::Q4));
        assert_eq!(Quarter::from_label("Quarter 2"), Some(Quarter::Q2));
        assert_eq!(Quarter::from_label("2nd"), Some(Quarter::Q2));
        assert_eq!(Quarter::from_label("first quarter"), Some(Quarter::Q1));
        assert_eq!(Quarter::from_label("3rd Quarter"), Some(Quarter::Q3));
        assert_eq!(Quarter::from_label("Q5"), None);
        assert_eq!(Quarter::from_label("Q"), None);
        assert_eq!(Quarter::from_label(""), None);
    }

    #[test]
    fn test_period_ordering_and_previous() {
        let a = Period::new(2022, Quarter::Q4);
        let b = Period::new(2023, Quarter::Q1);
        assert!(a < b);
        assert_eq!(b.previous(), a);
        assert_eq!(Period::new(2023, Quarter::Q3).previous(), Period::new(2023, Quarter::Q2));
        assert_eq!(b.label(), "2023-Q1");
    }

    #[test]
    fn test_department_key_collapses_variants() {
        assert_eq!(department_key("  Emergency   Room "), "emergency room");
        assert_eq!(department_key("EMERGENCY ROOM"), "emergency room");
    }

    #[test]
    fn test_selection_matches() {
        let record = Record::new("ICU", Quarter::Q2, 2022, 50);

        assert!(FilterSelection::all().matches(&record));
        assert!(FilterSelection::for_departments(["icu"]).matches(&record));
        assert!(!FilterSelection::for_departments(["ER"]).matches(&record));
        assert!(!FilterSelection::all().with_years(Some(2023), None).matches(&record));
        assert!(FilterSelection::all()
            .with_quarters(Some(Quarter::Q2), Some(Quarter::Q3))
            .matches(&record));
        assert!(!FilterSelection::all()
            .with_quarters(Some(Quarter::Q3), None)
            .matches(&record));
    }

    #[test]
    fn test_selection_json_shape() {
        let json = r#"{"departments":{"mode":"only","names":["ER"]},"yearFrom":2022}"#;
        let selection: FilterSelection = serde_json::from_str(json).unwrap();
        assert_eq!(selection.year_from, Some(2022));
        assert_eq!(selection.year_to, None);
        assert!(selection.matches(&Record::new("er", Quarter::Q1, 2022, 3)));
        assert!(!selection.matches(&Record::new("ER", Quarter::Q1, 2021, 3)));

        let all: FilterSelection = serde_json::from_str("{}").unwrap();
        assert_eq!(all, FilterSelection::all());
    }

    #[test]
    fn test_dataset_departments_sorted() {
        let dataset = Dataset::new(vec![
            Record::new("ICU", Quarter::Q1, 2022, 1),
            Record::new("ER", Quarter::Q1, 2022, 2),
            Record::new("ICU", Quarter::Q2, 2023, 3),
        ]);
        assert_eq!(dataset.departments(), vec!["ER", "ICU"]);
        assert_eq!(dataset.years(), vec![2022, 2023]);
    }
}
