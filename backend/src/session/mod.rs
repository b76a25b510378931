//! Per-user session state.
//!
//! A [`Session`] owns one loaded dataset, its cleaning report, the active
//! filter selection and the aggregate cache. Nothing here is global: the
//! CLI creates one session per run and the HTTP server one per upload.

use std::path::Path;
use std::sync::Arc;

use crate::cache::{AggregateCache, DEFAULT_CAPACITY};
use crate::error::{EmptySelectionError, PipelineError, PipelineResult};
use crate::models::{Dataset, FilterSelection};
use crate::present::{export_csv_string, DashboardView};
use crate::transform::aggregate::AggregateResult;
use crate::transform::clean::CleanReport;
use crate::transform::pipeline::{load_bytes, load_csv, LoadOptions, LoadResult};

#[derive(Debug)]
pub struct Session {
    loaded: Option<LoadResult>,
    selection: FilterSelection,
    cache: AggregateCache,
}

impl Session {
    pub fn new() -> Self {
        Self::with_cache_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            loaded: None,
            selection: FilterSelection::all(),
            cache: AggregateCache::with_capacity(capacity),
        }
    }

    /// Load CSV bytes, replacing the current dataset.
    ///
    /// On failure the previous dataset (if any) stays loaded.
    pub fn load(&mut self, bytes: &[u8], options: &LoadOptions) -> PipelineResult<&LoadResult> {
        let loaded = load_bytes(bytes, options)?;
        Ok(self.replace(loaded))
    }

    /// Load a CSV file, replacing the current dataset.
    pub fn load_file(&mut self, path: &Path, options: &LoadOptions) -> PipelineResult<&LoadResult> {
        let loaded = load_csv(path, options)?;
        Ok(self.replace(loaded))
    }

    fn replace(&mut self, loaded: LoadResult) -> &LoadResult {
        self.cache.invalidate();
        self.selection = FilterSelection::all();
        self.loaded.insert(loaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn loaded(&self) -> Option<&LoadResult> {
        self.loaded.as_ref()
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.loaded.as_ref().map(|l| &l.dataset)
    }

    pub fn report(&self) -> Option<&CleanReport> {
        self.loaded.as_ref().map(|l| &l.report)
    }

    /// Replace the active selection.
    pub fn select(&mut self, selection: FilterSelection) -> &FilterSelection {
        self.selection = selection;
        &self.selection
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    /// Aggregate the active selection, through the cache.
    pub fn aggregate(&mut self) -> PipelineResult<Result<Arc<AggregateResult>, EmptySelectionError>> {
        let loaded = self.loaded.as_ref().ok_or(PipelineError::NoDataset)?;
        Ok(self.cache.get_or_aggregate(&loaded.dataset, &self.selection))
    }

    /// Dashboard for the active selection.
    pub fn view(&mut self) -> PipelineResult<DashboardView> {
        Ok(DashboardView::from(self.aggregate()?))
    }

    /// Export the active selection as CSV.
    pub fn export_csv(&self) -> PipelineResult<String> {
        let loaded = self.loaded.as_ref().ok_or(PipelineError::NoDataset)?;
        export_csv_string(&loaded.dataset, &self.selection)
    }

    /// Departments available for selection, sorted.
    pub fn departments(&self) -> Vec<String> {
        self.dataset().map(Dataset::departments).unwrap_or_default()
    }

    /// `(hits, misses)` of the aggregate cache.
    pub fn cache_stats(&self) -> (u64, u64) {
        self.cache.stats()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &[u8] = b"Department,Quarter,Year,Patient_Count
ER,Q1,2022,100
ER,Q2,2022,150
ICU,Q2,2022,50
";

    #[test]
    fn test_view_requires_dataset() {
        let mut session = Session::new();
        assert!(matches!(session.view(), Err(PipelineError::NoDataset)));
        assert!(matches!(session.export_csv(), Err(PipelineError::NoDataset)));
        assert!(session.departments().is_empty());
    }

    #[test]
    fn test_load_select_view() {
        let mut session = Session::new();
        session.load(CSV, &LoadOptions::default()).unwrap();
        assert_eq!(session.departments(), vec!["ER", "ICU"]);

        session.select(FilterSelection::for_departments(["ICU"]));
        match session.view().unwrap() {
            DashboardView::Ready { summary, .. } => assert_eq!(summary.total_patients, 50),
            other => panic!("unexpected view: {other:?}"),
        }

        session.view().unwrap();
        assert_eq!(session.cache_stats(), (1, 1));
    }

    #[test]
    fn test_empty_selection_is_a_view_state() {
        let mut session = Session::new();
        session.load(CSV, &LoadOptions::default()).unwrap();
        session.select(FilterSelection::all().with_years(Some(2030), None));

        assert!(session.view().unwrap().is_empty());
        let csv = session.export_csv().unwrap();
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn test_reload_resets_selection_and_cache() {
        let mut session = Session::new();
        session.load(CSV, &LoadOptions::default()).unwrap();
        session.select(FilterSelection::for_departments(["ER"]));
        session.view().unwrap();

        session
            .load(b"Department,Quarter,Year,Patient_Count\nRadiology,Q3,2021,7\n", &LoadOptions::default())
            .unwrap();

        assert_eq!(session.selection(), &FilterSelection::all());
        assert_eq!(session.departments(), vec!["Radiology"]);
        match session.view().unwrap() {
            DashboardView::Ready { summary, .. } => assert_eq!(summary.total_patients, 7),
            other => panic!("unexpected view: {other:?}"),
        }
    }

    #[test]
    fn test_failed_load_keeps_previous_dataset() {
        let mut session = Session::new();
        session.load(CSV, &LoadOptions::default()).unwrap();

        let err = session.load(b"Department,Year\nER,2022\n", &LoadOptions::default());
        assert!(matches!(err, Err(PipelineError::Schema(_))));
        assert_eq!(session.dataset().map(Dataset::len), Some(3));
    }

    #[test]
    fn test_export_follows_selection() {
        let mut session = Session::new();
        session.load(CSV, &LoadOptions::default()).unwrap();
        session.select(FilterSelection::for_departments(["er"]).with_quarters(Some(crate::models::Quarter::Q2), None));

        let csv = session.export_csv().unwrap();
        assert_eq!(csv, "Department,Quarter,Year,Patient_Count\nER,Q2,2022,150\n");
    }
}
