//! Aggregate cache - memoize aggregation per (dataset, selection)
//!
//! A dataset is immutable once cleaned, so an entry never goes stale while
//! its dataset is loaded. Entries are only ever inserted whole; there is no
//! partial invalidation. Loading a new dataset drops everything.

use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::EmptySelectionError;
use crate::models::{Dataset, FilterSelection};
use crate::transform::aggregate::{aggregate, AggregateResult};

/// Default number of selections remembered per session.
pub const DEFAULT_CAPACITY: usize = 64;

type Outcome = Result<Arc<AggregateResult>, EmptySelectionError>;

/// Read-through cache of aggregation outcomes.
#[derive(Debug)]
pub struct AggregateCache {
    /// Dataset the entries belong to
    dataset_id: Option<Uuid>,
    /// Selection -> outcome (empty selections are cached too)
    entries: HashMap<FilterSelection, Outcome>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl AggregateCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a cache holding at most `capacity` selections.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            dataset_id: None,
            entries: HashMap::new(),
            capacity: capacity.max(1),
            hits: 0,
            misses: 0,
        }
    }

    /// Aggregate `dataset` under `selection`, reusing a previous outcome
    /// for the same dataset and selection.
    pub fn get_or_aggregate(&mut self, dataset: &Dataset, selection: &FilterSelection) -> Outcome {
        if self.dataset_id != Some(dataset.id()) {
            self.reset(Some(dataset.id()));
        }

        if let Some(outcome) = self.entries.get(selection) {
            self.hits += 1;
            return outcome.clone();
        }

        self.misses += 1;
        let outcome = aggregate(dataset, selection).map(Arc::new);

        if self.entries.len() >= self.capacity {
            self.entries.clear();
        }
        self.entries.insert(selection.clone(), outcome.clone());
        outcome
    }

    /// Forget every entry, e.g. when a new dataset replaces the old one.
    pub fn invalidate(&mut self) {
        self.reset(None);
    }

    fn reset(&mut self, dataset_id: Option<Uuid>) {
        self.dataset_id = dataset_id;
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

impl Default for AggregateCache {
    fn default() -> Self {
        Self::new()
    }
}
