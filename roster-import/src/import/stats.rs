//! Thread-safe counters of successful operations per entity type

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use log::info;

/// Success counters keyed by category label ("Users", "Groups", ...)
///
/// Guarded by its own mutex, independent of the identity cache, so counting
/// never contends with identity resolution. The lock is only held for the
/// map update, never across an await point.
#[derive(Default)]
pub struct ImportStats {
    counts: Mutex<HashMap<String, u64>>,
}

impl ImportStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one successful operation in `category`
    pub fn increment(&self, category: &str) {
        let mut counts = self.counts.lock().unwrap();
        *counts.entry(category.to_string()).or_insert(0) += 1;
    }

    /// Current count for `category`
    pub fn count(&self, category: &str) -> u64 {
        self.counts
            .lock()
            .unwrap()
            .get(category)
            .copied()
            .unwrap_or(0)
    }

    /// Non-zero counters sorted by category name
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        let counts = self.counts.lock().unwrap();
        let mut entries: Vec<(String, u64)> = counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(category, count)| (category.clone(), *count))
            .collect();
        entries.sort();
        entries
    }

    /// Deterministic one-line summary, e.g. "Groups: 4, Users: 12"
    pub fn summary(&self) -> String {
        self.snapshot()
            .into_iter()
            .map(|(category, count)| format!("{}: {}", category, count))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Log the job-level summary with elapsed wall-clock time
    pub fn report(&self, elapsed: Duration) {
        let seconds = elapsed.as_secs();
        info!("Imported {}", self.summary());
        info!("in {} minutes {} seconds", seconds / 60, seconds % 60);
    }
}
