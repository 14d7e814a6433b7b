//! In-memory result store.
//!
//! An ordered log of every probe outcome in a run. Names are unique:
//! the first write wins and later duplicates are suffixed `#2`, `#3`, …
//! Entries are immutable once appended.

use crate::models::ProbeResult;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ResultStore {
    results: Vec<ProbeResult>,
    index: HashMap<String, usize>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a result, renaming it on collision. Returns the name under
    /// which the result was actually stored.
    pub fn append(&mut self, mut result: ProbeResult) -> String {
        if self.index.contains_key(&result.name) {
            let base = result.name.clone();
            let mut n = 2;
            while self.index.contains_key(&format!("{base}#{n}")) {
                n += 1;
            }
            result.name = format!("{base}#{n}");
        }
        let name = result.name.clone();
        self.index.insert(name.clone(), self.results.len());
        self.results.push(result);
        name
    }

    /// Looks up a result by its stored name.
    pub fn get(&self, name: &str) -> Option<&ProbeResult> {
        self.index.get(name).map(|&i| &self.results[i])
    }

    /// Iterates results in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }

    /// Fraction of probes that passed, in `[0, 1]`. Empty stores report 1.
    pub fn pass_rate(&self) -> f64 {
        if self.results.is_empty() {
            1.0
        } else {
            self.passed_count() as f64 / self.results.len() as f64
        }
    }

    /// Consumes the store, yielding results in insertion order.
    pub fn into_results(self) -> Vec<ProbeResult> {
        self.results
    }
}
