//! Snapshot models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One running task at the moment of capture
///
/// `label` is a best-effort identifier, not a unique key: two running
/// instances of the same entry function produce identical labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Entry point derived from the first frame (e.g. `my_crate::worker`)
    pub label: String,
    /// Header line of the dump block (e.g. `task 7 [running]:`)
    pub header: String,
    /// Frame lines, innermost first, as they appeared in the dump
    pub stack_trace: Vec<String>,
}

impl TaskRecord {
    /// Whether `pattern` occurs in the label or any stack frame
    pub fn matches(&self, pattern: &str) -> bool {
        self.label.contains(pattern) || self.stack_trace.iter().any(|f| f.contains(pattern))
    }

    /// First frame line, trimmed
    pub fn top_frame(&self) -> Option<&str> {
        self.stack_trace
            .iter()
            .map(|f| f.trim())
            .find(|f| !f.is_empty())
    }

    /// Frame following the entry frame, i.e. where the task was started or
    /// is currently blocked
    pub fn site(&self) -> Option<&str> {
        self.stack_trace
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .nth(1)
            .map(|f| f.strip_prefix("spawned at ").unwrap_or(f))
    }
}

/// All tasks alive at one instant, excluding the capturing task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// When the dump was read
    pub captured_at: DateTime<Utc>,
    records: Vec<TaskRecord>,
}

impl Snapshot {
    pub(crate) fn new(records: Vec<TaskRecord>) -> Self {
        Self {
            captured_at: Utc::now(),
            records,
        }
    }

    pub fn records(&self) -> &[TaskRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records per label
    pub fn label_counts(&self) -> HashMap<&str, usize> {
        let mut counts = HashMap::new();
        for record in &self.records {
            *counts.entry(record.label.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Records of `self` not accounted for by `baseline`.
    ///
    /// Identity is the label with multiplicity: for every label the first
    /// `count_in_baseline` records are considered pre-existing and the rest
    /// are returned, in dump order.
    pub fn excess_over(&self, baseline: &Snapshot) -> Vec<TaskRecord> {
        let mut allowance = baseline.label_counts();
        let mut excess = Vec::new();

        for record in &self.records {
            match allowance.get_mut(record.label.as_str()) {
                Some(remaining) if *remaining > 0 => *remaining -= 1,
                _ => excess.push(record.clone()),
            }
        }

        excess
    }
}
