//! Diagnostic report for confirmed leaks

use crate::capture::TaskRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tasks that survived every settle retry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeakReport {
    /// Surviving candidates from the last comparison, in dump order
    pub leaks: Vec<TaskRecord>,
    /// Comparisons performed, including the first one
    pub attempts: u32,
    /// Total time spent sleeping between comparisons
    pub settled_ms: u64,
}

impl LeakReport {
    pub fn leak_count(&self) -> usize {
        self.leaks.len()
    }

    /// Labels of the leaked tasks, in dump order
    pub fn labels(&self) -> Vec<&str> {
        self.leaks.iter().map(|r| r.label.as_str()).collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Renders the one-line summary followed by every leaked task's header and
/// stack, blocks separated by blank lines.
impl fmt::Display for LeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary: Vec<String> = self
            .leaks
            .iter()
            .map(|r| match r.site() {
                Some(site) => format!("{} at {}", r.label, site),
                None => r.label.clone(),
            })
            .collect();

        write!(
            f,
            "{} unexpected task(s) still running: {}",
            self.leaks.len(),
            summary.join(", ")
        )?;

        for record in &self.leaks {
            write!(f, "\n\n{}", record.header)?;
            for frame in &record.stack_trace {
                write!(f, "\n{}", frame)?;
            }
        }

        Ok(())
    }
}
