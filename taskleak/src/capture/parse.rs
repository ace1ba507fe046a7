//! Parsing of textual task dumps into records
//!
//! A dump is a sequence of blocks separated by blank lines. The first line
//! of a block is a header identifying the task, the remaining lines are its
//! frames, innermost first:
//!
//! ```text
//! task 7 [running]:
//! my_crate::worker
//! spawned at src/lib.rs:42:5
//!
//! goroutine 18 [chan send]:
//! main.routine(0xc000016120)
//!         /src/main_test.go:38 +0x2c
//! ```

use super::models::TaskRecord;
use regex::Regex;
use std::sync::OnceLock;

/// Frames starting with this path belong to the capture routine itself
pub(crate) const CAPTURE_ENTRY: &str = "taskleak::capture::";

/// Result of parsing one dump
#[derive(Debug, Default)]
pub(crate) struct ParsedDump {
    pub records: Vec<TaskRecord>,
    /// Blocks dropped because they belong to the capturing task
    pub excluded: usize,
}

/// Parse a dump, dropping the block whose header equals `current_marker`
/// and any block whose entry frame is the capture routine.
pub(crate) fn parse_dump(text: &str, current_marker: Option<&str>) -> ParsedDump {
    let mut parsed = ParsedDump::default();

    for block in split_blocks(text) {
        let Some((header, frames)) = block.split_first() else {
            continue;
        };
        let header = header.trim();

        if current_marker.is_some_and(|m| m.trim() == header) {
            parsed.excluded += 1;
            continue;
        }

        let stack_trace: Vec<String> = frames.iter().map(|f| f.to_string()).collect();
        let label = stack_trace
            .iter()
            .find(|f| !f.trim().is_empty())
            .map(|f| derive_label(f))
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| header.trim_end_matches(':').to_string());

        if label.starts_with(CAPTURE_ENTRY) {
            parsed.excluded += 1;
            continue;
        }

        parsed.records.push(TaskRecord {
            label,
            header: header.to_string(),
            stack_trace,
        });
    }

    parsed
}

/// Split text into blocks of non-blank lines
fn split_blocks(text: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    blocks
}

/// Derive a short identifier from a frame line
///
/// Strips frame numbering, addresses, symbol hashes, closure segments,
/// argument lists and trailing source locations, keeping the function path.
pub fn derive_label(frame: &str) -> String {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

    let patterns = PATTERNS.get_or_init(|| {
        vec![
            // "  12: " frame numbering from std backtraces
            Regex::new(r"^\d+:\s*").unwrap(),
            // "0x55d4c8a1b2c3 - " address prefix
            Regex::new(r"^0x[0-9a-fA-F]+\s+-\s+").unwrap(),
            // " at src/lib.rs:10:5" trailing location
            Regex::new(r"\s+at\s+\S+$").unwrap(),
            // "(0xc000016120, 0x1)" trailing argument list
            Regex::new(r"\([^()]*\)$").unwrap(),
            // "::h0123456789abcdef" symbol hash
            Regex::new(r"::h[0-9a-f]{16}$").unwrap(),
            // "::{{closure}}" / "::{async_block#0}" segments, possibly nested
            Regex::new(r"(::\{\{[a-z_]+\}\}|::\{[a-z_]+#\d+\})+").unwrap(),
        ]
    });

    let mut label = frame.trim().to_string();
    for pattern in patterns {
        label = pattern.replace_all(&label, "").trim().to_string();
    }

    label
}
