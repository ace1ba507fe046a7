//! Snapshot capture
//!
//! Reads a textual dump from a [`DumpSource`], parses it into
//! [`TaskRecord`]s and drops the block that belongs to the caller.

pub mod models;
pub mod parse;

pub use models::{Snapshot, TaskRecord};
pub use parse::derive_label;

use crate::source::DumpSource;

/// Capture every task currently known to `source`, except the caller.
///
/// Never fails: a dump error yields an empty snapshot, a truncated dump
/// yields whatever blocks could be read.
pub fn capture(source: &dyn DumpSource) -> Snapshot {
    let text = match source.dump() {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(source = source.name(), error = %e, "task dump failed, capturing nothing");
            String::new()
        }
    };
    let marker = source.current_marker();

    let parsed = parse::parse_dump(&text, marker.as_deref());
    tracing::debug!(
        source = source.name(),
        tasks = parsed.records.len(),
        excluded = parsed.excluded,
        "captured snapshot"
    );

    Snapshot::new(parsed.records)
}

/// Parse a saved dump (e.g. from a file) into a snapshot.
///
/// No self-exclusion marker applies; blocks of the capture routine are
/// still dropped.
pub fn parse_snapshot(text: &str) -> Snapshot {
    Snapshot::new(parse::parse_dump(text, None).records)
}
