//! Test-time detection of leaked threads and async tasks.
//!
//! A [`Detector`] captures a baseline snapshot of running tasks when it is
//! created. After the code under test has run, [`Detector::check`] takes
//! fresh snapshots and fails with [`Error::LeakDetected`] if tasks beyond
//! the baseline are still running once a short settle window has passed.
//!
//! Task identity is the entry-point label with multiplicity: three running
//! copies of the same worker against one in the baseline are two leaks.

// Snapshot capture and dump parsing
pub mod capture;

pub mod config;
pub mod detector;
pub mod error;
pub mod harness;

// Tracked spawn wrappers (the registry read by the default source)
pub mod registry;

pub mod report;
pub mod settle;
pub mod source;

#[cfg(test)]
pub(crate) mod test_utils;

pub use capture::{Snapshot, TaskRecord};
pub use config::{Config, SettlePolicy};
pub use detector::Detector;
pub use error::{Error, Result};
pub use harness::{assert_no_leaks, LeakGuard};
pub use report::LeakReport;
pub use source::{DumpSource, RegistrySource};

#[cfg(target_os = "linux")]
pub use source::ProcThreadSource;
