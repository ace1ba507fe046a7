//! Assertion helpers for test harnesses
//!
//! ```rust,ignore
//! #[test]
//! fn server_shuts_down_cleanly() {
//!     let _guard = taskleak::LeakGuard::new();
//!     run_server_and_stop_it();
//! } // panics here if tracked tasks are still running
//! ```

use crate::detector::Detector;
use crate::error::Error;

/// Panic with the leak diagnostic if `detector` finds leaked tasks.
///
/// # Panics
///
/// When the check fails, with the full report as the message.
#[track_caller]
pub fn assert_no_leaks(detector: &Detector, filters: &[&str]) {
    if let Err(err) = detector.check(filters) {
        panic!("Task leak check failed\n{}", err);
    }
}

/// RAII guard that checks for leaked tasks when dropped
///
/// The check is skipped if the thread is already panicking, so a failing
/// test reports its own assertion rather than a follow-up leak.
#[derive(Debug)]
pub struct LeakGuard {
    detector: Option<Detector>,
    filters: Vec<String>,
}

impl LeakGuard {
    /// Guard over the tracked-task registry
    pub fn new() -> Self {
        Self::with_detector(Detector::new())
    }

    pub fn with_detector(detector: Detector) -> Self {
        Self {
            detector: Some(detector),
            filters: Vec::new(),
        }
    }

    /// Only report tasks matching `filter` (may be called repeatedly)
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }

    /// Run the check now and consume the guard
    pub fn finish(mut self) -> Result<(), Error> {
        self.run_check()
    }

    fn run_check(&mut self) -> Result<(), Error> {
        let Some(detector) = self.detector.take() else {
            return Ok(());
        };
        let filters: Vec<&str> = self.filters.iter().map(String::as_str).collect();
        detector.check(&filters)
    }
}

impl Default for LeakGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LeakGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        if let Err(err) = self.run_check() {
            panic!("Task leak check failed\n{}", err);
        }
    }
}
