//! Test utilities for detector tests
//!
//! This module is only compiled in test builds and provides scripted dump
//! sources and a sleeper that records delays instead of waiting.

use crate::settle::Sleeper;
use crate::source::DumpSource;
use std::collections::VecDeque;
use std::io;
use std::sync::{Mutex, Once};
use std::time::Duration;

/// Install a tracing subscriber once per test binary.
///
/// Verbosity follows `RUST_LOG` (defaults to `warn`).
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Dump source that replays a script of dumps
///
/// Each `dump()` returns the next entry; the last entry repeats forever.
#[derive(Debug)]
pub struct FakeSource {
    dumps: Mutex<VecDeque<String>>,
    marker: Option<String>,
    fail: bool,
}

impl FakeSource {
    pub fn new(dumps: Vec<&str>) -> Self {
        Self {
            dumps: Mutex::new(dumps.into_iter().map(String::from).collect()),
            marker: None,
            fail: false,
        }
    }

    /// Source whose every dump fails
    pub fn failing() -> Self {
        Self {
            dumps: Mutex::new(VecDeque::new()),
            marker: None,
            fail: true,
        }
    }

    /// Header reported as the calling task
    pub fn with_marker(mut self, marker: &str) -> Self {
        self.marker = Some(marker.to_string());
        self
    }
}

impl DumpSource for FakeSource {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn dump(&self) -> io::Result<String> {
        if self.fail {
            return Err(io::Error::new(io::ErrorKind::Other, "dump unavailable"));
        }

        let mut dumps = self.dumps.lock().unwrap();
        let next = if dumps.len() > 1 {
            dumps.pop_front()
        } else {
            dumps.front().cloned()
        };
        Ok(next.unwrap_or_default())
    }

    fn current_marker(&self) -> Option<String> {
        self.marker.clone()
    }
}

/// Sleeper that records requested delays and returns immediately
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_source_replays_then_repeats_last() {
        let source = FakeSource::new(vec!["a", "b"]);
        assert_eq!(source.dump().unwrap(), "a");
        assert_eq!(source.dump().unwrap(), "b");
        assert_eq!(source.dump().unwrap(), "b");
    }

    #[test]
    fn test_failing_source_errors() {
        assert!(FakeSource::failing().dump().is_err());
    }

    #[test]
    fn test_recording_sleeper_does_not_block() {
        let sleeper = RecordingSleeper::default();
        let start = std::time::Instant::now();
        sleeper.sleep(Duration::from_secs(60));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(60)]);
    }
}
