//! Settle loop for leak checks
//!
//! A check is a small state machine:
//!
//! ```text
//! Capturing -> Comparing -> Clean
//!                  |
//!                  +-> Settling -> Capturing   (while retries remain)
//!                  |
//!                  +-> LeakConfirmed           (retries exhausted)
//! ```
//!
//! [`CheckRun::advance`] runs transitions until the machine either needs to
//! sleep or reaches a terminal state, so the same machine drives both the
//! blocking and the async check.

use crate::capture::{self, Snapshot, TaskRecord};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::report::LeakReport;
use crate::source::DumpSource;
use std::time::Duration;

/// Blocking sleep used between comparisons
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Real thread sleep
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Tasks in `current` beyond `baseline` that pass the ignore list and
/// filters.
///
/// With no filters every excess task is a candidate; otherwise a task must
/// contain at least one filter in its label or a frame.
pub fn leak_candidates(
    baseline: &Snapshot,
    current: &Snapshot,
    filters: &[&str],
    ignore: &[String],
) -> Vec<TaskRecord> {
    current
        .excess_over(baseline)
        .into_iter()
        .filter(|r| !ignore.iter().any(|pattern| r.matches(pattern)))
        .filter(|r| filters.is_empty() || filters.iter().any(|f| r.matches(f)))
        .collect()
}

#[derive(Debug)]
enum SettleState {
    Capturing { retry: u32 },
    Comparing { retry: u32, current: Snapshot },
    Settling { retry: u32 },
    LeakConfirmed { retry: u32, leaks: Vec<TaskRecord> },
    Clean { retry: u32 },
}

/// Outcome of advancing a check
pub(crate) enum Step<'a> {
    /// Sleep for the duration, then advance the returned run
    Sleep(CheckRun<'a>, Duration),
    Done(Result<()>),
}

/// One in-flight check against a fixed baseline
pub(crate) struct CheckRun<'a> {
    source: &'a dyn DumpSource,
    baseline: &'a Snapshot,
    config: &'a Config,
    filters: &'a [&'a str],
    state: SettleState,
    slept: Duration,
}

impl<'a> CheckRun<'a> {
    pub(crate) fn new(
        source: &'a dyn DumpSource,
        baseline: &'a Snapshot,
        config: &'a Config,
        filters: &'a [&'a str],
    ) -> Self {
        Self {
            source,
            baseline,
            config,
            filters,
            state: SettleState::Capturing { retry: 0 },
            slept: Duration::ZERO,
        }
    }

    pub(crate) fn advance(mut self) -> Step<'a> {
        let mut state = std::mem::replace(&mut self.state, SettleState::Capturing { retry: 0 });

        loop {
            tracing::trace!(state = ?StateName::of(&state), "settle transition");

            state = match state {
                SettleState::Capturing { retry } => SettleState::Comparing {
                    retry,
                    current: capture::capture(self.source),
                },
                SettleState::Comparing { retry, current } => {
                    let leaks =
                        leak_candidates(self.baseline, &current, self.filters, &self.config.ignore);
                    if leaks.is_empty() {
                        SettleState::Clean { retry }
                    } else if retry >= self.config.settle.max_retries {
                        SettleState::LeakConfirmed { retry, leaks }
                    } else {
                        tracing::debug!(
                            candidates = leaks.len(),
                            retry,
                            "leak candidates present, settling"
                        );
                        SettleState::Settling { retry }
                    }
                }
                SettleState::Settling { retry } => {
                    let delay = self.config.settle.delay_for(retry);
                    self.slept += delay;
                    self.state = SettleState::Capturing { retry: retry + 1 };
                    return Step::Sleep(self, delay);
                }
                SettleState::Clean { retry } => {
                    tracing::debug!(attempts = retry + 1, "no leaked tasks");
                    return Step::Done(Ok(()));
                }
                SettleState::LeakConfirmed { retry, leaks } => {
                    let report = LeakReport {
                        leaks,
                        attempts: retry + 1,
                        settled_ms: self.slept.as_millis() as u64,
                    };
                    tracing::warn!(
                        leaks = report.leak_count(),
                        attempts = report.attempts,
                        settled_ms = report.settled_ms,
                        "leaked tasks confirmed"
                    );
                    return Step::Done(Err(Error::LeakDetected(report)));
                }
            };
        }
    }

    /// Drive the run to completion, sleeping with `sleeper`
    pub(crate) fn run_blocking(self, sleeper: &dyn Sleeper) -> Result<()> {
        let mut run = self;
        loop {
            match run.advance() {
                Step::Sleep(next, delay) => {
                    sleeper.sleep(delay);
                    run = next;
                }
                Step::Done(result) => return result,
            }
        }
    }

    /// Drive the run to completion, sleeping on the tokio timer
    pub(crate) async fn run_async(self) -> Result<()> {
        let mut run = self;
        loop {
            match run.advance() {
                Step::Sleep(next, delay) => {
                    tokio::time::sleep(delay).await;
                    run = next;
                }
                Step::Done(result) => return result,
            }
        }
    }
}

#[derive(Debug)]
enum StateName {
    Capturing,
    Comparing,
    Settling,
    LeakConfirmed,
    Clean,
}

impl StateName {
    fn of(state: &SettleState) -> Self {
        match state {
            SettleState::Capturing { .. } => StateName::Capturing,
            SettleState::Comparing { .. } => StateName::Comparing,
            SettleState::Settling { .. } => StateName::Settling,
            SettleState::LeakConfirmed { .. } => StateName::LeakConfirmed,
            SettleState::Clean { .. } => StateName::Clean,
        }
    }
}
