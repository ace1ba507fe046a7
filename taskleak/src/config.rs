// Detector configuration: settle policy and ignore list
// Defaults can be overridden through TASKLEAK_* environment variables

use std::time::Duration;

const DEFAULT_RETRIES: u32 = 4;
const DEFAULT_INITIAL_DELAY_MS: u64 = 25;
const DEFAULT_MAX_DELAY_MS: u64 = 400;

/// How long a detector waits for surviving tasks to wind down before
/// declaring a leak.
///
/// The delay starts at `initial_delay` and doubles after every retry,
/// capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlePolicy {
    /// Number of re-captures after the first comparison
    pub max_retries: u32,
    /// Delay before the first re-capture
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_RETRIES,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl SettlePolicy {
    /// Fail on the first comparison, never sleep
    pub fn immediate() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to wait before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Sum of every delay the policy can consume
    pub fn total_window(&self) -> Duration {
        (0..self.max_retries).map(|r| self.delay_for(r)).sum()
    }
}

/// Configuration for a detector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub settle: SettlePolicy,
    /// Substrings of labels or frames that are never reported as leaks
    /// (runtime housekeeping threads and the like)
    pub ignore: Vec<String>,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` but reads values through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SettlePolicy::default();
        let parse_u64 = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let settle = SettlePolicy {
            max_retries: lookup("TASKLEAK_RETRIES")
                .and_then(|v| v.trim().parse::<u32>().ok())
                .unwrap_or(defaults.max_retries),
            initial_delay: parse_u64("TASKLEAK_INITIAL_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_delay),
            max_delay: parse_u64("TASKLEAK_MAX_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
        };

        let ignore = lookup("TASKLEAK_IGNORE")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Self { settle, ignore }
    }

    pub fn with_settle(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }

    /// Add a substring to the ignore list
    pub fn ignore(mut self, pattern: impl Into<String>) -> Self {
        self.ignore.push(pattern.into());
        self
    }
}
