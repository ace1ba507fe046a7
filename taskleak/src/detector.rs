//! Leak detector: one baseline, any number of checks against it

use crate::capture::{self, Snapshot, TaskRecord};
use crate::config::Config;
use crate::error::Result;
use crate::settle::{leak_candidates, CheckRun, Sleeper, ThreadSleeper};
use crate::source::{DumpSource, RegistrySource};
use std::fmt;
use std::sync::Arc;

/// Captures a baseline at construction and reports tasks started since.
///
/// Every [`check`](Detector::check) compares a fresh snapshot against the
/// same baseline; checks never replace or mutate it.
///
/// ```rust,ignore
/// let detector = taskleak::Detector::new();
///
/// let (tx, _rx) = std::sync::mpsc::sync_channel::<u8>(0);
/// taskleak::registry::spawn(move || tx.send(1));
///
/// let err = detector.check(&[]).unwrap_err();
/// println!("{}", err);
/// ```
pub struct Detector {
    source: Arc<dyn DumpSource>,
    config: Config,
    sleeper: Arc<dyn Sleeper>,
    baseline: Snapshot,
}

impl Detector {
    /// Detector over the tracked-task registry, configured from the
    /// environment
    pub fn new() -> Self {
        Self::with_source(Arc::new(RegistrySource))
    }

    pub fn with_source(source: Arc<dyn DumpSource>) -> Self {
        Self::with_config(source, Config::from_env())
    }

    pub fn with_config(source: Arc<dyn DumpSource>, config: Config) -> Self {
        let baseline = capture::capture(source.as_ref());
        tracing::debug!(
            source = source.name(),
            tasks = baseline.len(),
            "captured baseline"
        );

        Self {
            source,
            config,
            sleeper: Arc::new(ThreadSleeper),
            baseline,
        }
    }

    /// Detector over the OS threads of the current process
    ///
    /// Fails only when `/proc` is unavailable.
    #[cfg(target_os = "linux")]
    pub fn proc_threads() -> Result<Self> {
        let source = crate::source::ProcThreadSource::current_process()?;
        Ok(Self::with_source(Arc::new(source)))
    }

    /// Replace the sleeper used between blocking comparisons (for testing)
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn baseline(&self) -> &Snapshot {
        &self.baseline
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fail with [`Error::LeakDetected`](crate::Error::LeakDetected) if
    /// tasks beyond the baseline are still running after the settle window.
    ///
    /// With filters, only tasks whose label or stack contains at least one
    /// filter are considered. Blocks the caller while settling.
    pub fn check(&self, filters: &[&str]) -> Result<()> {
        CheckRun::new(self.source.as_ref(), &self.baseline, &self.config, filters)
            .run_blocking(self.sleeper.as_ref())
    }

    /// Same as [`check`](Detector::check) but settles on the tokio timer
    /// instead of blocking the thread
    pub async fn check_async(&self, filters: &[&str]) -> Result<()> {
        CheckRun::new(self.source.as_ref(), &self.baseline, &self.config, filters)
            .run_async()
            .await
    }

    /// Single comparison against the baseline, without settling
    pub fn leaks_now(&self, filters: &[&str]) -> Vec<TaskRecord> {
        let current = capture::capture(self.source.as_ref());
        leak_candidates(&self.baseline, &current, filters, &self.config.ignore)
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detector")
            .field("source", &self.source.name())
            .field("config", &self.config)
            .field("baseline_tasks", &self.baseline.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SettlePolicy;
    use crate::test_utils::{init_tracing, FakeSource, RecordingSleeper};
    use std::time::Duration;

    const BASE: &str = "task 1 [thread]:\napp::server\n";

    fn detector(dumps: Vec<&str>) -> (Detector, Arc<RecordingSleeper>) {
        init_tracing();
        let sleeper = Arc::new(RecordingSleeper::default());
        let detector = Detector::with_config(Arc::new(FakeSource::new(dumps)), Config::default())
            .with_sleeper(sleeper.clone());
        (detector, sleeper)
    }

    #[test]
    fn test_quiescent_check_succeeds() {
        let (detector, sleeper) = detector(vec![BASE]);
        assert!(detector.check(&[]).is_ok());
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn test_checks_do_not_move_the_baseline() {
        let extra = "task 1:\napp::server\n\ntask 2:\napp::worker\n";
        let (detector, _) = detector(vec![BASE, BASE, BASE, extra]);

        assert!(detector.check(&[]).is_ok());
        assert!(detector.check(&[]).is_ok());
        let err = detector.check(&[]).unwrap_err();
        assert_eq!(err.report().unwrap().labels(), vec!["app::worker"]);
        assert_eq!(detector.baseline().len(), 1);
    }

    #[test]
    fn test_multiplicity_is_counted() {
        let three = "task 1:\napp::server\n\n\
                     task 2:\napp::routine\n\n\
                     task 3:\napp::routine\n\n\
                     task 4:\napp::routine\n";
        let (detector, _) = detector(vec![BASE, three]);

        let err = detector.check(&["routine"]).unwrap_err();
        assert_eq!(err.report().unwrap().leak_count(), 3);
        assert!(err.to_string().starts_with("3 unexpected task(s) still running"));
    }

    #[test]
    fn test_checking_task_excludes_itself() {
        let with_self = "task 1:\napp::server\n\ntask 9 [thread]:\napp::checker\n";
        let source = FakeSource::new(vec![BASE, with_self]).with_marker("task 9 [thread]:");
        let detector = Detector::with_config(
            Arc::new(source),
            Config::default().with_settle(SettlePolicy::immediate()),
        );

        for _ in 0..3 {
            assert!(detector.check(&[]).is_ok());
        }
    }

    #[test]
    fn test_leaks_now_skips_settling() {
        let extra = "task 1:\napp::server\n\ntask 2:\napp::worker\n";
        let (detector, sleeper) = detector(vec![BASE, extra]);
        let leaks = detector.leaks_now(&[]);
        assert_eq!(leaks.len(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn test_settle_window_is_bounded() {
        let extra = "task 1:\napp::server\n\ntask 2:\napp::worker\n";
        let (detector, sleeper) = detector(vec![BASE, extra]);
        assert!(detector.check(&[]).is_err());

        let total: Duration = sleeper.delays().iter().sum();
        assert_eq!(total, detector.config().settle.total_window());
    }

    #[test]
    fn test_debug_output_names_source() {
        let (detector, _) = detector(vec![BASE]);
        let debug = format!("{:?}", detector);
        assert!(debug.contains("fake"));
        assert!(debug.contains("baseline_tasks: 1"));
    }
}
