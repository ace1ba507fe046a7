//! Task dump sources
//!
//! Defines the DumpSource trait the capture routine reads from, inverting the
//! dependency so parsing and diffing never touch process state directly.

#[cfg(target_os = "linux")]
use crate::error::{Error, Result};
use crate::registry;
use std::io;

/// Provider of a textual dump of running tasks
///
/// The dump is a sequence of blank-line-separated blocks, each a header
/// line followed by frame lines (see [`crate::capture::parse`]).
pub trait DumpSource: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &'static str;

    /// Dump all tasks currently alive
    fn dump(&self) -> io::Result<String>;

    /// Header line this source emits for the calling task, if the caller
    /// appears in its dumps at all
    fn current_marker(&self) -> Option<String> {
        None
    }
}

/// Tasks started through [`crate::registry`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistrySource;

impl DumpSource for RegistrySource {
    fn name(&self) -> &'static str {
        "registry"
    }

    fn dump(&self) -> io::Result<String> {
        Ok(registry::dump())
    }

    fn current_marker(&self) -> Option<String> {
        registry::current_header()
    }
}

/// OS threads of a process, read from `/proc/<pid>/task`
///
/// Each thread becomes one block:
///
/// ```text
/// thread 4242:
/// tokio-runtime-worker
/// state: S (sleeping)
/// wchan: futex_wait_queue
/// ```
///
/// The thread name is the label, so unnamed threads spawned by the same
/// binary all share the binary's name.
#[cfg(target_os = "linux")]
#[derive(Debug, Clone)]
pub struct ProcThreadSource {
    task_dir: std::path::PathBuf,
    is_self: bool,
}

#[cfg(target_os = "linux")]
impl ProcThreadSource {
    /// Threads of the current process
    pub fn current_process() -> Result<Self> {
        Self::open(std::path::PathBuf::from("/proc/self/task"), true)
    }

    /// Threads of another process
    pub fn for_pid(pid: u32) -> Result<Self> {
        let is_self = pid == std::process::id();
        Self::open(std::path::PathBuf::from(format!("/proc/{}/task", pid)), is_self)
    }

    fn open(task_dir: std::path::PathBuf, is_self: bool) -> Result<Self> {
        std::fs::read_dir(&task_dir).map_err(|e| Error::SourceUnavailable {
            source_name: "proc-threads",
            reason: format!("{}: {}", task_dir.display(), e),
        })?;
        Ok(Self { task_dir, is_self })
    }

    fn thread_ids(&self) -> io::Result<Vec<u32>> {
        let mut tids: Vec<u32> = std::fs::read_dir(&self.task_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .collect();
        tids.sort_unstable();
        Ok(tids)
    }

    fn render_thread(&self, tid: u32) -> Option<String> {
        let dir = self.task_dir.join(tid.to_string());
        // Threads can exit between listing and reading
        let comm = std::fs::read_to_string(dir.join("comm")).ok()?;
        let state = std::fs::read_to_string(dir.join("status"))
            .ok()
            .and_then(|status| {
                status
                    .lines()
                    .find_map(|l| l.strip_prefix("State:").map(|s| s.trim().to_string()))
            })
            .unwrap_or_else(|| "?".to_string());
        let wchan = std::fs::read_to_string(dir.join("wchan"))
            .ok()
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty() && w != "0")
            .unwrap_or_else(|| "-".to_string());

        Some(format!(
            "{}\n{}\nstate: {}\nwchan: {}\n",
            thread_header(tid),
            comm.trim(),
            state,
            wchan
        ))
    }
}

#[cfg(target_os = "linux")]
fn thread_header(tid: u32) -> String {
    format!("thread {}:", tid)
}

#[cfg(target_os = "linux")]
fn current_tid() -> u32 {
    // SAFETY: gettid takes no arguments and cannot fail
    let tid = unsafe { libc::syscall(libc::SYS_gettid) };
    tid as u32
}

#[cfg(target_os = "linux")]
impl DumpSource for ProcThreadSource {
    fn name(&self) -> &'static str {
        "proc-threads"
    }

    fn dump(&self) -> io::Result<String> {
        let blocks: Vec<String> = self
            .thread_ids()?
            .into_iter()
            .filter_map(|tid| self.render_thread(tid))
            .collect();
        Ok(blocks.join("\n"))
    }

    fn current_marker(&self) -> Option<String> {
        self.is_self.then(|| thread_header(current_tid()))
    }
}
