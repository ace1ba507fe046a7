//! Process-wide table of tracked tasks
//!
//! Rust has no runtime-wide list of running threads with their stacks, so
//! tasks that should be visible to a [`Detector`](crate::Detector) are
//! started through the wrappers in this module. Each wrapper registers the
//! task before it starts and removes it when the task body finishes,
//! panics, or (for async tasks) is dropped by its runtime.
//!
//! The label of a task is the path of the function that defined its
//! closure or future. Spawning `move || tx.send(1)` from inside
//! `fn start_worker()` produces the label `my_crate::start_worker`.

use once_cell::sync::Lazy;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::future::Future;
use std::io;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

static REGISTRY: Lazy<TaskRegistry> = Lazy::new(TaskRegistry::new);

thread_local! {
    static CURRENT_THREAD_TASK: Cell<Option<u64>> = const { Cell::new(None) };
}

tokio::task_local! {
    static CURRENT_ASYNC_TASK: u64;
}

/// Kind of tracked task, shown in the dump header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Thread,
    Async,
}

impl TaskKind {
    fn as_str(self) -> &'static str {
        match self {
            TaskKind::Thread => "thread",
            TaskKind::Async => "async",
        }
    }
}

#[derive(Debug)]
struct TaskEntry {
    kind: TaskKind,
    /// Caller-supplied name, if any
    name: Option<String>,
    /// `type_name` of the closure or future
    entry: &'static str,
    spawned_at: &'static Location<'static>,
    backtrace: Backtrace,
}

impl TaskEntry {
    fn header(&self, id: u64) -> String {
        format!("task {} [{}]:", id, self.kind.as_str())
    }
}

/// Table of live tracked tasks
#[derive(Debug)]
struct TaskRegistry {
    tasks: Mutex<BTreeMap<u64, TaskEntry>>,
    next_id: AtomicU64,
}

impl TaskRegistry {
    fn new() -> Self {
        Self {
            tasks: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    // A task that panicked while holding the lock must not disable tracking
    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, TaskEntry>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(
        &'static self,
        kind: TaskKind,
        name: Option<String>,
        entry: &'static str,
        spawned_at: &'static Location<'static>,
    ) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = TaskEntry {
            kind,
            name,
            entry,
            spawned_at,
            backtrace: Backtrace::capture(),
        };
        tracing::trace!(id, kind = kind.as_str(), entry = entry.entry, "registered task");
        self.lock().insert(id, entry);

        Registration { id, registry: self }
    }

    fn remove(&self, id: u64) {
        if self.lock().remove(&id).is_some() {
            tracing::trace!(id, "deregistered task");
        }
    }

    fn header(&self, id: u64) -> Option<String> {
        self.lock().get(&id).map(|e| e.header(id))
    }

    fn render(&self) -> String {
        let tasks = self.lock();
        let mut out = String::new();

        for (id, entry) in tasks.iter() {
            let _ = writeln!(out, "{}", entry.header(*id));
            match &entry.name {
                Some(name) => {
                    let _ = writeln!(out, "{}", name);
                    let _ = writeln!(out, "spawned at {}", entry.spawned_at);
                    let _ = writeln!(out, "{}", entry.entry);
                }
                None => {
                    let _ = writeln!(out, "{}", entry.entry);
                    let _ = writeln!(out, "spawned at {}", entry.spawned_at);
                }
            }
            if entry.backtrace.status() == BacktraceStatus::Captured {
                for line in entry.backtrace.to_string().lines() {
                    if !line.trim().is_empty() {
                        let _ = writeln!(out, "{}", line);
                    }
                }
            }
            out.push('\n');
        }

        out
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Keeps a task in the registry until dropped
#[derive(Debug)]
struct Registration {
    id: u64,
    registry: &'static TaskRegistry,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

fn entry_of<F>() -> &'static str {
    std::any::type_name::<F>()
}

fn run_registered<F, T>(registration: Registration, f: F) -> T
where
    F: FnOnce() -> T,
{
    CURRENT_THREAD_TASK.with(|c| c.set(Some(registration.id)));
    let _registration = registration;
    f()
}

/// Spawn a tracked thread, panicking if the OS refuses to create it
/// (same contract as [`std::thread::spawn`]).
#[track_caller]
pub fn spawn<F, T>(f: F) -> thread::JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let registration = REGISTRY.register(TaskKind::Thread, None, entry_of::<F>(), Location::caller());
    thread::spawn(move || run_registered(registration, f))
}

/// Spawn a tracked thread with an explicit name
///
/// The name becomes both the OS thread name and the task label.
#[track_caller]
pub fn spawn_named<F, T>(name: impl Into<String>, f: F) -> io::Result<thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let name = name.into();
    let registration = REGISTRY.register(
        TaskKind::Thread,
        Some(name.clone()),
        entry_of::<F>(),
        Location::caller(),
    );
    thread::Builder::new()
        .name(name)
        .spawn(move || run_registered(registration, f))
}

/// Spawn a tracked task on the current tokio runtime
///
/// Must be called from within a runtime, like [`tokio::spawn`].
#[track_caller]
pub fn spawn_async<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let registration = REGISTRY.register(TaskKind::Async, None, entry_of::<F>(), Location::caller());
    spawn_registered(registration, future)
}

/// Spawn a tracked task on the current tokio runtime with an explicit label
#[track_caller]
pub fn spawn_async_named<F>(name: impl Into<String>, future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let registration = REGISTRY.register(
        TaskKind::Async,
        Some(name.into()),
        entry_of::<F>(),
        Location::caller(),
    );
    spawn_registered(registration, future)
}

fn spawn_registered<F>(registration: Registration, future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let id = registration.id;
    tokio::spawn(CURRENT_ASYNC_TASK.scope(id, async move {
        let _registration = registration;
        future.await
    }))
}

/// Id of the tracked task the caller is running in, if any
pub fn current_task() -> Option<u64> {
    CURRENT_ASYNC_TASK
        .try_with(|id| *id)
        .ok()
        .or_else(|| CURRENT_THREAD_TASK.with(Cell::get))
}

/// Dump header of the calling task, if it is tracked and still registered
pub fn current_header() -> Option<String> {
    current_task().and_then(|id| REGISTRY.header(id))
}

/// Render all live tracked tasks in dump format, in spawn order
pub fn dump() -> String {
    REGISTRY.render()
}

/// Number of live tracked tasks
pub fn live_count() -> usize {
    REGISTRY.len()
}
