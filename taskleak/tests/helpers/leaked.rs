use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::JoinHandle;

/// RAII owner of deliberately leaked threads.
///
/// Each thread blocks sending on a rendezvous channel whose receiver is
/// held here. Dropping the guard drops the receivers, which unblocks every
/// sender, and joins the threads so later tests start from a clean registry.
#[derive(Default)]
pub struct LeakedThreads {
    receivers: Vec<Receiver<bool>>,
    handles: Vec<JoinHandle<()>>,
}

impl LeakedThreads {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a tracked thread running the body built by `make`, blocked on
    /// a send nobody receives.
    pub fn spawn<F>(&mut self, make: fn(SyncSender<bool>) -> F)
    where
        F: FnOnce() + Send + 'static,
    {
        let (tx, rx) = sync_channel(0);
        self.handles.push(taskleak::registry::spawn(make(tx)));
        self.receivers.push(rx);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Unblock and join every thread
    pub fn release(&mut self) {
        self.receivers.clear();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.join() {
                eprintln!("leaked thread panicked: {:?}", e);
            }
        }
    }
}

impl Drop for LeakedThreads {
    fn drop(&mut self) {
        self.release();
    }
}
