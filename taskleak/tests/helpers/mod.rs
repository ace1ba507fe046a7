#![allow(dead_code)]

pub mod leaked;

use std::sync::{Mutex, MutexGuard, Once, PoisonError};

/// Tests in one binary share the global task registry; hold this guard
/// while a detector is live so baselines are not disturbed by neighbours.
pub fn serial() -> MutexGuard<'static, ()> {
    static SERIAL: Mutex<()> = Mutex::new(());
    SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Install a tracing subscriber once per test binary (honours RUST_LOG).
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
