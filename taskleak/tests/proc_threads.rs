//! Integration tests: detect leaked OS threads through /proc
//!
//! Run with: cargo test --test proc_threads

#![cfg(target_os = "linux")]

mod helpers;

use helpers::{init_tracing, serial};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use taskleak::{Config, Detector, ProcThreadSource, SettlePolicy};

fn spawn_parked(name: &str) -> (mpsc::Sender<()>, thread::JoinHandle<()>) {
    let (release, rx) = mpsc::channel::<()>();
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let _ = rx.recv();
        })
        .unwrap();
    (release, handle)
}

#[test]
fn test_untracked_named_thread_is_detected() {
    init_tracing();
    let _serial = serial();

    let detector = Detector::proc_threads().expect("/proc is available on Linux");
    let (release, handle) = spawn_parked("proc-leaker");

    let err = detector.check(&["proc-leaker"]).unwrap_err();
    let report = err.report().unwrap();
    assert_eq!(report.labels(), vec!["proc-leaker"]);
    assert!(err.to_string().contains("state: "));

    release.send(()).unwrap();
    handle.join().unwrap();
    detector
        .check(&["proc-leaker"])
        .expect("joined thread is gone from /proc");
}

#[test]
fn test_checking_thread_excludes_itself_from_proc_dump() {
    init_tracing();
    let _serial = serial();

    let source = Arc::new(ProcThreadSource::current_process().unwrap());
    let config = Config::default().with_settle(SettlePolicy::immediate());

    // Build the baseline on one thread and check from a newer one; the
    // checker must not report itself.
    let detector = Detector::with_config(source, config);
    let result = thread::Builder::new()
        .name("proc-checker".into())
        .spawn(move || detector.check(&["proc-checker"]))
        .unwrap()
        .join()
        .unwrap();

    result.expect("checking thread is excluded");
}

#[test]
fn test_ignore_list_hides_matching_threads() {
    init_tracing();
    let _serial = serial();

    let source = Arc::new(ProcThreadSource::current_process().unwrap());
    let config = Config::default()
        .with_settle(SettlePolicy::immediate())
        .ignore("proc-ignored");
    let detector = Detector::with_config(source, config);

    let (release, handle) = spawn_parked("proc-ignored");
    detector.check(&["proc-ignored"]).unwrap();

    release.send(()).unwrap();
    handle.join().unwrap();
}
