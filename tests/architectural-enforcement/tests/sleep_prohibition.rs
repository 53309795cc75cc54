//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Core production code MUST NOT sleep. Detection runs on
//! `tokio::time::interval`, playback waits on the audio output with a
//! timeout, and the Conductor reacts to events.
//! **Exceptions**: test code.

use std::path::Path;

use architectural_enforcement::{core_src, report, scan};

#[test]
fn test_no_sleep_in_core_production_code() {
    let violations = scan(
        &core_src(),
        |code| code.contains("::sleep(") || code.contains(".sleep("),
        |_: &Path| false,
    );

    report(
        "Sleep calls found in production code",
        &violations,
        &[
            "✅ Use tokio::time::interval() for periodic work",
            "✅ Use tokio::time::timeout() to bound a wait",
            "❌ Never sleep to 'wait' for something to happen",
        ],
    );
}

#[test]
fn test_no_thread_spawn_in_core() {
    let violations = scan(
        &core_src(),
        |code| code.contains("std::thread::spawn") || code.contains("thread::spawn("),
        |_: &Path| false,
    );

    report(
        "OS threads spawned in production code",
        &violations,
        &["✅ Use tokio::spawn and keep the JoinHandle"],
    );
}
