//! Integration Test: Core Boundaries
//!
//! Keeps the core library a UI-agnostic engine:
//! - No unwrap()/expect() in production code (errors propagate)
//! - No process-wide mutable state (everything hangs off the Conductor)
//! - No terminal/UI crates in the core's dependencies

use std::fs;
use std::path::Path;

use architectural_enforcement::{core_src, report, scan, workspace_root};

#[test]
fn test_no_unwrap_in_core_production_code() {
    let violations = scan(
        &core_src(),
        |code| code.contains(".unwrap()") || code.contains(".expect("),
        |_: &Path| false,
    );

    report(
        "unwrap()/expect() found in production code",
        &violations,
        &[
            "✅ Return Result and use ?",
            "✅ Map lock or channel failures to a logged warning",
        ],
    );
}

#[test]
fn test_no_global_mutable_state_in_core() {
    let violations = scan(
        &core_src(),
        |code| {
            code.contains("static mut")
                || code.contains("lazy_static!")
                || code.contains("OnceLock<")
                || code.contains("thread_local!")
        },
        |_: &Path| false,
    );

    report(
        "Process-wide mutable state found in the core",
        &violations,
        &["✅ Own state in the Conductor or pass it in through constructors"],
    );
}

#[test]
fn test_core_has_no_ui_dependencies() {
    let manifest = workspace_root().join("conductor/core/Cargo.toml");
    let content = fs::read_to_string(&manifest).expect("core manifest readable");

    let forbidden = ["ratatui", "crossterm", "egui", "gtk", "winit"];
    let found: Vec<&str> = forbidden
        .iter()
        .copied()
        .filter(|name| {
            content.lines().any(|line| {
                let line = line.trim_start();
                line.starts_with(&format!("{name} ")) || line.starts_with(&format!("{name}="))
            })
        })
        .collect();

    assert!(
        found.is_empty(),
        "core depends on UI crates {found:?}; surfaces talk to the Conductor through messages"
    );
}
