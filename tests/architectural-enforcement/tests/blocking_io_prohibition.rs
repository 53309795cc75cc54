//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Core production code MUST NOT use blocking I/O.
//! **Exceptions**: configuration loading (runs once, before the Conductor
//! starts) and the headless driver's startup code in `bin/`.

use std::path::Path;

use architectural_enforcement::{core_src, report, scan};

const FORBIDDEN: &[&str] = &[
    "std::fs::",
    "std::net::",
    "std::process::Command",
    "reqwest::blocking",
    "std::io::stdin",
];

fn is_startup_path(relative: &Path) -> bool {
    relative == Path::new("config.rs") || relative.starts_with("bin")
}

#[test]
fn test_no_blocking_io_in_core_production_code() {
    let violations = scan(
        &core_src(),
        |code| FORBIDDEN.iter().any(|pattern| code.contains(pattern)),
        is_startup_path,
    );

    report(
        "Blocking I/O found in production code",
        &violations,
        &[
            "✅ reqwest async client for the backend and model hosts",
            "✅ tokio::io for stdin/stdout in the headless driver",
            "✅ std::fs only in config.rs and bin/ startup code",
        ],
    );
}
