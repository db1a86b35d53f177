//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the bridge crates MUST NOT call sleep methods.
//! Readiness, shutdown and call completion are all signalled through channels;
//! deadlines use `tokio::time::timeout`.
//!
//! **Exceptions**: test code (`#[cfg(test)]` modules and `tests/` directories)

use architectural_enforcement::{bridge_root, calls_sleep, scan};

#[test]
fn test_no_sleep_in_production_code() {
    let root = bridge_root();
    assert!(root.exists(), "bridge sources not found at {}", root.display());

    let violations = scan(&root, calls_sleep);

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Wait on I/O instead:");
        eprintln!("  - ReadySignal / watch channels for state changes");
        eprintln!("  - oneshot channels for responses");
        eprintln!("  - tokio::time::timeout() for deadlines");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}
