//! Integration Test: Panic Prohibition in the Core Library
//!
//! **Policy**: `bridge/core/src` MUST NOT call `unwrap()` or `expect()` outside
//! of tests. A failing operation, a broken channel or a malformed manifest is
//! swallowed and reported as an error event; it never takes the process down.

use architectural_enforcement::{bridge_root, calls_unwrap, production_sources, scan};

#[test]
fn test_core_sources_are_scanned() {
    let core = bridge_root().join("core/src");
    let sources = production_sources(&core);

    assert!(sources.iter().any(|p| p.ends_with("controller.rs")));
    assert!(sources.iter().any(|p| p.ends_with("client.rs")));
}

#[test]
fn test_no_unwrap_in_core_library() {
    let violations = scan(&bridge_root().join("core/src"), calls_unwrap);

    if !violations.is_empty() {
        eprintln!("\n❌ unwrap()/expect() found in bridge-core production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Propagate with `?` or report through ErrorEvents instead.");

        panic!("\nFound {} panic site(s) in bridge-core.", violations.len());
    }
}
