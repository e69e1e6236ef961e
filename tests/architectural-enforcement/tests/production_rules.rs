//! Crate-wide rules for production code
//!
//! - The core library propagates errors instead of panicking
//! - Nothing blocks a runtime thread with `std::thread::sleep`
//! - Message text is only ever changed by the store
//! - The core library reports through `tracing`, never by printing

use architectural_enforcement::{assert_clean, find_violations};

const CORE_SRC: &str = "ragchat/core/src";
const CLI_SRC: &str = "ragchat/cli/src";

#[test]
fn test_no_unwrap_or_expect_in_core() {
    let violations = find_violations(CORE_SRC, |line| {
        line.code.contains(".unwrap()") || line.code.contains(".expect(")
    });
    assert_clean("unwrap()/expect() in ragchat-core production code", &violations);
}

#[test]
fn test_no_blocking_sleep() {
    let mut violations = find_violations(CORE_SRC, |line| line.code.contains("thread::sleep("));
    violations.extend(find_violations(CLI_SRC, |line| {
        line.code.contains("thread::sleep(")
    }));
    assert_clean("std::thread::sleep in production code", &violations);
}

#[test]
fn test_message_content_mutated_only_by_store() {
    let violations = find_violations(CORE_SRC, |line| {
        let mutates = line.code.contains(".content.push_str(")
            || line.code.contains(".content.push(")
            || line.code.contains(".content.clear(")
            || line.code.contains(".content = ");
        mutates && !line.path.ends_with("store.rs")
    });
    assert_clean("message content changed outside store.rs", &violations);
}

#[test]
fn test_core_does_not_print() {
    let violations = find_violations(CORE_SRC, |line| {
        ["println!", "eprintln!", "print!(", "eprint!(", "dbg!("]
            .iter()
            .any(|m| line.code.contains(m))
    });
    assert_clean("printing from ragchat-core (use tracing)", &violations);
}
