//! Shared helpers for the integration suites.

#![allow(dead_code)]

use std::time::Duration;

/// Polls `condition` every `tick` until it holds, panicking after
/// `wait_for`.
pub async fn eventually(condition: impl Fn() -> bool, wait_for: Duration, tick: Duration, msg: &str) {
    let deadline = tokio::time::Instant::now() + wait_for;
    loop {
        if condition() {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {wait_for:?}: {msg}");
        }
        tokio::time::sleep(tick).await;
    }
}

/// Asserts that `condition` holds at every `tick` for the whole `wait_for`
/// window.
pub async fn constantly(condition: impl Fn() -> bool, wait_for: Duration, tick: Duration, msg: &str) {
    let deadline = tokio::time::Instant::now() + wait_for;
    while tokio::time::Instant::now() < deadline {
        assert!(condition(), "condition violated: {msg}");
        tokio::time::sleep(tick).await;
    }
}
