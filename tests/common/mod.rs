//! Shared test utilities for integration tests.
//!
//! Helpers for building deferred values that settle after a delay, plus the
//! proptest strategies used across the integration test files.

#![allow(dead_code)] // These utilities are used by other integration test files

use std::sync::{Arc, Mutex};
use std::time::Duration;

use deferred_value::{Deferred, DeferredError, Outcome, Scheduler};
use deferred_value_testing::TestHarness;
use proptest::prelude::*;

// =============================================================================
// Fixtures
// =============================================================================

/// Starts a harness, panicking outside a runtime.
pub fn harness() -> TestHarness {
    TestHarness::new().expect("tests run inside a tokio runtime")
}

/// A deferred value settled with `outcome` once `millis` have elapsed.
pub fn delayed<T>(scheduler: &Scheduler, millis: u64, outcome: Outcome<T>) -> Deferred<T>
where
    T: Clone + Send + 'static,
{
    Deferred::create(scheduler, |resolver| {
        scheduler.after(Duration::from_millis(millis), move || {
            resolver.settle(outcome);
        });
    })
}

/// Shorthand for a plain-message rejection.
pub fn reason(message: &str) -> DeferredError {
    DeferredError::reason(message)
}

/// An append-only log shared with handlers.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries.lock().unwrap().iter().any(|e| e == entry)
    }
}

// =============================================================================
// Proptest Strategies
// =============================================================================

/// Delays in milliseconds, small enough to keep paused-clock runs fast.
pub fn delay_strategy() -> impl Strategy<Value = u64> {
    0u64..1_000
}

/// Either a value or a rejection with a short message.
pub fn outcome_strategy() -> impl Strategy<Value = Outcome<i32>> {
    prop_oneof![
        3 => any::<i32>().prop_map(Ok),
        1 => "[a-z]{1,8}".prop_map(|message| Err(DeferredError::reason(message))),
    ]
}

/// A list of `(delay, outcome)` pairs describing combinator inputs.
pub fn inputs_strategy(max_len: usize) -> impl Strategy<Value = Vec<(u64, Outcome<i32>)>> {
    prop::collection::vec((delay_strategy(), outcome_strategy()), 0..max_len)
}

/// Spreads delays so no two inputs share a deadline, keeping their relative
/// order. Timers with equal deadlines fire in no particular order.
pub fn distinct_delays(inputs: Vec<(u64, Outcome<i32>)>) -> Vec<(u64, Outcome<i32>)> {
    inputs
        .into_iter()
        .enumerate()
        .map(|(index, (delay, outcome))| (delay * 16 + index as u64, outcome))
        .collect()
}

/// A current-thread runtime with a paused clock.
pub fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap()
}
