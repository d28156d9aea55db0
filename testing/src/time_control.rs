//! Time control utilities for deferred value tests.
//!
//! Timers armed through [`Scheduler::after`](deferred_value::Scheduler::after)
//! sleep on tokio's clock. Pausing that clock lets a test jump over delays
//! instead of waiting for them, and while it is paused tokio also advances
//! it automatically whenever every task is idle.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use deferred_value::{Deferred, Scheduler};
//! use deferred_value_testing::TimeControl;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! TimeControl::enable().await.unwrap();
//!
//! let scheduler = Scheduler::new().unwrap();
//! let value = Deferred::delay(&scheduler, Duration::from_secs(3600), 1);
//! TimeControl::advance_secs(3600).await;
//! assert_eq!(value.await, Ok(1));
//!
//! TimeControl::disable().await.unwrap();
//! # }
//! ```

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use crate::error::TestError;

thread_local! {
    /// Whether this thread's runtime clock was paused through [`TimeControl`].
    ///
    /// A paused clock belongs to a `current_thread` runtime, which runs on a
    /// single thread, so tests running in parallel each track their own.
    static TIME_CONTROL_ACTIVE: Cell<bool> = const { Cell::new(false) };
}

/// Utilities for pausing and advancing tokio's clock.
///
/// Pausing requires the `current_thread` runtime, which is what
/// `#[tokio::test]` uses by default.
#[derive(Debug, Clone, Copy)]
pub struct TimeControl;

impl TimeControl {
    /// Pauses the clock. Idempotent.
    ///
    /// A runtime started with `start_paused = true` is already paused; this
    /// only records that.
    ///
    /// # Errors
    ///
    /// Returns [`TestError::TimeControl`] when the current runtime cannot be
    /// paused, e.g. a multi-threaded runtime.
    pub async fn enable() -> Result<(), TestError> {
        if Self::is_enabled() {
            return Ok(());
        }
        match panic::catch_unwind(AssertUnwindSafe(tokio::time::pause)) {
            Ok(()) => {}
            Err(payload) => {
                let message = payload_message(&*payload);
                if message.contains("current_thread") {
                    tracing::warn!(
                        "Time control requires the current_thread runtime: {}",
                        message
                    );
                    return Err(TestError::TimeControl(message));
                }
            }
        }
        TIME_CONTROL_ACTIVE.with(|active| active.set(true));
        Ok(())
    }

    /// Resumes the clock. Idempotent.
    pub async fn disable() -> Result<(), TestError> {
        if Self::is_enabled() {
            tokio::time::resume();
            TIME_CONTROL_ACTIVE.with(|active| active.set(false));
        }
        Ok(())
    }

    /// Returns whether the clock was paused through [`TimeControl`] and not
    /// resumed since.
    pub fn is_enabled() -> bool {
        TIME_CONTROL_ACTIVE.with(Cell::get)
    }

    /// Advances the paused clock, firing every timer due within `duration`.
    pub async fn advance(duration: Duration) {
        tokio::time::advance(duration).await;
    }

    /// Advances the paused clock by whole seconds.
    pub async fn advance_secs(seconds: u64) {
        Self::advance(Duration::from_secs(seconds)).await;
    }

    /// Advances the paused clock by milliseconds.
    pub async fn advance_millis(millis: u64) {
        Self::advance(Duration::from_millis(millis)).await;
    }
}

/// Pauses the clock for its lifetime.
///
/// ```
/// use deferred_value_testing::{TimeControl, TimeControlGuard};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let guard = TimeControlGuard::new().await.unwrap();
/// assert!(TimeControl::is_enabled());
/// drop(guard);
/// assert!(!TimeControl::is_enabled());
/// # }
/// ```
pub struct TimeControlGuard {
    _private: (),
}

impl TimeControlGuard {
    /// Pauses the clock and returns a guard that resumes it on drop.
    pub async fn new() -> Result<Self, TestError> {
        TimeControl::enable().await?;
        Ok(Self { _private: () })
    }
}

impl Drop for TimeControlGuard {
    fn drop(&mut self) {
        if TimeControl::is_enabled() {
            tokio::time::resume();
            TIME_CONTROL_ACTIVE.with(|active| active.set(false));
        }
    }
}

fn payload_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enable_disable() {
        TimeControl::disable().await.unwrap();
        assert!(!TimeControl::is_enabled());

        TimeControl::enable().await.unwrap();
        assert!(TimeControl::is_enabled());

        TimeControl::disable().await.unwrap();
        assert!(!TimeControl::is_enabled());
    }

    #[tokio::test]
    async fn test_enable_is_idempotent() {
        TimeControl::enable().await.unwrap();
        TimeControl::enable().await.unwrap();
        assert!(TimeControl::is_enabled());
        TimeControl::disable().await.unwrap();
        TimeControl::disable().await.unwrap();
        assert!(!TimeControl::is_enabled());
    }

    #[tokio::test]
    async fn test_advance_time() {
        let _guard = TimeControlGuard::new().await.unwrap();
        let start = tokio::time::Instant::now();

        TimeControl::advance_secs(60).await;
        TimeControl::advance_millis(500).await;

        assert!(start.elapsed() >= Duration::from_millis(60_500));
    }

    #[tokio::test]
    async fn test_is_enabled_leaves_the_clock_alone() {
        assert!(!TimeControl::is_enabled());
        let start = tokio::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(start.elapsed() >= Duration::from_millis(5));
        assert!(!TimeControl::is_enabled());

        let guard = TimeControlGuard::new().await.unwrap();
        let paused_at = tokio::time::Instant::now();
        for _ in 0..3 {
            assert!(TimeControl::is_enabled());
        }
        assert_eq!(tokio::time::Instant::now(), paused_at);

        drop(guard);
        assert!(!TimeControl::is_enabled());
        // Pausing again only succeeds if the guard really resumed the clock.
        tokio::time::pause();
        tokio::time::resume();
    }

    #[tokio::test(start_paused = true)]
    async fn test_enable_on_a_runtime_started_paused() {
        TimeControl::enable().await.unwrap();
        assert!(TimeControl::is_enabled());
        TimeControl::disable().await.unwrap();
        assert!(!TimeControl::is_enabled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_enable_fails_on_multi_thread_runtime() {
        let result = TimeControl::enable().await;
        assert!(matches!(result, Err(TestError::TimeControl(_))));
        assert!(!TimeControl::is_enabled());
    }
}
