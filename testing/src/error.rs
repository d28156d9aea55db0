//! Error types for the testing utilities crate.

use deferred_value::{DeferredError, DeferredId, SchedulerError};
use thiserror::Error;

/// Errors that can occur while driving deferred values in tests.
///
/// # Examples
///
/// ```
/// use deferred_value::DeferredId;
/// use deferred_value_testing::TestError;
///
/// let err = TestError::StillPending(DeferredId::from_raw(4));
/// assert!(err.to_string().contains("deferred#4"));
/// ```
#[derive(Debug, Error)]
pub enum TestError {
    /// The deferred value rejected.
    #[error("Deferred value rejected: {0}")]
    Rejected(#[from] DeferredError),

    /// The deferred value was still pending after everything settled.
    #[error("{0} is still pending after the scheduler went idle")]
    StillPending(DeferredId),

    /// The scheduler could not be started.
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Time control was requested outside a `current_thread` runtime.
    #[error("Time control unavailable: {0}")]
    TimeControl(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
