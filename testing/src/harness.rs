//! Scheduler harness for tests.

use std::sync::Arc;

use deferred_value::{Deferred, DeferredState, Scheduler, SchedulerConfig};

use crate::error::TestError;
use crate::recording_sink::RecordingSink;

/// A scheduler wired to a [`RecordingSink`].
///
/// # Examples
///
/// ```
/// use deferred_value::Deferred;
/// use deferred_value_testing::TestHarness;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let harness = TestHarness::new().unwrap();
/// let doubled = Deferred::resolved(harness.scheduler(), 4).then(|x| Ok(x * 2));
/// assert_eq!(harness.outcome(&doubled).await.unwrap(), 8);
/// assert!(harness.sink().is_empty());
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TestHarness {
    scheduler: Scheduler,
    sink: Arc<RecordingSink>,
}

impl TestHarness {
    /// Starts a scheduler named `test` on the current runtime.
    pub fn new() -> Result<Self, TestError> {
        Self::with_config(SchedulerConfig::default().with_name("test"))
    }

    /// Starts a scheduler with `config`; its sink is replaced by a recording one.
    pub fn with_config(config: SchedulerConfig) -> Result<Self, TestError> {
        let sink = Arc::new(RecordingSink::new());
        let scheduler = Scheduler::start(config.with_sink(sink.clone()))?;
        Ok(Self { scheduler, sink })
    }

    /// The scheduler under test.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The sink every diagnostic lands in.
    pub fn sink(&self) -> &RecordingSink {
        &self.sink
    }

    /// Waits until no job, timer or spawned work is left.
    pub async fn settle(&self) {
        self.scheduler.wait_idle().await;
    }

    /// Lets everything run, then returns the fulfilment value of `deferred`.
    ///
    /// # Errors
    ///
    /// [`TestError::Rejected`] if it rejected, [`TestError::StillPending`] if
    /// nothing left to run will ever settle it.
    pub async fn outcome<T>(&self, deferred: &Deferred<T>) -> Result<T, TestError>
    where
        T: Clone + Send + 'static,
    {
        self.settle().await;
        match deferred.state() {
            DeferredState::Pending => Err(TestError::StillPending(deferred.id())),
            DeferredState::Fulfilled(value) => Ok(value),
            // Observe the rejection so it is not reported as unhandled.
            DeferredState::Rejected(_) => Ok(deferred.wait().await?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deferred_value::DeferredError;

    #[tokio::test]
    async fn test_outcome_of_rejection() {
        let harness = TestHarness::new().unwrap();
        let failed = Deferred::<i32>::rejected(harness.scheduler(), "E");

        let err = harness.outcome(&failed).await.unwrap_err();
        assert!(matches!(err, TestError::Rejected(DeferredError::Reason { .. })));

        drop(failed);
        assert!(harness.sink().unhandled_rejections().is_empty());
    }

    #[tokio::test]
    async fn test_outcome_of_pending_value() {
        let harness = TestHarness::new().unwrap();
        let (pending, _resolver) = Deferred::<i32>::pending(harness.scheduler());

        let err = harness.outcome(&pending).await.unwrap_err();
        assert!(matches!(err, TestError::StillPending(id) if id == pending.id()));
    }

    #[tokio::test]
    async fn test_scheduler_is_named() {
        let harness = TestHarness::new().unwrap();
        assert_eq!(harness.scheduler().name(), "test");
    }
}
