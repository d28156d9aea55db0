//! Combinators over several deferred values: [`all`], [`all_settled`],
//! [`race`] and [`any`].
//!
//! Each combinator subscribes to every input and returns a new deferred
//! value. Inputs are never cancelled; once the combined value has settled,
//! later input outcomes are ignored. Subscribing counts as handling, so a
//! late rejection of an input is not reported as unhandled.

use std::sync::{Arc, Mutex};

use crate::deferred::Deferred;
use crate::error::DeferredError;
use crate::scheduler::Scheduler;
use crate::settled::{SettledBatch, SettledItem};
use crate::state::lock;

/// Per-input slots filled as inputs settle.
struct Progress<S> {
    slots: Vec<Option<S>>,
    remaining: usize,
}

impl<S> Progress<S> {
    fn new(total: usize) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self {
            slots: (0..total).map(|_| None).collect(),
            remaining: total,
        }))
    }

    /// Stores one slot; returns every slot, in input order, once all are filled.
    fn record(&mut self, index: usize, item: S) -> Option<Vec<S>> {
        if self.slots[index].replace(item).is_none() {
            self.remaining -= 1;
        }
        if self.remaining == 0 {
            Some(self.slots.drain(..).flatten().collect())
        } else {
            None
        }
    }
}

/// Waits for every input to fulfil.
///
/// Fulfils with the values in input order, regardless of the order in which
/// the inputs settled. Rejects as soon as any input rejects, with that
/// input's error. An empty input fulfils with an empty vector.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use deferred_value::{all, Deferred, Scheduler};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let scheduler = Scheduler::new()?;
/// let combined = all(
///     &scheduler,
///     vec![
///         Deferred::delay(&scheduler, Duration::from_millis(30), "one"),
///         Deferred::delay(&scheduler, Duration::from_millis(10), "two"),
///     ],
/// );
/// assert_eq!(combined.await?, vec!["one", "two"]);
/// # Ok(())
/// # }
/// ```
pub fn all<T, I>(scheduler: &Scheduler, inputs: I) -> Deferred<Vec<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Deferred<T>>,
{
    let inputs: Vec<Deferred<T>> = inputs.into_iter().collect();
    let total = inputs.len();
    tracing::debug!("Starting 'all' combinator with {} deferred values", total);

    let (combined, resolver) = Deferred::pending(scheduler);
    if total == 0 {
        resolver.succeed(Vec::new());
        return combined;
    }

    let progress = Progress::new(total);
    for (index, input) in inputs.into_iter().enumerate() {
        let progress = progress.clone();
        let resolver = resolver.clone();
        input.subscribe(move |outcome| match outcome {
            Ok(value) => {
                let values = lock(&progress).record(index, value);
                if let Some(values) = values {
                    if resolver.succeed(values) {
                        tracing::debug!("'all' combinator completed successfully");
                    }
                }
            }
            Err(error) => {
                if resolver.fail(error) {
                    tracing::debug!(
                        "'all' combinator rejected by deferred value at index {}",
                        index
                    );
                }
            }
        });
    }
    combined
}

/// Waits for every input to settle and reports each outcome.
///
/// Always fulfils, with one [`SettledItem`] per input in input order.
pub fn all_settled<T, I>(scheduler: &Scheduler, inputs: I) -> Deferred<SettledBatch<T>>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Deferred<T>>,
{
    let inputs: Vec<Deferred<T>> = inputs.into_iter().collect();
    let total = inputs.len();
    tracing::debug!("Starting 'all_settled' combinator with {} deferred values", total);

    let (combined, resolver) = Deferred::pending(scheduler);
    if total == 0 {
        resolver.succeed(SettledBatch::empty());
        return combined;
    }

    let progress = Progress::new(total);
    for (index, input) in inputs.into_iter().enumerate() {
        let progress = progress.clone();
        let resolver = resolver.clone();
        input.subscribe(move |outcome| {
            let items = lock(&progress).record(index, SettledItem::from_outcome(index, outcome));
            if let Some(items) = items {
                tracing::debug!("'all_settled' combinator completed");
                resolver.succeed(SettledBatch::new(items));
            }
        });
    }
    combined
}

/// Adopts the outcome of whichever input settles first.
///
/// When several inputs are already settled, the earliest one in input order
/// wins. An empty input rejects with [`DeferredError::Validation`].
pub fn race<T, I>(scheduler: &Scheduler, inputs: I) -> Deferred<T>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Deferred<T>>,
{
    let inputs: Vec<Deferred<T>> = inputs.into_iter().collect();
    tracing::debug!("Starting 'race' combinator with {} deferred values", inputs.len());

    if inputs.is_empty() {
        return Deferred::rejected(
            scheduler,
            DeferredError::validation("race requires at least one deferred value"),
        );
    }

    let (combined, resolver) = Deferred::pending(scheduler);
    for (index, input) in inputs.into_iter().enumerate() {
        let resolver = resolver.clone();
        input.subscribe(move |outcome| {
            if resolver.settle(outcome) {
                tracing::debug!("'race' combinator won by deferred value at index {}", index);
            }
        });
    }
    combined
}

/// Fulfils with the first input to fulfil.
///
/// Rejects with [`DeferredError::Aggregate`], listing every error in input
/// order, only once all inputs have rejected. An empty input rejects with
/// [`DeferredError::Validation`].
pub fn any<T, I>(scheduler: &Scheduler, inputs: I) -> Deferred<T>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = Deferred<T>>,
{
    let inputs: Vec<Deferred<T>> = inputs.into_iter().collect();
    let total = inputs.len();
    tracing::debug!("Starting 'any' combinator with {} deferred values", total);

    if total == 0 {
        return Deferred::rejected(
            scheduler,
            DeferredError::validation("any requires at least one deferred value"),
        );
    }

    let (combined, resolver) = Deferred::pending(scheduler);
    let failures = Progress::new(total);
    for (index, input) in inputs.into_iter().enumerate() {
        let failures = failures.clone();
        let resolver = resolver.clone();
        input.subscribe(move |outcome| match outcome {
            Ok(value) => {
                if resolver.succeed(value) {
                    tracing::debug!(
                        "'any' combinator fulfilled by deferred value at index {}",
                        index
                    );
                }
            }
            Err(error) => {
                let errors = lock(&failures).record(index, error);
                if let Some(errors) = errors {
                    tracing::debug!("'any' combinator rejected - all deferred values rejected");
                    resolver.fail(DeferredError::aggregate(errors));
                }
            }
        });
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time::Instant;

    fn delayed<T: Clone + Send + 'static>(
        scheduler: &Scheduler,
        millis: u64,
        outcome: Result<T, DeferredError>,
    ) -> Deferred<T> {
        Deferred::create(scheduler, |resolver| {
            scheduler.after(Duration::from_millis(millis), move || {
                resolver.settle(outcome);
            });
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_preserves_input_order() {
        let scheduler = Scheduler::new().unwrap();
        let start = Instant::now();

        let combined = all(
            &scheduler,
            vec![
                Deferred::delay(&scheduler, Duration::from_millis(1000), "PromiseOne resolved"),
                Deferred::delay(&scheduler, Duration::from_millis(2000), "PromiseTwo resolved"),
                Deferred::delay(&scheduler, Duration::from_millis(3000), "PromiseThree resolved"),
            ],
        );

        assert_eq!(
            combined.await,
            Ok(vec!["PromiseOne resolved", "PromiseTwo resolved", "PromiseThree resolved"])
        );
        assert!(start.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_orders_by_input_not_completion() {
        let scheduler = Scheduler::new().unwrap();
        let combined = all(
            &scheduler,
            vec![
                delayed(&scheduler, 300, Ok(1)),
                delayed(&scheduler, 100, Ok(2)),
                delayed(&scheduler, 200, Ok(3)),
            ],
        );
        assert_eq!(combined.await, Ok(vec![1, 2, 3]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_rejects_with_first_error_without_waiting() {
        let scheduler = Scheduler::new().unwrap();
        let start = Instant::now();

        let combined = all(
            &scheduler,
            vec![
                delayed(&scheduler, 1000, Ok(1)),
                delayed(&scheduler, 100, Err(DeferredError::reason("fast failure"))),
                delayed(&scheduler, 500, Err(DeferredError::reason("slow failure"))),
            ],
        );

        assert_eq!(combined.await, Err(DeferredError::reason("fast failure")));
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_all_empty() {
        let scheduler = Scheduler::new().unwrap();
        let combined = all(&scheduler, Vec::<Deferred<i32>>::new());
        assert_eq!(combined.await, Ok(Vec::new()));
    }

    #[tokio::test]
    async fn test_all_settled_mixed() {
        let scheduler = Scheduler::new().unwrap();
        let batch = all_settled(
            &scheduler,
            vec![
                Deferred::resolved(&scheduler, 1),
                Deferred::rejected(&scheduler, "error"),
                Deferred::resolved(&scheduler, 3),
            ],
        )
        .await
        .unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.fulfilled().len(), 2);
        assert_eq!(batch.rejected().len(), 1);
        assert_eq!(batch.items[1].error, Some(DeferredError::reason("error")));
        assert_eq!(batch.values(), vec![&1, &3]);
    }

    #[tokio::test]
    async fn test_all_settled_empty() {
        let scheduler = Scheduler::new().unwrap();
        let batch = all_settled(&scheduler, Vec::<Deferred<i32>>::new()).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_race_first_wins() {
        let scheduler = Scheduler::new().unwrap();
        let winner = race(
            &scheduler,
            vec![
                delayed(&scheduler, 200, Ok("slow")),
                delayed(&scheduler, 50, Ok("fast")),
            ],
        );
        assert_eq!(winner.await, Ok("fast"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_race_error_wins() {
        let scheduler = Scheduler::new().unwrap();
        let winner = race(
            &scheduler,
            vec![
                delayed(&scheduler, 200, Ok(1)),
                delayed::<i32>(&scheduler, 50, Err(DeferredError::reason("first"))),
            ],
        );
        assert_eq!(winner.await, Err(DeferredError::reason("first")));
    }

    #[tokio::test]
    async fn test_race_settled_inputs_win_in_input_order() {
        let scheduler = Scheduler::new().unwrap();
        let winner = race(
            &scheduler,
            vec![Deferred::resolved(&scheduler, "a"), Deferred::resolved(&scheduler, "b")],
        );
        assert_eq!(winner.await, Ok("a"));
    }

    #[tokio::test]
    async fn test_race_empty() {
        let scheduler = Scheduler::new().unwrap();
        let result = race(&scheduler, Vec::<Deferred<i32>>::new()).await;
        assert!(matches!(result, Err(DeferredError::Validation { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_any_first_success() {
        let scheduler = Scheduler::new().unwrap();
        let first = any(
            &scheduler,
            vec![
                delayed::<i32>(&scheduler, 10, Err(DeferredError::reason("nope"))),
                delayed(&scheduler, 300, Ok(2)),
                delayed(&scheduler, 100, Ok(3)),
            ],
        );
        assert_eq!(first.await, Ok(3));
    }

    #[tokio::test]
    async fn test_any_all_fail() {
        let scheduler = Scheduler::new().unwrap();
        let result = any(
            &scheduler,
            vec![
                Deferred::<i32>::rejected(&scheduler, "error 0"),
                Deferred::<i32>::rejected(&scheduler, "error 1"),
            ],
        )
        .await;

        match result {
            Err(DeferredError::Aggregate { message, errors }) => {
                assert!(message.contains("All 2 deferred values rejected"));
                assert_eq!(
                    errors,
                    vec![
                        DeferredError::reason("error 0"),
                        DeferredError::reason("error 1")
                    ]
                );
            }
            other => panic!("expected aggregate rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_any_empty() {
        let scheduler = Scheduler::new().unwrap();
        let result = any(&scheduler, Vec::<Deferred<i32>>::new()).await;
        assert!(matches!(result, Err(DeferredError::Validation { .. })));
    }

    #[test]
    fn test_progress_reports_once_full() {
        let progress = Progress::new(2);
        assert_eq!(lock(&progress).record(1, "b"), None);
        assert_eq!(lock(&progress).record(0, "a"), Some(vec!["a", "b"]));
    }
}
