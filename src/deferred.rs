//! Deferred values and continuation chains.
//!
//! A [`Deferred<T>`] is a single eventual result. It starts pending, settles
//! exactly once through its [`Resolver`], and hands a copy of the outcome to
//! every continuation registered with [`Deferred::on_settled`] (or one of its
//! shorthands). Each continuation produces a new deferred value, which is how
//! chains are built:
//!
//! ```
//! use deferred_value::{Deferred, DeferredError, Scheduler};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = Scheduler::new()?;
//!
//! let username = Deferred::<u32>::create(&scheduler, |resolver| {
//!     resolver.fail("ERROR: failed to fetch user");
//! })
//! .then(|id| Ok(format!("user-{}", id)))
//! .catch(|error: DeferredError| Ok(format!("anonymous ({})", error)));
//!
//! assert_eq!(username.await?, "anonymous (ERROR: failed to fetch user)");
//! # Ok(())
//! # }
//! ```
//!
//! Continuations always run on the scheduler's dispatcher, one at a time and
//! in registration order, even when the value was already settled at
//! registration time.

use std::future::{Future, IntoFuture};
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::diagnostics::DiagnosticEvent;
use crate::error::DeferredError;
use crate::scheduler::{panic_message, Job, Scheduler};
use crate::state::{DeferredId, DeferredState, DeferredStatus, Outcome, Reaction, StateCell};

/// Placeholder type for a handler slot left empty in [`Deferred::on_settled`].
///
/// ```
/// use deferred_value::{Deferred, DeferredError, Scheduler, Skip};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let scheduler = Scheduler::new()?;
/// let source = Deferred::resolved(&scheduler, 5);
/// let doubled = source.on_settled(Some(|x: i32| Ok(x * 2)), None::<Skip<DeferredError, i32>>);
/// assert_eq!(doubled.await?, 10);
/// # Ok(())
/// # }
/// ```
pub type Skip<A, U> = fn(A) -> Outcome<U>;

struct Shared<T> {
    id: DeferredId,
    scheduler: Scheduler,
    cell: StateCell<T>,
}

impl<T: Clone + Send + 'static> Shared<T> {
    fn new(scheduler: &Scheduler) -> Self {
        Self {
            id: DeferredId::next(),
            scheduler: scheduler.clone(),
            cell: StateCell::new(),
        }
    }

    fn settle(&self, outcome: Outcome<T>) -> bool {
        let Some(settlement) = self.cell.try_settle(outcome) else {
            tracing::trace!(deferred = %self.id, "Settlement ignored; already settled");
            return false;
        };

        tracing::debug!(
            deferred = %self.id,
            fulfilled = settlement.outcome.is_ok(),
            continuations = settlement.reactions.len(),
            "Deferred settled"
        );
        for reaction in settlement.reactions {
            self.queue(reaction, settlement.outcome.clone());
        }
        for waker in settlement.wakers {
            waker.wake();
        }
        true
    }

    fn subscribe(&self, reaction: Reaction<T>) {
        if let Some((reaction, outcome)) = self.cell.subscribe(reaction) {
            self.queue(reaction, outcome);
        }
    }

    fn queue(&self, reaction: Reaction<T>, outcome: Outcome<T>) {
        let job = Job::continuation(self.id, move || reaction(outcome));
        if self.scheduler.dispatch(job).is_err() {
            self.scheduler
                .report(DiagnosticEvent::ContinuationDropped { deferred: self.id });
        }
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        if let Some(error) = self.cell.take_unhandled_rejection() {
            self.scheduler.report_unhandled(self.id, &error);
        }
    }
}

/// Settles its deferred value. Handed to the work procedure of
/// [`Deferred::create`].
///
/// Only the first call to [`succeed`](Resolver::succeed),
/// [`fail`](Resolver::fail) or [`settle`](Resolver::settle) across all
/// clones takes effect. Dropping every resolver without calling any of them
/// leaves the value pending forever, which is allowed.
pub struct Resolver<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send + 'static> Resolver<T> {
    /// Fulfils the value. Returns false if it was already settled.
    pub fn succeed(&self, value: T) -> bool {
        self.shared.settle(Ok(value))
    }

    /// Rejects the value. Returns false if it was already settled.
    pub fn fail(&self, error: impl Into<DeferredError>) -> bool {
        self.shared.settle(Err(error.into()))
    }

    /// Settles with a ready-made outcome. Returns false if already settled.
    pub fn settle(&self, outcome: Outcome<T>) -> bool {
        self.shared.settle(outcome)
    }

    /// Identifier of the value this resolver settles.
    pub fn id(&self) -> DeferredId {
        self.shared.id
    }

    /// Returns true once the value has settled, through any resolver.
    pub fn is_settled(&self) -> bool {
        self.shared.cell.status().is_settled()
    }

    /// Runs a handler, turning a panic into a `Panicked` rejection.
    fn guarded<U>(&self, handler: impl FnOnce() -> Outcome<U>) -> Outcome<U> {
        panic::catch_unwind(AssertUnwindSafe(handler)).unwrap_or_else(|payload| {
            let message = panic_message(&*payload);
            self.shared.scheduler.report(DiagnosticEvent::HandlerPanicked {
                deferred: self.shared.id,
                message: message.clone(),
            });
            Err(DeferredError::panicked(message))
        })
    }
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").field("id", &self.shared.id).finish()
    }
}

/// A single eventual result: pending, then fulfilled or rejected, once.
///
/// Handles are cheap to clone and all point at the same value. Awaiting a
/// handle yields `Result<T, DeferredError>`.
pub struct Deferred<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send + 'static> Deferred<T> {
    /// Creates a pending value and runs `work` right away with its resolver.
    ///
    /// `work` typically hands the resolver to a timer or other asynchronous
    /// operation. If `work` panics before settling, the value is rejected
    /// with [`DeferredError::Panicked`].
    pub fn create<W>(scheduler: &Scheduler, work: W) -> Self
    where
        W: FnOnce(Resolver<T>),
    {
        let (deferred, resolver) = Self::pending(scheduler);
        let fallback = resolver.clone();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || work(resolver))) {
            let message = panic_message(&*payload);
            tracing::debug!(deferred = %deferred.id(), "Work procedure panicked: {}", message);
            fallback.fail(DeferredError::panicked(message));
        }
        deferred
    }

    /// Creates a pending value together with its resolver.
    pub fn pending(scheduler: &Scheduler) -> (Self, Resolver<T>) {
        let shared = Arc::new(Shared::new(scheduler));
        tracing::trace!(deferred = %shared.id, "Deferred created");
        (
            Self {
                shared: shared.clone(),
            },
            Resolver { shared },
        )
    }

    /// Creates a value that is already fulfilled.
    pub fn resolved(scheduler: &Scheduler, value: T) -> Self {
        let (deferred, resolver) = Self::pending(scheduler);
        resolver.succeed(value);
        deferred
    }

    /// Creates a value that is already rejected.
    pub fn rejected(scheduler: &Scheduler, error: impl Into<DeferredError>) -> Self {
        let (deferred, resolver) = Self::pending(scheduler);
        resolver.fail(error);
        deferred
    }

    /// Creates a value that fulfils with `value` once `delay` has elapsed.
    pub fn delay(scheduler: &Scheduler, delay: Duration, value: T) -> Self {
        Self::create(scheduler, |resolver| {
            scheduler.after(delay, move || {
                resolver.succeed(value);
            });
        })
    }

    /// Creates a value settled by a future running on the tokio runtime.
    ///
    /// The settlement itself happens on the dispatcher. A panicking future
    /// rejects the value with [`DeferredError::Panicked`].
    pub fn spawn<F>(scheduler: &Scheduler, future: F) -> Self
    where
        F: Future<Output = Outcome<T>> + Send + 'static,
    {
        let (deferred, resolver) = Self::pending(scheduler);
        scheduler.spawn_work(future, move |outcome| {
            resolver.settle(outcome);
        });
        deferred
    }

    /// Identifier used in logs and diagnostics.
    pub fn id(&self) -> DeferredId {
        self.shared.id
    }

    /// Current status.
    pub fn status(&self) -> DeferredStatus {
        self.shared.cell.status()
    }

    /// Snapshot of the current state, including the payload.
    pub fn state(&self) -> DeferredState<T> {
        self.shared.cell.snapshot()
    }

    /// Returns true while not settled.
    pub fn is_pending(&self) -> bool {
        !self.status().is_settled()
    }

    /// Returns true once fulfilled or rejected.
    pub fn is_settled(&self) -> bool {
        self.status().is_settled()
    }

    /// Registers continuation handlers and returns the value they produce.
    ///
    /// When this value fulfils, `on_fulfilled` runs with the value; when it
    /// rejects, `on_rejected` runs with the error. The handler's `Ok` fulfils
    /// the returned value and its `Err`, or a panic, rejects it. A missing
    /// handler passes the outcome through unchanged: a value is converted
    /// with `Into`, an error is forwarded as is. Use [`Skip`] to name the
    /// type of an empty slot.
    pub fn on_settled<U, F, G>(
        &self,
        on_fulfilled: Option<F>,
        on_rejected: Option<G>,
    ) -> Deferred<U>
    where
        T: Into<U>,
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Outcome<U> + Send + 'static,
        G: FnOnce(DeferredError) -> Outcome<U> + Send + 'static,
    {
        self.chain(move |outcome| match outcome {
            Ok(value) => match on_fulfilled {
                Some(handler) => handler(value),
                None => Ok(value.into()),
            },
            Err(error) => match on_rejected {
                Some(handler) => handler(error),
                None => Err(error),
            },
        })
    }

    /// Transforms the value; rejections skip `on_fulfilled` and pass through.
    pub fn then<U, F>(&self, on_fulfilled: F) -> Deferred<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Outcome<U> + Send + 'static,
    {
        self.chain(move |outcome| outcome.and_then(on_fulfilled))
    }

    /// Handles a rejection; fulfilment values pass through.
    ///
    /// Returning `Ok` recovers the chain, returning `Err` rejects again.
    pub fn catch<G>(&self, on_rejected: G) -> Deferred<T>
    where
        G: FnOnce(DeferredError) -> Outcome<T> + Send + 'static,
    {
        self.chain(move |outcome| outcome.or_else(on_rejected))
    }

    /// Runs `callback` on either outcome and passes the outcome through.
    pub fn finally<F>(&self, callback: F) -> Deferred<T>
    where
        F: FnOnce() + Send + 'static,
    {
        self.chain(move |outcome| {
            callback();
            outcome
        })
    }

    /// Chains a step that itself produces a deferred value and adopts that
    /// value's outcome.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Deferred<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Deferred<U> + Send + 'static,
    {
        let (next, resolver) = Deferred::pending(&self.shared.scheduler);
        self.subscribe(move |outcome| {
            let inner = match outcome {
                Ok(value) => resolver.guarded(|| Ok(on_fulfilled(value))),
                Err(error) => Err(error),
            };
            match inner {
                Ok(inner) => inner.subscribe(move |outcome| {
                    resolver.settle(outcome);
                }),
                Err(error) => {
                    resolver.fail(error);
                }
            }
        });
        next
    }

    /// Returns a future for the outcome without consuming this handle.
    pub fn wait(&self) -> DeferredFuture<T> {
        DeferredFuture {
            shared: self.shared.clone(),
        }
    }

    /// Registers a raw continuation. Marks the value as handled.
    pub(crate) fn subscribe<F>(&self, reaction: F)
    where
        F: FnOnce(Outcome<T>) + Send + 'static,
    {
        self.shared.subscribe(Box::new(reaction));
    }

    fn chain<U, H>(&self, handler: H) -> Deferred<U>
    where
        U: Clone + Send + 'static,
        H: FnOnce(Outcome<T>) -> Outcome<U> + Send + 'static,
    {
        let (next, resolver) = Deferred::pending(&self.shared.scheduler);
        tracing::trace!(source = %self.shared.id, next = %next.id(), "Continuation registered");
        self.subscribe(move |outcome| {
            let result = resolver.guarded(|| handler(outcome));
            resolver.settle(result);
        });
        next
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("id", &self.shared.id)
            .field("status", &self.status())
            .finish()
    }
}

impl<T: Clone + Send + 'static> IntoFuture for Deferred<T> {
    type Output = Outcome<T>;
    type IntoFuture = DeferredFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        DeferredFuture {
            shared: self.shared,
        }
    }
}

/// Future resolving to the outcome of a [`Deferred`].
///
/// Awaiting counts as handling: a rejection observed this way is never
/// reported as unhandled.
pub struct DeferredFuture<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Clone + Send + 'static> Future for DeferredFuture<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.shared.cell.poll_outcome(cx.waker()) {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}

impl<T> std::fmt::Debug for DeferredFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredFuture")
            .field("id", &self.shared.id)
            .finish()
    }
}
