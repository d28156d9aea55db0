//! Cooperative continuation dispatcher and timer capability.
//!
//! Every continuation, timer callback and spawned-work completion is turned
//! into a [`Job`] and sent through one unbounded FIFO channel. A single
//! dispatcher task drains the channel and runs each job to completion before
//! taking the next, so handlers never run concurrently with each other and a
//! handler registered on an already settled value still waits its turn in the
//! queue instead of running inline.
//!
//! The dispatcher task only holds the receiving end of the channel. Once the
//! last [`Scheduler`] handle is gone the channel closes and the task exits.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::SendError};
use tokio::sync::Notify;
use tracing::Instrument;

use crate::config::{SchedulerConfig, UnhandledRejectionPolicy};
use crate::diagnostics::{DiagnosticEvent, DiagnosticSink, TracingSink};
use crate::error::{DeferredError, ErrorObject, SchedulerError};
use crate::state::{DeferredId, Outcome};

/// A unit of work run on the dispatcher.
pub(crate) struct Job {
    run: Box<dyn FnOnce() + Send + 'static>,
    /// Source value when the job is a continuation.
    continuation_of: Option<DeferredId>,
}

impl Job {
    pub(crate) fn new<F>(run: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            run: Box::new(run),
            continuation_of: None,
        }
    }

    /// A continuation of `deferred`, reported as dropped if it never runs.
    pub(crate) fn continuation<F>(deferred: DeferredId, run: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            run: Box::new(run),
            continuation_of: Some(deferred),
        }
    }

    pub(crate) fn continuation_of(&self) -> Option<DeferredId> {
        self.continuation_of
    }
}

/// Counters describing what a scheduler has done so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Jobs run to completion by the dispatcher.
    pub jobs_dispatched: u64,
    /// Timers that reached their deadline.
    pub timers_fired: u64,
    /// Queued jobs plus armed timers plus spawned work not yet finished.
    pub in_flight: usize,
}

/// Handle to a running dispatcher.
///
/// Cloning is cheap; all clones talk to the same dispatcher task. The task
/// stops when the last handle is dropped, including the handles held by
/// pending deferred values and armed timers.
///
/// # Example
///
/// ```
/// use deferred_value::{Deferred, Scheduler};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let scheduler = Scheduler::new()?;
/// let doubled = Deferred::resolved(&scheduler, 21).then(|x| Ok(x * 2));
/// assert_eq!(doubled.await?, 42);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    name: String,
    jobs: mpsc::UnboundedSender<Job>,
    runtime: Handle,
    unhandled_rejections: UnhandledRejectionPolicy,
    dispatcher: Arc<DispatcherState>,
}

/// State shared between the handles and the dispatcher task.
struct DispatcherState {
    running: AtomicBool,
    shutdown: Notify,
    idle: Notify,
    in_flight: AtomicUsize,
    jobs_dispatched: AtomicU64,
    timers_fired: AtomicU64,
    sink: Arc<dyn DiagnosticSink>,
}

impl Scheduler {
    /// Starts a dispatcher with the default configuration.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn new() -> Result<Self, SchedulerError> {
        Self::start(SchedulerConfig::default())
    }

    /// Starts a dispatcher task on the current tokio runtime.
    pub fn start(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let runtime = Handle::try_current()?;
        let (jobs, receiver) = mpsc::unbounded_channel();
        let budget = config.job_budget();
        let sink = config
            .sink
            .unwrap_or_else(|| Arc::new(TracingSink) as Arc<dyn DiagnosticSink>);

        let dispatcher = Arc::new(DispatcherState {
            running: AtomicBool::new(true),
            shutdown: Notify::new(),
            idle: Notify::new(),
            in_flight: AtomicUsize::new(0),
            jobs_dispatched: AtomicU64::new(0),
            timers_fired: AtomicU64::new(0),
            sink,
        });

        let span = tracing::debug_span!("dispatcher", name = %config.name);
        runtime.spawn(dispatch_loop(dispatcher.clone(), receiver, budget).instrument(span));

        Ok(Self {
            inner: Arc::new(SchedulerInner {
                name: config.name,
                jobs,
                runtime,
                unhandled_rejections: config.unhandled_rejections,
                dispatcher,
            }),
        })
    }

    /// Name given in the configuration.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns false once the dispatcher has stopped.
    pub fn is_running(&self) -> bool {
        self.inner.dispatcher.running.load(Ordering::Acquire)
    }

    /// Queues a raw job behind everything already queued.
    ///
    /// Returns false if the dispatcher has stopped and the job was dropped.
    pub fn enqueue<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatch(Job::new(job)).is_ok()
    }

    /// Runs `callback` on the dispatcher once, no earlier than `delay` from now.
    pub fn after<F>(&self, delay: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.dispatcher.in_flight.fetch_add(1, Ordering::SeqCst);
        let deadline = tokio::time::Instant::now() + delay;
        let scheduler = self.clone();
        self.inner.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let dispatcher = &scheduler.inner.dispatcher;
            dispatcher.timers_fired.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(delay_ms = delay.as_millis() as u64, "Timer fired");
            if scheduler.dispatch(Job::new(callback)).is_err() {
                tracing::debug!("Dispatcher stopped; timer callback dropped");
            }
            dispatcher.finish_one();
        });
    }

    /// Resolves once nothing is queued, armed or running in the background.
    ///
    /// A `create` procedure that never calls its resolver does not keep the
    /// scheduler busy. A future handed to [`Deferred::spawn`] does until it
    /// completes, so waiting on a future that never completes never returns.
    ///
    /// [`Deferred::spawn`]: crate::Deferred::spawn
    pub async fn wait_idle(&self) {
        let dispatcher = &self.inner.dispatcher;
        loop {
            let notified = dispatcher.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if dispatcher.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stops the dispatcher. Jobs still queued are dropped, and each dropped
    /// continuation is reported as
    /// [`ContinuationDropped`](DiagnosticEvent::ContinuationDropped). The
    /// values those continuations would have settled stay pending.
    pub fn shutdown(&self) {
        tracing::debug!(name = %self.inner.name, "Dispatcher shutdown requested");
        self.inner.dispatcher.shutdown.notify_one();
    }

    /// Returns a snapshot of the scheduler counters.
    pub fn stats(&self) -> SchedulerStats {
        let dispatcher = &self.inner.dispatcher;
        SchedulerStats {
            jobs_dispatched: dispatcher.jobs_dispatched.load(Ordering::Relaxed),
            timers_fired: dispatcher.timers_fired.load(Ordering::Relaxed),
            in_flight: dispatcher.in_flight.load(Ordering::SeqCst),
        }
    }

    pub(crate) fn dispatch(&self, job: Job) -> Result<(), Job> {
        self.inner.dispatcher.in_flight.fetch_add(1, Ordering::SeqCst);
        match self.inner.jobs.send(job) {
            Ok(()) => Ok(()),
            Err(SendError(job)) => {
                self.inner.dispatcher.finish_one();
                Err(job)
            }
        }
    }

    /// Drives `future` on the runtime and hands its outcome to `complete` on
    /// the dispatcher. A panicking future completes with `Panicked`.
    pub(crate) fn spawn_work<T, F, C>(&self, future: F, complete: C)
    where
        T: Send + 'static,
        F: Future<Output = Outcome<T>> + Send + 'static,
        C: FnOnce(Outcome<T>) + Send + 'static,
    {
        self.inner.dispatcher.in_flight.fetch_add(1, Ordering::SeqCst);
        let scheduler = self.clone();
        let work = self.inner.runtime.spawn(future);
        self.inner.runtime.spawn(async move {
            let outcome = match work.await {
                Ok(outcome) => outcome,
                Err(error) if error.is_panic() => {
                    Err(DeferredError::panicked(panic_message(&*error.into_panic())))
                }
                Err(_) => Err(DeferredError::reason("Spawned work was cancelled")),
            };
            if scheduler.dispatch(Job::new(move || complete(outcome))).is_err() {
                tracing::debug!("Dispatcher stopped; spawned work completion dropped");
            }
            scheduler.inner.dispatcher.finish_one();
        });
    }

    pub(crate) fn report(&self, event: DiagnosticEvent) {
        self.inner.dispatcher.sink.report(&event);
    }

    pub(crate) fn report_unhandled(&self, deferred: DeferredId, error: &DeferredError) {
        if self.inner.unhandled_rejections.is_report() {
            self.report(DiagnosticEvent::UnhandledRejection {
                deferred,
                error: ErrorObject::from(error),
            });
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.inner.name)
            .field("running", &self.is_running())
            .field(
                "in_flight",
                &self.inner.dispatcher.in_flight.load(Ordering::SeqCst),
            )
            .finish()
    }
}

impl DispatcherState {
    fn run_job(&self, job: Job) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job.run)) {
            self.sink.report(&DiagnosticEvent::CallbackPanicked {
                message: panic_message(&*payload),
            });
        }
        self.jobs_dispatched.fetch_add(1, Ordering::Relaxed);
        self.finish_one();
    }

    fn drop_job(&self, job: Job) {
        let continuation_of = job.continuation_of();
        drop(job);
        if let Some(deferred) = continuation_of {
            self.sink
                .report(&DiagnosticEvent::ContinuationDropped { deferred });
        }
        self.finish_one();
    }

    fn finish_one(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

async fn dispatch_loop(
    dispatcher: Arc<DispatcherState>,
    mut receiver: mpsc::UnboundedReceiver<Job>,
    budget: usize,
) {
    tracing::debug!(budget, "Dispatcher started");
    let mut ran_this_turn = 0usize;

    loop {
        let job = tokio::select! {
            biased;
            _ = dispatcher.shutdown.notified() => break,
            job = receiver.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        dispatcher.run_job(job);
        ran_this_turn += 1;
        if ran_this_turn >= budget {
            ran_this_turn = 0;
            tokio::task::yield_now().await;
        }
    }

    dispatcher.running.store(false, Ordering::Release);
    receiver.close();
    let mut dropped = 0usize;
    while let Ok(job) = receiver.try_recv() {
        dispatcher.drop_job(job);
        dropped += 1;
    }
    tracing::debug!(dropped, "Dispatcher stopped");
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collecting {
        events: Mutex<Vec<DiagnosticEvent>>,
    }

    impl DiagnosticSink for Collecting {
        fn report(&self, event: &DiagnosticEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let result = std::thread::spawn(Scheduler::new).join().unwrap();
        assert!(matches!(result, Err(SchedulerError::NoRuntime(_))));
    }

    #[tokio::test]
    async fn test_jobs_run_in_fifo_order() {
        let scheduler = Scheduler::new().unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = order.clone();
            assert!(scheduler.enqueue(move || order.lock().unwrap().push(i)));
        }
        scheduler.wait_idle().await;

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(scheduler.stats().jobs_dispatched, 5);
        assert_eq!(scheduler.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_enqueue_never_runs_inline() {
        let scheduler = Scheduler::new().unwrap();
        let ran = Arc::new(AtomicBool::new(false));

        let flag = ran.clone();
        scheduler.enqueue(move || flag.store(true, Ordering::SeqCst));
        assert!(!ran.load(Ordering::SeqCst));

        scheduler.wait_idle().await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_after_fires_in_deadline_order() {
        let scheduler = Scheduler::new().unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (label, delay_ms) in [("slow", 300u64), ("fast", 100), ("medium", 200)] {
            let order = order.clone();
            scheduler.after(Duration::from_millis(delay_ms), move || {
                order.lock().unwrap().push(label);
            });
        }
        scheduler.wait_idle().await;

        assert_eq!(*order.lock().unwrap(), vec!["fast", "medium", "slow"]);
        assert_eq!(scheduler.stats().timers_fired, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_after_waits_at_least_the_delay() {
        let scheduler = Scheduler::new().unwrap();
        let start = tokio::time::Instant::now();
        let fired_at = Arc::new(Mutex::new(None));

        let slot = fired_at.clone();
        scheduler.after(Duration::from_secs(1), move || {
            *slot.lock().unwrap() = Some(tokio::time::Instant::now());
        });
        scheduler.wait_idle().await;

        let fired_at = fired_at.lock().unwrap().unwrap();
        assert!(fired_at.duration_since(start) >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_stop_dispatcher() {
        let scheduler = Scheduler::new().unwrap();
        let ran = Arc::new(AtomicBool::new(false));

        scheduler.enqueue(|| panic!("boom"));
        let flag = ran.clone();
        scheduler.enqueue(move || flag.store(true, Ordering::SeqCst));
        scheduler.wait_idle().await;

        assert!(ran.load(Ordering::SeqCst));
        assert!(scheduler.is_running());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_jobs() {
        let scheduler = Scheduler::new().unwrap();
        scheduler.shutdown();
        while scheduler.is_running() {
            tokio::task::yield_now().await;
        }
        assert!(!scheduler.enqueue(|| {}));
        assert_eq!(scheduler.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_dispatcher_exits_when_last_handle_drops() {
        let scheduler = Scheduler::new().unwrap();
        let clone = scheduler.clone();
        let dispatcher = Arc::downgrade(&scheduler.inner.dispatcher);

        drop(scheduler);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(dispatcher.upgrade().is_some(), "a clone keeps it running");

        drop(clone);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(dispatcher.upgrade().is_none());
    }

    #[tokio::test]
    async fn test_many_dropped_schedulers_leave_no_tasks() {
        let dispatchers: Vec<_> = (0..100)
            .map(|_| Arc::downgrade(&Scheduler::new().unwrap().inner.dispatcher))
            .collect();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(dispatchers.iter().all(|d| d.upgrade().is_none()));
    }

    #[tokio::test]
    async fn test_shutdown_reports_queued_continuations() {
        let sink = Arc::new(Collecting::default());
        let scheduler =
            Scheduler::start(SchedulerConfig::default().with_sink(sink.clone())).unwrap();
        let source = DeferredId::from_raw(7);

        assert!(scheduler.dispatch(Job::continuation(source, || {})).is_ok());
        assert!(scheduler.enqueue(|| {}));
        scheduler.shutdown();
        scheduler.wait_idle().await;

        assert!(!scheduler.is_running());
        assert_eq!(scheduler.stats().jobs_dispatched, 0);
        assert_eq!(
            *sink.events.lock().unwrap(),
            vec![DiagnosticEvent::ContinuationDropped { deferred: source }]
        );
    }

    #[tokio::test]
    async fn test_spawn_work_completes_on_dispatcher() {
        let scheduler = Scheduler::new().unwrap();
        let result = Arc::new(Mutex::new(None));

        let slot = result.clone();
        scheduler.spawn_work(async { Ok(7) }, move |outcome| {
            *slot.lock().unwrap() = Some(outcome);
        });
        scheduler.wait_idle().await;

        assert_eq!(*result.lock().unwrap(), Some(Ok(7)));
    }

    #[tokio::test]
    async fn test_spawn_work_panic_becomes_rejection() {
        let scheduler = Scheduler::new().unwrap();
        let result = Arc::new(Mutex::new(None));

        let slot = result.clone();
        scheduler.spawn_work(
            async {
                if true {
                    panic!("work exploded");
                }
                Ok(1)
            },
            move |outcome: Outcome<i32>| {
                *slot.lock().unwrap() = Some(outcome);
            },
        );
        scheduler.wait_idle().await;

        let outcome = result.lock().unwrap().clone().unwrap();
        assert_eq!(outcome, Err(DeferredError::panicked("work exploded")));
    }

    #[test]
    fn test_panic_message_downcasts() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*payload), "static");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");
        let payload: Box<dyn std::any::Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(&*payload), "non-string panic payload");
    }
}
