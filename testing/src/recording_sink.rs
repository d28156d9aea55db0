//! Diagnostic sink that records events for later assertions.

use std::sync::Mutex;

use deferred_value::{DiagnosticEvent, DiagnosticSink, DeferredId};

/// A [`DiagnosticSink`] that keeps every reported event.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use deferred_value::{Deferred, Scheduler, SchedulerConfig};
/// use deferred_value_testing::RecordingSink;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let sink = Arc::new(RecordingSink::new());
/// let scheduler = Scheduler::start(SchedulerConfig::default().with_sink(sink.clone())).unwrap();
///
/// drop(Deferred::<i32>::rejected(&scheduler, "nobody listens"));
/// assert_eq!(sink.unhandled_rejections().len(), 1);
/// # }
/// ```
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every event recorded so far, in report order.
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Returns only the unhandled rejection reports.
    pub fn unhandled_rejections(&self) -> Vec<DiagnosticEvent> {
        self.events()
            .into_iter()
            .filter(DiagnosticEvent::is_unhandled_rejection)
            .collect()
    }

    /// Returns every event about the given deferred value.
    pub fn events_for(&self, deferred: DeferredId) -> Vec<DiagnosticEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.deferred() == Some(deferred))
            .collect()
    }

    /// Returns true if nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.events.lock().unwrap().is_empty()
    }

    /// Forgets every recorded event.
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, event: &DiagnosticEvent) {
        tracing::debug!(?event, "Diagnostic event recorded");
        self.events.lock().unwrap().push(event.clone());
    }
}
