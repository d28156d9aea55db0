//! Diagnostic channel for conditions that are reportable but not fatal.
//!
//! Unhandled rejections, panicking handlers and continuations that could not
//! be dispatched are surfaced as [`DiagnosticEvent`]s. The default sink,
//! [`TracingSink`], turns them into `tracing` events; tests usually install a
//! recording sink instead.

use serde::{Deserialize, Serialize};

use crate::error::ErrorObject;
use crate::state::DeferredId;

/// A condition worth reporting that does not stop the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticEvent {
    /// A rejected deferred value was dropped without any handler or await.
    UnhandledRejection {
        /// The rejected value
        deferred: DeferredId,
        /// The rejection it carried
        error: ErrorObject,
    },
    /// A continuation handler panicked. The panic became a rejection of the
    /// handler's result.
    HandlerPanicked {
        /// The deferred value the handler was producing
        deferred: DeferredId,
        /// The panic message
        message: String,
    },
    /// A timer or raw job callback panicked on the dispatcher.
    CallbackPanicked {
        /// The panic message
        message: String,
    },
    /// The dispatcher stopped before a continuation could run, so the
    /// continuation was dropped and its result stays pending.
    ContinuationDropped {
        /// The deferred value whose continuation was dropped
        deferred: DeferredId,
    },
}

impl DiagnosticEvent {
    /// Returns the deferred value this event is about, if any.
    pub fn deferred(&self) -> Option<DeferredId> {
        match self {
            Self::UnhandledRejection { deferred, .. }
            | Self::HandlerPanicked { deferred, .. }
            | Self::ContinuationDropped { deferred } => Some(*deferred),
            Self::CallbackPanicked { .. } => None,
        }
    }

    /// Returns true for unhandled rejection reports.
    pub fn is_unhandled_rejection(&self) -> bool {
        matches!(self, Self::UnhandledRejection { .. })
    }
}

/// Receiver of diagnostic events.
///
/// Implementations must be cheap and must not block: `report` may run on the
/// dispatcher or inside a `Drop`.
pub trait DiagnosticSink: Send + Sync {
    /// Records one event.
    fn report(&self, event: &DiagnosticEvent);
}

/// Sink that forwards every event to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, event: &DiagnosticEvent) {
        match event {
            DiagnosticEvent::UnhandledRejection { deferred, error } => {
                tracing::warn!(
                    deferred = %deferred,
                    error_type = %error.error_type,
                    "Unhandled rejection: {}",
                    error.error_message
                );
            }
            DiagnosticEvent::HandlerPanicked { deferred, message } => {
                tracing::warn!(deferred = %deferred, "Continuation handler panicked: {}", message);
            }
            DiagnosticEvent::CallbackPanicked { message } => {
                tracing::warn!("Scheduled callback panicked: {}", message);
            }
            DiagnosticEvent::ContinuationDropped { deferred } => {
                tracing::error!(deferred = %deferred, "Dispatcher stopped; continuation dropped");
            }
        }
    }
}
