//! Configuration for the continuation dispatcher.
//!
//! A [`SchedulerConfig`] controls how the [`Scheduler`](crate::Scheduler)
//! dispatches continuation jobs and where diagnostics end up.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::diagnostics::DiagnosticSink;

/// Default number of jobs the dispatcher runs before yielding to the runtime.
pub const DEFAULT_MAX_JOBS_PER_TURN: usize = 1024;

/// What to do when a rejected deferred value is dropped without any handler.
///
/// Unhandled rejections are never fatal. They are either reported to the
/// configured [`DiagnosticSink`] or ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnhandledRejectionPolicy {
    /// Report the rejection as a diagnostic event.
    #[default]
    Report,
    /// Drop the rejection silently.
    Ignore,
}

impl UnhandledRejectionPolicy {
    /// Returns true if unhandled rejections should reach the sink.
    pub fn is_report(&self) -> bool {
        matches!(self, Self::Report)
    }
}

/// Configuration for a [`Scheduler`](crate::Scheduler).
///
/// # Example
///
/// ```
/// use deferred_value::{SchedulerConfig, UnhandledRejectionPolicy};
///
/// let config = SchedulerConfig::default()
///     .with_name("checkout")
///     .with_max_jobs_per_turn(64)
///     .with_unhandled_rejections(UnhandledRejectionPolicy::Ignore);
///
/// assert_eq!(config.name, "checkout");
/// assert_eq!(config.max_jobs_per_turn, 64);
/// ```
#[derive(Clone)]
pub struct SchedulerConfig {
    /// Name attached to the dispatcher's tracing span.
    pub name: String,
    /// Jobs run back to back before the dispatcher yields to other tasks.
    /// Zero is treated as one.
    pub max_jobs_per_turn: usize,
    /// Handling of rejections nobody observed.
    pub unhandled_rejections: UnhandledRejectionPolicy,
    /// Where diagnostic events go. `None` means [`TracingSink`](crate::TracingSink).
    pub sink: Option<Arc<dyn DiagnosticSink>>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "deferred".to_string(),
            max_jobs_per_turn: DEFAULT_MAX_JOBS_PER_TURN,
            unhandled_rejections: UnhandledRejectionPolicy::default(),
            sink: None,
        }
    }
}

impl SchedulerConfig {
    /// Sets the dispatcher name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the per-turn job budget.
    pub fn with_max_jobs_per_turn(mut self, max_jobs_per_turn: usize) -> Self {
        self.max_jobs_per_turn = max_jobs_per_turn;
        self
    }

    /// Sets the unhandled rejection policy.
    pub fn with_unhandled_rejections(mut self, policy: UnhandledRejectionPolicy) -> Self {
        self.unhandled_rejections = policy;
        self
    }

    /// Sets the diagnostic sink.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub(crate) fn job_budget(&self) -> usize {
        self.max_jobs_per_turn.max(1)
    }
}

impl std::fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field("name", &self.name)
            .field("max_jobs_per_turn", &self.max_jobs_per_turn)
            .field("unhandled_rejections", &self.unhandled_rejections)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}
