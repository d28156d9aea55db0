//! # Deferred values for Rust
//!
//! Single-settlement deferred values with continuation chains, combinators
//! and a cooperative dispatcher.
//!
//! ## Overview
//!
//! A [`Deferred<T>`] stands for a result that is not known yet. It starts
//! pending and is settled exactly once, either fulfilled with a value or
//! rejected with a [`DeferredError`]. Code that needs the result registers
//! continuations with [`Deferred::on_settled`] (or [`then`](Deferred::then),
//! [`catch`](Deferred::catch), [`finally`](Deferred::finally),
//! [`and_then`](Deferred::and_then)), each of which returns a new deferred
//! value for the continuation's own outcome. Deferred values can also simply
//! be awaited.
//!
//! ### Key Features
//!
//! - **Single settlement**: the first call to `succeed` or `fail` wins; every
//!   later call is ignored.
//! - **Never synchronous**: continuations always run on the dispatcher, in
//!   registration order, even when attached to an already settled value.
//! - **Combinators**: [`all`], [`all_settled`], [`race`] and [`any`].
//! - **Unhandled rejections**: a rejection nobody observed is reported to a
//!   [`DiagnosticSink`] when the value is dropped. It is never fatal.
//!
//! ## Getting Started
//!
//! ```
//! use std::time::Duration;
//! use deferred_value::{all, Deferred, Scheduler};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = Scheduler::new()?;
//!
//! let greeting = Deferred::create(&scheduler, |resolver| {
//!     scheduler.after(Duration::from_millis(10), move || {
//!         resolver.succeed("Hello");
//!     });
//! });
//!
//! let shouted = greeting.then(|text| Ok(format!("{}!", text.to_uppercase())));
//! let both = all(&scheduler, vec![shouted, Deferred::resolved(&scheduler, "done".to_string())]);
//!
//! assert_eq!(both.await?, vec!["HELLO!".to_string(), "done".to_string()]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`deferred`]: `Deferred`, `Resolver` and continuation chaining
//! - [`combinators`]: `all`, `all_settled`, `race`, `any`
//! - [`scheduler`]: the dispatcher and the `after` timer capability
//! - [`state`]: lifecycle states and identifiers
//! - [`settled`]: result type of `all_settled`
//! - [`diagnostics`]: unhandled rejection reporting
//! - [`config`]: scheduler configuration
//! - [`error`]: error types

pub mod combinators;
pub mod config;
pub mod deferred;
pub mod diagnostics;
pub mod error;
pub mod scheduler;
pub mod settled;
pub mod state;

// Re-export main types at crate root
pub use combinators::{all, all_settled, any, race};
pub use config::{SchedulerConfig, UnhandledRejectionPolicy, DEFAULT_MAX_JOBS_PER_TURN};
pub use deferred::{Deferred, DeferredFuture, Resolver, Skip};
pub use diagnostics::{DiagnosticEvent, DiagnosticSink, TracingSink};
pub use error::{DeferredError, ErrorObject, SchedulerError};
pub use scheduler::{Scheduler, SchedulerStats};
pub use settled::{SettledBatch, SettledItem};
pub use state::{DeferredId, DeferredState, DeferredStatus, Outcome};
