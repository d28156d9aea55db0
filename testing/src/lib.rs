//! Testing utilities for deferred-value
//!
//! # Features
//!
//! - **TestHarness**: a scheduler wired to a recording diagnostic sink
//! - **RecordingSink**: collects diagnostic events for assertions
//! - **Time Control**: skip timer delays for faster test execution
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use deferred_value::Deferred;
//! use deferred_value_testing::{TestHarness, TimeControlGuard};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let _time = TimeControlGuard::new().await.unwrap();
//! let harness = TestHarness::new().unwrap();
//!
//! let slow = Deferred::delay(harness.scheduler(), Duration::from_secs(30), "done");
//! assert_eq!(harness.outcome(&slow).await.unwrap(), "done");
//! # }
//! ```

pub mod error;
pub mod harness;
pub mod recording_sink;
pub mod time_control;

pub use error::TestError;
pub use harness::TestHarness;
pub use recording_sink::RecordingSink;
pub use time_control::{TimeControl, TimeControlGuard};
