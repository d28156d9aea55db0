//! Error types for deferred values.
//!
//! A rejected [`Deferred`](crate::Deferred) always carries a [`DeferredError`].
//! There is no fatal/recoverable split: every variant can be turned back into
//! a fulfilment by a later `catch` or `on_settled` handler.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The rejection payload of a deferred value.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DeferredError {
    /// Rejected with a plain message, e.g. `fail("ERROR: failed to fetch user")`.
    #[error("{message}")]
    Reason {
        /// The rejection message
        message: String,
    },

    /// Rejected with a structured payload.
    #[error("Rejected with value: {value}")]
    Structured {
        /// The payload as JSON
        value: serde_json::Value,
    },

    /// A handler or work procedure panicked while running.
    #[error("Handler panicked: {message}")]
    Panicked {
        /// The panic message, if it was a string
        message: String,
    },

    /// Every input of an `any` combinator rejected.
    #[error("{message}")]
    Aggregate {
        /// Summary of the failures
        message: String,
        /// The individual rejections, in input order
        errors: Vec<DeferredError>,
    },

    /// A combinator was called with input it cannot work with.
    #[error("Validation error: {message}")]
    Validation {
        /// Error message describing the validation failure
        message: String,
    },
}

impl DeferredError {
    /// Creates a rejection carrying a plain message.
    pub fn reason(message: impl Into<String>) -> Self {
        Self::Reason {
            message: message.into(),
        }
    }

    /// Creates a rejection carrying a structured payload.
    ///
    /// Fails if `value` cannot be represented as JSON.
    pub fn structured<V: Serialize>(value: &V) -> Result<Self, DeferredError> {
        Ok(Self::Structured {
            value: serde_json::to_value(value)?,
        })
    }

    /// Creates a new Validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn panicked(message: impl Into<String>) -> Self {
        Self::Panicked {
            message: message.into(),
        }
    }

    /// Builds the error `any` rejects with once all of its inputs failed.
    pub fn aggregate(errors: Vec<DeferredError>) -> Self {
        let details: Vec<String> = errors
            .iter()
            .enumerate()
            .map(|(index, error)| format!("Deferred {}: {}", index, error))
            .collect();
        Self::Aggregate {
            message: format!(
                "All {} deferred values rejected: {}",
                errors.len(),
                details.join("; ")
            ),
            errors,
        }
    }

    /// Returns the structured payload, if this rejection carries one.
    pub fn value(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Structured { value } => Some(value),
            _ => None,
        }
    }

    /// Returns true if this rejection came from a panic.
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }

    /// Returns true if this is an `any` aggregate rejection.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::Aggregate { .. })
    }
}

impl From<&str> for DeferredError {
    fn from(message: &str) -> Self {
        Self::reason(message)
    }
}

impl From<String> for DeferredError {
    fn from(message: String) -> Self {
        Self::reason(message)
    }
}

impl From<serde_json::Error> for DeferredError {
    fn from(error: serde_json::Error) -> Self {
        Self::Reason {
            message: format!("Serialization error: {}", error),
        }
    }
}

impl From<std::io::Error> for DeferredError {
    fn from(error: std::io::Error) -> Self {
        Self::Reason {
            message: error.to_string(),
        }
    }
}

/// Errors raised while setting up a [`Scheduler`](crate::Scheduler).
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The scheduler was started outside of a tokio runtime.
    #[error("No tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

/// Flat `type`/`message` view of a [`DeferredError`], used in diagnostic events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// The error type/name
    #[serde(rename = "ErrorType")]
    pub error_type: String,
    /// The error message
    #[serde(rename = "ErrorMessage")]
    pub error_message: String,
}

impl ErrorObject {
    /// Creates a new ErrorObject.
    pub fn new(error_type: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            error_message: error_message.into(),
        }
    }
}

impl From<&DeferredError> for ErrorObject {
    fn from(error: &DeferredError) -> Self {
        match error {
            DeferredError::Reason { message } => ErrorObject::new("Rejected", message),
            DeferredError::Structured { value } => {
                ErrorObject::new("StructuredRejection", value.to_string())
            }
            DeferredError::Panicked { message } => ErrorObject::new("HandlerPanic", message),
            DeferredError::Aggregate { message, .. } => {
                ErrorObject::new("AggregateError", message)
            }
            DeferredError::Validation { message } => {
                ErrorObject::new("ValidationError", message)
            }
        }
    }
}
