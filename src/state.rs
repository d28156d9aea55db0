//! Settlement state of a deferred value.
//!
//! [`DeferredState`] is the public snapshot of the three-state lifecycle
//! (`Pending` -> `Fulfilled` | `Rejected`). [`StateCell`] is the shared cell
//! behind every [`Deferred`](crate::Deferred): an atomic status tag guards
//! the single settlement, and a mutex protects the outcome together with the
//! continuations and wakers waiting for it.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::Waker;

use serde::{Deserialize, Serialize};

use crate::error::DeferredError;

/// Result a deferred value settles with.
pub type Outcome<T> = Result<T, DeferredError>;

/// A continuation waiting on a pending cell.
pub(crate) type Reaction<T> = Box<dyn FnOnce(Outcome<T>) + Send + 'static>;

const PENDING: u8 = 0;
const SETTLING: u8 = 1;
const FULFILLED: u8 = 2;
const REJECTED: u8 = 3;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a deferred value, used in logs and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeferredId(u64);

impl DeferredId {
    pub(crate) fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps a raw identifier. Mostly useful for building expected events in tests.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DeferredId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "deferred#{}", self.0)
    }
}

/// Lifecycle status without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeferredStatus {
    /// Not settled yet.
    Pending,
    /// Settled with a value.
    Fulfilled,
    /// Settled with an error.
    Rejected,
}

impl DeferredStatus {
    /// Returns true once the value has settled either way.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for DeferredStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Fulfilled => f.write_str("fulfilled"),
            Self::Rejected => f.write_str("rejected"),
        }
    }
}

/// Snapshot of a deferred value's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeferredState<T> {
    /// Not settled yet.
    Pending,
    /// Settled with a value.
    Fulfilled(T),
    /// Settled with an error.
    Rejected(DeferredError),
}

impl<T> DeferredState<T> {
    /// Returns the status without the payload.
    pub fn status(&self) -> DeferredStatus {
        match self {
            Self::Pending => DeferredStatus::Pending,
            Self::Fulfilled(_) => DeferredStatus::Fulfilled,
            Self::Rejected(_) => DeferredStatus::Rejected,
        }
    }

    /// Returns true if not settled yet.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Returns true if fulfilled.
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    /// Returns true if rejected.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Converts a settled state into its outcome; `None` while pending.
    pub fn into_outcome(self) -> Option<Outcome<T>> {
        match self {
            Self::Pending => None,
            Self::Fulfilled(value) => Some(Ok(value)),
            Self::Rejected(error) => Some(Err(error)),
        }
    }
}

impl<T> From<Outcome<T>> for DeferredState<T> {
    fn from(outcome: Outcome<T>) -> Self {
        match outcome {
            Ok(value) => Self::Fulfilled(value),
            Err(error) => Self::Rejected(error),
        }
    }
}

/// Locks a mutex, recovering the data if a previous holder panicked.
///
/// No user code ever runs while one of these locks is held, so a poisoned
/// lock still guards consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Slot<T> {
    outcome: Option<Outcome<T>>,
    reactions: Vec<Reaction<T>>,
    wakers: Vec<Waker>,
}

/// Everything a successful settlement has to hand out.
pub(crate) struct Settlement<T> {
    pub(crate) outcome: Outcome<T>,
    pub(crate) reactions: Vec<Reaction<T>>,
    pub(crate) wakers: Vec<Waker>,
}

/// Single-assignment state cell.
pub(crate) struct StateCell<T> {
    status: AtomicU8,
    handled: AtomicBool,
    slot: Mutex<Slot<T>>,
}

impl<T: Clone> StateCell<T> {
    pub(crate) fn new() -> Self {
        Self {
            status: AtomicU8::new(PENDING),
            handled: AtomicBool::new(false),
            slot: Mutex::new(Slot {
                outcome: None,
                reactions: Vec::new(),
                wakers: Vec::new(),
            }),
        }
    }

    pub(crate) fn status(&self) -> DeferredStatus {
        match self.status.load(Ordering::Acquire) {
            FULFILLED => DeferredStatus::Fulfilled,
            REJECTED => DeferredStatus::Rejected,
            _ => DeferredStatus::Pending,
        }
    }

    /// Moves the cell out of `Pending`.
    ///
    /// Only the first caller wins; every later call returns `None` and leaves
    /// the stored outcome untouched.
    pub(crate) fn try_settle(&self, outcome: Outcome<T>) -> Option<Settlement<T>> {
        if self
            .status
            .compare_exchange(PENDING, SETTLING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let terminal = if outcome.is_ok() { FULFILLED } else { REJECTED };
        let (reactions, wakers) = {
            let mut slot = lock(&self.slot);
            slot.outcome = Some(outcome.clone());
            (
                std::mem::take(&mut slot.reactions),
                std::mem::take(&mut slot.wakers),
            )
        };
        self.status.store(terminal, Ordering::Release);

        Some(Settlement {
            outcome,
            reactions,
            wakers,
        })
    }

    /// Registers a continuation.
    ///
    /// While pending the reaction is stored and `None` is returned. Once
    /// settled, the reaction comes back together with a copy of the outcome
    /// so the caller can queue it.
    pub(crate) fn subscribe(&self, reaction: Reaction<T>) -> Option<(Reaction<T>, Outcome<T>)> {
        self.handled.store(true, Ordering::Release);
        let mut slot = lock(&self.slot);
        match &slot.outcome {
            Some(outcome) => Some((reaction, outcome.clone())),
            None => {
                slot.reactions.push(reaction);
                None
            }
        }
    }

    /// Returns the outcome if settled, otherwise remembers `waker`.
    pub(crate) fn poll_outcome(&self, waker: &Waker) -> Option<Outcome<T>> {
        self.handled.store(true, Ordering::Release);
        let mut slot = lock(&self.slot);
        if let Some(outcome) = &slot.outcome {
            return Some(outcome.clone());
        }
        if !slot.wakers.iter().any(|known| known.will_wake(waker)) {
            slot.wakers.push(waker.clone());
        }
        None
    }

    pub(crate) fn snapshot(&self) -> DeferredState<T> {
        match &lock(&self.slot).outcome {
            Some(outcome) => outcome.clone().into(),
            None => DeferredState::Pending,
        }
    }
}

impl<T> StateCell<T> {
    /// Takes the rejection out of a cell nobody ever observed.
    pub(crate) fn take_unhandled_rejection(&mut self) -> Option<DeferredError> {
        if *self.status.get_mut() != REJECTED || *self.handled.get_mut() {
            return None;
        }
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        match slot.outcome.take() {
            Some(Err(error)) => Some(error),
            _ => None,
        }
    }
}
