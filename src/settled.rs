//! Result type of [`all_settled`](crate::combinators::all_settled).

use serde::{Deserialize, Serialize};

use crate::error::DeferredError;
use crate::state::{DeferredStatus, Outcome};

/// Outcome of a single input of `all_settled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettledItem<T> {
    /// Position of this input in the original list
    pub index: usize,
    /// Either `Fulfilled` or `Rejected`
    pub status: DeferredStatus,
    /// Value if fulfilled
    pub result: Option<T>,
    /// Error if rejected
    pub error: Option<DeferredError>,
}

impl<T> SettledItem<T> {
    /// Creates a fulfilled item.
    pub fn fulfilled(index: usize, result: T) -> Self {
        Self {
            index,
            status: DeferredStatus::Fulfilled,
            result: Some(result),
            error: None,
        }
    }

    /// Creates a rejected item.
    pub fn rejected(index: usize, error: DeferredError) -> Self {
        Self {
            index,
            status: DeferredStatus::Rejected,
            result: None,
            error: Some(error),
        }
    }

    /// Creates an item from an outcome.
    pub fn from_outcome(index: usize, outcome: Outcome<T>) -> Self {
        match outcome {
            Ok(result) => Self::fulfilled(index, result),
            Err(error) => Self::rejected(index, error),
        }
    }

    /// Returns true if this input fulfilled.
    pub fn is_fulfilled(&self) -> bool {
        self.status == DeferredStatus::Fulfilled
    }

    /// Returns true if this input rejected.
    pub fn is_rejected(&self) -> bool {
        self.status == DeferredStatus::Rejected
    }

    /// Converts the item back into the outcome it was built from.
    pub fn into_outcome(self) -> Outcome<T> {
        match (self.result, self.error) {
            (Some(result), _) => Ok(result),
            (None, Some(error)) => Err(error),
            (None, None) => Err(DeferredError::validation(format!(
                "Settled item {} carries neither a result nor an error",
                self.index
            ))),
        }
    }
}

/// Every input's outcome, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettledBatch<T> {
    /// One item per input
    pub items: Vec<SettledItem<T>>,
}

impl<T> SettledBatch<T> {
    /// Creates a batch, ordering the items by index.
    pub fn new(mut items: Vec<SettledItem<T>>) -> Self {
        items.sort_by_key(|item| item.index);
        Self { items }
    }

    /// Creates an empty batch.
    pub fn empty() -> Self {
        Self { items: Vec::new() }
    }

    /// Returns all fulfilled items.
    pub fn fulfilled(&self) -> Vec<&SettledItem<T>> {
        self.items.iter().filter(|item| item.is_fulfilled()).collect()
    }

    /// Returns all rejected items.
    pub fn rejected(&self) -> Vec<&SettledItem<T>> {
        self.items.iter().filter(|item| item.is_rejected()).collect()
    }

    /// Returns the values of the fulfilled items, in input order.
    pub fn values(&self) -> Vec<&T> {
        self.items
            .iter()
            .filter_map(|item| item.result.as_ref())
            .collect()
    }

    /// Returns every value, or the first error in input order.
    pub fn into_results(self) -> Outcome<Vec<T>> {
        self.items.into_iter().map(SettledItem::into_outcome).collect()
    }

    /// Number of inputs.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true for a batch built from no inputs.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns true if no input rejected.
    pub fn all_fulfilled(&self) -> bool {
        self.items.iter().all(|item| item.is_fulfilled())
    }

    /// Returns true if any input rejected.
    pub fn has_rejections(&self) -> bool {
        self.items.iter().any(|item| item.is_rejected())
    }
}

impl<T> Default for SettledBatch<T> {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod settled_item_tests {
        use super::*;

        #[test]
        fn test_fulfilled() {
            let item = SettledItem::fulfilled(0, 42);
            assert_eq!(item.index, 0);
            assert!(item.is_fulfilled());
            assert!(!item.is_rejected());
            assert_eq!(item.result, Some(42));
            assert!(item.error.is_none());
        }

        #[test]
        fn test_rejected() {
            let item: SettledItem<i32> = SettledItem::rejected(1, DeferredError::reason("E"));
            assert_eq!(item.status, DeferredStatus::Rejected);
            assert_eq!(item.into_outcome(), Err(DeferredError::reason("E")));
        }

        #[test]
        fn test_from_outcome() {
            let item = SettledItem::from_outcome(2, Ok::<_, DeferredError>("x"));
            assert!(item.is_fulfilled());
            assert_eq!(item.into_outcome(), Ok("x"));
        }
    }

    mod settled_batch_tests {
        use super::*;

        fn mixed() -> SettledBatch<i32> {
            SettledBatch::new(vec![
                SettledItem::rejected(1, DeferredError::reason("b")),
                SettledItem::fulfilled(0, 10),
                SettledItem::fulfilled(2, 30),
            ])
        }

        #[test]
        fn test_new_orders_by_index() {
            let batch = mixed();
            let indices: Vec<usize> = batch.items.iter().map(|item| item.index).collect();
            assert_eq!(indices, vec![0, 1, 2]);
        }

        #[test]
        fn test_counts_and_values() {
            let batch = mixed();
            assert_eq!(batch.len(), 3);
            assert_eq!(batch.fulfilled().len(), 2);
            assert_eq!(batch.rejected().len(), 1);
            assert_eq!(batch.values(), vec![&10, &30]);
            assert!(batch.has_rejections());
            assert!(!batch.all_fulfilled());
        }

        #[test]
        fn test_into_results_returns_first_error() {
            assert_eq!(mixed().into_results(), Err(DeferredError::reason("b")));

            let batch = SettledBatch::new(vec![
                SettledItem::fulfilled(0, 1),
                SettledItem::fulfilled(1, 2),
            ]);
            assert_eq!(batch.into_results(), Ok(vec![1, 2]));
        }

        #[test]
        fn test_empty() {
            let batch: SettledBatch<i32> = SettledBatch::default();
            assert!(batch.is_empty());
            assert!(batch.all_fulfilled());
        }

        #[test]
        fn test_serializes_items() {
            let batch = SettledBatch::new(vec![SettledItem::fulfilled(0, 1)]);
            let json = serde_json::to_value(&batch).unwrap();
            assert_eq!(json["items"][0]["status"], "Fulfilled");
            assert_eq!(json["items"][0]["result"], 1);
        }
    }
}
