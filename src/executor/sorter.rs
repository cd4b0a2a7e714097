//! Result sorting for query execution
//!
//! Composite ordering over at most two keys, applied in key order.

use std::cmp::Ordering;

use crate::query::{OrderDirection, OrderExpression};
use crate::value::{sort_compare, Record};

/// Sorts result records
pub struct ResultSorter;

impl ResultSorter {
    /// Sorts records by the given keys.
    ///
    /// Sort is stable: rows equal on every key keep their input order.
    pub fn sort(records: &mut [Record], orders: &[OrderExpression]) {
        if orders.is_empty() {
            return;
        }
        records.sort_by(|a, b| Self::compare(a, b, orders));
    }

    fn compare(a: &Record, b: &Record, orders: &[OrderExpression]) -> Ordering {
        for order in orders {
            let ordering = sort_compare(a.get(&order.attribute), b.get(&order.attribute));
            let ordering = match order.direction {
                OrderDirection::Ascending => ordering,
                OrderDirection::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}
