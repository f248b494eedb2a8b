//! Keyed reductions over partitioned collections.
//!
//! A reduction is expressed as a [`Combiner`]: a commutative monoid. Each
//! partition is reduced on its own task, then the partial results are merged
//! with the same `combine`, so the answer does not depend on how elements
//! were split or in which order partitions finish.

use super::Partitioned;
use crate::errors::BatchflowError;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::hash::Hash;
use tracing::debug;

/// A commutative monoid over accumulator values.
///
/// Implementations must satisfy, for all `a`, `b`, `c`:
/// `combine(identity(), a) == a`, `combine(a, b) == combine(b, a)` and
/// `combine(combine(a, b), c) == combine(a, combine(b, c))`.
pub trait Combiner: Send + Sync + 'static {
    /// Accumulator type.
    type Acc: Send + 'static;

    /// The neutral element.
    fn identity() -> Self::Acc;

    /// Merges two accumulators.
    fn combine(a: Self::Acc, b: Self::Acc) -> Self::Acc;
}

/// Counting: integer addition.
#[derive(Debug, Clone, Copy, Default)]
pub struct Count;

impl Combiner for Count {
    type Acc = i64;

    fn identity() -> i64 {
        0
    }

    fn combine(a: i64, b: i64) -> i64 {
        a + b
    }
}

/// Reduces one partition of `(key, value)` pairs locally.
fn reduce_partition<C, K>(partition: Vec<(K, C::Acc)>) -> HashMap<K, C::Acc>
where
    C: Combiner,
    K: Eq + Hash,
{
    let mut acc: HashMap<K, C::Acc> = HashMap::new();
    for (key, value) in partition {
        merge_value::<C, K>(&mut acc, key, value);
    }
    acc
}

fn merge_value<C, K>(acc: &mut HashMap<K, C::Acc>, key: K, value: C::Acc)
where
    C: Combiner,
    K: Eq + Hash,
{
    let current = acc.remove(&key).unwrap_or_else(C::identity);
    acc.insert(key, C::combine(current, value));
}

/// Combines values per key: partial reduction per partition on separate
/// tasks, then a merge of the partial maps.
///
/// # Errors
///
/// Returns [`BatchflowError::Internal`] if a partial reduction task panics.
pub async fn combine_per_key<C, K>(
    input: Partitioned<(K, C::Acc)>,
) -> Result<HashMap<K, C::Acc>, BatchflowError>
where
    C: Combiner,
    K: Eq + Hash + Send + 'static,
{
    let partitions = input.into_partitions();
    let partition_count = partitions.len();

    let mut partials: FuturesUnordered<tokio::task::JoinHandle<HashMap<K, C::Acc>>> = partitions
        .into_iter()
        .map(|partition| tokio::spawn(async move { reduce_partition::<C, K>(partition) }))
        .collect();

    let mut merged: HashMap<K, C::Acc> = HashMap::new();
    while let Some(joined) = partials.next().await {
        let partial = joined.map_err(|e| {
            BatchflowError::Internal(format!("partial aggregation task failed: {e}"))
        })?;
        for (key, value) in partial {
            merge_value::<C, K>(&mut merged, key, value);
        }
    }

    debug!(partition_count, keys = merged.len(), "merged partial aggregates");
    Ok(merged)
}

/// Counts occurrences of each distinct value.
///
/// # Errors
///
/// See [`combine_per_key`].
pub async fn count_by_value<K>(input: Partitioned<K>) -> Result<HashMap<K, i64>, BatchflowError>
where
    K: Eq + Hash + Send + 'static,
{
    combine_per_key::<Count, K>(input.map(|key| (key, 1))).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_monoid_laws() {
        for (a, b, c) in [(0_i64, 1, 2), (5, 7, 11), (-3, 3, 9)] {
            assert_eq!(Count::combine(Count::identity(), a), a);
            assert_eq!(Count::combine(a, b), Count::combine(b, a));
            assert_eq!(
                Count::combine(Count::combine(a, b), c),
                Count::combine(a, Count::combine(b, c))
            );
        }
    }

    #[tokio::test]
    async fn test_count_by_value() {
        let input = Partitioned::from_vec(vec![3, 3, 5, 3, 7], 2);
        let counts = count_by_value(input).await.unwrap();

        assert_eq!(counts.len(), 3);
        assert_eq!(counts[&3], 3);
        assert_eq!(counts[&5], 1);
        assert_eq!(counts[&7], 1);
    }

    #[tokio::test]
    async fn test_count_independent_of_partitioning() {
        let values: Vec<i64> = (0..200).map(|i| (i * 7) % 12).collect();
        let reference = count_by_value(Partitioned::from_vec(values.clone(), 1))
            .await
            .unwrap();

        for partitions in [2, 3, 8, 64, 500] {
            let counts = count_by_value(Partitioned::from_vec(values.clone(), partitions))
                .await
                .unwrap();
            assert_eq!(counts, reference, "partitions = {partitions}");
        }
    }

    #[tokio::test]
    async fn test_duplicate_keys_across_partitions_merge() {
        let input = Partitioned::from_partitions(vec![vec![4, 4], vec![4], vec![], vec![4, 9]]);
        let counts = count_by_value(input).await.unwrap();

        assert_eq!(counts[&4], 4);
        assert_eq!(counts[&9], 1);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let counts = count_by_value(Partitioned::<i64>::empty(4)).await.unwrap();
        assert!(counts.is_empty());
    }
}
