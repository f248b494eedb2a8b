//! Partitioned collections.

use serde::{Deserialize, Serialize};

/// A collection split into independently processable partitions.
///
/// Element order inside a partition follows arrival order; nothing relies
/// on ordering across partitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Partitioned<T> {
    partitions: Vec<Vec<T>>,
}

impl<T> Partitioned<T> {
    /// Creates `count` empty partitions (at least one).
    #[must_use]
    pub fn empty(count: usize) -> Self {
        Self {
            partitions: (0..count.max(1)).map(|_| Vec::new()).collect(),
        }
    }

    /// Spreads `items` round-robin over `count` partitions (at least one).
    #[must_use]
    pub fn from_vec(items: Vec<T>, count: usize) -> Self {
        let mut partitioned = Self::empty(count);
        for item in items {
            partitioned.push(item);
        }
        partitioned
    }

    /// Wraps existing partitions.
    #[must_use]
    pub fn from_partitions(partitions: Vec<Vec<T>>) -> Self {
        if partitions.is_empty() {
            return Self::empty(1);
        }
        Self { partitions }
    }

    /// Appends an item, continuing the round-robin assignment.
    pub fn push(&mut self, item: T) {
        if self.partitions.is_empty() {
            self.partitions.push(Vec::new());
        }
        let total = self.len();
        let index = total % self.partitions.len();
        self.partitions[index].push(item);
    }

    /// Returns the number of partitions.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Returns the total number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.partitions.iter().map(Vec::len).sum()
    }

    /// Returns true if no partition holds an element.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.partitions.iter().all(Vec::is_empty)
    }

    /// Applies `f` to every element, keeping the partitioning.
    #[must_use]
    pub fn map<U, F>(self, mut f: F) -> Partitioned<U>
    where
        F: FnMut(T) -> U,
    {
        Partitioned {
            partitions: self
                .partitions
                .into_iter()
                .map(|p| p.into_iter().map(&mut f).collect())
                .collect(),
        }
    }

    /// Replaces every element with zero or more elements, keeping the
    /// partitioning.
    #[must_use]
    pub fn flat_map<U, I, F>(self, mut f: F) -> Partitioned<U>
    where
        F: FnMut(T) -> I,
        I: IntoIterator<Item = U>,
    {
        Partitioned {
            partitions: self
                .partitions
                .into_iter()
                .map(|p| p.into_iter().flat_map(&mut f).collect())
                .collect(),
        }
    }

    /// Returns the partitions.
    #[must_use]
    pub fn into_partitions(self) -> Vec<Vec<T>> {
        self.partitions
    }

    /// Concatenates all partitions.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.partitions.into_iter().flatten().collect()
    }
}
