//! Running total of the partitions a worker owns.
//!
//! Only the worker's own loop touches this, from its rebalance handling.

use crate::broker::TopicPartition;
use std::collections::BTreeSet;

#[derive(Debug, Default, Clone)]
pub struct PartitionAssignment {
    partitions: BTreeSet<TopicPartition>,
}

impl PartitionAssignment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an incremental assignment. Returns how many were new.
    pub fn assign(&mut self, added: &[TopicPartition]) -> usize {
        added
            .iter()
            .filter(|tp| self.partitions.insert((*tp).clone()))
            .count()
    }

    /// Remove an incremental revocation, keeping everything else.
    pub fn revoke(&mut self, removed: &[TopicPartition]) -> usize {
        removed
            .iter()
            .filter(|tp| self.partitions.remove(*tp))
            .count()
    }

    /// The member fell out of the group: nothing it held can be trusted any
    /// more, so the whole set is dropped. Returns what was held.
    pub fn lose(&mut self) -> Vec<TopicPartition> {
        std::mem::take(&mut self.partitions).into_iter().collect()
    }

    pub fn contains(&self, tp: &TopicPartition) -> bool {
        self.partitions.contains(tp)
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn partitions(&self) -> Vec<TopicPartition> {
        self.partitions.iter().cloned().collect()
    }
}

impl std::fmt::Display for PartitionAssignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<String> = self
            .partitions
            .iter()
            .map(|tp| tp.partition.to_string())
            .collect();
        write!(f, "[{}]", ids.join(","))
    }
}
