//! Per-partition invalidation sequence tracking.

use std::collections::HashMap;

use uuid::Uuid;

/// Last applied invalidation state of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionMetadata {
    /// Epoch assigned by the partition owner; changes when the owner loses
    /// its sequence history.
    pub uuid: Uuid,
    /// Sequence of the last applied invalidation.
    pub sequence: i64,
}

/// Outcome of checking an observed sequence against the recorded one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// The observation is the immediate successor (or nothing was missed).
    InOrder,
    /// The observation is not newer than what was already applied.
    Stale,
    /// Invalidations were missed or the epoch changed; cached entries of
    /// the partition can no longer be trusted.
    Inconsistent,
}

/// Invalidation sequences and epochs of every partition a near cache has seen.
#[derive(Debug, Default)]
pub struct MetaDataContainer {
    partitions: HashMap<i32, PartitionMetadata>,
}

impl MetaDataContainer {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded state of a partition.
    pub fn get(&self, partition_id: i32) -> Option<PartitionMetadata> {
        self.partitions.get(&partition_id).copied()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.partitions.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Records an invalidation event.
    ///
    /// Unknown partitions, epoch changes and sequence gaps re-seed the
    /// partition from the event and report [`SequenceCheck::Inconsistent`].
    pub fn observe_event(&mut self, partition_id: i32, uuid: Uuid, sequence: i64) -> SequenceCheck {
        let observed = PartitionMetadata { uuid, sequence };
        let Some(current) = self.partitions.get_mut(&partition_id) else {
            self.partitions.insert(partition_id, observed);
            return SequenceCheck::Inconsistent;
        };

        if current.uuid != uuid {
            *current = observed;
            return SequenceCheck::Inconsistent;
        }
        if sequence <= current.sequence {
            return SequenceCheck::Stale;
        }

        let in_order = sequence == current.sequence + 1;
        current.sequence = sequence;
        if in_order {
            SequenceCheck::InOrder
        } else {
            SequenceCheck::Inconsistent
        }
    }

    /// Records state fetched from the partition owner.
    ///
    /// Unknown partitions are seeded silently. A changed epoch or a sequence
    /// ahead of the recorded one means invalidations were missed.
    pub fn observe_metadata(
        &mut self,
        partition_id: i32,
        uuid: Uuid,
        sequence: i64,
    ) -> SequenceCheck {
        let observed = PartitionMetadata { uuid, sequence };
        let Some(current) = self.partitions.get_mut(&partition_id) else {
            self.partitions.insert(partition_id, observed);
            return SequenceCheck::InOrder;
        };

        if current.uuid != uuid {
            *current = observed;
            SequenceCheck::Inconsistent
        } else if sequence > current.sequence {
            current.sequence = sequence;
            SequenceCheck::Inconsistent
        } else {
            SequenceCheck::InOrder
        }
    }

    /// Forgets every partition.
    pub fn clear(&mut self) {
        self.partitions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_event_for_unknown_partition_is_inconsistent() {
        let mut container = MetaDataContainer::new();
        let uuid = Uuid::new_v4();

        assert_eq!(container.observe_event(3, uuid, 1), SequenceCheck::Inconsistent);
        assert_eq!(container.get(3), Some(PartitionMetadata { uuid, sequence: 1 }));
    }

    #[test]
    fn test_successive_events_are_in_order() {
        let mut container = MetaDataContainer::new();
        let uuid = Uuid::new_v4();
        container.observe_metadata(0, uuid, 4);

        assert_eq!(container.observe_event(0, uuid, 5), SequenceCheck::InOrder);
        assert_eq!(container.observe_event(0, uuid, 6), SequenceCheck::InOrder);
        assert_eq!(container.get(0).unwrap().sequence, 6);
    }

    #[test]
    fn test_gap_is_inconsistent_and_reseeds() {
        let mut container = MetaDataContainer::new();
        let uuid = Uuid::new_v4();
        container.observe_metadata(0, uuid, 1);

        assert_eq!(container.observe_event(0, uuid, 4), SequenceCheck::Inconsistent);
        assert_eq!(container.observe_event(0, uuid, 5), SequenceCheck::InOrder);
    }

    #[test]
    fn test_duplicate_event_is_stale() {
        let mut container = MetaDataContainer::new();
        let uuid = Uuid::new_v4();
        container.observe_metadata(0, uuid, 2);

        assert_eq!(container.observe_event(0, uuid, 2), SequenceCheck::Stale);
        assert_eq!(container.observe_event(0, uuid, 1), SequenceCheck::Stale);
        assert_eq!(container.get(0).unwrap().sequence, 2);
    }

    #[test]
    fn test_epoch_change_is_inconsistent() {
        let mut container = MetaDataContainer::new();
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();
        container.observe_metadata(0, old, 9);

        assert_eq!(container.observe_event(0, new, 1), SequenceCheck::Inconsistent);
        assert_eq!(container.get(0), Some(PartitionMetadata { uuid: new, sequence: 1 }));
    }

    #[test]
    fn test_metadata_ahead_means_missed_invalidations() {
        let mut container = MetaDataContainer::new();
        let uuid = Uuid::new_v4();

        assert_eq!(container.observe_metadata(1, uuid, 3), SequenceCheck::InOrder);
        assert_eq!(container.observe_metadata(1, uuid, 3), SequenceCheck::InOrder);
        assert_eq!(container.observe_metadata(1, uuid, 7), SequenceCheck::Inconsistent);
        assert_eq!(container.get(1).unwrap().sequence, 7);
    }

    #[test]
    fn test_clear() {
        let mut container = MetaDataContainer::new();
        container.observe_metadata(1, Uuid::new_v4(), 3);
        assert!(!container.is_empty());
        container.clear();
        assert!(container.is_empty());
        assert_eq!(container.len(), 0);
    }
}
