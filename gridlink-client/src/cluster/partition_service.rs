//! Partition table and key-to-partition mapping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use gridlink_core::protocol::PARTITION_ID_ANY;
use gridlink_core::serialization::hash_to_index;
use gridlink_core::{Data, GridError, Result};
use tracing::debug;
use uuid::Uuid;

/// Represents a single partition in the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    id: i32,
    owner_uuid: Option<Uuid>,
}

impl Partition {
    /// Creates a new partition with the given ID and optional owner.
    pub fn new(id: i32, owner_uuid: Option<Uuid>) -> Self {
        Self { id, owner_uuid }
    }

    /// Returns the partition ID.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Returns the UUID of the partition owner, if known.
    pub fn owner_uuid(&self) -> Option<Uuid> {
        self.owner_uuid
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.owner_uuid {
            Some(uuid) => write!(f, "Partition[id={}, owner={}]", self.id, uuid),
            None => write!(f, "Partition[id={}, owner=unknown]", self.id),
        }
    }
}

/// An immutable snapshot of partition ownership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionTable {
    version: i32,
    owners: HashMap<i32, Uuid>,
}

impl PartitionTable {
    /// Builds a table from the per-member partition lists of a cluster view event.
    pub fn from_view(version: i32, partitions: &[(Uuid, Vec<i32>)]) -> Self {
        let owners = partitions
            .iter()
            .flat_map(|(owner, ids)| ids.iter().map(move |id| (*id, *owner)))
            .collect();
        Self { version, owners }
    }

    /// Returns the table version.
    pub fn version(&self) -> i32 {
        self.version
    }

    /// Returns the owner of `partition_id`, if assigned.
    pub fn owner(&self, partition_id: i32) -> Option<Uuid> {
        self.owners.get(&partition_id).copied()
    }

    /// Returns the number of partitions with a known owner.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Returns true if no partition has a known owner.
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// Service for querying partition information.
///
/// The partition service maps keys to partitions with the same hash the
/// members use and caches the partition-to-owner table pushed by the
/// cluster. Tables are replaced wholesale, never merged, and only by a
/// strictly newer version.
///
/// # Example
///
/// ```ignore
/// let partitions = client.partition_service();
///
/// let key = Data::of("my-key")?;
/// let partition_id = partitions.partition_id(&key);
/// if let Some(owner) = partitions.owner_of(partition_id) {
///     println!("{} is owned by {}", partition_id, owner);
/// }
/// ```
#[derive(Debug, Default)]
pub struct PartitionService {
    partition_count: AtomicI32,
    table: RwLock<Arc<PartitionTable>>,
}

impl PartitionService {
    /// Creates a partition service with an unknown partition count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of partitions, or 0 before the first
    /// successful authentication.
    pub fn partition_count(&self) -> i32 {
        self.partition_count.load(Ordering::Acquire)
    }

    /// Records the partition count reported by a member.
    ///
    /// The count never changes for the lifetime of a cluster; a member
    /// reporting a different one belongs to another cluster.
    pub fn set_partition_count(&self, count: i32) -> Result<()> {
        match self
            .partition_count
            .compare_exchange(0, count, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                debug!(partition_count = count, "partition count learned");
                Ok(())
            }
            Err(existing) if existing == count => Ok(()),
            Err(existing) => Err(GridError::Protocol(format!(
                "member reports {} partitions, but the cluster has {}",
                count, existing
            ))),
        }
    }

    /// Returns the partition `key` belongs to, or `PARTITION_ID_ANY` while
    /// the partition count is unknown.
    pub fn partition_id(&self, key: &Data) -> i32 {
        match self.partition_count() {
            0 => PARTITION_ID_ANY,
            count => hash_to_index(key.partition_hash(), count),
        }
    }

    /// Returns the partition `key` belongs to together with its owner.
    pub fn partition(&self, key: &Data) -> Partition {
        let id = self.partition_id(key);
        Partition::new(id, self.owner_of(id))
    }

    /// Returns every partition with its owner, if known.
    pub fn partitions(&self) -> Vec<Partition> {
        let table = self.table();
        (0..self.partition_count())
            .map(|id| Partition::new(id, table.owner(id)))
            .collect()
    }

    /// Returns the owner of `partition_id` in the latest table.
    pub fn owner_of(&self, partition_id: i32) -> Option<Uuid> {
        self.table().owner(partition_id)
    }

    /// Returns the latest table snapshot.
    pub fn table(&self) -> Arc<PartitionTable> {
        Arc::clone(&self.table.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Installs `table` if it is newer than the current one.
    ///
    /// Returns false, leaving the current table in place, for a version
    /// equal to or older than the current one.
    pub fn refresh(&self, table: PartitionTable) -> bool {
        let mut current = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if table.version <= current.version {
            debug!(
                version = table.version,
                current = current.version,
                "ignoring stale partition table"
            );
            return false;
        }

        debug!(
            version = table.version,
            owned = table.len(),
            "partition table updated"
        );
        *current = Arc::new(table);
        true
    }

    /// Forgets the table after the client lost the cluster, so the next
    /// table is accepted whatever its version.
    pub fn reset(&self) {
        *self.table.write().unwrap_or_else(PoisonError::into_inner) =
            Arc::new(PartitionTable::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_id_unknown_count() {
        let service = PartitionService::new();
        let key = Data::of("key").unwrap();
        assert_eq!(service.partition_id(&key), PARTITION_ID_ANY);
    }

    #[test]
    fn test_partition_id_in_range_and_stable() {
        let service = PartitionService::new();
        service.set_partition_count(271).unwrap();

        for i in 0..100 {
            let key = Data::of(&format!("key{}", i)).unwrap();
            let id = service.partition_id(&key);
            assert!((0..271).contains(&id));
            assert_eq!(id, service.partition_id(&key));
        }
    }

    #[test]
    fn test_partition_count_mismatch() {
        let service = PartitionService::new();
        service.set_partition_count(271).unwrap();
        service.set_partition_count(271).unwrap();

        let err = service.set_partition_count(17).unwrap_err();
        assert!(matches!(err, GridError::Protocol(_)));
        assert_eq!(service.partition_count(), 271);
    }

    #[test]
    fn test_refresh_is_monotonic() {
        let service = PartitionService::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(service.refresh(PartitionTable::from_view(2, &[(a, vec![0, 1])])));
        assert_eq!(service.owner_of(0), Some(a));

        assert!(!service.refresh(PartitionTable::from_view(2, &[(b, vec![0, 1])])));
        assert!(!service.refresh(PartitionTable::from_view(1, &[(b, vec![0, 1])])));
        assert_eq!(service.owner_of(0), Some(a));

        assert!(service.refresh(PartitionTable::from_view(3, &[(b, vec![0])])));
        assert_eq!(service.owner_of(0), Some(b));
        assert_eq!(service.owner_of(1), None);
    }

    #[test]
    fn test_reset_accepts_older_version() {
        let service = PartitionService::new();
        let owner = Uuid::new_v4();
        service.refresh(PartitionTable::from_view(10, &[(owner, vec![0])]));

        service.reset();
        assert!(service.table().is_empty());
        assert!(service.refresh(PartitionTable::from_view(1, &[(owner, vec![0])])));
    }

    #[test]
    fn test_partitions_lists_every_id() {
        let service = PartitionService::new();
        service.set_partition_count(3).unwrap();
        let owner = Uuid::new_v4();
        service.refresh(PartitionTable::from_view(1, &[(owner, vec![0, 2])]));

        let partitions = service.partitions();
        assert_eq!(partitions.len(), 3);
        assert_eq!(partitions[1].owner_uuid(), None);
        assert_eq!(partitions[2].to_string(), format!("Partition[id=2, owner={}]", owner));
    }
}
