//! Cluster membership and partition ownership.

mod member;
mod partition_service;

pub use member::{Member, MemberEvent, MemberEventType, MemberList};
pub use partition_service::{Partition, PartitionService, PartitionTable};
