//! Cluster members and the versioned member list.

use std::collections::HashMap;
use std::net::SocketAddr;

use uuid::Uuid;

/// Type of membership event fired when cluster topology changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberEventType {
    /// A new member joined the cluster.
    Added,
    /// A member left the cluster.
    Removed,
}

/// Represents a member of the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Unique identifier of the member.
    pub uuid: Uuid,
    /// Network address of the member.
    pub address: SocketAddr,
    /// Whether this member holds no partitions.
    pub lite_member: bool,
}

impl Member {
    /// Creates a new data member.
    pub fn new(uuid: Uuid, address: SocketAddr) -> Self {
        Self {
            uuid,
            address,
            lite_member: false,
        }
    }

    /// Returns the member's UUID.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns the member's network address.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Returns whether this is a lite member.
    pub fn is_lite_member(&self) -> bool {
        self.lite_member
    }
}

impl std::fmt::Display for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Member[uuid={}, address={}]", self.uuid, self.address)
    }
}

/// A membership change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberEvent {
    /// Whether the member joined or left.
    pub event_type: MemberEventType,
    /// The member concerned.
    pub member: Member,
}

/// The member list, replaced wholesale by newer versions.
#[derive(Debug, Clone, Default)]
pub struct MemberList {
    version: i32,
    members: HashMap<Uuid, Member>,
}

impl MemberList {
    /// Returns the version of this list, or 0 before the first update.
    pub fn version(&self) -> i32 {
        self.version
    }

    /// Returns the member with the given UUID.
    pub fn get(&self, uuid: &Uuid) -> Option<&Member> {
        self.members.get(uuid)
    }

    /// Returns all members.
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    /// Returns the number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if no members are known.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Replaces the list if `version` is newer and returns the membership
    /// changes. Older or equal versions are ignored.
    pub fn apply(&mut self, version: i32, members: Vec<Member>) -> Option<Vec<MemberEvent>> {
        if version <= self.version && !self.members.is_empty() {
            return None;
        }

        let incoming: HashMap<Uuid, Member> =
            members.into_iter().map(|m| (m.uuid, m)).collect();
        let mut events: Vec<MemberEvent> = self
            .members
            .values()
            .filter(|m| !incoming.contains_key(&m.uuid))
            .map(|m| MemberEvent {
                event_type: MemberEventType::Removed,
                member: m.clone(),
            })
            .collect();
        events.extend(
            incoming
                .values()
                .filter(|m| !self.members.contains_key(&m.uuid))
                .map(|m| MemberEvent {
                    event_type: MemberEventType::Added,
                    member: m.clone(),
                }),
        );

        self.version = version;
        self.members = incoming;
        Some(events)
    }

    /// Forgets all members so the next list is accepted regardless of version.
    pub fn reset(&mut self) {
        self.version = 0;
        self.members.clear();
    }
}
