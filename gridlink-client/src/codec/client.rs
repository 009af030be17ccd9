//! Client-level operations: authentication, heartbeats and the cluster view.

/// Authentication status reported by the member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthenticationStatus {
    /// Credentials accepted.
    Authenticated = 0,
    /// Credentials rejected.
    CredentialsFailed = 1,
    /// Client and member disagree on the serialization version.
    SerializationVersionMismatch = 2,
    /// The cluster refuses this client (wrong cluster name, blacklisted).
    NotAllowedInCluster = 3,
}

impl AuthenticationStatus {
    /// Decodes a status byte.
    pub fn from_u8(value: u8) -> gridlink_core::Result<Self> {
        match value {
            0 => Ok(Self::Authenticated),
            1 => Ok(Self::CredentialsFailed),
            2 => Ok(Self::SerializationVersionMismatch),
            3 => Ok(Self::NotAllowedInCluster),
            other => Err(gridlink_core::GridError::Protocol(format!(
                "unknown authentication status {}",
                other
            ))),
        }
    }
}

/// `Client.Authentication`: the first request on every connection.
pub mod authentication {
    use std::net::SocketAddr;

    use gridlink_core::protocol::builtin::{
        decode_list, decode_nullable, decode_string, encode_list, encode_nullable, encode_string,
    };
    use gridlink_core::protocol::{
        fixed, ClientMessage, BOOLEAN_SIZE_IN_BYTES, BYTE_SIZE_IN_BYTES, INT_SIZE_IN_BYTES,
        PARTITION_ID_ANY, REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE, UUID_SIZE_IN_BYTES,
    };
    use gridlink_core::{GridError, Result};
    use uuid::Uuid;

    use super::AuthenticationStatus;
    use crate::codec::custom::{decode_address, encode_address};
    use crate::codec::{expect_type, initial_content};

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x000100;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x000101;
    /// Authentication never mutates cluster state.
    pub const RETRYABLE: bool = true;

    const CLIENT_UUID_OFFSET: usize = REQUEST_HEADER_SIZE;
    const SERIALIZATION_VERSION_OFFSET: usize = CLIENT_UUID_OFFSET + UUID_SIZE_IN_BYTES;
    const REQUEST_FIXED_SIZE: usize = UUID_SIZE_IN_BYTES + BYTE_SIZE_IN_BYTES;

    const STATUS_OFFSET: usize = RESPONSE_HEADER_SIZE;
    const MEMBER_UUID_OFFSET: usize = STATUS_OFFSET + BYTE_SIZE_IN_BYTES;
    const RESPONSE_SERIALIZATION_VERSION_OFFSET: usize = MEMBER_UUID_OFFSET + UUID_SIZE_IN_BYTES;
    const PARTITION_COUNT_OFFSET: usize = RESPONSE_SERIALIZATION_VERSION_OFFSET + BYTE_SIZE_IN_BYTES;
    const CLUSTER_ID_OFFSET: usize = PARTITION_COUNT_OFFSET + INT_SIZE_IN_BYTES;
    const FAILOVER_SUPPORTED_OFFSET: usize = CLUSTER_ID_OFFSET + UUID_SIZE_IN_BYTES;
    const RESPONSE_FIXED_SIZE: usize =
        FAILOVER_SUPPORTED_OFFSET + BOOLEAN_SIZE_IN_BYTES - RESPONSE_HEADER_SIZE;

    /// Parameters of an authentication request.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Request {
        /// Name of the cluster the client expects.
        pub cluster_name: String,
        /// Optional username.
        pub username: Option<String>,
        /// Optional password.
        pub password: Option<String>,
        /// Identity of this client instance.
        pub client_uuid: Uuid,
        /// Short client type code.
        pub client_type: String,
        /// Serialization version spoken by the client.
        pub serialization_version: u8,
        /// Client library version.
        pub client_version: String,
        /// Client instance name.
        pub client_name: String,
        /// Free-form labels.
        pub labels: Vec<String>,
    }

    /// Result of an authentication request.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Response {
        /// Whether the client was accepted.
        pub status: AuthenticationStatus,
        /// Address of the member that answered.
        pub address: Option<SocketAddr>,
        /// UUID of the member that answered.
        pub member_uuid: Option<Uuid>,
        /// Serialization version spoken by the member.
        pub serialization_version: u8,
        /// Number of partitions in the cluster.
        pub partition_count: i32,
        /// Identity of the cluster.
        pub cluster_id: Option<Uuid>,
        /// Whether the cluster supports client failover.
        pub failover_supported: bool,
    }

    /// Encodes the request.
    pub fn encode_request(request: &Request) -> ClientMessage {
        let mut message =
            ClientMessage::create_for_encode(REQUEST_MESSAGE_TYPE, PARTITION_ID_ANY, REQUEST_FIXED_SIZE);
        message.set_retryable(RETRYABLE);
        message.set_operation_name("Client.Authentication");
        let content = message.initial_content_mut();
        fixed::encode_uuid(content, CLIENT_UUID_OFFSET, Some(request.client_uuid));
        fixed::encode_u8(content, SERIALIZATION_VERSION_OFFSET, request.serialization_version);

        encode_string(&mut message, &request.cluster_name);
        encode_nullable(&mut message, request.username.as_deref(), encode_string);
        encode_nullable(&mut message, request.password.as_deref(), encode_string);
        encode_string(&mut message, &request.client_type);
        encode_string(&mut message, &request.client_version);
        encode_string(&mut message, &request.client_name);
        encode_list(&mut message, &request.labels, |m, label| encode_string(m, label));
        message
    }

    /// Decodes the request (member side).
    pub fn decode_request(message: &ClientMessage) -> Result<Request> {
        expect_type(message, REQUEST_MESSAGE_TYPE)?;
        let content = initial_content(message)?;
        let client_uuid = fixed::decode_uuid(content, CLIENT_UUID_OFFSET)?
            .ok_or_else(|| GridError::Protocol("authentication without client UUID".to_string()))?;
        let serialization_version = fixed::decode_u8(content, SERIALIZATION_VERSION_OFFSET)?;

        let mut reader = message.reader();
        Ok(Request {
            cluster_name: decode_string(&mut reader)?,
            username: decode_nullable(&mut reader, decode_string)?,
            password: decode_nullable(&mut reader, decode_string)?,
            client_uuid,
            client_type: decode_string(&mut reader)?,
            serialization_version,
            client_version: decode_string(&mut reader)?,
            client_name: decode_string(&mut reader)?,
            labels: decode_list(&mut reader, decode_string)?,
        })
    }

    /// Encodes the response (member side).
    pub fn encode_response(response: &Response) -> ClientMessage {
        let mut message = ClientMessage::create_for_response(RESPONSE_MESSAGE_TYPE, RESPONSE_FIXED_SIZE);
        let content = message.initial_content_mut();
        fixed::encode_u8(content, STATUS_OFFSET, response.status as u8);
        fixed::encode_uuid(content, MEMBER_UUID_OFFSET, response.member_uuid);
        fixed::encode_u8(
            content,
            RESPONSE_SERIALIZATION_VERSION_OFFSET,
            response.serialization_version,
        );
        fixed::encode_i32(content, PARTITION_COUNT_OFFSET, response.partition_count);
        fixed::encode_uuid(content, CLUSTER_ID_OFFSET, response.cluster_id);
        fixed::encode_bool(content, FAILOVER_SUPPORTED_OFFSET, response.failover_supported);

        encode_nullable(&mut message, response.address.as_ref(), encode_address);
        message
    }

    /// Decodes the response.
    pub fn decode_response(message: &ClientMessage) -> Result<Response> {
        expect_type(message, RESPONSE_MESSAGE_TYPE)?;
        let content = initial_content(message)?;
        let mut reader = message.reader();
        Ok(Response {
            status: AuthenticationStatus::from_u8(fixed::decode_u8(content, STATUS_OFFSET)?)?,
            member_uuid: fixed::decode_uuid(content, MEMBER_UUID_OFFSET)?,
            serialization_version: fixed::decode_u8(content, RESPONSE_SERIALIZATION_VERSION_OFFSET)?,
            partition_count: fixed::decode_i32(content, PARTITION_COUNT_OFFSET)?,
            cluster_id: fixed::decode_uuid(content, CLUSTER_ID_OFFSET)?,
            failover_supported: fixed::decode_bool(content, FAILOVER_SUPPORTED_OFFSET)?,
            address: decode_nullable(&mut reader, decode_address)?,
        })
    }
}

/// `Client.Ping`: keeps idle connections alive.
pub mod ping {
    use gridlink_core::protocol::{ClientMessage, PARTITION_ID_ANY};
    use gridlink_core::Result;

    use crate::codec::{decode_empty_response, expect_type};

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x000B00;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x000B01;
    /// Pings are idempotent.
    pub const RETRYABLE: bool = true;

    /// Encodes the request.
    pub fn encode_request() -> ClientMessage {
        let mut message = ClientMessage::create_for_encode(REQUEST_MESSAGE_TYPE, PARTITION_ID_ANY, 0);
        message.set_retryable(RETRYABLE);
        message.set_operation_name("Client.Ping");
        message
    }

    /// Decodes the request (member side).
    pub fn decode_request(message: &ClientMessage) -> Result<()> {
        expect_type(message, REQUEST_MESSAGE_TYPE)
    }

    /// Encodes the response (member side).
    pub fn encode_response() -> ClientMessage {
        ClientMessage::create_for_response(RESPONSE_MESSAGE_TYPE, 0)
    }

    /// Decodes the response.
    pub fn decode_response(message: &ClientMessage) -> Result<()> {
        decode_empty_response(message, RESPONSE_MESSAGE_TYPE)
    }
}

/// `Client.AddClusterViewListener`: subscribes to member-list and
/// partition-table updates on one connection.
pub mod add_cluster_view_listener {
    use gridlink_core::protocol::builtin::{
        decode_entry_list, decode_int_list, decode_list, encode_entry_list, encode_int_list,
        encode_list,
    };
    use gridlink_core::protocol::{
        fixed, ClientMessage, INT_SIZE_IN_BYTES, PARTITION_ID_ANY, REQUEST_HEADER_SIZE,
    };
    use gridlink_core::{GridError, Result};
    use uuid::Uuid;

    use crate::cluster::Member;
    use crate::codec::custom::{decode_member, decode_uuid_frame, encode_member, encode_uuid_frame};
    use crate::codec::{decode_empty_response, expect_type, initial_content};

    /// Request message type.
    pub const REQUEST_MESSAGE_TYPE: i32 = 0x000300;
    /// Response message type.
    pub const RESPONSE_MESSAGE_TYPE: i32 = 0x000301;
    /// Member-list event type.
    pub const EVENT_MEMBERS_VIEW_MESSAGE_TYPE: i32 = 0x000302;
    /// Partition-table event type.
    pub const EVENT_PARTITIONS_VIEW_MESSAGE_TYPE: i32 = 0x000303;
    /// Registration has no side effects beyond the subscription itself.
    pub const RETRYABLE: bool = false;

    const VERSION_OFFSET: usize = REQUEST_HEADER_SIZE;

    /// A cluster view update pushed by the member.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ClusterViewEvent {
        /// The full member list at `version`.
        MembersView {
            /// Member-list version.
            version: i32,
            /// All current members.
            members: Vec<Member>,
        },
        /// The full partition table at `version`.
        PartitionsView {
            /// Partition-table version.
            version: i32,
            /// Owner UUID with the partitions it owns.
            partitions: Vec<(Uuid, Vec<i32>)>,
        },
    }

    /// Encodes the request.
    pub fn encode_request() -> ClientMessage {
        let mut message = ClientMessage::create_for_encode(REQUEST_MESSAGE_TYPE, PARTITION_ID_ANY, 0);
        message.set_retryable(RETRYABLE);
        message.set_operation_name("Client.AddClusterViewListener");
        message
    }

    /// Decodes the request (member side).
    pub fn decode_request(message: &ClientMessage) -> Result<()> {
        expect_type(message, REQUEST_MESSAGE_TYPE)
    }

    /// Encodes the response (member side).
    pub fn encode_response() -> ClientMessage {
        ClientMessage::create_for_response(RESPONSE_MESSAGE_TYPE, 0)
    }

    /// Decodes the response.
    pub fn decode_response(message: &ClientMessage) -> Result<()> {
        decode_empty_response(message, RESPONSE_MESSAGE_TYPE)
    }

    /// Encodes a member-list event (member side).
    pub fn encode_members_view_event(version: i32, members: &[Member]) -> ClientMessage {
        let mut message = ClientMessage::create_for_event(
            EVENT_MEMBERS_VIEW_MESSAGE_TYPE,
            PARTITION_ID_ANY,
            INT_SIZE_IN_BYTES,
        );
        fixed::encode_i32(message.initial_content_mut(), VERSION_OFFSET, version);
        encode_list(&mut message, members, encode_member);
        message
    }

    /// Encodes a partition-table event (member side).
    pub fn encode_partitions_view_event(
        version: i32,
        partitions: &[(Uuid, Vec<i32>)],
    ) -> ClientMessage {
        let mut message = ClientMessage::create_for_event(
            EVENT_PARTITIONS_VIEW_MESSAGE_TYPE,
            PARTITION_ID_ANY,
            INT_SIZE_IN_BYTES,
        );
        fixed::encode_i32(message.initial_content_mut(), VERSION_OFFSET, version);
        encode_entry_list(&mut message, partitions, encode_uuid_frame, |m, ids| {
            encode_int_list(m, ids)
        });
        message
    }

    /// Decodes either cluster view event.
    pub fn decode_event(message: &ClientMessage) -> Result<ClusterViewEvent> {
        let version = fixed::decode_i32(initial_content(message)?, VERSION_OFFSET)?;
        let mut reader = message.reader();
        match message.message_type() {
            Some(EVENT_MEMBERS_VIEW_MESSAGE_TYPE) => Ok(ClusterViewEvent::MembersView {
                version,
                members: decode_list(&mut reader, decode_member)?,
            }),
            Some(EVENT_PARTITIONS_VIEW_MESSAGE_TYPE) => Ok(ClusterViewEvent::PartitionsView {
                version,
                partitions: decode_entry_list(&mut reader, decode_uuid_frame, decode_int_list)?,
            }),
            other => Err(GridError::Protocol(format!(
                "unexpected cluster view event type {:?}",
                other
            ))),
        }
    }
}
