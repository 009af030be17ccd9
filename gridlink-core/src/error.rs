//! Error types for grid client operations.

use std::fmt;
use std::io;
use thiserror::Error;

/// Error codes reported by cluster members in error responses.
///
/// Only the codes the client reacts to are named here; every other code is
/// carried through verbatim in [`ServerError::error_code`].
pub mod error_codes {
    /// The member could not classify the failure.
    pub const UNDEFINED: i32 = 0;
    /// Authentication was rejected.
    pub const AUTHENTICATION: i32 = 3;
    /// The caller is not a member of the cluster.
    pub const CALLER_NOT_MEMBER: i32 = 8;
    /// The member is shutting down or not yet started.
    pub const INSTANCE_NOT_ACTIVE: i32 = 19;
    /// Illegal argument passed to the operation.
    pub const ILLEGAL_ARGUMENT: i32 = 23;
    /// A member left the cluster while the operation was running.
    pub const MEMBER_LEFT: i32 = 33;
    /// The operation timed out on the member.
    pub const OPERATION_TIMEOUT: i32 = 38;
    /// The partition is being migrated.
    pub const PARTITION_MIGRATING: i32 = 39;
    /// A transient failure the member asks the client to retry.
    pub const RETRYABLE_GRID: i32 = 46;
    /// A transient I/O failure on the member side.
    pub const RETRYABLE_IO: i32 = 47;
    /// The target member is not part of the cluster.
    pub const TARGET_NOT_MEMBER: i32 = 53;
    /// The operation reached a member that does not own the partition.
    pub const WRONG_TARGET: i32 = 62;

    /// Returns true if the member guarantees that an operation failing with
    /// `code` was not executed, so it can be sent again.
    pub fn is_retryable(code: i32) -> bool {
        matches!(
            code,
            CALLER_NOT_MEMBER
                | INSTANCE_NOT_ACTIVE
                | MEMBER_LEFT
                | PARTITION_MIGRATING
                | RETRYABLE_GRID
                | RETRYABLE_IO
                | TARGET_NOT_MEMBER
                | WRONG_TARGET
        )
    }
}

/// An operation-level failure reported by a cluster member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// Numeric error code, see [`error_codes`].
    pub error_code: i32,
    /// Class name of the failure on the member side.
    pub class_name: String,
    /// Optional human-readable message.
    pub message: Option<String>,
}

impl ServerError {
    /// Creates a new server error.
    pub fn new(error_code: i32, class_name: impl Into<String>, message: Option<String>) -> Self {
        Self {
            error_code,
            class_name: class_name.into(),
            message,
        }
    }

    /// Returns true if the failure class allows the operation to be retried.
    pub fn is_retryable(&self) -> bool {
        error_codes::is_retryable(self.error_code)
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{} ({}): {}", self.class_name, self.error_code, message),
            None => write!(f, "{} ({})", self.class_name, self.error_code),
        }
    }
}

/// Broad classification of a [`GridError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Socket failures, closed connections, no connection available.
    Transport,
    /// Malformed frames or unexpected messages. Fatal to the connection.
    Protocol,
    /// The member reported a failure inside a response.
    Application,
    /// The invocation deadline passed.
    Timeout,
    /// Credentials were rejected.
    Authentication,
    /// Invalid client configuration.
    Configuration,
    /// The client has been shut down.
    Shutdown,
}

/// The main error type for grid client operations.
#[derive(Debug, Error)]
pub enum GridError {
    /// Connection-related errors (connect refused, write failures).
    #[error("connection error: {0}")]
    Connection(String),

    /// The connection carrying an operation was closed before a response arrived.
    #[error("target disconnected: {0}")]
    TargetDisconnected(String),

    /// No live connection exists to route the operation to.
    #[error("no connection available: {0}")]
    NoConnection(String),

    /// Protocol-related errors (invalid messages, unsupported versions).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Operation timeout errors.
    #[error("timeout error: {0}")]
    Timeout(String),

    /// Authentication errors (invalid credentials, failed login).
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Configuration errors (invalid settings).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The client was shut down while the operation was outstanding.
    #[error("client shut down: {0}")]
    ClientShutdown(String),

    /// A failure reported by a cluster member.
    #[error("server error: {0}")]
    Server(ServerError),

    /// I/O errors from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl GridError {
    /// Returns the broad classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GridError::Connection(_)
            | GridError::TargetDisconnected(_)
            | GridError::NoConnection(_)
            | GridError::Io(_) => ErrorKind::Transport,
            GridError::Protocol(_) | GridError::Serialization(_) => ErrorKind::Protocol,
            GridError::Server(_) => ErrorKind::Application,
            GridError::Timeout(_) => ErrorKind::Timeout,
            GridError::Authentication(_) => ErrorKind::Authentication,
            GridError::Configuration(_) => ErrorKind::Configuration,
            GridError::ClientShutdown(_) => ErrorKind::Shutdown,
        }
    }

    /// Returns true for transport failures.
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    /// Returns true if the member reported a transient failure the
    /// operation may be retried on regardless of its own retry flag.
    pub fn is_retryable_server_error(&self) -> bool {
        matches!(self, GridError::Server(e) if e.is_retryable())
    }
}

impl From<ServerError> for GridError {
    fn from(error: ServerError) -> Self {
        GridError::Server(error)
    }
}

/// A specialized `Result` type for grid client operations.
pub type Result<T> = std::result::Result<T, GridError>;
