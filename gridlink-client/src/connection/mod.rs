//! Connections to cluster members and their management.

mod address;
mod connection;
mod manager;

pub use address::{AddressProvider, StaticAddressProvider};
pub use connection::{Connection, ConnectionId, ConnectionOptions, EventCallback, PendingCall};
pub use manager::{ConnectionEvent, ConnectionManager};
