//! Async Rust client for a partitioned in-memory data grid.
//!
//! The client connects to the members of a cluster over a framed binary
//! protocol, routes every keyed operation to the member owning the key's
//! partition and can keep a near cache of map entries on the client,
//! coherent with the cluster through server-pushed invalidation events.
//! It is built on [Tokio](https://tokio.rs/) and exposes every operation
//! as an `async fn`.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use gridlink_client::{ClientConfig, GridClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .cluster_name("dev")
//!         .build()?;
//!     let client = GridClient::new(config).await?;
//!
//!     let map = client.get_map::<String, String>("my-map").await?;
//!     map.put("key".into(), "value".into()).await?;
//!     let value = map.get(&"key".into()).await?;
//!     println!("{:?}", value); // Some("value")
//!
//!     client.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Near Cache
//!
//! A near cache is attached to every map whose name matches a configured
//! [`NearCacheConfig`], either exactly or through a single `*` wildcard:
//!
//! ```rust,no_run
//! use gridlink_client::{ClientConfig, EvictionPolicy, NearCacheConfig};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let near_cache = NearCacheConfig::builder("orders-*")
//!     .max_size(10_000)
//!     .eviction_policy(EvictionPolicy::Lru)
//!     .time_to_live(Duration::from_secs(300))
//!     .build()?;
//!
//! let config = ClientConfig::builder()
//!     .add_near_cache_config(near_cache)
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! A read through a near-cached map is served locally once cached. An
//! entry is dropped as soon as this client mutates the key or an
//! invalidation event for it arrives; when events may have been missed,
//! the whole near cache is cleared rather than risk a stale read.
//!
//! # Configuration
//!
//! ```rust,no_run
//! use gridlink_client::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::builder()
//!     .cluster_name("production")
//!     .add_address("10.0.0.1:5701".parse().unwrap())
//!     .connection_timeout(Duration::from_secs(10))
//!     .credentials("admin", "secret")
//!     .retry(|r| r
//!         .initial_backoff(Duration::from_millis(100))
//!         .max_backoff(Duration::from_secs(30))
//!         .multiplier(2.0))
//!     .invocation(|i| i
//!         .timeout(Duration::from_secs(60))
//!         .redo_operation(false))
//!     .build()
//!     .expect("invalid config");
//! ```
//!
//! # Feature Flags
//!
//! | Flag | Purpose |
//! |------|---------|
//! | `config-file` | Load [`ClientConfig`] from YAML or TOML files |

#![warn(missing_docs)]

pub mod cache;
pub mod cluster;
mod client;
pub mod codec;
pub mod config;
pub mod config_file;
pub mod connection;
pub mod invocation;
pub mod listener;
pub mod proxy;

pub use cache::{
    EvictionPolicy, NearCache, NearCacheConfig, NearCacheConfigBuilder, NearCacheStats,
};
pub use client::GridClient;
pub use cluster::{Member, MemberEvent, MemberEventType, Partition, PartitionService};
pub use config::{
    ClientConfig, ClientConfigBuilder, ConfigError, InvocationConfig, InvocationConfigBuilder,
    NetworkConfig, NetworkConfigBuilder, RetryConfig, RetryConfigBuilder, SecurityConfig,
    SecurityConfigBuilder,
};
pub use config_file::FileConfig;
pub use connection::{
    AddressProvider, Connection, ConnectionEvent, ConnectionId, ConnectionManager,
    StaticAddressProvider,
};
pub use gridlink_core as core;
pub use gridlink_core::{GridError, Result};
pub use invocation::{InvocationService, InvocationTarget};
pub use listener::{EventHandler, LifecycleEvent, ListenerMessageCodec, ListenerService, ListenerStats};
pub use proxy::IMap;
