//! Declarative configuration loading from YAML, TOML, and environment variables.
//!
//! The structs in this module mirror [`ClientConfig`](crate::config::ClientConfig)
//! with serde-friendly types. They are deserialized from a file and then
//! converted through the builder API, so file configuration goes through
//! the same validation as programmatic configuration.
//!
//! # Supported Formats
//!
//! - **YAML** (requires `config-file` feature): `ClientConfig::from_yaml("gridlink.yaml")`
//! - **TOML** (requires `config-file` feature): `ClientConfig::from_toml("gridlink.toml")`
//! - **Environment Variables** (always available): `ClientConfig::from_env()`
//!
//! # Example YAML
//!
//! ```yaml
//! cluster-name: production
//! network:
//!   addresses:
//!     - "10.0.0.1:5701"
//!     - "10.0.0.2:5701"
//!   connection-timeout-ms: 10000
//!   heartbeat-interval-ms: 5000
//!   heartbeat-timeout-ms: 60000
//!   smart-routing: true
//! retry:
//!   initial-backoff-ms: 100
//!   max-backoff-ms: 30000
//!   multiplier: 2.0
//!   cluster-connect-timeout-ms: 20000
//! invocation:
//!   timeout-ms: 120000
//!   retry-pause-ms: 1000
//!   redo-operation: false
//! near-caches:
//!   - name: "orders-*"
//!     max-size: 5000
//!     eviction-policy: lfu
//!     reconciliation-interval-seconds: 60
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{EvictionPolicy, NearCacheConfig};
use crate::config::{ClientConfig, ClientConfigBuilder, ConfigError};

/// Port assumed for addresses given without one.
const DEFAULT_PORT: u16 = 5701;

/// Top-level file-based configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileConfig {
    /// Cluster name to connect to.
    pub cluster_name: Option<String>,
    /// Network configuration.
    pub network: Option<FileNetworkConfig>,
    /// Reconnection configuration.
    pub retry: Option<FileRetryConfig>,
    /// Invocation configuration.
    pub invocation: Option<FileInvocationConfig>,
    /// Credentials sent during authentication.
    pub security: Option<FileSecurityConfig>,
    /// Near-cache configurations.
    pub near_caches: Option<Vec<FileNearCacheConfig>>,
}

/// File-based network configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileNetworkConfig {
    /// Cluster member addresses.
    pub addresses: Option<Vec<String>>,
    /// Connection timeout in milliseconds.
    pub connection_timeout_ms: Option<u64>,
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: Option<u64>,
    /// Heartbeat timeout in milliseconds.
    pub heartbeat_timeout_ms: Option<u64>,
    /// Whether to use smart routing (route to partition owner).
    pub smart_routing: Option<bool>,
    /// Maximum frame size before outbound messages are fragmented.
    pub max_fragment_size: Option<usize>,
}

/// File-based retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileRetryConfig {
    /// Initial backoff duration in milliseconds.
    pub initial_backoff_ms: Option<u64>,
    /// Maximum backoff duration in milliseconds.
    pub max_backoff_ms: Option<u64>,
    /// Backoff multiplier.
    pub multiplier: Option<f64>,
    /// Jitter factor (0.0 to 1.0).
    pub jitter: Option<f64>,
    /// How long to keep trying to reach the cluster, in milliseconds.
    pub cluster_connect_timeout_ms: Option<u64>,
}

/// File-based invocation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileInvocationConfig {
    /// Invocation timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Pause between retry attempts in milliseconds.
    pub retry_pause_ms: Option<u64>,
    /// Whether to retry non-idempotent operations on connection failure.
    pub redo_operation: Option<bool>,
}

/// File-based security configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileSecurityConfig {
    /// Username for authentication.
    pub username: Option<String>,
    /// Password for authentication.
    pub password: Option<String>,
}

/// File-based near-cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct FileNearCacheConfig {
    /// Map name or wildcard pattern.
    pub name: String,
    /// Time-to-live in seconds (0 disables expiry).
    pub time_to_live_seconds: Option<u64>,
    /// Maximum idle time in seconds (0 disables expiry).
    pub max_idle_seconds: Option<u64>,
    /// Maximum number of entries.
    pub max_size: Option<u32>,
    /// One of `lru`, `lfu`, `random` or `none`.
    pub eviction_policy: Option<String>,
    /// Whether to listen for invalidation events.
    pub invalidate_on_change: Option<bool>,
    /// Interval between metadata reconciliations in seconds (0 disables).
    pub reconciliation_interval_seconds: Option<u64>,
}

fn parse_address(address: &str) -> Result<SocketAddr, ConfigError> {
    let address = address.trim();
    address
        .parse::<SocketAddr>()
        .or_else(|_| format!("{address}:{DEFAULT_PORT}").parse::<SocketAddr>())
        .map_err(|_| ConfigError::new(format!("invalid member address '{address}'")))
}

fn parse_eviction_policy(policy: &str) -> Result<EvictionPolicy, ConfigError> {
    match policy.to_ascii_lowercase().as_str() {
        "lru" => Ok(EvictionPolicy::Lru),
        "lfu" => Ok(EvictionPolicy::Lfu),
        "random" => Ok(EvictionPolicy::Random),
        "none" => Ok(EvictionPolicy::None),
        other => Err(ConfigError::new(format!("unknown eviction policy '{other}'"))),
    }
}

impl TryFrom<FileNearCacheConfig> for NearCacheConfig {
    type Error = ConfigError;

    fn try_from(file: FileNearCacheConfig) -> Result<Self, Self::Error> {
        let mut builder = NearCacheConfig::builder(file.name);
        if let Some(secs) = file.time_to_live_seconds {
            builder = builder.time_to_live(Duration::from_secs(secs));
        }
        if let Some(secs) = file.max_idle_seconds {
            builder = builder.max_idle(Duration::from_secs(secs));
        }
        if let Some(size) = file.max_size {
            builder = builder.max_size(size);
        }
        if let Some(policy) = file.eviction_policy {
            builder = builder.eviction_policy(parse_eviction_policy(&policy)?);
        }
        if let Some(invalidate) = file.invalidate_on_change {
            builder = builder.invalidate_on_change(invalidate);
        }
        if let Some(secs) = file.reconciliation_interval_seconds {
            builder = builder.reconciliation_interval(Duration::from_secs(secs));
        }
        builder.build()
    }
}

impl TryFrom<FileConfig> for ClientConfig {
    type Error = ConfigError;

    fn try_from(file: FileConfig) -> Result<Self, Self::Error> {
        let mut builder = ClientConfigBuilder::new();

        if let Some(name) = file.cluster_name {
            builder = builder.cluster_name(name);
        }

        if let Some(net) = file.network {
            let addresses = net
                .addresses
                .unwrap_or_default()
                .iter()
                .map(|a| parse_address(a))
                .collect::<Result<Vec<_>, _>>()?;

            builder = builder.network(|mut n| {
                if !addresses.is_empty() {
                    n = n.addresses(addresses);
                }
                if let Some(ms) = net.connection_timeout_ms {
                    n = n.connection_timeout(Duration::from_millis(ms));
                }
                if let Some(ms) = net.heartbeat_interval_ms {
                    n = n.heartbeat_interval(Duration::from_millis(ms));
                }
                if let Some(ms) = net.heartbeat_timeout_ms {
                    n = n.heartbeat_timeout(Duration::from_millis(ms));
                }
                if let Some(smart) = net.smart_routing {
                    n = n.smart_routing(smart);
                }
                if let Some(size) = net.max_fragment_size {
                    n = n.max_fragment_size(size);
                }
                n
            });
        }

        if let Some(retry) = file.retry {
            builder = builder.retry(|mut r| {
                if let Some(ms) = retry.initial_backoff_ms {
                    r = r.initial_backoff(Duration::from_millis(ms));
                }
                if let Some(ms) = retry.max_backoff_ms {
                    r = r.max_backoff(Duration::from_millis(ms));
                }
                if let Some(m) = retry.multiplier {
                    r = r.multiplier(m);
                }
                if let Some(j) = retry.jitter {
                    r = r.jitter(j);
                }
                if let Some(ms) = retry.cluster_connect_timeout_ms {
                    r = r.cluster_connect_timeout(Duration::from_millis(ms));
                }
                r
            });
        }

        if let Some(invocation) = file.invocation {
            builder = builder.invocation(|mut i| {
                if let Some(ms) = invocation.timeout_ms {
                    i = i.timeout(Duration::from_millis(ms));
                }
                if let Some(ms) = invocation.retry_pause_ms {
                    i = i.retry_pause(Duration::from_millis(ms));
                }
                if let Some(redo) = invocation.redo_operation {
                    i = i.redo_operation(redo);
                }
                i
            });
        }

        if let Some(security) = file.security {
            builder = builder.security(|mut s| {
                if let Some(username) = security.username {
                    s = s.username(username);
                }
                if let Some(password) = security.password {
                    s = s.password(password);
                }
                s
            });
        }

        for near_cache in file.near_caches.unwrap_or_default() {
            builder = builder.add_near_cache_config(near_cache.try_into()?);
        }

        builder.build()
    }
}

impl ClientConfig {
    /// Loads configuration from a YAML file.
    ///
    /// Requires the `config-file` feature.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let config = ClientConfig::from_yaml("gridlink.yaml")?;
    /// let client = GridClient::new(config).await?;
    /// ```
    #[cfg(feature = "config-file")]
    pub fn from_yaml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("failed to read YAML config file: {e}")))?;
        let file_config: FileConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("failed to parse YAML config: {e}")))?;
        file_config.try_into()
    }

    /// Loads configuration from a TOML file.
    ///
    /// Requires the `config-file` feature.
    #[cfg(feature = "config-file")]
    pub fn from_toml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("failed to read TOML config file: {e}")))?;
        let file_config: FileConfig = toml_crate::from_str(&content)
            .map_err(|e| ConfigError::new(format!("failed to parse TOML config: {e}")))?;
        file_config.try_into()
    }

    /// Loads configuration from environment variables.
    ///
    /// # Supported Environment Variables
    ///
    /// | Variable | Maps to |
    /// |----------|---------|
    /// | `GRIDLINK_CLUSTER_NAME` | `cluster_name` |
    /// | `GRIDLINK_ADDRESSES` | Comma-separated addresses (e.g., `10.0.0.1:5701,10.0.0.2:5701`) |
    /// | `GRIDLINK_CONNECTION_TIMEOUT_MS` | Connection timeout in milliseconds |
    /// | `GRIDLINK_SMART_ROUTING` | `"true"` or `"false"` |
    /// | `GRIDLINK_INVOCATION_TIMEOUT_MS` | Invocation timeout in milliseconds |
    /// | `GRIDLINK_REDO_OPERATION` | `"true"` or `"false"` |
    /// | `GRIDLINK_USERNAME` | Authentication username |
    /// | `GRIDLINK_PASSWORD` | Authentication password |
    ///
    /// Numeric values that do not parse are rejected.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_ms = |name: &str| -> Result<Option<u64>, ConfigError> {
            var(name)
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .map_err(|_| ConfigError::new(format!("{name} must be a number, got '{v}'")))
                })
                .transpose()
        };
        let parse_bool = |name: &str| var(name).map(|v| v.trim().eq_ignore_ascii_case("true"));

        let mut file_config = FileConfig {
            cluster_name: var("GRIDLINK_CLUSTER_NAME"),
            ..Default::default()
        };

        let network = FileNetworkConfig {
            addresses: var("GRIDLINK_ADDRESSES")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect()),
            connection_timeout_ms: parse_ms("GRIDLINK_CONNECTION_TIMEOUT_MS")?,
            smart_routing: parse_bool("GRIDLINK_SMART_ROUTING"),
            ..Default::default()
        };
        file_config.network = Some(network);

        file_config.invocation = Some(FileInvocationConfig {
            timeout_ms: parse_ms("GRIDLINK_INVOCATION_TIMEOUT_MS")?,
            redo_operation: parse_bool("GRIDLINK_REDO_OPERATION"),
            ..Default::default()
        });

        file_config.security = Some(FileSecurityConfig {
            username: var("GRIDLINK_USERNAME"),
            password: var("GRIDLINK_PASSWORD"),
        });

        file_config.try_into()
    }
}

/// Loads a configuration file, detecting the format from its extension.
///
/// Supports `.yaml`, `.yml`, and `.toml` extensions.
/// Requires the `config-file` feature.
#[cfg(feature = "config-file")]
pub fn load_config<P: AsRef<std::path::Path>>(path: P) -> Result<ClientConfig, ConfigError> {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => ClientConfig::from_yaml(path),
        Some("toml") => ClientConfig::from_toml(path),
        Some(ext) => Err(ConfigError::new(format!(
            "unsupported config file extension: .{ext} (expected .yaml, .yml, or .toml)"
        ))),
        None => Err(ConfigError::new(
            "config file has no extension; expected .yaml, .yml, or .toml",
        )),
    }
}
