//! Client configuration types and builders.

use std::net::SocketAddr;
use std::time::Duration;

use crate::cache::NearCacheConfig;

/// Default cluster name.
pub const DEFAULT_CLUSTER_NAME: &str = "dev";
/// Default member address used when none is configured.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:5701";
/// Default connection timeout.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Default time without reads after which a connection is closed.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);
/// Default initial reconnect backoff.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);
/// Default maximum reconnect backoff.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);
/// Default reconnect backoff multiplier.
pub const DEFAULT_RETRY_MULTIPLIER: f64 = 2.0;
/// Default jitter applied to reconnect backoff.
pub const DEFAULT_RETRY_JITTER: f64 = 0.0;
/// Default time the client keeps trying to reach the cluster before shutting down.
pub const DEFAULT_CLUSTER_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
/// Default deadline of an invocation, measured from its first attempt.
pub const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(120);
/// Default pause between invocation attempts.
pub const DEFAULT_INVOCATION_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Configuration error returned when validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for gridlink_core::GridError {
    fn from(err: ConfigError) -> Self {
        gridlink_core::GridError::Configuration(err.message)
    }
}

fn default_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5701))
}

/// Network configuration for cluster connections.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    addresses: Vec<SocketAddr>,
    connection_timeout: Duration,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
    smart_routing: bool,
    max_fragment_size: Option<usize>,
}

impl NetworkConfig {
    /// Returns the configured cluster member addresses.
    pub fn addresses(&self) -> &[SocketAddr] {
        &self.addresses
    }

    /// Returns the connection timeout duration.
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Returns the heartbeat interval duration.
    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Returns how long a connection may go without reads before it is closed.
    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    /// Returns whether the client connects to every member and routes
    /// partition-bound requests to the partition owner.
    pub fn smart_routing(&self) -> bool {
        self.smart_routing
    }

    /// Returns the size above which outgoing messages are fragmented.
    pub fn max_fragment_size(&self) -> Option<usize> {
        self.max_fragment_size
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            addresses: vec![default_address()],
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            smart_routing: true,
            max_fragment_size: None,
        }
    }
}

/// Builder for `NetworkConfig`.
#[derive(Debug, Clone, Default)]
pub struct NetworkConfigBuilder {
    addresses: Vec<SocketAddr>,
    connection_timeout: Option<Duration>,
    heartbeat_interval: Option<Duration>,
    heartbeat_timeout: Option<Duration>,
    smart_routing: Option<bool>,
    max_fragment_size: Option<usize>,
}

impl NetworkConfigBuilder {
    /// Creates a new network configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cluster member address.
    pub fn add_address(mut self, address: SocketAddr) -> Self {
        self.addresses.push(address);
        self
    }

    /// Sets the cluster member addresses, replacing any previously configured.
    pub fn addresses(mut self, addresses: impl IntoIterator<Item = SocketAddr>) -> Self {
        self.addresses = addresses.into_iter().collect();
        self
    }

    /// Sets the connection timeout duration.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Sets the heartbeat interval duration.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Sets the heartbeat timeout duration.
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = Some(timeout);
        self
    }

    /// Enables or disables smart routing.
    ///
    /// With smart routing disabled the client talks to a single member and
    /// lets it forward partition-bound requests.
    pub fn smart_routing(mut self, enabled: bool) -> Self {
        self.smart_routing = Some(enabled);
        self
    }

    /// Fragments outgoing messages larger than `size` bytes.
    pub fn max_fragment_size(mut self, size: usize) -> Self {
        self.max_fragment_size = Some(size);
        self
    }

    /// Builds the network configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `heartbeat_timeout` does not exceed `heartbeat_interval`
    /// - `max_fragment_size` is too small to hold a frame
    pub fn build(self) -> Result<NetworkConfig, ConfigError> {
        let addresses = if self.addresses.is_empty() {
            vec![default_address()]
        } else {
            self.addresses
        };

        let heartbeat_interval = self.heartbeat_interval.unwrap_or(DEFAULT_HEARTBEAT_INTERVAL);
        let heartbeat_timeout = self.heartbeat_timeout.unwrap_or(DEFAULT_HEARTBEAT_TIMEOUT);
        if heartbeat_timeout <= heartbeat_interval {
            return Err(ConfigError::new(
                "heartbeat_timeout must exceed heartbeat_interval",
            ));
        }

        if let Some(size) = self.max_fragment_size {
            if size < 64 {
                return Err(ConfigError::new("max_fragment_size must be at least 64 bytes"));
            }
        }

        Ok(NetworkConfig {
            addresses,
            connection_timeout: self.connection_timeout.unwrap_or(DEFAULT_CONNECTION_TIMEOUT),
            heartbeat_interval,
            heartbeat_timeout,
            smart_routing: self.smart_routing.unwrap_or(true),
            max_fragment_size: self.max_fragment_size,
        })
    }
}

/// Reconnection configuration.
///
/// Controls the exponential backoff used while the client has lost every
/// connection and tries to reach the cluster again.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    jitter: f64,
    cluster_connect_timeout: Duration,
}

impl RetryConfig {
    /// Returns the initial backoff duration.
    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Returns the maximum backoff duration.
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Returns the backoff multiplier.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Returns the jitter factor in `[0.0, 1.0]`.
    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Returns how long the client keeps trying before giving up.
    pub fn cluster_connect_timeout(&self) -> Duration {
        self.cluster_connect_timeout
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            multiplier: DEFAULT_RETRY_MULTIPLIER,
            jitter: DEFAULT_RETRY_JITTER,
            cluster_connect_timeout: DEFAULT_CLUSTER_CONNECT_TIMEOUT,
        }
    }
}

impl From<RetryConfig> for RetryConfigBuilder {
    fn from(config: RetryConfig) -> Self {
        Self {
            initial_backoff: Some(config.initial_backoff),
            max_backoff: Some(config.max_backoff),
            multiplier: Some(config.multiplier),
            jitter: Some(config.jitter),
            cluster_connect_timeout: Some(config.cluster_connect_timeout),
        }
    }
}

/// Builder for `RetryConfig`.
#[derive(Debug, Clone, Default)]
pub struct RetryConfigBuilder {
    initial_backoff: Option<Duration>,
    max_backoff: Option<Duration>,
    multiplier: Option<f64>,
    jitter: Option<f64>,
    cluster_connect_timeout: Option<Duration>,
}

impl RetryConfigBuilder {
    /// Creates a new retry configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial backoff duration.
    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = Some(backoff);
        self
    }

    /// Sets the maximum backoff duration.
    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = Some(backoff);
        self
    }

    /// Sets the backoff multiplier.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Sets the jitter factor applied to each backoff.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Sets how long the client keeps trying to reach the cluster.
    pub fn cluster_connect_timeout(mut self, timeout: Duration) -> Self {
        self.cluster_connect_timeout = Some(timeout);
        self
    }

    /// Builds the retry configuration, returning an error if validation fails.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `initial_backoff` exceeds `max_backoff`
    /// - `multiplier` is less than 1.0
    /// - `jitter` is outside `[0.0, 1.0]`
    pub fn build(self) -> Result<RetryConfig, ConfigError> {
        let initial_backoff = self.initial_backoff.unwrap_or(DEFAULT_INITIAL_BACKOFF);
        let max_backoff = self.max_backoff.unwrap_or(DEFAULT_MAX_BACKOFF);
        let multiplier = self.multiplier.unwrap_or(DEFAULT_RETRY_MULTIPLIER);
        let jitter = self.jitter.unwrap_or(DEFAULT_RETRY_JITTER);

        if initial_backoff > max_backoff {
            return Err(ConfigError::new(
                "initial_backoff must not exceed max_backoff",
            ));
        }

        if multiplier < 1.0 {
            return Err(ConfigError::new("multiplier must be at least 1.0"));
        }

        if !(0.0..=1.0).contains(&jitter) {
            return Err(ConfigError::new("jitter must be between 0.0 and 1.0"));
        }

        Ok(RetryConfig {
            initial_backoff,
            max_backoff,
            multiplier,
            jitter,
            cluster_connect_timeout: self
                .cluster_connect_timeout
                .unwrap_or(DEFAULT_CLUSTER_CONNECT_TIMEOUT),
        })
    }
}

/// Invocation configuration.
#[derive(Debug, Clone)]
pub struct InvocationConfig {
    timeout: Duration,
    retry_pause: Duration,
    redo_operation: bool,
}

impl InvocationConfig {
    /// Returns the deadline of an invocation, measured from its first attempt.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the pause between attempts.
    pub fn retry_pause(&self) -> Duration {
        self.retry_pause
    }

    /// Returns whether non-retryable operations are also sent again after a
    /// transport failure.
    pub fn redo_operation(&self) -> bool {
        self.redo_operation
    }
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_INVOCATION_TIMEOUT,
            retry_pause: DEFAULT_INVOCATION_RETRY_PAUSE,
            redo_operation: false,
        }
    }
}

/// Builder for `InvocationConfig`.
#[derive(Debug, Clone, Default)]
pub struct InvocationConfigBuilder {
    timeout: Option<Duration>,
    retry_pause: Option<Duration>,
    redo_operation: Option<bool>,
}

impl InvocationConfigBuilder {
    /// Creates a new invocation configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the invocation timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the pause between attempts.
    pub fn retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause = Some(pause);
        self
    }

    /// Sets whether non-retryable operations are sent again after a
    /// transport failure.
    pub fn redo_operation(mut self, redo: bool) -> Self {
        self.redo_operation = Some(redo);
        self
    }

    /// Builds the invocation configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the timeout is zero.
    pub fn build(self) -> Result<InvocationConfig, ConfigError> {
        let timeout = self.timeout.unwrap_or(DEFAULT_INVOCATION_TIMEOUT);
        if timeout.is_zero() {
            return Err(ConfigError::new("invocation timeout must be greater than zero"));
        }

        Ok(InvocationConfig {
            timeout,
            retry_pause: self.retry_pause.unwrap_or(DEFAULT_INVOCATION_RETRY_PAUSE),
            redo_operation: self.redo_operation.unwrap_or(false),
        })
    }
}

/// Security configuration for cluster authentication.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfig {
    username: Option<String>,
    password: Option<String>,
}

impl SecurityConfig {
    /// Returns the configured username.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Returns the configured password.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Returns true if both username and password are configured.
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

/// Builder for `SecurityConfig`.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfigBuilder {
    username: Option<String>,
    password: Option<String>,
}

impl SecurityConfigBuilder {
    /// Creates a new security configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the username.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets both username and password.
    pub fn credentials(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username(username).password(password)
    }

    /// Builds the security configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if only one of username and password is set.
    pub fn build(self) -> Result<SecurityConfig, ConfigError> {
        if self.username.is_some() != self.password.is_some() {
            return Err(ConfigError::new(
                "both username and password must be provided together",
            ));
        }

        Ok(SecurityConfig {
            username: self.username,
            password: self.password,
        })
    }
}

/// Main client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    cluster_name: String,
    network: NetworkConfig,
    retry: RetryConfig,
    invocation: InvocationConfig,
    security: SecurityConfig,
    near_caches: Vec<NearCacheConfig>,
}

impl ClientConfig {
    /// Creates a new client configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Returns the cluster name.
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Returns the network configuration.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Returns the reconnection configuration.
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Returns the invocation configuration.
    pub fn invocation(&self) -> &InvocationConfig {
        &self.invocation
    }

    /// Returns the security configuration.
    pub fn security(&self) -> &SecurityConfig {
        &self.security
    }

    /// Returns the near-cache configurations.
    pub fn near_caches(&self) -> &[NearCacheConfig] {
        &self.near_caches
    }

    /// Finds the near-cache configuration for the given map name.
    ///
    /// An exact name match wins over a wildcard pattern.
    pub fn find_near_cache(&self, map_name: &str) -> Option<&NearCacheConfig> {
        self.near_caches
            .iter()
            .find(|nc| nc.name() == map_name)
            .or_else(|| self.near_caches.iter().find(|nc| nc.matches(map_name)))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cluster_name: DEFAULT_CLUSTER_NAME.to_string(),
            network: NetworkConfig::default(),
            retry: RetryConfig::default(),
            invocation: InvocationConfig::default(),
            security: SecurityConfig::default(),
            near_caches: Vec::new(),
        }
    }
}

/// Builder for `ClientConfig`.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    cluster_name: Option<String>,
    network: NetworkConfigBuilder,
    retry: RetryConfigBuilder,
    invocation: InvocationConfigBuilder,
    security: SecurityConfigBuilder,
    near_caches: Vec<NearCacheConfig>,
}

impl ClientConfigBuilder {
    /// Creates a new client configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cluster name.
    pub fn cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = Some(name.into());
        self
    }

    /// Configures network settings using a builder function.
    pub fn network<F>(mut self, f: F) -> Self
    where
        F: FnOnce(NetworkConfigBuilder) -> NetworkConfigBuilder,
    {
        self.network = f(self.network);
        self
    }

    /// Configures reconnection settings using a builder function.
    pub fn retry<F>(mut self, f: F) -> Self
    where
        F: FnOnce(RetryConfigBuilder) -> RetryConfigBuilder,
    {
        self.retry = f(self.retry);
        self
    }

    /// Configures invocation settings using a builder function.
    pub fn invocation<F>(mut self, f: F) -> Self
    where
        F: FnOnce(InvocationConfigBuilder) -> InvocationConfigBuilder,
    {
        self.invocation = f(self.invocation);
        self
    }

    /// Configures security settings using a builder function.
    pub fn security<F>(mut self, f: F) -> Self
    where
        F: FnOnce(SecurityConfigBuilder) -> SecurityConfigBuilder,
    {
        self.security = f(self.security);
        self
    }

    /// Adds a cluster member address.
    pub fn add_address(mut self, address: SocketAddr) -> Self {
        self.network = self.network.add_address(address);
        self
    }

    /// Sets the cluster member addresses.
    pub fn addresses(mut self, addresses: impl IntoIterator<Item = SocketAddr>) -> Self {
        self.network = self.network.addresses(addresses);
        self
    }

    /// Sets the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.network = self.network.connection_timeout(timeout);
        self
    }

    /// Sets the invocation timeout.
    pub fn invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation = self.invocation.timeout(timeout);
        self
    }

    /// Sets credentials for authentication.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.security = self.security.credentials(username, password);
        self
    }

    /// Adds a near-cache configuration.
    ///
    /// Multiple configurations can be added, each matching a map name or a
    /// wildcard pattern.
    pub fn add_near_cache_config(mut self, config: NearCacheConfig) -> Self {
        self.near_caches.push(config);
        self
    }

    /// Builds the client configuration, returning an error if validation fails.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let cluster_name = self
            .cluster_name
            .unwrap_or_else(|| DEFAULT_CLUSTER_NAME.to_string());

        if cluster_name.is_empty() {
            return Err(ConfigError::new("cluster_name must not be empty"));
        }

        let mut seen = std::collections::HashSet::new();
        for near_cache in &self.near_caches {
            if !seen.insert(near_cache.name()) {
                return Err(ConfigError::new(format!(
                    "duplicate near-cache configuration for '{}'",
                    near_cache.name()
                )));
            }
        }

        Ok(ClientConfig {
            cluster_name,
            network: self.network.build()?,
            retry: self.retry.build()?,
            invocation: self.invocation.build()?,
            security: self.security.build()?,
            near_caches: self.near_caches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_client_config() {
        let config = ClientConfig::default();
        assert_eq!(config.cluster_name(), "dev");
        assert_eq!(config.network().addresses().len(), 1);
        assert_eq!(
            config.network().addresses()[0],
            DEFAULT_ADDRESS.parse::<SocketAddr>().unwrap()
        );
        assert!(config.network().smart_routing());
        assert_eq!(config.invocation().timeout(), Duration::from_secs(120));
        assert!(!config.invocation().redo_operation());
    }

    #[test]
    fn test_builder_matches_default() {
        let built = ClientConfig::builder().build().unwrap();
        let default = ClientConfig::default();
        assert_eq!(built.cluster_name(), default.cluster_name());
        assert_eq!(built.network().addresses(), default.network().addresses());
        assert_eq!(
            built.retry().cluster_connect_timeout(),
            default.retry().cluster_connect_timeout()
        );
    }

    #[test]
    fn test_builder_empty_cluster_name_fails() {
        let result = ClientConfig::builder().cluster_name("").build();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cluster_name must not be empty"));
    }

    #[test]
    fn test_builder_addresses_replaces() {
        let addr1: SocketAddr = "192.168.1.1:5701".parse().unwrap();
        let addr2: SocketAddr = "192.168.1.2:5701".parse().unwrap();

        let config = ClientConfig::builder()
            .add_address("10.0.0.1:5701".parse().unwrap())
            .addresses([addr1, addr2])
            .build()
            .unwrap();

        assert_eq!(config.network().addresses(), &[addr1, addr2]);
    }

    #[test]
    fn test_builder_credentials() {
        let config = ClientConfig::builder()
            .credentials("admin", "secret123")
            .build()
            .unwrap();

        assert_eq!(config.security().username(), Some("admin"));
        assert_eq!(config.security().password(), Some("secret123"));
        assert!(config.security().has_credentials());
    }

    #[test]
    fn test_security_partial_credentials_fails() {
        let result = SecurityConfigBuilder::new().username("admin").build();
        assert!(result.unwrap_err().to_string().contains("both username and password"));
    }

    #[test]
    fn test_network_config_builder() {
        let addr: SocketAddr = "10.0.0.1:5701".parse().unwrap();
        let config = NetworkConfigBuilder::new()
            .add_address(addr)
            .connection_timeout(Duration::from_secs(15))
            .heartbeat_interval(Duration::from_secs(10))
            .heartbeat_timeout(Duration::from_secs(30))
            .smart_routing(false)
            .max_fragment_size(4096)
            .build()
            .unwrap();

        assert_eq!(config.addresses(), &[addr]);
        assert_eq!(config.connection_timeout(), Duration::from_secs(15));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(10));
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(30));
        assert!(!config.smart_routing());
        assert_eq!(config.max_fragment_size(), Some(4096));
    }

    #[test]
    fn test_heartbeat_timeout_must_exceed_interval() {
        let result = NetworkConfigBuilder::new()
            .heartbeat_interval(Duration::from_secs(10))
            .heartbeat_timeout(Duration::from_secs(10))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_tiny_fragment_size_fails() {
        assert!(NetworkConfigBuilder::new().max_fragment_size(10).build().is_err());
    }

    #[test]
    fn test_retry_config_builder() {
        let config = RetryConfigBuilder::new()
            .initial_backoff(Duration::from_millis(200))
            .max_backoff(Duration::from_secs(60))
            .multiplier(1.5)
            .jitter(0.2)
            .cluster_connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        assert_eq!(config.initial_backoff(), Duration::from_millis(200));
        assert_eq!(config.max_backoff(), Duration::from_secs(60));
        assert_eq!(config.multiplier(), 1.5);
        assert_eq!(config.jitter(), 0.2);
        assert_eq!(config.cluster_connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_retry_validation() {
        assert!(RetryConfigBuilder::new()
            .initial_backoff(Duration::from_secs(60))
            .max_backoff(Duration::from_secs(1))
            .build()
            .is_err());
        assert!(RetryConfigBuilder::new().multiplier(0.5).build().is_err());
        assert!(RetryConfigBuilder::new().jitter(1.5).build().is_err());
    }

    #[test]
    fn test_retry_config_round_trips_through_builder() {
        let config = RetryConfigBuilder::new().jitter(0.3).build().unwrap();
        let rebuilt = RetryConfigBuilder::from(config.clone()).build().unwrap();
        assert_eq!(rebuilt.jitter(), config.jitter());
        assert_eq!(rebuilt.max_backoff(), config.max_backoff());
    }

    #[test]
    fn test_invocation_config_builder() {
        let config = ClientConfig::builder()
            .invocation(|i| {
                i.timeout(Duration::from_secs(3))
                    .retry_pause(Duration::from_millis(50))
                    .redo_operation(true)
            })
            .build()
            .unwrap();

        assert_eq!(config.invocation().timeout(), Duration::from_secs(3));
        assert_eq!(config.invocation().retry_pause(), Duration::from_millis(50));
        assert!(config.invocation().redo_operation());
    }

    #[test]
    fn test_zero_invocation_timeout_fails() {
        assert!(ClientConfig::builder()
            .invocation_timeout(Duration::ZERO)
            .build()
            .is_err());
    }

    #[test]
    fn test_find_near_cache_prefers_exact_match() {
        let config = ClientConfig::builder()
            .add_near_cache_config(NearCacheConfig::builder("user-*").max_size(10).build().unwrap())
            .add_near_cache_config(
                NearCacheConfig::builder("user-profile").max_size(20).build().unwrap(),
            )
            .build()
            .unwrap();

        assert_eq!(config.find_near_cache("user-profile").unwrap().max_size(), 20);
        assert_eq!(config.find_near_cache("user-settings").unwrap().max_size(), 10);
        assert!(config.find_near_cache("orders").is_none());
    }

    #[test]
    fn test_duplicate_near_cache_names_fail() {
        let result = ClientConfig::builder()
            .add_near_cache_config(NearCacheConfig::builder("m").build().unwrap())
            .add_near_cache_config(NearCacheConfig::builder("m").build().unwrap())
            .build();
        assert!(result.unwrap_err().to_string().contains("duplicate near-cache"));
    }

    #[test]
    fn test_config_error_converts_to_grid_error() {
        let err: gridlink_core::GridError = ConfigError::new("bad").into();
        assert!(matches!(err, gridlink_core::GridError::Configuration(ref m) if m == "bad"));
    }

    #[test]
    fn test_config_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ClientConfig>();
        assert_send_sync::<ClientConfigBuilder>();
    }
}
