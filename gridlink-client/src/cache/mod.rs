//! Near-cache configuration and implementation for client-side caching.

mod metadata;
mod near_cache;
mod repairing;

pub use metadata::{MetaDataContainer, PartitionMetadata, SequenceCheck};
pub use near_cache::{CachedValue, NearCache, NearCacheStats, ReservationId};
pub use repairing::{InvalidationHandler, InvalidationListenerCodec, RepairingTask};

use std::time::Duration;

use crate::config::ConfigError;

/// Default time-to-live for near-cache entries (0 = infinite).
pub const DEFAULT_TTL: Duration = Duration::ZERO;
/// Default max idle time for near-cache entries (0 = infinite).
pub const DEFAULT_MAX_IDLE: Duration = Duration::ZERO;
/// Default maximum size of the near-cache.
pub const DEFAULT_MAX_SIZE: u32 = 10_000;
/// Default interval between invalidation metadata reconciliations.
pub const DEFAULT_RECONCILIATION_INTERVAL: Duration = Duration::from_secs(60);

/// Eviction policy for near-cache when max size is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Least Recently Used - evicts entries that haven't been accessed recently.
    #[default]
    Lru,
    /// Least Frequently Used - evicts entries with the lowest access count.
    Lfu,
    /// Random - evicts entries randomly.
    Random,
    /// None - no eviction; new entries are rejected when cache is full.
    None,
}

/// Configuration for a near-cache associated with a distributed map.
///
/// Near-caches keep recently read entries on the client and are kept
/// coherent with the cluster through invalidation events.
#[derive(Debug, Clone)]
pub struct NearCacheConfig {
    name: String,
    time_to_live: Duration,
    max_idle: Duration,
    max_size: u32,
    eviction_policy: EvictionPolicy,
    invalidate_on_change: bool,
    reconciliation_interval: Duration,
}

impl NearCacheConfig {
    /// Creates a new near-cache configuration builder.
    pub fn builder(name: impl Into<String>) -> NearCacheConfigBuilder {
        NearCacheConfigBuilder::new(name)
    }

    /// Returns the name pattern for this near-cache.
    ///
    /// The name can be an exact map name or a wildcard pattern (e.g., "user-*").
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the time-to-live duration for cached entries.
    ///
    /// A value of `Duration::ZERO` means entries never expire based on time.
    pub fn time_to_live(&self) -> Duration {
        self.time_to_live
    }

    /// Returns the maximum idle time for cached entries.
    ///
    /// A value of `Duration::ZERO` means entries never expire based on idle time.
    pub fn max_idle(&self) -> Duration {
        self.max_idle
    }

    /// Returns the maximum number of entries in the near-cache.
    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    /// Returns the eviction policy used when the cache is full.
    pub fn eviction_policy(&self) -> EvictionPolicy {
        self.eviction_policy
    }

    /// Returns whether the near-cache listens for invalidation events.
    pub fn invalidate_on_change(&self) -> bool {
        self.invalidate_on_change
    }

    /// Returns how often invalidation metadata is fetched from the cluster.
    ///
    /// `Duration::ZERO` fetches it only once, when the near cache is created.
    pub fn reconciliation_interval(&self) -> Duration {
        self.reconciliation_interval
    }

    /// Checks if this configuration matches the given map name.
    ///
    /// Supports exact matches and a single `*` wildcard anywhere in the name.
    pub fn matches(&self, map_name: &str) -> bool {
        match self.name.split_once('*') {
            Some((prefix, suffix)) => {
                map_name.len() >= prefix.len() + suffix.len()
                    && map_name.starts_with(prefix)
                    && map_name.ends_with(suffix)
            }
            None => self.name == map_name,
        }
    }
}

/// Builder for `NearCacheConfig`.
#[derive(Debug, Clone)]
pub struct NearCacheConfigBuilder {
    name: String,
    time_to_live: Option<Duration>,
    max_idle: Option<Duration>,
    max_size: Option<u32>,
    eviction_policy: Option<EvictionPolicy>,
    invalidate_on_change: Option<bool>,
    reconciliation_interval: Option<Duration>,
}

impl NearCacheConfigBuilder {
    /// Creates a new near-cache configuration builder with the given name pattern.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            time_to_live: None,
            max_idle: None,
            max_size: None,
            eviction_policy: None,
            invalidate_on_change: None,
            reconciliation_interval: None,
        }
    }

    /// Sets the time-to-live duration for cached entries.
    pub fn time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    /// Sets the maximum idle time for cached entries.
    pub fn max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = Some(max_idle);
        self
    }

    /// Sets the maximum number of entries in the near-cache.
    pub fn max_size(mut self, max_size: u32) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Sets the eviction policy.
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = Some(policy);
        self
    }

    /// Sets whether the near-cache should be invalidated on remote changes.
    ///
    /// When enabled, the near-cache registers for cluster events and invalidates
    /// local entries when they are modified remotely.
    pub fn invalidate_on_change(mut self, invalidate: bool) -> Self {
        self.invalidate_on_change = Some(invalidate);
        self
    }

    /// Sets how often invalidation metadata is fetched from the cluster.
    pub fn reconciliation_interval(mut self, interval: Duration) -> Self {
        self.reconciliation_interval = Some(interval);
        self
    }

    /// Builds the near-cache configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - The name is empty
    /// - The name holds more than one `*`
    /// - `max_size` is zero
    pub fn build(self) -> Result<NearCacheConfig, ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::new("near-cache name must not be empty"));
        }

        if self.name.matches('*').count() > 1 {
            return Err(ConfigError::new(
                "near-cache name may contain at most one '*' wildcard",
            ));
        }

        let max_size = self.max_size.unwrap_or(DEFAULT_MAX_SIZE);
        if max_size == 0 {
            return Err(ConfigError::new("near-cache max_size must be greater than zero"));
        }

        Ok(NearCacheConfig {
            name: self.name,
            time_to_live: self.time_to_live.unwrap_or(DEFAULT_TTL),
            max_idle: self.max_idle.unwrap_or(DEFAULT_MAX_IDLE),
            max_size,
            eviction_policy: self.eviction_policy.unwrap_or_default(),
            invalidate_on_change: self.invalidate_on_change.unwrap_or(true),
            reconciliation_interval: self
                .reconciliation_interval
                .unwrap_or(DEFAULT_RECONCILIATION_INTERVAL),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_near_cache_config_defaults() {
        let config = NearCacheConfig::builder("test-map").build().unwrap();

        assert_eq!(config.name(), "test-map");
        assert_eq!(config.time_to_live(), Duration::ZERO);
        assert_eq!(config.max_idle(), Duration::ZERO);
        assert_eq!(config.max_size(), 10_000);
        assert_eq!(config.eviction_policy(), EvictionPolicy::Lru);
        assert!(config.invalidate_on_change());
        assert_eq!(config.reconciliation_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_near_cache_config_custom_values() {
        let config = NearCacheConfig::builder("user-cache")
            .time_to_live(Duration::from_secs(300))
            .max_idle(Duration::from_secs(60))
            .max_size(5000)
            .eviction_policy(EvictionPolicy::Lfu)
            .invalidate_on_change(false)
            .reconciliation_interval(Duration::ZERO)
            .build()
            .unwrap();

        assert_eq!(config.time_to_live(), Duration::from_secs(300));
        assert_eq!(config.max_idle(), Duration::from_secs(60));
        assert_eq!(config.max_size(), 5000);
        assert_eq!(config.eviction_policy(), EvictionPolicy::Lfu);
        assert!(!config.invalidate_on_change());
        assert_eq!(config.reconciliation_interval(), Duration::ZERO);
    }

    #[test]
    fn test_near_cache_config_empty_name_fails() {
        let result = NearCacheConfig::builder("").build();
        assert!(result.unwrap_err().to_string().contains("name must not be empty"));
    }

    #[test]
    fn test_near_cache_config_zero_max_size_fails() {
        let result = NearCacheConfig::builder("test").max_size(0).build();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("max_size must be greater than zero"));
    }

    #[test]
    fn test_two_wildcards_fail() {
        assert!(NearCacheConfig::builder("a*b*").build().is_err());
    }

    #[test]
    fn test_near_cache_config_exact_match() {
        let config = NearCacheConfig::builder("user-map").build().unwrap();

        assert!(config.matches("user-map"));
        assert!(!config.matches("user-map-backup"));
        assert!(!config.matches("other-map"));
    }

    #[test]
    fn test_near_cache_config_wildcard_match() {
        let config = NearCacheConfig::builder("user-*").build().unwrap();

        assert!(config.matches("user-"));
        assert!(config.matches("user-map"));
        assert!(config.matches("user-data-store"));
        assert!(!config.matches("other-map"));
        assert!(!config.matches("users"));
    }

    #[test]
    fn test_near_cache_config_inner_wildcard() {
        let config = NearCacheConfig::builder("ncc*map").build().unwrap();

        assert!(config.matches("ncc-map"));
        assert!(config.matches("nccmap"));
        assert!(!config.matches("ncc-cache"));
        assert!(!config.matches("nc"));
    }

    #[test]
    fn test_eviction_policy_default() {
        assert_eq!(EvictionPolicy::default(), EvictionPolicy::Lru);
    }

    #[test]
    fn test_near_cache_config_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NearCacheConfig>();
        assert_send_sync::<NearCacheConfigBuilder>();
        assert_send_sync::<EvictionPolicy>();
    }
}
