//! Distributed map proxy implementation.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use gridlink_core::protocol::ClientMessage;
use gridlink_core::{Data, Deserializable, GridError, Result, Serializable};

use crate::cache::{NearCache, NearCacheStats};
use crate::cluster::PartitionService;
use crate::codec::map;
use crate::invocation::{InvocationService, InvocationTarget};

/// Thread ID sent with keyed operations. The client takes no map locks, so
/// every operation runs as the same logical thread.
const THREAD_ID: i64 = 1;
/// TTL value asking the member to apply the map's configured expiry.
const DEFAULT_TTL: i64 = -1;

/// A distributed map proxy for performing key-value operations on the cluster.
///
/// `IMap` provides async operations with automatic serialization and
/// partition routing. When a near cache is configured for the map, reads
/// are served locally once cached and every mutation through this proxy
/// invalidates the local copy of the key.
pub struct IMap<K, V> {
    name: String,
    invocations: Arc<InvocationService>,
    partitions: Arc<PartitionService>,
    near_cache: Option<Arc<NearCache>>,
    _phantom: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Clone for IMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            invocations: Arc::clone(&self.invocations),
            partitions: Arc::clone(&self.partitions),
            near_cache: self.near_cache.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<K, V> fmt::Debug for IMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IMap")
            .field("name", &self.name)
            .field("near_cache", &self.near_cache.is_some())
            .finish()
    }
}

impl<K, V> IMap<K, V> {
    pub(crate) fn new(
        name: String,
        invocations: Arc<InvocationService>,
        partitions: Arc<PartitionService>,
        near_cache: Option<Arc<NearCache>>,
    ) -> Self {
        Self {
            name,
            invocations,
            partitions,
            near_cache,
            _phantom: PhantomData,
        }
    }

    /// Returns the name of this map.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the statistics of the map's near cache, if it has one.
    pub fn near_cache_stats(&self) -> Option<NearCacheStats> {
        self.near_cache.as_ref().map(|nc| nc.stats())
    }

    /// Returns the map's near cache, if it has one.
    pub fn near_cache(&self) -> Option<&Arc<NearCache>> {
        self.near_cache.as_ref()
    }
}

impl<K, V> IMap<K, V>
where
    K: Serializable + Send + Sync,
    V: Serializable + Deserializable + Send + Sync,
{
    /// Retrieves the value associated with the given key.
    ///
    /// Returns `None` if the key does not exist in the map.
    pub async fn get(&self, key: &K) -> Result<Option<V>> {
        let key = Data::of(key)?;
        let partition_id = self.partitions.partition_id(&key);

        let Some(near_cache) = &self.near_cache else {
            return to_value(self.get_remote(&key, partition_id).await?);
        };

        if let Some(cached) = near_cache.get(&key) {
            return to_value(cached.into_data());
        }

        let reservation = near_cache.reserve(&key, partition_id);
        match self.get_remote(&key, partition_id).await {
            Ok(value) => {
                near_cache.publish(&key, reservation, value.clone().into());
                to_value(value)
            }
            Err(e) => {
                near_cache.release(&key, reservation);
                Err(e)
            }
        }
    }

    async fn get_remote(&self, key: &Data, partition_id: i32) -> Result<Option<Data>> {
        let request = map::get::encode_request(&self.name, key, THREAD_ID);
        let response = self.invoke(request, partition_id).await?;
        map::get::decode_response(&response)
    }

    /// Retrieves the values of several keys.
    ///
    /// Keys cached in the near cache are answered locally; the rest are read
    /// with one request per owning partition. Keys without a value are left
    /// out of the result.
    pub async fn get_all(&self, keys: &[K]) -> Result<HashMap<K, V>>
    where
        K: Clone + Eq + Hash,
    {
        let mut result = HashMap::with_capacity(keys.len());
        let mut by_partition: HashMap<i32, Vec<(Data, &K)>> = HashMap::new();

        for key in keys {
            let data = Data::of(key)?;
            if let Some(cached) = self.near_cache.as_ref().and_then(|nc| nc.get(&data)) {
                if let Some(value) = cached.into_data() {
                    result.insert(key.clone(), value.to_value()?);
                }
                continue;
            }
            by_partition
                .entry(self.partitions.partition_id(&data))
                .or_default()
                .push((data, key));
        }

        let fetches = by_partition.into_iter().map(|(partition_id, entries)| async move {
            let data: Vec<Data> = entries.iter().map(|(data, _)| data.clone()).collect();
            let values = self.get_all_remote(partition_id, data).await?;
            Ok::<_, GridError>(entries.into_iter().map(|(_, key)| key).zip(values))
        });
        for fetched in join_all(fetches).await {
            for (key, value) in fetched? {
                if let Some(value) = value {
                    result.insert(key.clone(), value.to_value()?);
                }
            }
        }
        Ok(result)
    }

    /// Reads `keys` of one partition, returning their values in key order.
    async fn get_all_remote(&self, partition_id: i32, keys: Vec<Data>) -> Result<Vec<Option<Data>>> {
        let reservations: Vec<_> = keys
            .iter()
            .map(|key| self.near_cache.as_ref().map(|nc| nc.reserve(key, partition_id)))
            .collect();

        let request = map::get_all::encode_request(&self.name, &keys);
        let response = self
            .invoke(request, partition_id)
            .await
            .and_then(|response| map::get_all::decode_response(&response));
        let mut found: HashMap<Data, Data> = match response {
            Ok(entries) => entries.into_iter().collect(),
            Err(e) => {
                if let Some(near_cache) = &self.near_cache {
                    for (key, reservation) in keys.iter().zip(reservations.into_iter().flatten()) {
                        near_cache.release(key, reservation);
                    }
                }
                return Err(e);
            }
        };

        Ok(keys
            .iter()
            .zip(reservations)
            .map(|(key, reservation)| {
                let value = found.remove(key);
                if let (Some(near_cache), Some(reservation)) = (&self.near_cache, reservation) {
                    near_cache.publish(key, reservation, value.clone().into());
                }
                value
            })
            .collect())
    }

    /// Associates the specified value with the specified key.
    ///
    /// Returns the previous value associated with the key, or `None` if there was no mapping.
    pub async fn put(&self, key: K, value: V) -> Result<Option<V>> {
        self.put_with_ttl_millis(&key, &value, DEFAULT_TTL).await
    }

    /// Like [`put`](Self::put), with the entry expiring after `ttl`.
    pub async fn put_with_ttl(&self, key: K, value: V, ttl: Duration) -> Result<Option<V>> {
        self.put_with_ttl_millis(&key, &value, ttl_millis(ttl)).await
    }

    async fn put_with_ttl_millis(&self, key: &K, value: &V, ttl: i64) -> Result<Option<V>> {
        let key = Data::of(key)?;
        let value = Data::of(value)?;
        let request = map::put::encode_request(&self.name, &key, &value, THREAD_ID, ttl);
        let response = self.invoke_keyed(&key, request).await?;
        to_value(map::put::decode_response(&response)?)
    }

    /// Associates the value with the key without returning the previous value.
    pub async fn set(&self, key: K, value: V) -> Result<()> {
        let key = Data::of(&key)?;
        let value = Data::of(&value)?;
        let request = map::set::encode_request(&self.name, &key, &value, THREAD_ID, DEFAULT_TTL);
        let response = self.invoke_keyed(&key, request).await?;
        map::set::decode_response(&response)
    }

    /// Stores every entry, one request per owning partition.
    ///
    /// The member loads missing keys from its backing store first so it can
    /// report the replaced values; use [`set_all`](Self::set_all) to skip that.
    pub async fn put_all(&self, entries: HashMap<K, V>) -> Result<()> {
        self.put_all_with(entries, true).await
    }

    /// Like [`put_all`](Self::put_all), without loading replaced values.
    pub async fn set_all(&self, entries: HashMap<K, V>) -> Result<()> {
        self.put_all_with(entries, false).await
    }

    async fn put_all_with(&self, entries: HashMap<K, V>, trigger_map_loader: bool) -> Result<()> {
        let mut by_partition: HashMap<i32, Vec<(Data, Data)>> = HashMap::new();
        for (key, value) in &entries {
            let key = Data::of(key)?;
            let value = Data::of(value)?;
            by_partition
                .entry(self.partitions.partition_id(&key))
                .or_default()
                .push((key, value));
        }

        // Every batch runs to completion so each one invalidates its keys.
        let writes = by_partition.into_iter().map(|(partition_id, batch)| async move {
            let keys: Vec<Data> = batch.iter().map(|(key, _)| key.clone()).collect();
            let request = map::put_all::encode_request(&self.name, &batch, trigger_map_loader);
            let response = self.invoke_keys(partition_id, &keys, request).await?;
            map::put_all::decode_response(&response)
        });
        join_all(writes).await.into_iter().collect()
    }

    /// Stores the value unless the key stays locked by another owner for
    /// longer than `timeout`.
    ///
    /// Returns true if the value was stored.
    pub async fn try_put(&self, key: K, value: V, timeout: Duration) -> Result<bool> {
        let key = Data::of(&key)?;
        let value = Data::of(&value)?;
        let request = map::try_put::encode_request(&self.name, &key, &value, THREAD_ID, ttl_millis(timeout));
        let response = self.invoke_keyed(&key, request).await?;
        map::try_put::decode_response(&response)
    }

    /// Stores the value without writing it to the member's backing store.
    /// The entry expires after `ttl`, or never if `ttl` is `None`.
    pub async fn put_transient(&self, key: K, value: V, ttl: Option<Duration>) -> Result<()> {
        let key = Data::of(&key)?;
        let value = Data::of(&value)?;
        let ttl = ttl.map_or(DEFAULT_TTL, ttl_millis);
        let request = map::put_transient::encode_request(&self.name, &key, &value, THREAD_ID, ttl);
        let response = self.invoke_keyed(&key, request).await?;
        map::put_transient::decode_response(&response)
    }

    /// Associates the value with the key only if the key has no value.
    ///
    /// Returns the existing value, or `None` if the value was stored.
    pub async fn put_if_absent(&self, key: K, value: V) -> Result<Option<V>> {
        let key = Data::of(&key)?;
        let value = Data::of(&value)?;
        let request = map::put_if_absent::encode_request(&self.name, &key, &value, THREAD_ID, DEFAULT_TTL);
        let response = self.invoke_keyed(&key, request).await?;
        to_value(map::put_if_absent::decode_response(&response)?)
    }

    /// Replaces the value of the key only if it currently has one.
    ///
    /// Returns the previous value, or `None` if nothing was replaced.
    pub async fn replace(&self, key: K, value: V) -> Result<Option<V>> {
        let key = Data::of(&key)?;
        let value = Data::of(&value)?;
        let request = map::replace::encode_request(&self.name, &key, &value, THREAD_ID);
        let response = self.invoke_keyed(&key, request).await?;
        to_value(map::replace::decode_response(&response)?)
    }

    /// Replaces the value of the key only if it currently maps to `old_value`.
    ///
    /// Returns true if the value was replaced.
    pub async fn replace_if_same(&self, key: &K, old_value: &V, new_value: V) -> Result<bool> {
        let key = Data::of(key)?;
        let old_value = Data::of(old_value)?;
        let new_value = Data::of(&new_value)?;
        let request = map::replace_if_same::encode_request(&self.name, &key, &old_value, &new_value, THREAD_ID);
        let response = self.invoke_keyed(&key, request).await?;
        map::replace_if_same::decode_response(&response)
    }

    /// Removes the mapping for a key from this map if it is present.
    ///
    /// Returns the previous value associated with the key, or `None` if there was no mapping.
    pub async fn remove(&self, key: &K) -> Result<Option<V>> {
        let key = Data::of(key)?;
        let request = map::remove::encode_request(&self.name, &key, THREAD_ID);
        let response = self.invoke_keyed(&key, request).await?;
        to_value(map::remove::decode_response(&response)?)
    }

    /// Removes the key unless it stays locked by another owner for longer
    /// than `timeout`.
    ///
    /// Returns true if the key was removed.
    pub async fn try_remove(&self, key: &K, timeout: Duration) -> Result<bool> {
        let key = Data::of(key)?;
        let request = map::try_remove::encode_request(&self.name, &key, THREAD_ID, ttl_millis(timeout));
        let response = self.invoke_keyed(&key, request).await?;
        map::try_remove::decode_response(&response)
    }

    /// Removes the mapping for a key without returning the previous value.
    pub async fn delete(&self, key: &K) -> Result<()> {
        let key = Data::of(key)?;
        let request = map::delete::encode_request(&self.name, &key, THREAD_ID);
        let response = self.invoke_keyed(&key, request).await?;
        map::delete::decode_response(&response)
    }

    /// Returns `true` if this map contains a mapping for the specified key.
    ///
    /// A key cached in the near cache is answered locally.
    pub async fn contains_key(&self, key: &K) -> Result<bool> {
        let key = Data::of(key)?;
        if let Some(cached) = self.near_cache.as_ref().and_then(|nc| nc.get(&key)) {
            return Ok(cached.is_present());
        }

        let request = map::contains_key::encode_request(&self.name, &key, THREAD_ID);
        let response = self.invoke(request, self.partitions.partition_id(&key)).await?;
        map::contains_key::decode_response(&response)
    }

    /// Evicts the key from the member's memory without deleting it from
    /// any backing store.
    ///
    /// Returns true if the key was evicted.
    pub async fn evict(&self, key: &K) -> Result<bool> {
        let key = Data::of(key)?;
        let request = map::evict::encode_request(&self.name, &key, THREAD_ID);
        let response = self.invoke_keyed(&key, request).await?;
        map::evict::decode_response(&response)
    }

    /// Evicts every key of the map.
    pub async fn evict_all(&self) -> Result<()> {
        let request = map::evict_all::encode_request(&self.name);
        let result = self.invocations.invoke(request, InvocationTarget::Any).await;
        self.clear_near_cache();
        map::evict_all::decode_response(&result?)
    }

    /// Returns the number of key-value mappings in this map.
    pub async fn size(&self) -> Result<usize> {
        let request = map::size::encode_request(&self.name);
        let response = self.invocations.invoke(request, InvocationTarget::Any).await?;
        Ok(map::size::decode_response(&response)?.max(0) as usize)
    }

    /// Removes all entries from this map.
    pub async fn clear(&self) -> Result<()> {
        let request = map::clear::encode_request(&self.name);
        let result = self.invocations.invoke(request, InvocationTarget::Any).await;
        self.clear_near_cache();
        map::clear::decode_response(&result?)
    }

    async fn invoke(&self, request: ClientMessage, partition_id: i32) -> Result<ClientMessage> {
        self.invocations.invoke_on_partition(request, partition_id).await
    }

    /// Invokes a mutation of `key` and invalidates the key's near-cache
    /// entry once the member answered, successfully or not.
    async fn invoke_keyed(&self, key: &Data, request: ClientMessage) -> Result<ClientMessage> {
        let partition_id = self.partitions.partition_id(key);
        self.invoke_keys(partition_id, std::slice::from_ref(key), request).await
    }

    /// Invokes a mutation of several keys of one partition, invalidating
    /// each of them once the member answered.
    async fn invoke_keys(&self, partition_id: i32, keys: &[Data], request: ClientMessage) -> Result<ClientMessage> {
        let result = self.invoke(request, partition_id).await;
        if let Some(near_cache) = &self.near_cache {
            for key in keys {
                near_cache.invalidate(key);
            }
        }
        result
    }

    fn clear_near_cache(&self) {
        if let Some(near_cache) = &self.near_cache {
            near_cache.clear();
        }
    }
}

fn to_value<T: Deserializable>(data: Option<Data>) -> Result<Option<T>> {
    data.map(|data| data.to_value()).transpose()
}

fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)
}
