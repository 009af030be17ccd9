//! Keeps near caches consistent with the cluster.
//!
//! Invalidation events are applied as they arrive. Because events may be
//! lost, the invalidation state of every partition is also fetched from the
//! members periodically and compared with what the near cache has seen.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use gridlink_core::protocol::{ClientMessage, PARTITION_ID_ANY};
use gridlink_core::{Data, Result};
use tokio::sync::watch;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::NearCache;
use crate::cluster::PartitionService;
use crate::codec::map::{add_near_cache_invalidation_listener, fetch_near_cache_invalidation_metadata, remove_entry_listener};
use crate::connection::ConnectionManager;
use crate::invocation::{InvocationService, InvocationTarget};
use crate::listener::{EventHandler, ListenerMessageCodec};

use add_near_cache_invalidation_listener::{Invalidation, INVALIDATION_LISTENER_FLAGS};

/// Adds and removes the invalidation listener of one map.
#[derive(Debug, Clone)]
pub struct InvalidationListenerCodec {
    name: String,
}

impl InvalidationListenerCodec {
    /// Creates the codec for the named map.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ListenerMessageCodec for InvalidationListenerCodec {
    fn encode_add_request(&self, local_only: bool) -> ClientMessage {
        add_near_cache_invalidation_listener::encode_request(
            &self.name,
            INVALIDATION_LISTENER_FLAGS,
            local_only,
        )
    }

    fn decode_add_response(&self, response: &ClientMessage) -> Result<Uuid> {
        add_near_cache_invalidation_listener::decode_response(response)
    }

    fn encode_remove_request(&self, registration_id: Uuid) -> ClientMessage {
        remove_entry_listener::encode_request(&self.name, registration_id)
    }
}

/// Applies invalidation events to a near cache.
#[derive(Debug)]
pub struct InvalidationHandler {
    near_cache: Arc<NearCache>,
    partitions: Arc<PartitionService>,
    client_uuid: Uuid,
}

impl InvalidationHandler {
    /// Creates a handler for `near_cache`. Events caused by `client_uuid`
    /// only advance sequences, the client has already invalidated the key.
    pub fn new(near_cache: Arc<NearCache>, partitions: Arc<PartitionService>, client_uuid: Uuid) -> Self {
        Self {
            near_cache,
            partitions,
            client_uuid,
        }
    }

    fn apply(&self, invalidation: Invalidation) {
        let partition_id = match &invalidation.key {
            Some(key) => self.partitions.partition_id(key),
            // Map-wide invalidations are sequenced on the partition of the map name.
            None => Data::of(self.near_cache.name())
                .map(|name| self.partitions.partition_id(&name))
                .unwrap_or(PARTITION_ID_ANY),
        };

        if partition_id == PARTITION_ID_ANY {
            self.near_cache.clear();
            return;
        }

        if invalidation.source_uuid == Some(self.client_uuid) {
            self.near_cache.apply_local_invalidation(
                partition_id,
                invalidation.partition_uuid,
                invalidation.sequence,
            );
        } else {
            self.near_cache.apply_invalidation(
                invalidation.key.as_ref(),
                partition_id,
                invalidation.partition_uuid,
                invalidation.sequence,
            );
        }
    }
}

impl EventHandler for InvalidationHandler {
    fn handle(&self, event: ClientMessage) {
        match add_near_cache_invalidation_listener::decode_event(&event) {
            Ok(invalidations) => {
                for invalidation in invalidations {
                    self.apply(invalidation);
                }
            }
            Err(e) => {
                warn!(map = %self.near_cache.name(), error = %e, "undecodable invalidation event, clearing near cache");
                self.near_cache.clear();
            }
        }
    }
}

/// Fetches invalidation metadata from every member and applies it to near caches.
#[derive(Debug)]
pub struct RepairingTask {
    connections: Arc<ConnectionManager>,
    invocations: Arc<InvocationService>,
}

impl RepairingTask {
    /// Creates a repairing task using the client's connections.
    pub fn new(connections: Arc<ConnectionManager>, invocations: Arc<InvocationService>) -> Self {
        Self {
            connections,
            invocations,
        }
    }

    /// Fetches the invalidation state of every partition from every
    /// connected member and applies it to `near_cache`.
    ///
    /// A member that cannot be reached is skipped; its partitions are
    /// checked on the next run.
    #[instrument(name = "near_cache.fetch_metadata", skip_all, fields(map = %near_cache.name()))]
    pub async fn fetch_metadata(&self, near_cache: &NearCache) {
        let names = vec![near_cache.name().to_string()];
        for connection in self.connections.connections() {
            let Some(member_uuid) = connection.member_uuid() else {
                continue;
            };
            let request = fetch_near_cache_invalidation_metadata::encode_request(&names, member_uuid);
            let result = self
                .invocations
                .invoke(request, InvocationTarget::Connection(Arc::clone(&connection)))
                .await
                .and_then(|response| fetch_near_cache_invalidation_metadata::decode_response(&response));

            match result {
                Ok(metadata) => apply_metadata(near_cache, &metadata),
                Err(e) => debug!(member = %member_uuid, error = %e, "failed to fetch invalidation metadata"),
            }
        }
    }

    /// Runs [`fetch_metadata`](Self::fetch_metadata) every `interval` until
    /// `shutdown` fires or the near cache is dropped.
    pub fn spawn(
        self: Arc<Self>,
        near_cache: Weak<NearCache>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        if interval.is_zero() {
            return;
        }
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(near_cache) = near_cache.upgrade() else { break };
                        self.fetch_metadata(&near_cache).await;
                    }
                    result = shutdown.changed() => {
                        if result.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("near cache repairing task stopped");
        });
    }
}

fn apply_metadata(near_cache: &NearCache, metadata: &fetch_near_cache_invalidation_metadata::Response) {
    let uuids: HashMap<i32, Uuid> = metadata.partition_uuids.iter().copied().collect();
    for (name, sequences) in &metadata.name_partition_sequences {
        if name != near_cache.name() {
            continue;
        }
        for (partition_id, sequence) in sequences {
            if let Some(uuid) = uuids.get(partition_id) {
                near_cache.apply_metadata(*partition_id, *uuid, *sequence);
            }
        }
    }
}
