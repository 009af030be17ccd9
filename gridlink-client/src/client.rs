//! Client entry point.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use gridlink_core::{Deserializable, Result, Serializable};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::{InvalidationHandler, InvalidationListenerCodec, NearCache, RepairingTask};
use crate::cluster::{Member, MemberEvent, PartitionService};
use crate::config::ClientConfig;
use crate::connection::{AddressProvider, ConnectionEvent, ConnectionManager, StaticAddressProvider};
use crate::invocation::{CorrelationIdGenerator, InvocationService};
use crate::listener::{LifecycleEvent, ListenerService};
use crate::proxy::IMap;

/// Client-wide state shared by every service and proxy.
#[derive(Debug)]
pub(crate) struct ClientContext {
    config: Arc<ClientConfig>,
    partitions: Arc<PartitionService>,
    connections: Arc<ConnectionManager>,
    invocations: Arc<InvocationService>,
    listeners: Arc<ListenerService>,
    repairing: Arc<RepairingTask>,
    near_caches: Mutex<HashMap<String, Arc<NearCache>>>,
    lifecycle: broadcast::Sender<LifecycleEvent>,
    shutdown: watch::Sender<bool>,
}

impl ClientContext {
    fn new(config: ClientConfig, address_provider: Arc<dyn AddressProvider>) -> Arc<Self> {
        let config = Arc::new(config);
        let (lifecycle, _) = broadcast::channel(32);
        let (shutdown, _) = watch::channel(false);
        let partitions = Arc::new(PartitionService::new());
        let correlation_ids = Arc::new(CorrelationIdGenerator::new());

        let connections = ConnectionManager::new(
            Arc::clone(&config),
            address_provider,
            Arc::clone(&partitions),
            Arc::clone(&correlation_ids),
            lifecycle.clone(),
        );
        let invocations = InvocationService::new(
            Arc::clone(&connections),
            Arc::clone(&correlation_ids),
            config.invocation().clone(),
        );
        let listeners = ListenerService::new(
            Arc::clone(&connections),
            Arc::clone(&invocations),
            correlation_ids,
            config.invocation().timeout(),
        );
        let repairing = Arc::new(RepairingTask::new(
            Arc::clone(&connections),
            Arc::clone(&invocations),
        ));

        Arc::new(Self {
            config,
            partitions,
            connections,
            invocations,
            listeners,
            repairing,
            near_caches: Mutex::new(HashMap::new()),
            lifecycle,
            shutdown,
        })
    }

    async fn start(self: &Arc<Self>) -> Result<()> {
        let _ = self.lifecycle.send(LifecycleEvent::Starting);
        self.listeners.start();
        self.spawn_reconnect_watcher();
        self.spawn_topology_watcher();

        if let Err(e) = self.connections.start().await {
            error!(error = %e, "failed to connect to the cluster");
            self.shutdown().await;
            return Err(e);
        }

        let _ = self.lifecycle.send(LifecycleEvent::Started);
        Ok(())
    }

    /// Shuts the client down once the cluster stays unreachable for the
    /// whole cluster connect timeout.
    fn spawn_reconnect_watcher(self: &Arc<Self>) {
        let context: Weak<Self> = Arc::downgrade(self);
        let mut events = self.connections.subscribe();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    event = events.recv() => event,
                    _ = shutdown_rx.changed() => return,
                };
                match event {
                    Ok(ConnectionEvent::ReconnectFailed { error }) => {
                        warn!(error = %error, "cluster unreachable, shutting down the client");
                        if let Some(context) = context.upgrade() {
                            context.shutdown().await;
                        }
                        return;
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return,
                }
            }
        });
    }

    /// Drops near-cache contents while the cluster is unreachable.
    ///
    /// Invalidations published during the outage never reach this client, so
    /// every cache is emptied on disconnect and emptied again, with its
    /// metadata refetched, once the client is connected again.
    fn spawn_topology_watcher(self: &Arc<Self>) {
        let context: Weak<Self> = Arc::downgrade(self);
        let mut events = self.lifecycle.subscribe();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut disconnected = false;
            loop {
                let event = tokio::select! {
                    event = events.recv() => event,
                    _ = shutdown_rx.changed() => return,
                };
                let Some(context) = context.upgrade() else {
                    return;
                };
                match event {
                    Ok(LifecycleEvent::ClientDisconnected) => {
                        disconnected = true;
                        context.clear_near_caches().await;
                    }
                    Ok(LifecycleEvent::ClientConnected) if disconnected => {
                        disconnected = false;
                        context.resync_near_caches().await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "lifecycle events lagged, clearing near caches");
                        context.resync_near_caches().await;
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        });
    }

    async fn near_cache_snapshot(&self) -> Vec<Arc<NearCache>> {
        self.near_caches.lock().await.values().cloned().collect()
    }

    async fn clear_near_caches(&self) {
        for near_cache in self.near_cache_snapshot().await {
            debug!(map = %near_cache.name(), "cluster lost, clearing near cache");
            near_cache.clear();
        }
    }

    async fn resync_near_caches(&self) {
        for near_cache in self.near_cache_snapshot().await {
            near_cache.clear();
            if near_cache.config().invalidate_on_change() {
                self.repairing.fetch_metadata(&near_cache).await;
            }
        }
    }

    async fn near_cache(&self, name: &str) -> Result<Option<Arc<NearCache>>> {
        let Some(config) = self.config.find_near_cache(name) else {
            return Ok(None);
        };

        let mut near_caches = self.near_caches.lock().await;
        if let Some(existing) = near_caches.get(name) {
            return Ok(Some(Arc::clone(existing)));
        }

        let near_cache = Arc::new(NearCache::new(name, config.clone()));
        if config.invalidate_on_change() {
            let handler = InvalidationHandler::new(
                Arc::clone(&near_cache),
                Arc::clone(&self.partitions),
                self.connections.client_uuid(),
            );
            self.listeners
                .register(
                    Arc::new(InvalidationListenerCodec::new(name)),
                    Arc::new(handler),
                    false,
                )
                .await?;

            self.repairing.fetch_metadata(&near_cache).await;
            Arc::clone(&self.repairing).spawn(
                Arc::downgrade(&near_cache),
                config.reconciliation_interval(),
                self.shutdown.subscribe(),
            );
        }

        debug!(map = %name, "near cache created");
        near_caches.insert(name.to_string(), Arc::clone(&near_cache));
        Ok(Some(near_cache))
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn shutdown(&self) {
        if self.shutdown.send_replace(true) {
            return;
        }
        let _ = self.lifecycle.send(LifecycleEvent::ShuttingDown);

        self.listeners.shutdown().await;
        if let Err(e) = self.connections.shutdown().await {
            warn!(error = %e, "error while closing connections");
        }
        self.invocations.shutdown();
        for near_cache in self.near_caches.lock().await.drain().map(|(_, nc)| nc) {
            near_cache.clear();
        }

        info!(cluster = %self.config.cluster_name(), "client shut down");
        let _ = self.lifecycle.send(LifecycleEvent::Shutdown);
    }
}

/// The main entry point for connecting to a cluster.
///
/// `GridClient` manages connections to cluster members and provides
/// access to distributed maps.
///
/// # Example
///
/// ```ignore
/// use gridlink_client::{ClientConfig, GridClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = ClientConfig::builder()
///         .cluster_name("dev")
///         .build()?;
///
///     let client = GridClient::new(config).await?;
///     let map = client.get_map::<String, String>("my-map").await?;
///
///     map.put("key".to_string(), "value".to_string()).await?;
///     let value = map.get(&"key".to_string()).await?;
///
///     client.shutdown().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct GridClient {
    context: Arc<ClientContext>,
}

impl GridClient {
    /// Creates a new client and connects to the cluster.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No member can be reached within the cluster connect timeout
    /// - A member rejects the credentials
    pub async fn new(config: ClientConfig) -> Result<Self> {
        let provider = StaticAddressProvider::new(config.network().addresses().to_vec());
        Self::with_address_provider(config, Arc::new(provider)).await
    }

    /// Creates a new client discovering members through `address_provider`.
    pub async fn with_address_provider(
        config: ClientConfig,
        address_provider: Arc<dyn AddressProvider>,
    ) -> Result<Self> {
        let context = ClientContext::new(config, address_provider);
        context.start().await?;

        info!(
            cluster = %context.config.cluster_name(),
            client = %context.connections.client_uuid(),
            "connected to cluster"
        );
        Ok(Self { context })
    }

    /// Returns a distributed map proxy for the given name.
    ///
    /// If a near cache is configured for the name, it is created on first
    /// use and shared by every proxy of the map.
    pub async fn get_map<K, V>(&self, name: &str) -> Result<IMap<K, V>>
    where
        K: Serializable + Send + Sync,
        V: Serializable + Deserializable + Send + Sync,
    {
        let near_cache = self.context.near_cache(name).await?;
        Ok(IMap::new(
            name.to_string(),
            Arc::clone(&self.context.invocations),
            Arc::clone(&self.context.partitions),
            near_cache,
        ))
    }

    /// Returns the cluster name this client is connected to.
    pub fn cluster_name(&self) -> &str {
        self.context.config.cluster_name()
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.context.config
    }

    /// Returns the UUID identifying this client to the cluster.
    pub fn client_uuid(&self) -> Uuid {
        self.context.connections.client_uuid()
    }

    /// Returns the partition service.
    pub fn partition_service(&self) -> &Arc<PartitionService> {
        &self.context.partitions
    }

    /// Returns the invocation service.
    pub fn invocation_service(&self) -> &Arc<InvocationService> {
        &self.context.invocations
    }

    /// Returns the listener service.
    pub fn listener_service(&self) -> &Arc<ListenerService> {
        &self.context.listeners
    }

    /// Returns the connection manager.
    pub fn connection_manager(&self) -> &Arc<ConnectionManager> {
        &self.context.connections
    }

    /// Returns the number of active connections to cluster members.
    pub fn connection_count(&self) -> usize {
        self.context.connections.connection_count()
    }

    /// Returns the current list of known cluster members.
    ///
    /// This list is updated as members join or leave the cluster.
    pub fn members(&self) -> Vec<Member> {
        self.context.connections.members()
    }

    /// Returns the number of known cluster members.
    pub fn member_count(&self) -> usize {
        self.context.connections.member_count()
    }

    /// Subscribes to cluster membership events.
    pub fn subscribe_membership(&self) -> broadcast::Receiver<MemberEvent> {
        self.context.connections.subscribe_membership()
    }

    /// Subscribes to client lifecycle events.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.context.lifecycle.subscribe()
    }

    /// Subscribes to connection events.
    pub fn subscribe_connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.context.connections.subscribe()
    }

    /// Returns true until the client is shut down.
    pub fn is_running(&self) -> bool {
        !self.context.is_shutdown()
    }

    /// Shuts down the client.
    ///
    /// Listeners are deregistered, background tasks stopped and connections
    /// closed; invocations still outstanding fail with `ClientShutdown`.
    /// Calling it again has no effect.
    pub async fn shutdown(&self) -> Result<()> {
        self.context.shutdown().await;
        Ok(())
    }
}
