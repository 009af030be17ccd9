//! Connection pool management and lifecycle handling.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use rand::Rng;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, timeout, Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use gridlink_core::error::error_codes;
use gridlink_core::protocol::ClientMessage;
use gridlink_core::{GridError, Result};

use super::address::AddressProvider;
use super::connection::{Connection, ConnectionId, ConnectionOptions};
use crate::cluster::{Member, MemberEvent, MemberEventType, MemberList, PartitionService, PartitionTable};
use crate::codec::client::add_cluster_view_listener::{self, ClusterViewEvent};
use crate::codec::client::{authentication, ping, AuthenticationStatus};
use crate::codec::error as error_codec;
use crate::config::ClientConfig;
use crate::invocation::{CorrelationIdGenerator, InvocationTarget};
use crate::listener::LifecycleEvent;

const CLIENT_TYPE: &str = "RST";
const CLIENT_NAME: &str = "gridlink-client";
const SERIALIZATION_VERSION: u8 = 1;

/// Events emitted during connection lifecycle.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Successfully connected and authenticated to a cluster member.
    Connected {
        /// The connection identifier.
        id: ConnectionId,
        /// The address of the connected member.
        address: SocketAddr,
        /// The UUID of the connected member.
        member_uuid: Uuid,
    },
    /// Disconnected from a cluster member.
    Disconnected {
        /// The connection identifier.
        id: ConnectionId,
        /// The address of the disconnected member.
        address: SocketAddr,
        /// The UUID of the member, if it had authenticated.
        member_uuid: Option<Uuid>,
        /// Why the connection was closed, if known.
        error: Option<String>,
    },
    /// A round over every candidate address failed; another follows after `next_delay`.
    ReconnectAttempt {
        /// The number of the round that failed.
        attempt: u32,
        /// The delay before the next round.
        next_delay: Duration,
    },
    /// The cluster could not be reached before the cluster connect timeout.
    ReconnectFailed {
        /// Description of the failure.
        error: String,
    },
}

/// Manages connections to cluster members.
///
/// Connections are keyed by member UUID. One of them also carries the
/// cluster view listener that feeds the member list and the partition
/// table; when it closes the listener moves to another connection.
#[derive(Debug)]
pub struct ConnectionManager {
    config: Arc<ClientConfig>,
    client_uuid: Uuid,
    address_provider: Arc<dyn AddressProvider>,
    partition_service: Arc<PartitionService>,
    correlation_ids: Arc<CorrelationIdGenerator>,
    connections: RwLock<HashMap<Uuid, Arc<Connection>>>,
    members: RwLock<MemberList>,
    cluster_view_connection: Mutex<Option<ConnectionId>>,
    cluster_id: Mutex<Option<Uuid>>,
    reconnecting: AtomicBool,
    event_sender: broadcast::Sender<ConnectionEvent>,
    membership_sender: broadcast::Sender<MemberEvent>,
    lifecycle_sender: broadcast::Sender<LifecycleEvent>,
    shutdown: watch::Sender<bool>,
    self_ref: Weak<ConnectionManager>,
}

/// Calculates the next backoff duration with jitter applied.
fn calculate_backoff_with_jitter(
    current_backoff: Duration,
    multiplier: f64,
    max_backoff: Duration,
    jitter: f64,
) -> Duration {
    let base_backoff = current_backoff.as_secs_f64() * multiplier;

    let jitter_factor = if jitter > 0.0 {
        let mut rng = rand::thread_rng();
        1.0 + rng.gen_range(-jitter..=jitter)
    } else {
        1.0
    };

    let jittered_backoff = base_backoff * jitter_factor;

    std::cmp::min(Duration::from_secs_f64(jittered_backoff), max_backoff)
}

impl ConnectionManager {
    /// Creates a new connection manager.
    pub fn new(
        config: Arc<ClientConfig>,
        address_provider: Arc<dyn AddressProvider>,
        partition_service: Arc<PartitionService>,
        correlation_ids: Arc<CorrelationIdGenerator>,
        lifecycle_sender: broadcast::Sender<LifecycleEvent>,
    ) -> Arc<Self> {
        let (event_sender, _) = broadcast::channel(64);
        let (membership_sender, _) = broadcast::channel(64);
        let (shutdown, _) = watch::channel(false);

        Arc::new_cyclic(|self_ref| Self {
            config,
            client_uuid: Uuid::new_v4(),
            address_provider,
            partition_service,
            correlation_ids,
            connections: RwLock::new(HashMap::new()),
            members: RwLock::new(MemberList::default()),
            cluster_view_connection: Mutex::new(None),
            cluster_id: Mutex::new(None),
            reconnecting: AtomicBool::new(false),
            event_sender,
            membership_sender,
            lifecycle_sender,
            shutdown,
            self_ref: self_ref.clone(),
        })
    }

    fn connections_read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Arc<Connection>>> {
        self.connections.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn connections_write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, Arc<Connection>>> {
        self.connections.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn members_read(&self) -> RwLockReadGuard<'_, MemberList> {
        self.members.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn members_write(&self) -> RwLockWriteGuard<'_, MemberList> {
        self.members.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes to connection events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.event_sender.subscribe()
    }

    /// Subscribes to membership events.
    pub fn subscribe_membership(&self) -> broadcast::Receiver<MemberEvent> {
        self.membership_sender.subscribe()
    }

    /// Returns the UUID this client authenticates with.
    pub fn client_uuid(&self) -> Uuid {
        self.client_uuid
    }

    /// Returns the ID of the cluster the client is connected to.
    pub fn cluster_id(&self) -> Option<Uuid> {
        *self.cluster_id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the current cluster members.
    pub fn members(&self) -> Vec<Member> {
        self.members_read().members().cloned().collect()
    }

    /// Returns the member with the given UUID.
    pub fn get_member(&self, uuid: &Uuid) -> Option<Member> {
        self.members_read().get(uuid).cloned()
    }

    /// Returns the number of known members.
    pub fn member_count(&self) -> usize {
        self.members_read().len()
    }

    /// Returns every live connection.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections_read()
            .values()
            .filter(|c| c.is_alive())
            .cloned()
            .collect()
    }

    /// Returns the number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections_read().values().filter(|c| c.is_alive()).count()
    }

    /// Returns the live connection to the given member.
    pub fn get_connection(&self, member_uuid: &Uuid) -> Option<Arc<Connection>> {
        self.connections_read()
            .get(member_uuid)
            .filter(|c| c.is_alive())
            .cloned()
    }

    /// Returns true while at least one connection is alive.
    pub fn is_connected(&self) -> bool {
        self.connection_count() > 0
    }

    /// Returns true once shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn shutdown_signal(&self) {
        let mut rx = self.shutdown.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Connects to the cluster and starts the heartbeat task.
    #[instrument(
        name = "connection_manager.start",
        skip(self),
        fields(cluster = %self.config.cluster_name())
    )]
    pub async fn start(&self) -> Result<()> {
        self.connect_to_cluster().await?;
        self.spawn_heartbeat_task();
        Ok(())
    }

    /// Tries every candidate address in rounds separated by exponential
    /// backoff until one connection authenticates or the cluster connect
    /// timeout passes.
    async fn connect_to_cluster(&self) -> Result<()> {
        let retry = self.config.retry();
        let deadline = Instant::now() + retry.cluster_connect_timeout();
        let mut backoff = retry.initial_backoff();
        let mut attempt = 0u32;

        loop {
            if self.is_shutdown() {
                return Err(GridError::ClientShutdown(
                    "client shut down while connecting".to_string(),
                ));
            }
            attempt += 1;

            for address in self.candidate_addresses().await {
                match self.connect(address).await {
                    Ok(_) => {
                        info!(address = %address, attempt, "connected to cluster");
                        let _ = self.lifecycle_sender.send(LifecycleEvent::ClientConnected);
                        return Ok(());
                    }
                    Err(e @ GridError::Authentication(_)) => {
                        error!(address = %address, error = %e, "authentication rejected");
                        return Err(e);
                    }
                    Err(e) => {
                        warn!(address = %address, attempt, error = %e, "failed to connect");
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                let error = format!(
                    "unable to connect to any cluster member within {:?}",
                    retry.cluster_connect_timeout()
                );
                error!(attempts = attempt, "{}", error);
                let _ = self.event_sender.send(ConnectionEvent::ReconnectFailed {
                    error: error.clone(),
                });
                return Err(GridError::Connection(error));
            }

            let delay = backoff.min(deadline - now);
            let _ = self.event_sender.send(ConnectionEvent::ReconnectAttempt {
                attempt,
                next_delay: delay,
            });
            debug!(attempt, backoff = ?delay, "retrying cluster connection");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown_signal() => {
                    return Err(GridError::ClientShutdown(
                        "client shut down while connecting".to_string(),
                    ));
                }
            }

            backoff = calculate_backoff_with_jitter(
                backoff,
                retry.multiplier(),
                retry.max_backoff(),
                retry.jitter(),
            );
        }
    }

    async fn candidate_addresses(&self) -> Vec<SocketAddr> {
        let mut seen = HashSet::new();
        let mut addresses = Vec::new();

        match self.address_provider.load_addresses().await {
            Ok(loaded) => addresses.extend(loaded.into_iter().filter(|a| seen.insert(*a))),
            Err(e) => warn!(error = %e, "failed to load cluster addresses"),
        }

        let known: Vec<SocketAddr> = self.members_read().members().map(|m| m.address).collect();
        for address in known {
            match self.address_provider.translate(address).await {
                Ok(Some(translated)) if seen.insert(translated) => addresses.push(translated),
                Ok(_) => {}
                Err(e) => warn!(address = %address, error = %e, "failed to translate member address"),
            }
        }
        addresses
    }

    /// Opens and authenticates a connection to the given address.
    #[instrument(
        name = "connection_manager.connect",
        skip(self),
        fields(address = %address)
    )]
    pub async fn connect(&self, address: SocketAddr) -> Result<Arc<Connection>> {
        let network = self.config.network();
        let connection = Connection::connect(
            address,
            network.connection_timeout(),
            ConnectionOptions {
                max_fragment_size: network.max_fragment_size(),
            },
        )
        .await?;

        match self.authenticate(&connection).await {
            Ok(member_uuid) => self.register_connection(connection, member_uuid),
            Err(e) => {
                connection.close(&format!("authentication failed: {}", e));
                Err(e)
            }
        }
    }

    async fn authenticate(&self, connection: &Connection) -> Result<Uuid> {
        let security = self.config.security();
        let request = authentication::Request {
            cluster_name: self.config.cluster_name().to_string(),
            username: security.username().map(str::to_string),
            password: security.password().map(str::to_string),
            client_uuid: self.client_uuid,
            client_type: CLIENT_TYPE.to_string(),
            serialization_version: SERIALIZATION_VERSION,
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            client_name: CLIENT_NAME.to_string(),
            labels: Vec::new(),
        };
        let mut message = authentication::encode_request(&request);
        let correlation_id = self.correlation_ids.next_id();
        message.set_correlation_id(correlation_id);

        let rx = connection.request(message)?;
        let wait = self.config.network().connection_timeout();
        let response = match timeout(wait, rx).await {
            Ok(Ok(response)) => response?,
            Ok(Err(_)) => {
                return Err(GridError::TargetDisconnected(format!(
                    "{} closed during authentication",
                    connection.id()
                )))
            }
            Err(_) => {
                connection.take_pending(correlation_id);
                return Err(GridError::Timeout(format!(
                    "authentication with {} timed out after {:?}",
                    connection.address(),
                    wait
                )));
            }
        };

        if error_codec::is_error(&response) {
            return Err(match error_codec::to_grid_error(&response) {
                GridError::Server(e) if e.error_code == error_codes::AUTHENTICATION => {
                    GridError::Authentication(e.to_string())
                }
                other => other,
            });
        }

        let response = authentication::decode_response(&response)?;
        match response.status {
            AuthenticationStatus::Authenticated => {}
            AuthenticationStatus::CredentialsFailed => {
                return Err(GridError::Authentication(
                    "the member rejected the credentials".to_string(),
                ))
            }
            AuthenticationStatus::NotAllowedInCluster => {
                return Err(GridError::Authentication(format!(
                    "client is not allowed in cluster '{}'",
                    self.config.cluster_name()
                )))
            }
            AuthenticationStatus::SerializationVersionMismatch => {
                return Err(GridError::Protocol(format!(
                    "member does not speak serialization version {}",
                    SERIALIZATION_VERSION
                )))
            }
        }

        let member_uuid = response.member_uuid.ok_or_else(|| {
            GridError::Protocol("authentication response without member UUID".to_string())
        })?;
        self.partition_service
            .set_partition_count(response.partition_count)?;

        if let Some(cluster_id) = response.cluster_id {
            let mut current = self.cluster_id.lock().unwrap_or_else(PoisonError::into_inner);
            if current.is_some_and(|previous| previous != cluster_id) {
                info!(cluster_id = %cluster_id, "connected to a different cluster");
            }
            *current = Some(cluster_id);
        }

        debug!(member = %member_uuid, "authenticated");
        Ok(member_uuid)
    }

    fn register_connection(
        &self,
        connection: Arc<Connection>,
        member_uuid: Uuid,
    ) -> Result<Arc<Connection>> {
        connection.set_member_uuid(member_uuid);
        {
            let mut connections = self.connections_write();
            if let Some(existing) = connections.get(&member_uuid).filter(|c| c.is_alive()) {
                let existing = Arc::clone(existing);
                drop(connections);
                connection.close("duplicate connection to member");
                return Ok(existing);
            }

            if connections.values().all(|c| !c.is_alive()) && self.reconnecting.load(Ordering::Acquire) {
                // First connection after losing the cluster: views from before
                // the outage may carry versions the cluster no longer uses.
                self.partition_service.reset();
                self.members_write().reset();
            }
            connections.insert(member_uuid, Arc::clone(&connection));
        }

        if self.is_shutdown() {
            connection.close("client is shutting down");
            return Err(GridError::ClientShutdown(
                "client shut down while connecting".to_string(),
            ));
        }

        info!(
            connection = %connection.id(),
            address = %connection.address(),
            member = %member_uuid,
            "connection registered"
        );
        let _ = self.event_sender.send(ConnectionEvent::Connected {
            id: connection.id(),
            address: connection.address(),
            member_uuid,
        });

        self.spawn_close_watcher(&connection);
        self.register_cluster_view_listener(&connection);
        Ok(connection)
    }

    fn spawn_close_watcher(&self, connection: &Arc<Connection>) {
        let manager = self.self_ref.clone();
        let connection = Arc::clone(connection);
        tokio::spawn(async move {
            connection.closed().await;
            if let Some(manager) = manager.upgrade() {
                manager.on_connection_closed(&connection);
            }
        });
    }

    fn on_connection_closed(&self, connection: &Arc<Connection>) {
        let member_uuid = connection.member_uuid();
        let cluster_lost = {
            let mut connections = self.connections_write();
            let registered = member_uuid
                .and_then(|uuid| connections.get(&uuid))
                .is_some_and(|c| c.id() == connection.id());
            if !registered {
                return;
            }
            if let Some(uuid) = member_uuid {
                connections.remove(&uuid);
            }
            connections.values().all(|c| !c.is_alive())
        };

        let reason = connection.close_reason();
        info!(
            connection = %connection.id(),
            address = %connection.address(),
            reason = reason.as_deref().unwrap_or("unknown"),
            "connection removed"
        );
        let _ = self.event_sender.send(ConnectionEvent::Disconnected {
            id: connection.id(),
            address: connection.address(),
            member_uuid,
            error: reason,
        });

        let was_view_connection = {
            let mut view = self
                .cluster_view_connection
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *view == Some(connection.id()) {
                *view = None;
                true
            } else {
                false
            }
        };

        if self.is_shutdown() {
            return;
        }
        if was_view_connection {
            if let Ok(next) = self.any_connection() {
                self.register_cluster_view_listener(&next);
            }
        }
        if cluster_lost {
            self.on_cluster_lost();
        }
    }

    fn on_cluster_lost(&self) {
        if self.reconnecting.swap(true, Ordering::AcqRel) {
            return;
        }
        warn!("lost every connection to the cluster, reconnecting");
        let _ = self.lifecycle_sender.send(LifecycleEvent::ClientDisconnected);

        let Some(manager) = self.self_ref.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let result = manager.connect_to_cluster().await;
            manager.reconnecting.store(false, Ordering::Release);
            match result {
                Ok(()) => {
                    if manager.config.network().smart_routing() {
                        manager.connect_to_all_members().await;
                    }
                }
                Err(e) => error!(error = %e, "reconnection to the cluster failed"),
            }
        });
    }

    fn register_cluster_view_listener(&self, connection: &Arc<Connection>) {
        {
            let mut view = self
                .cluster_view_connection
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if view.is_some() {
                return;
            }
            *view = Some(connection.id());
        }

        let correlation_id = self.correlation_ids.next_id();
        let manager = self.self_ref.clone();
        connection.add_event_handler(
            correlation_id,
            Arc::new(move |event: ClientMessage| {
                if let Some(manager) = manager.upgrade() {
                    manager.handle_cluster_view_event(&event);
                }
            }),
        );

        let mut request = add_cluster_view_listener::encode_request();
        request.set_correlation_id(correlation_id);
        match connection.request(request) {
            Ok(rx) => {
                let id = connection.id();
                tokio::spawn(async move {
                    match rx.await {
                        Ok(Ok(response)) if error_codec::is_error(&response) => warn!(
                            connection = %id,
                            error = %error_codec::to_grid_error(&response),
                            "cluster view listener rejected"
                        ),
                        Ok(Ok(_)) => debug!(connection = %id, "cluster view listener registered"),
                        Ok(Err(e)) => debug!(connection = %id, error = %e, "cluster view listener lost"),
                        Err(_) => {}
                    }
                });
            }
            Err(e) => warn!(
                connection = %connection.id(),
                error = %e,
                "failed to register cluster view listener"
            ),
        }
    }

    fn handle_cluster_view_event(&self, event: &ClientMessage) {
        match add_cluster_view_listener::decode_event(event) {
            Ok(ClusterViewEvent::MembersView { version, members }) => {
                self.apply_members_view(version, members)
            }
            Ok(ClusterViewEvent::PartitionsView {
                version,
                partitions,
            }) => {
                self.partition_service
                    .refresh(PartitionTable::from_view(version, &partitions));
            }
            Err(e) => warn!(error = %e, "failed to decode cluster view event"),
        }
    }

    fn apply_members_view(&self, version: i32, members: Vec<Member>) {
        let Some(events) = self.members_write().apply(version, members) else {
            debug!(version, "ignoring stale member list");
            return;
        };
        info!(version, count = self.member_count(), "member list updated");

        for event in events {
            if event.event_type == MemberEventType::Removed {
                if let Some(connection) = self.get_connection(&event.member.uuid) {
                    connection.close("member left the cluster");
                }
            }
            let _ = self.membership_sender.send(event);
        }

        if self.config.network().smart_routing() {
            if let Some(manager) = self.self_ref.upgrade() {
                tokio::spawn(async move { manager.connect_to_all_members().await });
            }
        }
    }

    async fn connect_to_all_members(&self) {
        let missing: Vec<Member> = {
            let connected: HashSet<Uuid> = self.connections_read().keys().copied().collect();
            self.members_read()
                .members()
                .filter(|m| !connected.contains(&m.uuid))
                .cloned()
                .collect()
        };

        for member in missing {
            if self.is_shutdown() {
                return;
            }
            let address = match self.address_provider.translate(member.address).await {
                Ok(Some(address)) => address,
                Ok(None) => continue,
                Err(e) => {
                    warn!(member = %member, error = %e, "failed to translate member address");
                    continue;
                }
            };
            if let Err(e) = self.connect(address).await {
                debug!(member = %member, error = %e, "failed to open member connection");
            }
        }
    }

    /// Chooses the connection an invocation is sent on.
    ///
    /// Partition-bound invocations go to the owner when smart routing is on
    /// and the owner is connected, and to any connection otherwise.
    pub fn connection_for(&self, target: &InvocationTarget) -> Result<Arc<Connection>> {
        match target {
            InvocationTarget::Connection(connection) => {
                if connection.is_alive() {
                    Ok(Arc::clone(connection))
                } else {
                    Err(GridError::TargetDisconnected(format!(
                        "{} to {} is closed",
                        connection.id(),
                        connection.address()
                    )))
                }
            }
            InvocationTarget::Partition(partition_id) => {
                if self.config.network().smart_routing() {
                    if let Some(connection) = self
                        .partition_service
                        .owner_of(*partition_id)
                        .and_then(|owner| self.get_connection(&owner))
                    {
                        return Ok(connection);
                    }
                }
                self.any_connection()
            }
            InvocationTarget::Any => self.any_connection(),
        }
    }

    /// Returns the connection carrying the cluster view listener if it is
    /// alive, otherwise any live connection.
    fn any_connection(&self) -> Result<Arc<Connection>> {
        let primary = *self
            .cluster_view_connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let connections = self.connections_read();
        let live = || connections.values().filter(|c| c.is_alive());

        primary
            .and_then(|id| live().find(|c| c.id() == id))
            .or_else(|| live().next())
            .cloned()
            .ok_or_else(|| GridError::NoConnection("no live connection to the cluster".to_string()))
    }

    fn spawn_heartbeat_task(&self) {
        let manager = self.self_ref.clone();
        let heartbeat_interval = self.config.network().heartbeat_interval();
        let heartbeat_timeout = self.config.network().heartbeat_timeout();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(heartbeat_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else { break };
                        manager.check_heartbeats(heartbeat_interval, heartbeat_timeout);
                    }
                    result = shutdown_rx.changed() => {
                        if result.is_err() || *shutdown_rx.borrow() {
                            debug!("heartbeat task shutting down");
                            break;
                        }
                    }
                }
            }
        });
    }

    fn check_heartbeats(&self, heartbeat_interval: Duration, heartbeat_timeout: Duration) {
        let now = std::time::Instant::now();
        for connection in self.connections() {
            if now.duration_since(connection.last_read_at()) > heartbeat_timeout {
                warn!(
                    connection = %connection.id(),
                    address = %connection.address(),
                    "heartbeat timed out"
                );
                connection.close(&format!("heartbeat timed out after {:?}", heartbeat_timeout));
                continue;
            }

            if now.duration_since(connection.last_write_at()) >= heartbeat_interval {
                let mut request = ping::encode_request();
                request.set_correlation_id(self.correlation_ids.next_id());
                // The response only refreshes the read timestamp.
                if let Err(e) = connection.request(request) {
                    debug!(connection = %connection.id(), error = %e, "heartbeat send failed");
                }
            }
        }
    }

    /// Stops background tasks and closes every connection.
    #[instrument(name = "connection_manager.shutdown", skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutdown.send_replace(true) {
            return Ok(());
        }

        let connections: Vec<Arc<Connection>> =
            self.connections_write().drain().map(|(_, c)| c).collect();
        for connection in &connections {
            connection.close("client is shutting down");
        }
        *self
            .cluster_view_connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;

        info!(closed = connections.len(), "connection manager shut down");
        Ok(())
    }
}
