//! Server-side event subscriptions that survive connection loss.

mod lifecycle;

pub use lifecycle::LifecycleEvent;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use gridlink_core::protocol::ClientMessage;
use gridlink_core::{GridError, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

use crate::codec::error as error_codec;
use crate::connection::{Connection, ConnectionEvent, ConnectionId, ConnectionManager};
use crate::invocation::{CorrelationIdGenerator, InvocationService, InvocationTarget};

/// Encodes the requests that add and remove one kind of server-side listener.
pub trait ListenerMessageCodec: Send + Sync {
    /// Encodes the add-listener request.
    fn encode_add_request(&self, local_only: bool) -> ClientMessage;

    /// Extracts the member-assigned registration ID from the add response.
    fn decode_add_response(&self, response: &ClientMessage) -> Result<Uuid>;

    /// Encodes the request removing the registration with `registration_id`.
    fn encode_remove_request(&self, registration_id: Uuid) -> ClientMessage;
}

/// Receives the events of one registration.
pub trait EventHandler: Send + Sync {
    /// Handles a pushed event. Called on the connection's reader task, so it
    /// must not block.
    fn handle(&self, event: ClientMessage);

    /// Returns the partition and sequence of `event` when it carries one.
    ///
    /// Events whose sequence is not newer than the last one seen for the
    /// same partition are dropped before reaching [`handle`](Self::handle).
    fn event_sequence(&self, _event: &ClientMessage) -> Option<(i32, i64)> {
        None
    }
}

/// Counters of a single registration.
#[derive(Debug, Default)]
pub struct ListenerStats {
    events_received: AtomicU64,
    duplicates_dropped: AtomicU64,
    registrations: AtomicU64,
}

impl ListenerStats {
    /// Returns the number of events delivered to the handler.
    pub fn events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    /// Returns the number of events dropped as already seen.
    pub fn duplicates_dropped(&self) -> u64 {
        self.duplicates_dropped.load(Ordering::Relaxed)
    }

    /// Returns how many times the subscription was established on a member,
    /// the first registration included.
    pub fn registrations(&self) -> u64 {
        self.registrations.load(Ordering::Relaxed)
    }
}

struct ActiveRegistration {
    connection: Arc<Connection>,
    correlation_id: i64,
    server_registration_id: Uuid,
}

struct Registration {
    id: Uuid,
    local_only: bool,
    codec: Arc<dyn ListenerMessageCodec>,
    handler: Arc<dyn EventHandler>,
    active: Mutex<Option<ActiveRegistration>>,
    last_sequences: Mutex<HashMap<i32, i64>>,
    stats: Arc<ListenerStats>,
}

impl Registration {
    fn dispatch(&self, event: ClientMessage) {
        if let Some((partition_id, sequence)) = self.handler.event_sequence(&event) {
            let mut last = self
                .last_sequences
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if last.get(&partition_id).is_some_and(|seen| sequence <= *seen) {
                trace!(registration = %self.id, partition_id, sequence, "dropping duplicate event");
                self.stats.duplicates_dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            last.insert(partition_id, sequence);
        }
        self.stats.events_received.fetch_add(1, Ordering::Relaxed);
        self.handler.handle(event);
    }

    fn active_connection(&self) -> Option<ConnectionId> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|active| active.connection.id())
    }

    /// Forgets the sequences seen on an earlier server registration. A new
    /// registration starts its own event stream.
    fn prepare_activation(&self) {
        if self.stats.registrations() == 0 {
            return;
        }
        self.last_sequences
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn take_active(&self) -> Option<ActiveRegistration> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Keeps listener registrations alive across connection changes.
///
/// A registration lives on one connection. When that connection closes the
/// service registers it again on another live connection, or on the next
/// one to be opened, without the caller noticing.
pub struct ListenerService {
    connections: Arc<ConnectionManager>,
    invocations: Arc<InvocationService>,
    correlation_ids: Arc<CorrelationIdGenerator>,
    registration_timeout: Duration,
    registrations: Mutex<HashMap<Uuid, Arc<Registration>>>,
    shutdown: watch::Sender<bool>,
}

impl fmt::Debug for ListenerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerService")
            .field("registrations", &self.registration_count())
            .finish()
    }
}

impl ListenerService {
    /// Creates a listener service. Call [`start`](Self::start) to follow
    /// connection changes.
    pub fn new(
        connections: Arc<ConnectionManager>,
        invocations: Arc<InvocationService>,
        correlation_ids: Arc<CorrelationIdGenerator>,
        registration_timeout: Duration,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            connections,
            invocations,
            correlation_ids,
            registration_timeout,
            registrations: Mutex::new(HashMap::new()),
            shutdown,
        })
    }

    /// Spawns the task re-registering listeners when connections change.
    pub fn start(self: &Arc<Self>) {
        let service = Arc::downgrade(self);
        let mut events = self.connections.subscribe();
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    event = events.recv() => event,
                    _ = shutdown_rx.changed() => break,
                };
                let Some(service) = service.upgrade() else { break };
                match event {
                    Ok(ConnectionEvent::Disconnected { id, .. }) => {
                        service.on_connection_lost(id);
                        service.reregister_inactive().await;
                    }
                    Ok(ConnectionEvent::Connected { .. }) => service.reregister_inactive().await,
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "listener service missed connection events");
                        service.reregister_inactive().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("listener service stopped");
        });
    }

    fn registrations(&self) -> Vec<Arc<Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Returns the number of registrations.
    pub fn registration_count(&self) -> usize {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns the counters of the registration with `id`.
    pub fn stats(&self, id: &Uuid) -> Option<Arc<ListenerStats>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|registration| Arc::clone(&registration.stats))
    }

    /// Subscribes `handler` to the events `codec` registers for.
    ///
    /// Returns the local registration ID, which stays the same across
    /// re-registrations on other members.
    #[instrument(name = "listener.register", skip_all)]
    pub async fn register(
        &self,
        codec: Arc<dyn ListenerMessageCodec>,
        handler: Arc<dyn EventHandler>,
        local_only: bool,
    ) -> Result<Uuid> {
        let registration = Arc::new(Registration {
            id: Uuid::new_v4(),
            local_only,
            codec,
            handler,
            active: Mutex::new(None),
            last_sequences: Mutex::new(HashMap::new()),
            stats: Arc::new(ListenerStats::default()),
        });

        self.activate(&registration).await?;
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(registration.id, Arc::clone(&registration));
        Ok(registration.id)
    }

    async fn activate(&self, registration: &Arc<Registration>) -> Result<()> {
        let connection = self.connections.connection_for(&InvocationTarget::Any)?;
        let correlation_id = self.correlation_ids.next_id();
        registration.prepare_activation();

        let weak: Weak<Registration> = Arc::downgrade(registration);
        connection.add_event_handler(
            correlation_id,
            Arc::new(move |event: ClientMessage| {
                if let Some(registration) = weak.upgrade() {
                    registration.dispatch(event);
                }
            }),
        );

        match self.send_add_request(&connection, registration, correlation_id).await {
            Ok(server_registration_id) => {
                debug!(
                    registration = %registration.id,
                    server_registration = %server_registration_id,
                    connection = %connection.id(),
                    "listener registered"
                );
                registration.stats.registrations.fetch_add(1, Ordering::Relaxed);
                *registration
                    .active
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(ActiveRegistration {
                    connection,
                    correlation_id,
                    server_registration_id,
                });
                Ok(())
            }
            Err(e) => {
                connection.remove_event_handler(correlation_id);
                Err(e)
            }
        }
    }

    async fn send_add_request(
        &self,
        connection: &Arc<Connection>,
        registration: &Registration,
        correlation_id: i64,
    ) -> Result<Uuid> {
        let mut request = registration.codec.encode_add_request(registration.local_only);
        request.set_correlation_id(correlation_id);
        let rx = connection.request(request)?;

        let response = match tokio::time::timeout(self.registration_timeout, rx).await {
            Ok(Ok(response)) => response?,
            Ok(Err(_)) => {
                return Err(GridError::TargetDisconnected(format!(
                    "{} closed while registering a listener",
                    connection.id()
                )))
            }
            Err(_) => {
                connection.take_pending(correlation_id);
                return Err(GridError::Timeout(format!(
                    "listener registration got no response within {:?}",
                    self.registration_timeout
                )));
            }
        };

        if error_codec::is_error(&response) {
            return Err(error_codec::to_grid_error(&response));
        }
        registration.codec.decode_add_response(&response)
    }

    fn on_connection_lost(&self, id: ConnectionId) {
        for registration in self.registrations() {
            if registration.active_connection() == Some(id) {
                registration.take_active();
                debug!(registration = %registration.id, connection = %id, "listener lost its connection");
            }
        }
    }

    async fn reregister_inactive(&self) {
        if *self.shutdown.borrow() {
            return;
        }
        for registration in self.registrations() {
            let stale = registration
                .active
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .is_some_and(|active| !active.connection.is_alive());
            if stale {
                registration.take_active();
            }
            if registration.active_connection().is_some() {
                continue;
            }

            match self.activate(&registration).await {
                Ok(()) => info!(registration = %registration.id, "listener registered again"),
                Err(e) => debug!(
                    registration = %registration.id,
                    error = %e,
                    "listener re-registration deferred"
                ),
            }
        }
    }

    /// Removes the registration with `id`.
    ///
    /// Returns false if no such registration exists. A failure to reach the
    /// member is logged and otherwise ignored.
    #[instrument(name = "listener.deregister", skip(self), fields(registration = %id))]
    pub async fn deregister(&self, id: Uuid) -> bool {
        let Some(registration) = self
            .registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
        else {
            return false;
        };

        let Some(active) = registration.take_active() else {
            return true;
        };
        active.connection.remove_event_handler(active.correlation_id);
        if !active.connection.is_alive() {
            return true;
        }

        let request = registration
            .codec
            .encode_remove_request(active.server_registration_id);
        let result = self
            .invocations
            .invoke(request, InvocationTarget::Connection(Arc::clone(&active.connection)))
            .await;
        if let Err(e) = result {
            warn!(error = %e, "failed to remove listener on the member");
        }
        true
    }

    /// Deregisters every listener and stops following connection changes.
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let ids: Vec<Uuid> = self
            .registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        for id in ids {
            self.deregister(id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::PartitionService;
    use crate::config::{ClientConfig, InvocationConfig};
    use crate::connection::StaticAddressProvider;
    use tokio::sync::broadcast;

    struct CountingHandler {
        events: Mutex<Vec<ClientMessage>>,
    }

    impl EventHandler for CountingHandler {
        fn handle(&self, event: ClientMessage) {
            self.events.lock().unwrap().push(event);
        }

        fn event_sequence(&self, event: &ClientMessage) -> Option<(i32, i64)> {
            Some((event.partition_id()?, event.correlation_id()?))
        }
    }

    fn registration(handler: Arc<dyn EventHandler>) -> Registration {
        struct NoopCodec;
        impl ListenerMessageCodec for NoopCodec {
            fn encode_add_request(&self, _local_only: bool) -> ClientMessage {
                ClientMessage::create_for_encode(1, -1, 0)
            }
            fn decode_add_response(&self, _response: &ClientMessage) -> Result<Uuid> {
                Ok(Uuid::nil())
            }
            fn encode_remove_request(&self, _registration_id: Uuid) -> ClientMessage {
                ClientMessage::create_for_encode(2, -1, 0)
            }
        }

        Registration {
            id: Uuid::new_v4(),
            local_only: false,
            codec: Arc::new(NoopCodec),
            handler,
            active: Mutex::new(None),
            last_sequences: Mutex::new(HashMap::new()),
            stats: Arc::new(ListenerStats::default()),
        }
    }

    fn event(partition_id: i32, sequence: i64) -> ClientMessage {
        let mut event = ClientMessage::create_for_event(3, partition_id, 0);
        event.set_correlation_id(sequence);
        event
    }

    #[test]
    fn test_duplicate_sequences_are_dropped() {
        let handler = Arc::new(CountingHandler {
            events: Mutex::new(Vec::new()),
        });
        let registration = registration(handler.clone());

        registration.dispatch(event(1, 1));
        registration.dispatch(event(1, 2));
        registration.dispatch(event(1, 2));
        registration.dispatch(event(1, 1));
        registration.dispatch(event(2, 1));

        assert_eq!(handler.events.lock().unwrap().len(), 3);
        assert_eq!(registration.stats.events_received(), 3);
        assert_eq!(registration.stats.duplicates_dropped(), 2);
    }

    #[test]
    fn test_reregistration_forgets_sequences() {
        let handler = Arc::new(CountingHandler {
            events: Mutex::new(Vec::new()),
        });
        let registration = registration(handler.clone());

        registration.prepare_activation();
        registration.stats.registrations.fetch_add(1, Ordering::Relaxed);
        registration.dispatch(event(1, 5));
        registration.dispatch(event(1, 1));
        assert_eq!(registration.stats.duplicates_dropped(), 1);

        // The member numbers events of the new registration from scratch.
        registration.prepare_activation();
        registration.stats.registrations.fetch_add(1, Ordering::Relaxed);
        registration.dispatch(event(1, 1));
        registration.dispatch(event(1, 2));

        assert_eq!(handler.events.lock().unwrap().len(), 3);
        assert_eq!(registration.stats.duplicates_dropped(), 1);
    }

    #[tokio::test]
    async fn test_register_without_connection_fails() {
        let (lifecycle, _) = broadcast::channel(16);
        let correlation_ids = Arc::new(CorrelationIdGenerator::new());
        let manager = ConnectionManager::new(
            Arc::new(ClientConfig::default()),
            Arc::new(StaticAddressProvider::new(vec![])),
            Arc::new(PartitionService::new()),
            Arc::clone(&correlation_ids),
            lifecycle,
        );
        let invocations = InvocationService::new(
            Arc::clone(&manager),
            Arc::clone(&correlation_ids),
            InvocationConfig::default(),
        );
        let service = ListenerService::new(manager, invocations, correlation_ids, Duration::from_secs(1));

        let handler = Arc::new(CountingHandler {
            events: Mutex::new(Vec::new()),
        });
        let result = service
            .register(registration(handler.clone()).codec, handler, false)
            .await;
        assert!(matches!(result, Err(GridError::NoConnection(_))));
        assert_eq!(service.registration_count(), 0);
        assert!(!service.deregister(Uuid::new_v4()).await);
    }

    #[test]
    fn test_listener_service_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ListenerService>();
        assert_send_sync::<ListenerStats>();
    }
}
