//! Common test utilities for integration tests.
//!
//! [`MockMember`] is an in-process cluster member listening on a loopback
//! port. It speaks the client protocol for authentication, heartbeats, the
//! cluster view and the map operations, keeps map contents in memory and
//! pushes near-cache invalidation events to subscribed clients.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use gridlink_client::cluster::{Member, PartitionService};
use gridlink_client::codec::client::{
    add_cluster_view_listener, authentication, ping, AuthenticationStatus,
};
use gridlink_client::codec::error as error_codec;
use gridlink_client::codec::map::{self, add_near_cache_invalidation_listener as invalidation_listener};
use gridlink_client::core::error::error_codes;
use gridlink_client::core::protocol::{ClientMessage, ClientMessageCodec, CLIENT_PROTOCOL_HEADER};
use gridlink_client::core::{Data, GridError, ServerError};
use gridlink_client::{ClientConfigBuilder, GridClient, NearCacheConfig};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use uuid::Uuid;

pub const PARTITION_COUNT: i32 = 271;
pub const CLUSTER_NAME: &str = "dev";

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn unique_name(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}-{}", prefix, std::process::id(), id)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Polls `condition` until it holds, panicking after five seconds.
pub async fn eventually<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Behaviour knobs of a mock member.
#[derive(Debug, Clone)]
pub struct MockOptions {
    /// Cluster name accepted during authentication.
    pub cluster_name: String,
    /// Fragment outgoing messages larger than this.
    pub max_fragment_size: Option<usize>,
    /// Leave heartbeat pings unanswered, as a hung member would.
    pub ignore_pings: bool,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            cluster_name: CLUSTER_NAME.to_string(),
            max_fragment_size: None,
            ignore_pings: false,
        }
    }
}

/// One client connection as seen by the member.
struct Session {
    id: u64,
    client_uuid: Mutex<Option<Uuid>>,
    outbox: mpsc::UnboundedSender<ClientMessage>,
}

impl Session {
    fn send(&self, message: ClientMessage) {
        let _ = self.outbox.send(message);
    }

    fn client_uuid(&self) -> Option<Uuid> {
        *lock(&self.client_uuid)
    }
}

struct Subscriber {
    registration_id: Uuid,
    map: String,
    correlation_id: i64,
    session: Arc<Session>,
}

struct MemberState {
    uuid: Uuid,
    address: SocketAddr,
    cluster_id: Uuid,
    partition_uuid: Uuid,
    options: MockOptions,
    partitions: PartitionService,
    maps: Mutex<HashMap<String, HashMap<Data, Data>>>,
    sequences: Mutex<HashMap<(String, i32), i64>>,
    subscribers: Mutex<Vec<Subscriber>>,
    sessions: Mutex<HashMap<u64, (Arc<Session>, JoinHandle<()>)>>,
    requests: Mutex<HashMap<i32, usize>>,
    holding: Mutex<Vec<i32>>,
    held: Mutex<Vec<(Arc<Session>, ClientMessage)>>,
    next_session: AtomicU64,
}

/// An in-process cluster member for integration tests.
pub struct MockMember {
    state: Arc<MemberState>,
    accept_task: JoinHandle<()>,
}

impl MockMember {
    /// Starts a member with default options.
    pub async fn start() -> Self {
        Self::start_with(MockOptions::default()).await
    }

    /// Starts a member on an ephemeral loopback port.
    pub async fn start_with(options: MockOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let partitions = PartitionService::new();
        partitions.set_partition_count(PARTITION_COUNT).unwrap();

        let state = Arc::new(MemberState {
            uuid: Uuid::new_v4(),
            address,
            cluster_id: Uuid::new_v4(),
            partition_uuid: Uuid::new_v4(),
            options,
            partitions,
            maps: Mutex::new(HashMap::new()),
            sequences: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
            sessions: Mutex::new(HashMap::new()),
            requests: Mutex::new(HashMap::new()),
            holding: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
            next_session: AtomicU64::new(1),
        });

        let accept_state = Arc::clone(&state);
        let accept_task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                MemberState::open_session(&accept_state, stream);
            }
        });

        Self { state, accept_task }
    }

    pub fn address(&self) -> SocketAddr {
        self.state.address
    }

    pub fn uuid(&self) -> Uuid {
        self.state.uuid
    }

    /// A config builder pointing at this member with fast retries.
    pub fn config_builder(&self) -> ClientConfigBuilder {
        ClientConfigBuilder::new()
            .cluster_name(CLUSTER_NAME)
            .add_address(self.address())
            .retry(|r| {
                r.initial_backoff(Duration::from_millis(20))
                    .max_backoff(Duration::from_millis(100))
                    .cluster_connect_timeout(Duration::from_secs(5))
            })
            .invocation(|i| {
                i.timeout(Duration::from_secs(5))
                    .retry_pause(Duration::from_millis(20))
            })
    }

    /// Connects a client with a near cache on `map_name`.
    pub async fn near_cached_client(&self, map_name: &str) -> GridClient {
        let near_cache = NearCacheConfig::builder(map_name)
            .invalidate_on_change(true)
            .build()
            .unwrap();
        let config = self.config_builder().add_near_cache_config(near_cache).build().unwrap();
        GridClient::new(config).await.unwrap()
    }

    /// Connects a client without near caches.
    pub async fn client(&self) -> GridClient {
        GridClient::new(self.config_builder().build().unwrap()).await.unwrap()
    }

    /// Number of requests of `message_type` received so far.
    pub fn request_count(&self, message_type: i32) -> usize {
        lock(&self.state.requests).get(&message_type).copied().unwrap_or(0)
    }

    pub async fn wait_for_requests(&self, message_type: i32, count: usize) {
        eventually("requests to arrive", || self.request_count(message_type) >= count).await;
    }

    /// Keeps responses to `message_type` back until released.
    ///
    /// The response is computed when the request arrives, so a held read
    /// returns the value the map had at that time.
    pub fn hold_responses(&self, message_type: i32) {
        lock(&self.state.holding).push(message_type);
    }

    /// Answers new requests immediately again. Held responses stay held.
    pub fn stop_holding(&self) {
        lock(&self.state.holding).clear();
    }

    /// Sends every held response.
    pub fn release_held(&self) {
        let held: Vec<_> = lock(&self.state.held).drain(..).collect();
        for (session, response) in held {
            session.send(response);
        }
    }

    pub fn held_count(&self) -> usize {
        lock(&self.state.held).len()
    }

    /// Closes every client connection. Held responses are discarded.
    pub fn drop_connections(&self) {
        lock(&self.state.held).clear();
        let sessions: Vec<_> = lock(&self.state.sessions).drain().collect();
        lock(&self.state.subscribers).clear();
        for (_, (_, task)) in sessions {
            task.abort();
        }
    }

    pub fn session_count(&self) -> usize {
        lock(&self.state.sessions).len()
    }

    /// Number of invalidation listeners registered for `map_name`.
    pub fn subscriber_count(&self, map_name: &str) -> usize {
        lock(&self.state.subscribers)
            .iter()
            .filter(|s| s.map == map_name)
            .count()
    }

    /// Stores an entry directly, as another member-side writer would, and
    /// notifies subscribers.
    pub fn put_entry(&self, map_name: &str, key: &Data, value: &Data) {
        lock(&self.state.maps)
            .entry(map_name.to_string())
            .or_default()
            .insert(key.clone(), value.clone());
        self.state.invalidate(map_name, Some(key), None, 1);
    }

    /// Pushes an invalidation for `key` whose sequence skips `missed`
    /// sequence numbers, as if events were lost on the way.
    pub fn push_invalidation_with_gap(&self, map_name: &str, key: &Data, missed: i64) {
        self.state.invalidate(map_name, Some(key), None, missed + 1);
    }
}

impl Drop for MockMember {
    fn drop(&mut self) {
        self.accept_task.abort();
        self.drop_connections();
    }
}

impl MemberState {
    fn open_session(state: &Arc<Self>, stream: TcpStream) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let id = state.next_session.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session {
            id,
            client_uuid: Mutex::new(None),
            outbox,
        });

        let task_state = Arc::clone(state);
        let task_session = Arc::clone(&session);
        let mut sessions = lock(&state.sessions);
        let task = tokio::spawn(async move {
            task_state.serve(&task_session, stream, inbox).await;
            task_state.close_session(task_session.id);
        });
        sessions.insert(id, (session, task));
    }

    fn close_session(&self, id: u64) {
        lock(&self.sessions).remove(&id);
        lock(&self.subscribers).retain(|s| s.session.id != id);
    }

    async fn serve(
        &self,
        session: &Arc<Session>,
        mut stream: TcpStream,
        mut inbox: mpsc::UnboundedReceiver<ClientMessage>,
    ) {
        let mut header = [0u8; 3];
        if stream.read_exact(&mut header).await.is_err() || &header != CLIENT_PROTOCOL_HEADER {
            return;
        }

        let mut codec = ClientMessageCodec::new();
        if let Some(size) = self.options.max_fragment_size {
            codec = codec.with_max_fragment_size(size);
        }
        let mut framed = Framed::new(stream, codec);

        loop {
            tokio::select! {
                outgoing = inbox.recv() => match outgoing {
                    Some(message) => {
                        if framed.send(message).await.is_err() {
                            return;
                        }
                    }
                    None => return,
                },
                incoming = framed.next() => match incoming {
                    Some(Ok(message)) => self.handle(session, message),
                    _ => return,
                },
            }
        }
    }

    fn handle(&self, session: &Arc<Session>, message: ClientMessage) {
        let (Some(message_type), Some(correlation_id)) =
            (message.message_type(), message.correlation_id())
        else {
            return;
        };
        *lock(&self.requests).entry(message_type).or_insert(0) += 1;
        if message_type == ping::REQUEST_MESSAGE_TYPE && self.options.ignore_pings {
            return;
        }

        let mut response = self
            .respond(session, message_type, correlation_id, &message)
            .unwrap_or_else(|e| {
                error_codec::encode(&[ServerError::new(
                    error_codes::ILLEGAL_ARGUMENT,
                    "MockMemberError",
                    Some(e.to_string()),
                )])
            });
        response.set_correlation_id(correlation_id);

        if lock(&self.holding).contains(&message_type) {
            lock(&self.held).push((Arc::clone(session), response));
        } else {
            session.send(response);
        }

        if message_type == add_cluster_view_listener::REQUEST_MESSAGE_TYPE {
            self.send_cluster_view(session, correlation_id);
        }
    }

    fn send_cluster_view(&self, session: &Session, correlation_id: i64) {
        let members = [Member::new(self.uuid, self.address)];
        let mut members_event = add_cluster_view_listener::encode_members_view_event(1, &members);
        members_event.set_correlation_id(correlation_id);
        session.send(members_event);

        let owned: Vec<i32> = (0..PARTITION_COUNT).collect();
        let mut partitions_event =
            add_cluster_view_listener::encode_partitions_view_event(1, &[(self.uuid, owned)]);
        partitions_event.set_correlation_id(correlation_id);
        session.send(partitions_event);
    }

    fn respond(
        &self,
        session: &Arc<Session>,
        message_type: i32,
        correlation_id: i64,
        message: &ClientMessage,
    ) -> Result<ClientMessage, GridError> {
        let source = session.client_uuid();
        let response = match message_type {
            authentication::REQUEST_MESSAGE_TYPE => {
                let request = authentication::decode_request(message)?;
                *lock(&session.client_uuid) = Some(request.client_uuid);
                let status = if request.cluster_name == self.options.cluster_name {
                    AuthenticationStatus::Authenticated
                } else {
                    AuthenticationStatus::NotAllowedInCluster
                };
                authentication::encode_response(&authentication::Response {
                    status,
                    address: Some(self.address),
                    member_uuid: Some(self.uuid),
                    serialization_version: request.serialization_version,
                    partition_count: PARTITION_COUNT,
                    cluster_id: Some(self.cluster_id),
                    failover_supported: false,
                })
            }
            ping::REQUEST_MESSAGE_TYPE => ping::encode_response(),
            add_cluster_view_listener::REQUEST_MESSAGE_TYPE => {
                add_cluster_view_listener::encode_response()
            }
            map::get::REQUEST_MESSAGE_TYPE => {
                let request = map::get::decode_request(message)?;
                map::get::encode_response(self.read(&request.name, &request.key).as_ref())
            }
            map::contains_key::REQUEST_MESSAGE_TYPE => {
                let request = map::contains_key::decode_request(message)?;
                map::contains_key::encode_response(self.read(&request.name, &request.key).is_some())
            }
            map::put::REQUEST_MESSAGE_TYPE => {
                let request = map::put::decode_request(message)?;
                let previous = self.write(&request.name, &request.key, request.value, source);
                map::put::encode_response(previous.as_ref())
            }
            map::set::REQUEST_MESSAGE_TYPE => {
                let request = map::set::decode_request(message)?;
                self.write(&request.name, &request.key, request.value, source);
                map::set::encode_response()
            }
            map::put_if_absent::REQUEST_MESSAGE_TYPE => {
                let request = map::put_if_absent::decode_request(message)?;
                match self.read(&request.name, &request.key) {
                    Some(existing) => map::put_if_absent::encode_response(Some(&existing)),
                    None => {
                        self.write(&request.name, &request.key, request.value, source);
                        map::put_if_absent::encode_response(None)
                    }
                }
            }
            map::replace::REQUEST_MESSAGE_TYPE => {
                let request = map::replace::decode_request(message)?;
                let previous = self.read(&request.name, &request.key);
                if previous.is_some() {
                    self.write(&request.name, &request.key, request.value, source);
                }
                map::replace::encode_response(previous.as_ref())
            }
            map::replace_if_same::REQUEST_MESSAGE_TYPE => {
                let request = map::replace_if_same::decode_request(message)?;
                let matches = self.read(&request.name, &request.key).as_ref() == Some(&request.test_value);
                if matches {
                    self.write(&request.name, &request.key, Some(request.value), source);
                }
                map::replace_if_same::encode_response(matches)
            }
            map::try_put::REQUEST_MESSAGE_TYPE => {
                let (request, _) = map::try_put::decode_request(message)?;
                self.write(&request.name, &request.key, request.value, source);
                map::try_put::encode_response(true)
            }
            map::try_remove::REQUEST_MESSAGE_TYPE => {
                let (request, _) = map::try_remove::decode_request(message)?;
                self.write(&request.name, &request.key, None, source);
                map::try_remove::encode_response(true)
            }
            map::put_transient::REQUEST_MESSAGE_TYPE => {
                let request = map::put_transient::decode_request(message)?;
                self.write(&request.name, &request.key, request.value, source);
                map::put_transient::encode_response()
            }
            map::get_all::REQUEST_MESSAGE_TYPE => {
                let (name, keys) = map::get_all::decode_request(message)?;
                let entries: Vec<(Data, Data)> = keys
                    .into_iter()
                    .filter_map(|key| self.read(&name, &key).map(|value| (key, value)))
                    .collect();
                map::get_all::encode_response(&entries)
            }
            map::put_all::REQUEST_MESSAGE_TYPE => {
                let (name, entries, _) = map::put_all::decode_request(message)?;
                for (key, value) in entries {
                    self.write(&name, &key, Some(value), source);
                }
                map::put_all::encode_response()
            }
            map::remove::REQUEST_MESSAGE_TYPE => {
                let request = map::remove::decode_request(message)?;
                let previous = self.write(&request.name, &request.key, None, source);
                map::remove::encode_response(previous.as_ref())
            }
            map::delete::REQUEST_MESSAGE_TYPE => {
                let request = map::delete::decode_request(message)?;
                self.write(&request.name, &request.key, None, source);
                map::delete::encode_response()
            }
            map::evict::REQUEST_MESSAGE_TYPE => {
                let request = map::evict::decode_request(message)?;
                let previous = self.write(&request.name, &request.key, None, source);
                map::evict::encode_response(previous.is_some())
            }
            map::clear::REQUEST_MESSAGE_TYPE => {
                let name = map::clear::decode_request(message)?;
                self.clear(&name, source);
                map::clear::encode_response()
            }
            map::evict_all::REQUEST_MESSAGE_TYPE => {
                let name = map::evict_all::decode_request(message)?;
                self.clear(&name, source);
                map::evict_all::encode_response()
            }
            map::size::REQUEST_MESSAGE_TYPE => {
                let name = map::size::decode_request(message)?;
                let size = lock(&self.maps).get(&name).map_or(0, HashMap::len);
                map::size::encode_response(size as i32)
            }
            invalidation_listener::REQUEST_MESSAGE_TYPE => {
                let (name, _, _) = invalidation_listener::decode_request(message)?;
                let registration_id = Uuid::new_v4();
                lock(&self.subscribers).push(Subscriber {
                    registration_id,
                    map: name,
                    correlation_id,
                    session: Arc::clone(session),
                });
                invalidation_listener::encode_response(registration_id)
            }
            map::remove_entry_listener::REQUEST_MESSAGE_TYPE => {
                let (_, registration_id) = map::remove_entry_listener::decode_request(message)?;
                let mut subscribers = lock(&self.subscribers);
                let before = subscribers.len();
                subscribers.retain(|s| s.registration_id != registration_id);
                map::remove_entry_listener::encode_response(subscribers.len() != before)
            }
            map::fetch_near_cache_invalidation_metadata::REQUEST_MESSAGE_TYPE => {
                let (names, _) = map::fetch_near_cache_invalidation_metadata::decode_request(message)?;
                map::fetch_near_cache_invalidation_metadata::encode_response(&self.metadata(&names))
            }
            other => {
                return Err(GridError::Protocol(format!(
                    "unsupported message type {other:#x}"
                )))
            }
        };
        Ok(response)
    }

    fn read(&self, map_name: &str, key: &Data) -> Option<Data> {
        lock(&self.maps).get(map_name).and_then(|m| m.get(key)).cloned()
    }

    /// Stores or removes `key` and notifies subscribers.
    fn write(&self, map_name: &str, key: &Data, value: Option<Data>, source: Option<Uuid>) -> Option<Data> {
        let previous = {
            let mut maps = lock(&self.maps);
            let entries = maps.entry(map_name.to_string()).or_default();
            match value {
                Some(value) => entries.insert(key.clone(), value),
                None => entries.remove(key),
            }
        };
        self.invalidate(map_name, Some(key), source, 1);
        previous
    }

    fn clear(&self, map_name: &str, source: Option<Uuid>) {
        lock(&self.maps).remove(map_name);
        self.invalidate(map_name, None, source, 1);
    }

    fn partition_of(&self, map_name: &str, key: Option<&Data>) -> i32 {
        match key {
            Some(key) => self.partitions.partition_id(key),
            None => Data::of(map_name)
                .map(|name| self.partitions.partition_id(&name))
                .unwrap_or(0),
        }
    }

    fn invalidate(&self, map_name: &str, key: Option<&Data>, source: Option<Uuid>, step: i64) {
        let partition_id = self.partition_of(map_name, key);
        let sequence = {
            let mut sequences = lock(&self.sequences);
            let sequence = sequences.entry((map_name.to_string(), partition_id)).or_insert(0);
            *sequence += step;
            *sequence
        };

        let invalidation = invalidation_listener::Invalidation {
            key: key.cloned(),
            source_uuid: source,
            partition_uuid: self.partition_uuid,
            sequence,
        };
        for subscriber in lock(&self.subscribers).iter().filter(|s| s.map == map_name) {
            let mut event = invalidation_listener::encode_invalidation_event(partition_id, &invalidation);
            event.set_correlation_id(subscriber.correlation_id);
            subscriber.session.send(event);
        }
    }

    fn metadata(&self, names: &[String]) -> map::fetch_near_cache_invalidation_metadata::Response {
        let sequences = lock(&self.sequences);
        let name_partition_sequences = names
            .iter()
            .map(|name| {
                let per_partition = (0..PARTITION_COUNT)
                    .map(|pid| (pid, sequences.get(&(name.clone(), pid)).copied().unwrap_or(0)))
                    .collect();
                (name.clone(), per_partition)
            })
            .collect();
        map::fetch_near_cache_invalidation_metadata::Response {
            name_partition_sequences,
            partition_uuids: (0..PARTITION_COUNT).map(|pid| (pid, self.partition_uuid)).collect(),
        }
    }
}
