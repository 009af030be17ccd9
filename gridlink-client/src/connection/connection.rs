//! Single connection to a cluster member.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use gridlink_core::protocol::{ClientMessage, ClientMessageCodec, CLIENT_PROTOCOL_HEADER};
use gridlink_core::{GridError, Result};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generates a new unique connection ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Receiver of the response to one request.
pub type PendingCall = oneshot::Sender<Result<ClientMessage>>;

/// Callback invoked for every event pushed on a subscription.
pub type EventCallback = Arc<dyn Fn(ClientMessage) + Send + Sync>;

/// Options applied to the codec of a new connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionOptions {
    /// Outbound messages larger than this are fragmented.
    pub max_fragment_size: Option<usize>,
}

/// A live connection to a single cluster member.
///
/// Reading and writing happen on two background tasks. Callers queue
/// messages with [`send`](Self::send) or [`request`](Self::request); the
/// reader task routes responses to the pending call with the same
/// correlation ID and events to the handler registered for it.
pub struct Connection {
    id: ConnectionId,
    address: SocketAddr,
    member_uuid: OnceLock<Uuid>,
    alive: AtomicBool,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    pending: Mutex<HashMap<i64, PendingCall>>,
    event_handlers: Mutex<HashMap<i64, EventCallback>>,
    created_at: Instant,
    last_read_ms: AtomicU64,
    last_write_ms: AtomicU64,
    close_reason: Mutex<Option<String>>,
    closed_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("member_uuid", &self.member_uuid.get())
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl Connection {
    /// Opens a TCP connection and sends the protocol header.
    pub async fn connect(
        address: SocketAddr,
        timeout: Duration,
        options: ConnectionOptions,
    ) -> Result<Arc<Self>> {
        let mut stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| {
                GridError::Connection(format!("connecting to {} timed out after {:?}", address, timeout))
            })?
            .map_err(|e| GridError::Connection(format!("failed to connect to {}: {}", address, e)))?;

        stream
            .set_nodelay(true)
            .map_err(|e| GridError::Connection(format!("failed to set TCP_NODELAY: {}", e)))?;

        stream.write_all(CLIENT_PROTOCOL_HEADER).await.map_err(|e| {
            GridError::Connection(format!("failed to write protocol header to {}: {}", address, e))
        })?;

        debug!(address = %address, "established connection");
        Ok(Self::spawn(stream, address, options))
    }

    /// Starts the reader and writer tasks on an already connected stream.
    pub fn spawn<S>(stream: S, address: SocketAddr, options: ConnectionOptions) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);

        let connection = Arc::new(Self {
            id: ConnectionId::new(),
            address,
            member_uuid: OnceLock::new(),
            alive: AtomicBool::new(true),
            outbound,
            pending: Mutex::new(HashMap::new()),
            event_handlers: Mutex::new(HashMap::new()),
            created_at: Instant::now(),
            last_read_ms: AtomicU64::new(0),
            last_write_ms: AtomicU64::new(0),
            close_reason: Mutex::new(None),
            closed_tx,
        });

        let mut codec = ClientMessageCodec::new();
        if let Some(size) = options.max_fragment_size {
            codec = codec.with_max_fragment_size(size);
        }
        let writer = FramedWrite::new(write_half, codec);
        let reader = FramedRead::new(read_half, ClientMessageCodec::new());

        tokio::spawn(Self::write_loop(
            Arc::clone(&connection),
            writer,
            outbound_rx,
            closed_rx.clone(),
        ));
        tokio::spawn(Self::read_loop(Arc::clone(&connection), reader, closed_rx));

        connection
    }

    async fn write_loop<W>(
        connection: Arc<Self>,
        mut writer: FramedWrite<W, ClientMessageCodec>,
        mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
        mut closed: watch::Receiver<bool>,
    ) where
        W: AsyncWrite + Send + Unpin,
    {
        loop {
            tokio::select! {
                message = outbound.recv() => {
                    let Some(message) = message else { break };
                    if let Err(e) = writer.send(message).await {
                        connection.close(&format!("write failed: {}", e));
                        break;
                    }
                    connection.touch_write();
                }
                _ = closed.changed() => break,
            }
        }
        let _ = writer.close().await;
        trace!(connection = %connection.id, "writer stopped");
    }

    async fn read_loop<R>(
        connection: Arc<Self>,
        mut reader: FramedRead<R, ClientMessageCodec>,
        mut closed: watch::Receiver<bool>,
    ) where
        R: AsyncRead + Send + Unpin,
    {
        loop {
            tokio::select! {
                next = reader.next() => match next {
                    Some(Ok(message)) => {
                        connection.touch_read();
                        connection.dispatch(message);
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection.id, error = %e, "closing connection on read error");
                        connection.close(&format!("read failed: {}", e));
                        break;
                    }
                    None => {
                        connection.close("connection closed by the member");
                        break;
                    }
                },
                _ = closed.changed() => break,
            }
        }
        trace!(connection = %connection.id, "reader stopped");
    }

    fn dispatch(&self, message: ClientMessage) {
        let Some(correlation_id) = message.correlation_id() else {
            warn!(connection = %self.id, "dropping message without correlation ID");
            return;
        };

        if message.is_event() {
            let handler = self
                .event_handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&correlation_id)
                .cloned();
            match handler {
                Some(handler) => handler(message),
                None => trace!(connection = %self.id, correlation_id, "dropping event without handler"),
            }
            return;
        }

        match self.take_pending(correlation_id) {
            Some(call) => {
                let _ = call.send(Ok(message));
            }
            None => trace!(
                connection = %self.id,
                correlation_id,
                "dropping response without pending call"
            ),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.created_at.elapsed().as_millis() as u64
    }

    fn touch_read(&self) {
        self.last_read_ms.store(self.elapsed_ms(), Ordering::Relaxed);
    }

    fn touch_write(&self) {
        self.last_write_ms.store(self.elapsed_ms(), Ordering::Relaxed);
    }

    /// Returns the connection's unique identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the remote address of this connection.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Returns the UUID of the member, once authenticated.
    pub fn member_uuid(&self) -> Option<Uuid> {
        self.member_uuid.get().copied()
    }

    /// Records the member UUID reported by the authentication response.
    pub(crate) fn set_member_uuid(&self, uuid: Uuid) {
        let _ = self.member_uuid.set(uuid);
    }

    /// Returns when this connection was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Returns when a message was last read from this connection.
    pub fn last_read_at(&self) -> Instant {
        self.created_at + Duration::from_millis(self.last_read_ms.load(Ordering::Relaxed))
    }

    /// Returns when a message was last written to this connection.
    pub fn last_write_at(&self) -> Instant {
        self.created_at + Duration::from_millis(self.last_write_ms.load(Ordering::Relaxed))
    }

    /// Returns true until the connection is closed.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Returns why the connection was closed, if it was.
    pub fn close_reason(&self) -> Option<String> {
        self.close_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Queues a message for writing.
    pub fn send(&self, message: ClientMessage) -> Result<()> {
        if !self.is_alive() {
            return Err(self.disconnected_error());
        }
        self.outbound
            .send(message)
            .map_err(|_| self.disconnected_error())
    }

    /// Sends a request and returns a receiver for its response.
    ///
    /// The message must already carry its correlation ID.
    pub fn request(&self, message: ClientMessage) -> Result<oneshot::Receiver<Result<ClientMessage>>> {
        let correlation_id = message
            .correlation_id()
            .ok_or_else(|| GridError::Protocol("request without correlation ID".to_string()))?;
        let (tx, rx) = oneshot::channel();
        self.register_pending(correlation_id, tx)?;
        if let Err(e) = self.send(message) {
            self.take_pending(correlation_id);
            return Err(e);
        }
        Ok(rx)
    }

    /// Registers the receiver of the response with `correlation_id`.
    pub fn register_pending(&self, correlation_id: i64, call: PendingCall) -> Result<()> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        // Checked under the lock so close() cannot miss this entry.
        if !self.is_alive() {
            return Err(self.disconnected_error());
        }
        pending.insert(correlation_id, call);
        Ok(())
    }

    /// Removes and returns the pending call for `correlation_id`.
    pub fn take_pending(&self, correlation_id: i64) -> Option<PendingCall> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&correlation_id)
    }

    /// Returns the number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Routes events carrying `correlation_id` to `handler`.
    pub fn add_event_handler(&self, correlation_id: i64, handler: EventCallback) {
        self.event_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(correlation_id, handler);
    }

    /// Stops routing events carrying `correlation_id`.
    pub fn remove_event_handler(&self, correlation_id: i64) -> bool {
        self.event_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&correlation_id)
            .is_some()
    }

    /// Closes the connection.
    ///
    /// Every pending call fails with `TargetDisconnected`. Only the first
    /// call has any effect.
    pub fn close(&self, reason: &str) {
        let drained: Vec<PendingCall> = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if !self.alive.swap(false, Ordering::AcqRel) {
                return;
            }
            pending.drain().map(|(_, call)| call).collect()
        };

        *self.close_reason.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.to_string());
        self.event_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        debug!(
            connection = %self.id,
            address = %self.address,
            pending = drained.len(),
            reason,
            "connection closed"
        );
        for call in drained {
            let _ = call.send(Err(self.disconnected_error()));
        }
        self.closed_tx.send_replace(true);
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    fn disconnected_error(&self) -> GridError {
        let reason = self
            .close_reason()
            .unwrap_or_else(|| "connection is closed".to_string());
        GridError::TargetDisconnected(format!("{} to {}: {}", self.id, self.address, reason))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.closed_tx.send_replace(true);
    }
}
