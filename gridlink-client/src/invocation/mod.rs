//! Request/response invocations with routing, retry and deadlines.
//!
//! Every invocation runs in its own task. An attempt picks a connection,
//! registers a pending call under a fresh correlation ID and waits for the
//! response; transient failures schedule another attempt after the
//! configured pause until the deadline passes. The caller observes exactly
//! one completion.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use gridlink_core::protocol::ClientMessage;
use gridlink_core::{GridError, Result};
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, instrument, trace, warn};

use crate::codec::error as error_codec;
use crate::config::InvocationConfig;
use crate::connection::{Connection, ConnectionManager};

/// Allocates correlation IDs shared by every connection of a client.
#[derive(Debug)]
pub struct CorrelationIdGenerator {
    next: AtomicI64,
}

impl CorrelationIdGenerator {
    /// Creates a generator starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
        }
    }

    /// Returns a correlation ID never returned before by this generator.
    pub fn next_id(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for CorrelationIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Where an invocation is sent.
#[derive(Clone)]
pub enum InvocationTarget {
    /// A specific connection. Never rerouted.
    Connection(Arc<Connection>),
    /// The owner of a partition, or any connection when the owner is unreachable.
    Partition(i32),
    /// Any live connection.
    Any,
}

impl fmt::Debug for InvocationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(c) => write!(f, "Connection({}, {})", c.id(), c.address()),
            Self::Partition(id) => write!(f, "Partition({})", id),
            Self::Any => f.write_str("Any"),
        }
    }
}

const PENDING: u8 = 0;
const COMPLETE: u8 = 1;
const FAILED: u8 = 2;

struct Invocation {
    id: u64,
    state: AtomicU8,
    result_tx: Mutex<Option<oneshot::Sender<Result<ClientMessage>>>>,
    attempt: Mutex<Option<(Arc<Connection>, i64)>>,
}

impl Invocation {
    fn new(id: u64, result_tx: oneshot::Sender<Result<ClientMessage>>) -> Self {
        Self {
            id,
            state: AtomicU8::new(PENDING),
            result_tx: Mutex::new(Some(result_tx)),
            attempt: Mutex::new(None),
        }
    }

    fn is_done(&self) -> bool {
        self.state.load(Ordering::Acquire) != PENDING
    }

    /// Records the pending call of a new attempt, dropping the previous one
    /// so no two attempts are tracked at the same time.
    fn begin_attempt(&self, connection: Arc<Connection>, correlation_id: i64) {
        let previous = self
            .attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((connection, correlation_id));
        if let Some((connection, correlation_id)) = previous {
            connection.take_pending(correlation_id);
        }
    }

    /// Removes the current attempt's pending call, if any.
    fn detach(&self) {
        let current = self
            .attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((connection, correlation_id)) = current {
            if connection.take_pending(correlation_id).is_some() {
                trace!(
                    connection = %connection.id(),
                    correlation_id,
                    "abandoned pending call, a late response will be dropped"
                );
            }
        }
    }

    /// Resolves the invocation. Returns false if it was already resolved.
    fn complete(&self, result: Result<ClientMessage>) -> bool {
        let next = if result.is_ok() { COMPLETE } else { FAILED };
        if self
            .state
            .compare_exchange(PENDING, next, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.detach();
        if let Some(tx) = self
            .result_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            let _ = tx.send(result);
        }
        true
    }
}

/// Drops the pending call of the running attempt when the attempt loop is
/// abandoned, e.g. on deadline expiry.
struct AttemptGuard<'a>(&'a Invocation);

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        self.0.detach();
    }
}

/// The result of [`InvocationService::invoke`].
///
/// Dropping the future abandons interest in the result only; the request
/// is not retracted and the invocation task runs until it resolves or its
/// deadline passes.
#[must_use = "an invocation's result is only observed by awaiting its future"]
#[derive(Debug)]
pub struct InvocationFuture {
    rx: oneshot::Receiver<Result<ClientMessage>>,
}

impl Future for InvocationFuture {
    type Output = Result<ClientMessage>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|result| {
            result.unwrap_or_else(|_| {
                Err(GridError::ClientShutdown(
                    "invocation was abandoned".to_string(),
                ))
            })
        })
    }
}

/// Sends invocations and tracks them until they complete.
pub struct InvocationService {
    connections: Arc<ConnectionManager>,
    correlation_ids: Arc<CorrelationIdGenerator>,
    config: InvocationConfig,
    outstanding: Mutex<HashMap<u64, Arc<Invocation>>>,
    next_invocation_id: AtomicU64,
    shutdown: watch::Sender<bool>,
}

impl fmt::Debug for InvocationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationService")
            .field("config", &self.config)
            .field("outstanding", &self.outstanding_count())
            .finish()
    }
}

impl InvocationService {
    /// Creates an invocation service routing through `connections`.
    pub fn new(
        connections: Arc<ConnectionManager>,
        correlation_ids: Arc<CorrelationIdGenerator>,
        config: InvocationConfig,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            connections,
            correlation_ids,
            config,
            outstanding: Mutex::new(HashMap::new()),
            next_invocation_id: AtomicU64::new(1),
            shutdown,
        })
    }

    /// Returns the number of invocations that have not resolved yet.
    pub fn outstanding_count(&self) -> usize {
        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Sends `message` to `target`.
    ///
    /// The message's retryable flag, set by its codec, decides whether a
    /// transport failure is retried. The returned future resolves with the
    /// response, the member's error or `Timeout` once the invocation
    /// timeout, measured from this call, passes.
    pub fn invoke(self: &Arc<Self>, message: ClientMessage, target: InvocationTarget) -> InvocationFuture {
        let (tx, rx) = oneshot::channel();
        let id = self.next_invocation_id.fetch_add(1, Ordering::Relaxed);
        let invocation = Arc::new(Invocation::new(id, tx));

        if *self.shutdown.borrow() {
            invocation.complete(Err(GridError::ClientShutdown(
                "client is shut down".to_string(),
            )));
            return InvocationFuture { rx };
        }

        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&invocation));

        let service = Arc::clone(self);
        let deadline = Instant::now() + self.config.timeout();
        tokio::spawn(async move {
            service.run(invocation, message, target, deadline).await;
        });

        InvocationFuture { rx }
    }

    /// Sends `message` to the owner of `partition_id`.
    pub fn invoke_on_partition(self: &Arc<Self>, mut message: ClientMessage, partition_id: i32) -> InvocationFuture {
        message.set_partition_id(partition_id);
        self.invoke(message, InvocationTarget::Partition(partition_id))
    }

    #[instrument(
        name = "invocation.run",
        skip_all,
        fields(
            invocation = invocation.id,
            operation = message.operation_name(),
            target = ?target,
        )
    )]
    async fn run(
        &self,
        invocation: Arc<Invocation>,
        message: ClientMessage,
        target: InvocationTarget,
        deadline: Instant,
    ) {
        let mut shutdown_rx = self.shutdown.subscribe();
        let timeout = self.config.timeout();

        let result = tokio::select! {
            result = tokio::time::timeout_at(deadline, self.attempt_loop(&invocation, message, &target, deadline)) => {
                result.unwrap_or_else(|_| {
                    Err(GridError::Timeout(format!(
                        "invocation did not complete within {:?}",
                        timeout
                    )))
                })
            }
            _ = async { let _ = shutdown_rx.wait_for(|shutdown| *shutdown).await; } => {
                Err(GridError::ClientShutdown("client is shutting down".to_string()))
            }
        };

        if let Err(e) = &result {
            debug!(error = %e, "invocation failed");
        }
        invocation.complete(result);
        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&invocation.id);
    }

    async fn attempt_loop(
        &self,
        invocation: &Invocation,
        mut message: ClientMessage,
        target: &InvocationTarget,
        deadline: Instant,
    ) -> Result<ClientMessage> {
        let _guard = AttemptGuard(invocation);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let error = match self.attempt(invocation, &mut message, target).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if invocation.is_done() || !self.should_retry(&message, target, &error) {
                return Err(error);
            }

            let pause = self.config.retry_pause();
            if Instant::now() + pause >= deadline {
                warn!(attempt, error = %error, "invocation deadline reached while retrying");
                return Err(error);
            }

            debug!(attempt, error = %error, pause = ?pause, "retrying invocation");
            tokio::time::sleep(pause).await;
        }
    }

    async fn attempt(
        &self,
        invocation: &Invocation,
        message: &mut ClientMessage,
        target: &InvocationTarget,
    ) -> Result<ClientMessage> {
        let connection = self.connections.connection_for(target)?;
        let correlation_id = self.correlation_ids.next_id();
        message.set_correlation_id(correlation_id);

        let (tx, rx) = oneshot::channel();
        connection.register_pending(correlation_id, tx)?;
        invocation.begin_attempt(Arc::clone(&connection), correlation_id);
        trace!(connection = %connection.id(), correlation_id, "sending invocation");
        connection.send(message.clone())?;

        let response = rx.await.map_err(|_| {
            GridError::TargetDisconnected(format!(
                "{} dropped the call with correlation ID {}",
                connection.id(),
                correlation_id
            ))
        })??;

        if error_codec::is_error(&response) {
            return Err(error_codec::to_grid_error(&response));
        }
        Ok(response)
    }

    fn should_retry(&self, message: &ClientMessage, target: &InvocationTarget, error: &GridError) -> bool {
        if matches!(target, InvocationTarget::Connection(_)) {
            return false;
        }
        if error.is_retryable_server_error() {
            return true;
        }
        error.is_transport() && (message.is_retryable() || self.config.redo_operation())
    }

    /// Fails every outstanding invocation with `ClientShutdown` and rejects
    /// new ones.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let outstanding: Vec<Arc<Invocation>> = self
            .outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, invocation)| invocation)
            .collect();

        let failed = outstanding
            .iter()
            .filter(|invocation| {
                invocation.complete(Err(GridError::ClientShutdown(
                    "client is shutting down".to_string(),
                )))
            })
            .count();
        if failed > 0 {
            debug!(failed, "failed outstanding invocations on shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::PartitionService;
    use crate::config::{ClientConfig, InvocationConfigBuilder};
    use crate::connection::{ConnectionOptions, StaticAddressProvider};
    use futures::{SinkExt, StreamExt};
    use gridlink_core::protocol::ClientMessageCodec;
    use gridlink_core::ServerError;
    use std::time::Duration;
    use tokio::io::DuplexStream;
    use tokio::sync::broadcast;
    use tokio_util::codec::Framed;

    fn service(config: InvocationConfig) -> Arc<InvocationService> {
        let (lifecycle, _) = broadcast::channel(16);
        let correlation_ids = Arc::new(CorrelationIdGenerator::new());
        let manager = ConnectionManager::new(
            Arc::new(ClientConfig::default()),
            Arc::new(StaticAddressProvider::new(vec![])),
            Arc::new(PartitionService::new()),
            Arc::clone(&correlation_ids),
            lifecycle,
        );
        InvocationService::new(manager, correlation_ids, config)
    }

    fn config(timeout: Duration, pause: Duration) -> InvocationConfig {
        InvocationConfigBuilder::new()
            .timeout(timeout)
            .retry_pause(pause)
            .build()
            .unwrap()
    }

    fn connected_pair() -> (Arc<Connection>, Framed<DuplexStream, ClientMessageCodec>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let connection = Connection::spawn(
            client,
            "127.0.0.1:5701".parse().unwrap(),
            ConnectionOptions::default(),
        );
        (connection, Framed::new(server, ClientMessageCodec::new()))
    }

    fn request(retryable: bool) -> ClientMessage {
        let mut message = ClientMessage::create_for_encode(0x7F0100, -1, 0);
        message.set_retryable(retryable);
        message
    }

    fn response_to(request: &ClientMessage) -> ClientMessage {
        let mut response = ClientMessage::create_for_response(0x7F0101, 0);
        response.set_correlation_id(request.correlation_id().unwrap());
        response
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let generator = CorrelationIdGenerator::new();
        let a = generator.next_id();
        let b = generator.next_id();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_invoke_on_connection_resolves_response() {
        let service = service(config(Duration::from_secs(5), Duration::from_millis(10)));
        let (connection, mut server) = connected_pair();

        let future = service.invoke(request(false), InvocationTarget::Connection(Arc::clone(&connection)));
        let received = server.next().await.unwrap().unwrap();
        server.send(response_to(&received)).await.unwrap();

        let response = future.await.unwrap();
        assert_eq!(response.message_type(), Some(0x7F0101));
        assert_eq!(connection.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_error_response_becomes_server_error() {
        let service = service(config(Duration::from_secs(5), Duration::from_millis(10)));
        let (connection, mut server) = connected_pair();

        let future = service.invoke(request(true), InvocationTarget::Connection(connection));
        let received = server.next().await.unwrap().unwrap();
        let mut error = error_codec::encode(&[ServerError::new(
            gridlink_core::error::error_codes::ILLEGAL_ARGUMENT,
            "IllegalArgumentException",
            Some("bad key".to_string()),
        )]);
        error.set_correlation_id(received.correlation_id().unwrap());
        server.send(error).await.unwrap();

        match future.await {
            Err(GridError::Server(e)) => assert_eq!(e.class_name, "IllegalArgumentException"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_drops_late_response() {
        let service = service(config(Duration::from_millis(100), Duration::from_millis(10)));
        let (connection, mut server) = connected_pair();

        let future = service.invoke(request(true), InvocationTarget::Connection(Arc::clone(&connection)));
        let received = server.next().await.unwrap().unwrap();

        assert!(matches!(future.await, Err(GridError::Timeout(_))));
        assert_eq!(connection.pending_count(), 0);

        server.send(response_to(&received)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(connection.is_alive());
        assert_eq!(service.outstanding_count(), 0);
    }

    #[tokio::test]
    async fn test_connection_target_is_not_retried() {
        let service = service(config(Duration::from_secs(5), Duration::from_millis(10)));
        let (connection, mut server) = connected_pair();

        let future = service.invoke(request(true), InvocationTarget::Connection(Arc::clone(&connection)));
        let _ = server.next().await.unwrap().unwrap();
        connection.close("member went away");

        assert!(matches!(future.await, Err(GridError::TargetDisconnected(_))));
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast_without_connection() {
        let service = service(config(Duration::from_secs(5), Duration::from_millis(10)));

        let started = Instant::now();
        let result = service.invoke(request(false), InvocationTarget::Any).await;
        assert!(matches!(result, Err(GridError::NoConnection(_))));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_surfaces_last_error_at_deadline() {
        let service = service(config(Duration::from_millis(200), Duration::from_millis(20)));

        let result = service.invoke(request(true), InvocationTarget::Partition(1)).await;
        assert!(matches!(result, Err(GridError::NoConnection(_))));
    }

    #[tokio::test]
    async fn test_shutdown_fails_outstanding() {
        let service = service(config(Duration::from_secs(30), Duration::from_millis(10)));
        let (connection, mut server) = connected_pair();

        let future = service.invoke(request(true), InvocationTarget::Connection(Arc::clone(&connection)));
        let _ = server.next().await.unwrap().unwrap();
        assert_eq!(service.outstanding_count(), 1);

        service.shutdown();
        assert!(matches!(future.await, Err(GridError::ClientShutdown(_))));
        assert_eq!(connection.pending_count(), 0);

        let after = service.invoke(request(true), InvocationTarget::Any).await;
        assert!(matches!(after, Err(GridError::ClientShutdown(_))));
    }

    #[test]
    fn test_invocation_completes_once() {
        let (tx, mut rx) = oneshot::channel();
        let invocation = Invocation::new(1, tx);

        assert!(invocation.complete(Err(GridError::Timeout("late".to_string()))));
        assert!(!invocation.complete(Ok(ClientMessage::create_for_response(1, 0))));
        assert!(matches!(rx.try_recv(), Ok(Err(GridError::Timeout(_)))));
    }

    #[test]
    fn test_invocation_service_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<InvocationService>();
        assert_send_sync::<InvocationTarget>();
    }
}
