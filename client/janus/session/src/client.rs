//! Connection and session management.
//!
//! [`JanusClient`] owns the transport, runs the connect/handshake/reconnect
//! state machine, multiplexes transactions over the single socket, and
//! dispatches server-pushed events to attached plugins.
//!
//! All engine state lives behind one mutex and is only touched between
//! await points; the transport's event stream and every timer run as
//! separate tasks that re-enter through the same handle. Each connect
//! attempt bumps an atomic generation counter, and every spawned task
//! checks its generation before acting, so callbacks of a superseded
//! connection can never fire against the new one.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use janus_wire::{build_request, ReplyKind, RequestKind, TransactionId};

use crate::broker::{Reply, TransactionBroker};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::event::ConnectionEvent;
use crate::keepalive;
use crate::plugin::{Plugin, PluginContext};
use crate::registry::HandleRegistry;
use crate::router;
use crate::transport::{Transport, TransportConnection, TransportEvent, JANUS_PROTOCOL};

/// Delay before a scheduled reconnect attempt fires. A drop also triggers
/// an immediate attempt; this timer is the backstop.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Capacity of the connection-event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Connection lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// No transport.
    Disconnected,
    /// A transport attempt is underway but the socket is not open yet.
    Connecting,
    /// The transport is open; no gateway session (yet).
    Connected,
    /// The transport is open and a gateway session is established.
    SessionEstablished,
}

#[derive(Default)]
struct Timers {
    connection: Option<JoinHandle<()>>,
    keepalive: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

impl Timers {
    fn cancel_all(&mut self) {
        for timer in [
            self.connection.take(),
            self.keepalive.take(),
            self.reconnect.take(),
        ]
        .into_iter()
        .flatten()
        {
            timer.abort();
        }
    }
}

struct ConnState {
    phase: ConnectionPhase,
    /// Present if and only if `phase` is `SessionEstablished`.
    session_id: Option<u64>,
    /// Consecutive connection attempts; cleared on success and on an
    /// explicit `reset()`.
    connection_tries: u32,
    /// Requests accumulated while the transport is not open, flushed FIFO
    /// after the next handshake.
    queue: VecDeque<Value>,
    conn: Option<Arc<dyn TransportConnection>>,
    /// The synthetic create transaction, rejected through its dedicated
    /// callback when the connection drops before it resolves.
    handshake: Option<TransactionId>,
    timers: Timers,
}

pub(crate) struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    broker: TransactionBroker,
    handles: HandleRegistry,
    state: Mutex<ConnState>,
    events: broadcast::Sender<ConnectionEvent>,
    generation: AtomicU64,
}

/// Handle to the connection/session engine.
///
/// Cheap to clone; all clones share the same underlying connection, broker,
/// and registry.
#[derive(Clone)]
pub struct JanusClient {
    inner: Arc<ClientInner>,
}

impl JanusClient {
    /// Create an engine for `config`, reaching the gateway through
    /// `transport`.
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                broker: TransactionBroker::new(),
                handles: HandleRegistry::new(),
                state: Mutex::new(ConnState {
                    phase: ConnectionPhase::Disconnected,
                    session_id: None,
                    connection_tries: 0,
                    queue: VecDeque::new(),
                    conn: None,
                    handshake: None,
                    timers: Timers::default(),
                }),
                events,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Subscribe to connection-lifecycle events. Subscribe before
    /// [`JanusClient::connect`] to observe the attempt's outcome.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// The transaction broker (pure reads only).
    pub fn broker(&self) -> &TransactionBroker {
        &self.inner.broker
    }

    /// The plugin handle registry (pure reads only).
    pub fn registry(&self) -> &HandleRegistry {
        &self.inner.handles
    }

    /// Current lifecycle phase.
    pub async fn phase(&self) -> ConnectionPhase {
        self.inner.state.lock().await.phase
    }

    /// True while the transport is open.
    pub async fn is_connected(&self) -> bool {
        matches!(
            self.inner.state.lock().await.phase,
            ConnectionPhase::Connected | ConnectionPhase::SessionEstablished
        )
    }

    /// True while a gateway session is established over an open transport.
    pub async fn is_session_established(&self) -> bool {
        self.inner.state.lock().await.phase == ConnectionPhase::SessionEstablished
    }

    /// The gateway-assigned session id; present only while established.
    pub async fn session_id(&self) -> Option<u64> {
        self.inner.state.lock().await.session_id
    }

    pub(crate) fn emit(&self, event: ConnectionEvent) {
        let _ = self.inner.events.send(event);
    }

    pub(crate) fn same_generation(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == generation
    }

    /// Open the transport and start the handshake.
    ///
    /// Returns once the attempt is underway; the outcome is observable on
    /// [`JanusClient::events`] (`Open` on success, `Close` on a failed
    /// attempt).
    pub fn connect(&self) -> Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send + '_>> {
        Box::pin(async move {
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let (event_tx, event_rx) = mpsc::unbounded_channel();

            let mut state = self.inner.state.lock().await;
            state.connection_tries += 1;
            state.session_id = None;
            state.phase = ConnectionPhase::Connecting;
            debug!(
                attempt = state.connection_tries,
                url = %self.inner.config.url,
                "connecting to gateway"
            );
            // A superseded connection must not linger: close it before its
            // replacement opens.
            if let Some(previous) = state.conn.take() {
                previous.close();
            }
            let conn = match self
                .inner
                .transport
                .open(&self.inner.config.url, JANUS_PROTOCOL, event_tx)
            {
                Ok(conn) => conn,
                Err(error) => {
                    state.phase = ConnectionPhase::Disconnected;
                    return Err(error.into());
                }
            };
            state.conn = Some(Arc::from(conn));
            if let Some(stale) = state.timers.connection.take() {
                stale.abort();
            }
            state.timers.connection =
                Some(tokio::spawn(connection_timeout(self.clone(), generation)));
            drop(state);

            drop(tokio::spawn(event_loop(self.clone(), event_rx, generation)));
            Ok(())
        })
    }

    /// Close the transport. Idempotent; does not run the drop path, so no
    /// `Close` event is emitted for an explicit disconnect.
    pub async fn disconnect(&self) {
        let mut state = self.inner.state.lock().await;
        let Some(conn) = state.conn.take() else {
            return;
        };
        // Invalidate the attempt's listeners before closing so the close
        // event cannot re-enter the drop path.
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        conn.close();
        state.phase = ConnectionPhase::Disconnected;
        state.session_id = None;
    }

    /// Fully disconnect and return to a clean slate: all timers cancelled,
    /// session state and the attempt counter cleared.
    pub async fn reset(&self) {
        self.disconnect().await;
        let mut state = self.inner.state.lock().await;
        state.timers.cancel_all();
        state.connection_tries = 0;
        state.session_id = None;
        state.phase = ConnectionPhase::Disconnected;
        state.handshake = None;
    }

    /// Administrative escape hatch: drop the connection as if the transport
    /// had failed, exercising the reconnection policy.
    pub async fn force_drop(&self) {
        self.disconnect().await;
        self.handle_drop().await;
    }

    /// Send `request` now when the transport is open; otherwise queue it
    /// for the next connection (FIFO, flushed after the handshake).
    pub async fn send_request(&self, request: Value) -> Result<(), ClientError> {
        let mut state = self.inner.state.lock().await;
        if matches!(
            state.phase,
            ConnectionPhase::Connected | ConnectionPhase::SessionEstablished
        ) {
            if let Some(conn) = state.conn.as_ref() {
                return conn.send(request.to_string()).map_err(ClientError::from);
            }
        }
        debug!("transport not open, queueing request");
        state.queue.push_back(request);
        Ok(())
    }

    /// Issue a request and await its correlated reply.
    ///
    /// Fails immediately when not connected. The reply frame's kind must
    /// match `reply` exactly to resolve the call. With a `timeout`, the
    /// pending entry is removed once the deadline elapses; without one the
    /// call waits until a matching reply arrives or the engine is torn
    /// down.
    pub async fn transaction(
        &self,
        kind: RequestKind,
        reply: ReplyKind,
        payload: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Reply, ClientError> {
        if !self.is_connected().await {
            return Err(ClientError::NotConnected);
        }
        let id = TransactionId::random();
        let session_id = self.session_id().await;
        let request = build_request(kind, &id, session_id, payload)?;
        let (sender, receiver) = oneshot::channel();
        let diagnostic = (kind != RequestKind::Create).then(|| request.clone());
        self.inner
            .broker
            .register(id.clone(), reply, sender, diagnostic);
        if let Err(error) = self.send_request(request).await {
            self.inner.broker.discard(&id);
            return Err(error);
        }
        match timeout {
            Some(deadline) => match tokio::time::timeout(deadline, receiver).await {
                Ok(received) => received.unwrap_or(Err(ClientError::ConnectionDropped)),
                Err(_) => {
                    self.inner.broker.discard(&id);
                    Err(ClientError::TransactionTimeout(deadline))
                }
            },
            None => receiver.await.unwrap_or(Err(ClientError::ConnectionDropped)),
        }
    }

    /// Attach `plugin` to the gateway: sends the attach transaction, binds
    /// the returned handle id, and hands the plugin its back-reference.
    pub async fn add_plugin(&self, plugin: Arc<dyn Plugin>) -> Result<u64, ClientError> {
        let payload = serde_json::to_value(plugin.attach_payload())
            .map_err(janus_wire::WireError::from)?;
        match self
            .transaction(RequestKind::Attach, ReplyKind::Success, Some(payload), None)
            .await
        {
            Ok(reply) => {
                let Some(handle_id) = reply.frame().data_id() else {
                    let error = ClientError::MissingId;
                    warn!("attach reply carried no handle id");
                    plugin.error(&error);
                    return Err(error);
                };
                self.inner.handles.register(handle_id, Arc::clone(&plugin));
                info!(
                    handle_id,
                    plugin = %plugin.attach_payload().plugin,
                    "plugin attached"
                );
                plugin.attached(PluginContext::new(self.clone(), handle_id));
                Ok(handle_id)
            }
            Err(error) => {
                warn!("cannot attach plugin: {error}");
                plugin.error(&error);
                Err(error)
            }
        }
    }

    /// Detach `plugin` from the gateway and release its handle binding.
    ///
    /// Fails cleanly, leaving the binding untouched, when the handle is not
    /// bound or the gateway refuses the detach.
    pub async fn remove_plugin(&self, plugin: &Arc<dyn Plugin>) -> Result<(), ClientError> {
        let Some(handle_id) = plugin.handle_id() else {
            return Err(ClientError::NotAttached);
        };
        if self.inner.handles.lookup(handle_id).is_none() {
            return Err(ClientError::NotAttached);
        }
        let attach = plugin.attach_payload();
        let payload = serde_json::json!({
            "plugin": attach.plugin,
            "opaque_id": attach.opaque_id,
            "handle_id": handle_id,
        });
        match self
            .transaction(RequestKind::Detach, ReplyKind::Success, Some(payload), None)
            .await
        {
            Ok(_) => {
                drop(self.inner.handles.unregister(handle_id));
                plugin.detach();
                info!(handle_id, "plugin detached");
                Ok(())
            }
            Err(error) => {
                warn!("cannot detach plugin: {error}");
                plugin.error(&error);
                Err(error)
            }
        }
    }

    /// Gracefully end the gateway session, then close the transport.
    pub async fn destroy(&self) -> Result<(), ClientError> {
        let result = if self.is_session_established().await {
            self.transaction(
                RequestKind::Destroy,
                ReplyKind::Success,
                None,
                Some(self.inner.config.connection_timeout),
            )
            .await
            .map(drop)
        } else {
            Ok(())
        };
        self.disconnect().await;
        result
    }

    pub(crate) async fn handle_drop(&self) {
        debug!("connection dropped");
        self.emit(ConnectionEvent::Close);
        {
            let mut state = self.inner.state.lock().await;
            if let Some(timer) = state.timers.keepalive.take() {
                timer.abort();
            }
            if let Some(id) = state.handshake.take() {
                self.inner.broker.reject(&id, ClientError::ConnectionDropped);
            }
        }
        if !self.inner.config.reconnect {
            return;
        }
        {
            let mut state = self.inner.state.lock().await;
            if let Some(timer) = state.timers.reconnect.take() {
                timer.abort();
            }
            state.timers.reconnect = Some(tokio::spawn(scheduled_reconnect(self.clone())));
        }
        self.handle_reconnect().await;
    }

    async fn handle_reconnect(&self) {
        let limit = self.inner.config.connection_tries_limit;
        {
            let mut state = self.inner.state.lock().await;
            if limit != 0 && state.connection_tries > limit {
                state.connection_tries = 0;
                // Stop the backstop timer too: one terminal notification,
                // no attempt beyond the limit.
                if let Some(timer) = state.timers.connection.take() {
                    timer.abort();
                }
                if let Some(timer) = state.timers.reconnect.take() {
                    timer.abort();
                }
                warn!("reached the connection attempt limit, giving up");
                drop(state);
                self.emit(ConnectionEvent::ConnectError);
                return;
            }
            let already_done = match state.phase {
                ConnectionPhase::Connecting | ConnectionPhase::SessionEstablished => true,
                ConnectionPhase::Connected => !self.inner.config.create_session_on_connect,
                ConnectionPhase::Disconnected => false,
            };
            if already_done {
                return;
            }
        }
        debug!("attempting reconnect");
        // The attempt counter survives the internal reset so the limit
        // keeps binding across consecutive failures.
        let tries = self.inner.state.lock().await.connection_tries;
        self.reset().await;
        self.inner.state.lock().await.connection_tries = tries;
        if let Err(error) = self.connect().await {
            warn!("reconnect attempt failed to start: {error}");
        }
    }

    /// Forget a timer handle without aborting it. Tasks that escalate into
    /// the drop path call this on their own slot first, so the drop path's
    /// abort cannot cancel the very task running it.
    pub(crate) async fn detach_keepalive_timer(&self) {
        drop(self.inner.state.lock().await.timers.keepalive.take());
    }

    async fn detach_connection_timer(&self) {
        drop(self.inner.state.lock().await.timers.connection.take());
    }

    pub(crate) async fn on_transport_drop(&self) {
        {
            let mut state = self.inner.state.lock().await;
            state.conn = None;
            state.phase = ConnectionPhase::Disconnected;
            state.session_id = None;
        }
        self.handle_drop().await;
    }

    async fn on_open(&self, generation: u64) {
        debug!("transport open");
        self.inner.state.lock().await.phase = ConnectionPhase::Connected;
        if !self.inner.config.create_session_on_connect {
            self.inner.state.lock().await.connection_tries = 0;
            self.emit(ConnectionEvent::Open);
            self.flush_queue().await;
            return;
        }
        self.start_handshake(generation).await;
    }

    /// Register the synthetic create transaction directly with the broker:
    /// it must go out before any session id exists and deliberately has no
    /// timeout (it lives until it succeeds or the connection drops).
    async fn start_handshake(&self, generation: u64) {
        let id = TransactionId::random();
        let (sender, receiver) = oneshot::channel();
        self.inner
            .broker
            .register(id.clone(), ReplyKind::Success, sender, None);
        self.inner.state.lock().await.handshake = Some(id.clone());

        let request = match build_request(RequestKind::Create, &id, None, None) {
            Ok(request) => request,
            Err(error) => {
                warn!("cannot build handshake request: {error}");
                return;
            }
        };
        if let Err(error) = self.send_request(request).await {
            warn!("cannot send handshake request: {error}");
            self.disconnect().await;
            self.handle_drop().await;
            return;
        }
        drop(tokio::spawn(finish_handshake(self.clone(), receiver, generation)));
    }

    async fn flush_queue(&self) {
        loop {
            let (request, conn) = {
                let mut state = self.inner.state.lock().await;
                if !matches!(
                    state.phase,
                    ConnectionPhase::Connected | ConnectionPhase::SessionEstablished
                ) {
                    return;
                }
                match (state.queue.pop_front(), state.conn.clone()) {
                    (Some(request), Some(conn)) => (request, conn),
                    _ => return,
                }
            };
            if let Err(error) = conn.send(request.to_string()) {
                warn!("flush failed, re-queueing request: {error}");
                self.inner.state.lock().await.queue.push_front(request);
                return;
            }
        }
    }
}

async fn event_loop(
    client: JanusClient,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    generation: u64,
) {
    while let Some(event) = events.recv().await {
        if !client.same_generation(generation) {
            break;
        }
        match event {
            TransportEvent::Opened => client.on_open(generation).await,
            TransportEvent::Message(text) => router::route_frame(&client, &text).await,
            TransportEvent::Closed { reason } => {
                debug!(?reason, "transport closed");
                client.on_transport_drop().await;
                break;
            }
            TransportEvent::Errored(error) => {
                warn!("transport error: {error}");
                client.on_transport_drop().await;
                break;
            }
        }
    }
}

async fn finish_handshake(
    client: JanusClient,
    receiver: oneshot::Receiver<Result<Reply, ClientError>>,
    generation: u64,
) {
    let outcome = receiver.await.unwrap_or(Err(ClientError::ConnectionDropped));
    if !client.same_generation(generation) {
        return;
    }
    match outcome {
        Ok(reply) => {
            let Some(session_id) = reply.frame().data_id() else {
                warn!("session handshake reply carried no id");
                client.disconnect().await;
                client.handle_drop().await;
                return;
            };
            {
                let mut state = client.inner.state.lock().await;
                state.session_id = Some(session_id);
                state.phase = ConnectionPhase::SessionEstablished;
                state.handshake = None;
                state.connection_tries = 0;
                if let Some(stale) = state.timers.keepalive.take() {
                    stale.abort();
                }
                state.timers.keepalive = Some(keepalive::spawn(client.clone(), generation));
            }
            info!(session_id, "gateway session established");
            client.emit(ConnectionEvent::Open);
            client.flush_queue().await;
        }
        Err(error) => {
            // Dedicated reject path: the handshake aborts when the
            // connection drops or the gateway refuses the create. A stalled
            // attempt is caught by the connection timer.
            debug!("session handshake aborted: {error}");
        }
    }
}

/// Armed at `connect()`: if the attempt has not opened (or, with session
/// establishment enabled, produced a session id) by the deadline, it is a
/// failed attempt and goes through the drop path.
async fn connection_timeout(client: JanusClient, generation: u64) {
    tokio::time::sleep(client.inner.config.connection_timeout).await;
    if !client.same_generation(generation) {
        return;
    }
    let stalled = {
        let state = client.inner.state.lock().await;
        match state.phase {
            // The attempt already failed through the drop path.
            ConnectionPhase::Disconnected => false,
            _ if client.inner.config.create_session_on_connect => state.session_id.is_none(),
            phase => !matches!(
                phase,
                ConnectionPhase::Connected | ConnectionPhase::SessionEstablished
            ),
        }
    };
    if stalled {
        debug!(
            "connection attempt timed out after {:?}",
            client.inner.config.connection_timeout
        );
        client.detach_connection_timer().await;
        client.disconnect().await;
        client.handle_drop().await;
    }
}

async fn scheduled_reconnect(client: JanusClient) {
    tokio::time::sleep(RECONNECT_DELAY).await;
    // Clear our own slot first so `reset()` inside the reconnect cannot
    // abort this task mid-flight.
    client.inner.state.lock().await.timers.reconnect = None;
    client.handle_reconnect().await;
}
