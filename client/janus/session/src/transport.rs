//! Transport capability consumed by the session engine.
//!
//! The engine never constructs sockets itself; it depends only on the
//! open/send/close/event-notify capability defined here. A
//! tokio-tungstenite backed implementation lives in [`crate::ws`].

use thiserror::Error;
use tokio::sync::mpsc;

/// WebSocket subprotocol requested for every gateway connection.
pub const JANUS_PROTOCOL: &str = "janus-protocol";

/// Errors surfaced by a transport implementation.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The connection attempt could not be started.
    #[error("transport open failed: {0}")]
    Open(String),

    /// A frame could not be handed to the connection.
    #[error("transport send failed: {0}")]
    Send(String),
}

/// Notifications a connection attempt delivers to the engine.
///
/// Implementations must preserve message ordering and deliver `Closed` or
/// `Errored` at most once per connection attempt.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The socket finished opening and is ready to carry frames.
    Opened,
    /// A complete text frame arrived.
    Message(String),
    /// The socket closed.
    Closed {
        /// Close reason reported by the peer, if any.
        reason: Option<String>,
    },
    /// The socket failed.
    Errored(String),
}

/// Factory for gateway connections.
pub trait Transport: Send + Sync {
    /// Start a connection attempt to `url` speaking `subprotocol`.
    ///
    /// Events for the attempt are delivered on `events`. Each attempt gets
    /// its own channel; dropping the receiver detaches a superseded attempt,
    /// so its events can never reach a newer connection.
    fn open(
        &self,
        url: &str,
        subprotocol: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn TransportConnection>, TransportError>;
}

/// A single connection attempt produced by [`Transport::open`].
pub trait TransportConnection: Send + Sync {
    /// Queue one text frame for delivery, in order.
    fn send(&self, frame: String) -> Result<(), TransportError>;

    /// Close the connection. Idempotent.
    fn close(&self);
}
