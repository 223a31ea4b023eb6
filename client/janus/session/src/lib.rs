//! Connection, session, and transaction management for the Janus signaling
//! client.
//!
//! This crate is the engine underneath the client: it owns the transport
//! lifecycle, establishes a gateway session, multiplexes concurrent
//! request/reply transactions and server-pushed events over one WebSocket,
//! keeps the session alive, and recovers automatically from transport loss.
//!
//! ## Features
//!
//! - **Connection lifecycle**: connect/handshake/reconnect state machine
//!   with a bounded attempt limit and a connection timeout
//! - **Transaction broker**: correlates out-of-order replies by transaction
//!   id and expected reply kind
//! - **Keepalive**: periodic liveness probes that escalate into a
//!   disconnect when the session stops answering
//! - **Plugin multiplexing**: server-pushed events routed to the plugin
//!   bound to their handle id
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use janus_session::{ClientConfig, ConnectionEvent, JanusClient, WsTransport};
//!
//! # async fn example() -> Result<(), janus_session::ClientError> {
//! let mut config = ClientConfig::new("ws://127.0.0.1:8188/");
//! config.reconnect = true;
//!
//! let client = JanusClient::new(config, Arc::new(WsTransport));
//! let mut events = client.events();
//! client.connect().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         ConnectionEvent::Open => {
//!             println!("session established: {:?}", client.session_id().await);
//!         }
//!         ConnectionEvent::Close => println!("connection dropped"),
//!         ConnectionEvent::ConnectError => break,
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod broker;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
mod keepalive;
pub mod plugin;
pub mod registry;
mod router;
pub mod transport;
pub mod ws;

// Re-export main types
pub use broker::{LookupMiss, Reply, TransactionBroker};
pub use client::{ConnectionPhase, JanusClient};
pub use config::ClientConfig;
pub use error::ClientError;
pub use event::ConnectionEvent;
pub use plugin::{AttachPayload, Plugin, PluginContext};
pub use registry::HandleRegistry;
pub use transport::{
    Transport, TransportConnection, TransportError, TransportEvent, JANUS_PROTOCOL,
};
pub use ws::WsTransport;
