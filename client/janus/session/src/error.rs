//! Error taxonomy for the session engine.

use std::time::Duration;
use thiserror::Error;

use janus_wire::{InboundFrame, WireError};

use crate::transport::TransportError;

/// Errors surfaced by [`crate::JanusClient`] operations.
///
/// Transaction-level failures are always local to the failing call; only
/// keepalive failure escalates into a full disconnect.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The engine is not connected to the gateway.
    #[error("gateway is not connected")]
    NotConnected,

    /// No matching reply arrived before the caller's deadline.
    #[error("transaction timed out after {0:?}")]
    TransactionTimeout(Duration),

    /// The gateway answered with an error frame.
    #[error("gateway error {code}: {reason}")]
    Gateway {
        /// Gateway error code.
        code: i64,
        /// Gateway-provided reason, empty when absent.
        reason: String,
        /// The full error frame.
        frame: Box<InboundFrame>,
    },

    /// An event frame carried a plugin-level error code.
    #[error("plugin error {code}")]
    PluginEvent {
        /// Plugin-level error code.
        code: i64,
        /// The full event frame.
        frame: Box<InboundFrame>,
    },

    /// The connection dropped while the operation was outstanding.
    #[error("connection dropped")]
    ConnectionDropped,

    /// The plugin has no bound handle in the registry.
    #[error("plugin is not attached")]
    NotAttached,

    /// A gateway success reply was missing the assigned identifier.
    #[error("gateway reply carried no identifier")]
    MissingId,

    /// Transport-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Frame-level failure.
    #[error(transparent)]
    Wire(#[from] WireError),
}
