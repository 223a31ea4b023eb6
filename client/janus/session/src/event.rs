//! Typed connection-lifecycle notifications.

use janus_wire::InboundFrame;

/// Notifications delivered on the engine's broadcast channel.
///
/// Every current subscriber receives every event. The channel does not
/// replay: subscribe before calling `connect()` to observe the attempt's
/// outcome.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The transport is open and, when session establishment is enabled,
    /// the gateway session is established.
    Open,
    /// The connection dropped (close, error, or a timed-out attempt).
    Close,
    /// The gateway declared the current session timed out.
    Timeout,
    /// Automatic reconnection exceeded the attempt limit; no further
    /// attempts happen until `connect()` is called again.
    ConnectError,
    /// A frame of an unrecognized kind, passed through by name.
    Generic {
        /// The frame's raw kind discriminator.
        kind: String,
        /// The full frame.
        frame: InboundFrame,
    },
}
