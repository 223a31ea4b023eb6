//! JSON frame model and request builders for the Janus signaling protocol.
//!
//! Every message exchanged with the gateway is a single JSON object tagged
//! with a `janus` kind discriminator. This crate provides the inbound frame
//! model, the closed kind sets for inbound and outbound traffic, and the
//! outbound request builder used by the session engine.
//!
//! ## Wire format
//!
//! ```text
//! request:  { "janus": "<kind>", "transaction": "<uuid>",
//!             "session_id": <u64>?, ...payload }
//! reply:    { "janus": "<kind>", "transaction": "<uuid>"?,
//!             "session_id": <u64>?, "sender": <u64>?, ... }
//! ```
//!
//! Requests carry a client-generated `transaction` correlation id; replies
//! scoped to a plugin handle carry `sender`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod frame;
pub mod request;

// Re-export main types
pub use error::{is_teardown_race, GatewayError, WireError, ERROR_HANDLE_NOT_FOUND, ERROR_SESSION_NOT_FOUND};
pub use frame::{InboundFrame, MessageKind, PluginData};
pub use request::{build_request, ReplyKind, RequestKind, TransactionId};
