//! Protocol-specific request/response shims built on top of the session
//! engine, plus the stateless SDP text transforms they rely on.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod sdp;
pub mod streaming;

// Re-export main types
pub use streaming::{
    CreateStreamParams, StreamingError, StreamingEvent, StreamingPlugin, STREAMING_PLUGIN,
};
