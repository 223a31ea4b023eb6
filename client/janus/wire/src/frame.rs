//! Inbound frame model and message-kind classification.
//!
//! Inbound frames are parsed leniently: every kind-specific field is
//! optional, unknown fields are retained, and classification happens after
//! parsing via [`MessageKind::parse`]. Frames with an unrecognized `janus`
//! kind are still valid and are passed through as generic named events.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::GatewayError;
use crate::request::TransactionId;

/// Closed set of inbound message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// The gateway timed the session out.
    Timeout,
    /// Immediate acknowledgment of a request.
    Ack,
    /// Substantive success reply to a request.
    Success,
    /// The PeerConnection for a handle came up.
    WebrtcUp,
    /// The PeerConnection for a handle was hung up.
    Hangup,
    /// A handle was detached gateway-side.
    Detached,
    /// Media started or stopped flowing for a handle.
    Media,
    /// The gateway reported uplink trouble for a handle.
    SlowLink,
    /// The gateway rejected a request.
    Error,
    /// A plugin-originated event for a handle.
    Event,
}

impl MessageKind {
    /// Classify a wire-level kind discriminator; `None` for unrecognized
    /// kinds, which the router forwards as generic named events.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "timeout" => Some(MessageKind::Timeout),
            "ack" => Some(MessageKind::Ack),
            "success" => Some(MessageKind::Success),
            "webrtcup" => Some(MessageKind::WebrtcUp),
            "hangup" => Some(MessageKind::Hangup),
            "detached" => Some(MessageKind::Detached),
            "media" => Some(MessageKind::Media),
            "slowlink" => Some(MessageKind::SlowLink),
            "error" => Some(MessageKind::Error),
            "event" => Some(MessageKind::Event),
            _ => None,
        }
    }

    /// The wire-level name of this kind.
    pub fn as_wire(self) -> &'static str {
        match self {
            MessageKind::Timeout => "timeout",
            MessageKind::Ack => "ack",
            MessageKind::Success => "success",
            MessageKind::WebrtcUp => "webrtcup",
            MessageKind::Hangup => "hangup",
            MessageKind::Detached => "detached",
            MessageKind::Media => "media",
            MessageKind::SlowLink => "slowlink",
            MessageKind::Error => "error",
            MessageKind::Event => "event",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Plugin-scoped payload carried by `success` and `event` frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginData {
    /// Gateway-side plugin package name.
    #[serde(default)]
    pub plugin: String,
    /// The plugin-provided data body.
    #[serde(default)]
    pub data: Value,
}

/// One inbound frame from the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundFrame {
    /// Raw kind discriminator.
    pub janus: String,
    /// Correlation id of the request this frame answers, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionId>,
    /// Session the frame belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,
    /// Handle id the frame originates from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<u64>,
    /// Session-level data body (e.g. the assigned id on `create`/`attach`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Plugin-scoped data body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugindata: Option<PluginData>,
    /// Error object on `error` frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<GatewayError>,
    /// Hangup reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Slow-link direction flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uplink: Option<bool>,
    /// Slow-link NACK count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nacks: Option<u32>,
    /// Medium kind on `media` frames.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Whether the medium is flowing, on `media` frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiving: Option<bool>,
    /// Session description attached to `event` frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsep: Option<Value>,
    /// Plugin-level error code on `event` frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    /// Fields this model does not know about, preserved for pass-through.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl InboundFrame {
    /// Classified kind; `None` for unrecognized discriminators.
    pub fn kind(&self) -> Option<MessageKind> {
        MessageKind::parse(&self.janus)
    }

    /// The gateway-assigned identifier inside `data`, as returned by
    /// `create` and `attach` success replies.
    pub fn data_id(&self) -> Option<u64> {
        self.data.as_ref()?.get("id")?.as_u64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_kinds() {
        for (wire, kind) in [
            ("timeout", MessageKind::Timeout),
            ("ack", MessageKind::Ack),
            ("success", MessageKind::Success),
            ("webrtcup", MessageKind::WebrtcUp),
            ("hangup", MessageKind::Hangup),
            ("detached", MessageKind::Detached),
            ("media", MessageKind::Media),
            ("slowlink", MessageKind::SlowLink),
            ("error", MessageKind::Error),
            ("event", MessageKind::Event),
        ] {
            assert_eq!(MessageKind::parse(wire), Some(kind));
            assert_eq!(kind.as_wire(), wire);
        }
        assert_eq!(MessageKind::parse("trickle_response"), None);
    }

    #[test]
    fn parses_create_success() {
        let frame: InboundFrame = serde_json::from_str(
            r#"{"janus": "success", "transaction": "abc", "data": {"id": 8437152999}}"#,
        )
        .unwrap();
        assert_eq!(frame.kind(), Some(MessageKind::Success));
        assert_eq!(frame.transaction.as_ref().map(|t| t.as_str()), Some("abc"));
        assert_eq!(frame.data_id(), Some(8437152999));
    }

    #[test]
    fn parses_plugin_event() {
        let frame: InboundFrame = serde_json::from_str(
            r#"{
                "janus": "event",
                "session_id": 1,
                "sender": 7,
                "plugindata": {
                    "plugin": "janus.plugin.streaming",
                    "data": {"streaming": "event", "result": {"status": "started"}}
                },
                "jsep": {"type": "offer", "sdp": "v=0"}
            }"#,
        )
        .unwrap();
        assert_eq!(frame.kind(), Some(MessageKind::Event));
        assert_eq!(frame.sender, Some(7));
        let plugindata = frame.plugindata.unwrap();
        assert_eq!(plugindata.plugin, "janus.plugin.streaming");
        assert_eq!(plugindata.data["result"]["status"], "started");
        assert!(frame.jsep.is_some());
    }

    #[test]
    fn parses_hangup_and_slowlink_fields() {
        let frame: InboundFrame = serde_json::from_str(
            r#"{"janus": "hangup", "sender": 3, "reason": "Close PC"}"#,
        )
        .unwrap();
        assert_eq!(frame.kind(), Some(MessageKind::Hangup));
        assert_eq!(frame.reason.as_deref(), Some("Close PC"));

        let frame: InboundFrame = serde_json::from_str(
            r#"{"janus": "slowlink", "sender": 3, "uplink": true, "nacks": 12, "lost": 4}"#,
        )
        .unwrap();
        assert_eq!(frame.uplink, Some(true));
        assert_eq!(frame.nacks, Some(12));
        // Fields outside the model survive the round trip.
        assert_eq!(frame.extra["lost"], 4);
    }

    #[test]
    fn unknown_kind_is_still_a_frame() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"janus": "announcement", "text": "hi"}"#).unwrap();
        assert_eq!(frame.kind(), None);
        assert_eq!(frame.janus, "announcement");
        assert_eq!(frame.extra["text"], "hi");
    }

    #[test]
    fn rejects_non_object_frames() {
        assert!(serde_json::from_str::<InboundFrame>("[1, 2]").is_err());
        assert!(serde_json::from_str::<InboundFrame>("not json").is_err());
        assert!(serde_json::from_str::<InboundFrame>(r#"{"no_kind": true}"#).is_err());
    }
}
