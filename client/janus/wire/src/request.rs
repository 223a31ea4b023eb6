//! Outbound request construction.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::error::WireError;
use crate::frame::MessageKind;

/// Client-generated correlation id pairing one request with its reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// A fresh process-unique id.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Closed set of outbound request kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Establish a gateway session.
    Create,
    /// Attach a plugin, allocating a handle.
    Attach,
    /// Detach a plugin handle.
    Detach,
    /// Destroy the gateway session.
    Destroy,
    /// Plugin-scoped message for an attached handle.
    Message,
    /// Trickle an ICE candidate to a handle.
    Trickle,
    /// Session liveness probe.
    KeepAlive,
}

impl RequestKind {
    /// The wire-level name of this kind.
    pub fn as_wire(self) -> &'static str {
        match self {
            RequestKind::Create => "create",
            RequestKind::Attach => "attach",
            RequestKind::Detach => "detach",
            RequestKind::Destroy => "destroy",
            RequestKind::Message => "message",
            RequestKind::Trickle => "trickle",
            RequestKind::KeepAlive => "keepalive",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// The reply kind a transaction resolves on. Matching is exact; there is no
/// wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Resolve on the immediate acknowledgment.
    Ack,
    /// Resolve on the substantive success reply.
    Success,
    /// Resolve on a plugin event.
    Event,
}

impl ReplyKind {
    /// Whether an inbound frame of `kind` satisfies this expectation.
    pub fn matches(self, kind: MessageKind) -> bool {
        matches!(
            (self, kind),
            (ReplyKind::Ack, MessageKind::Ack)
                | (ReplyKind::Success, MessageKind::Success)
                | (ReplyKind::Event, MessageKind::Event)
        )
    }

    /// The wire-level name of the expected kind.
    pub fn as_wire(self) -> &'static str {
        match self {
            ReplyKind::Ack => "ack",
            ReplyKind::Success => "success",
            ReplyKind::Event => "event",
        }
    }
}

/// Build one outbound request frame.
///
/// The payload's own fields are kept as-is; a `session_id` already present
/// in the payload wins over `session_id`. The `janus` and `transaction`
/// fields always come from `kind` and `transaction`.
pub fn build_request(
    kind: RequestKind,
    transaction: &TransactionId,
    session_id: Option<u64>,
    payload: Option<Value>,
) -> Result<Value, WireError> {
    let mut request = match payload {
        Some(Value::Object(map)) => map,
        Some(_) => return Err(WireError::PayloadNotObject),
        None => Map::new(),
    };
    if !request.contains_key("session_id") {
        if let Some(session_id) = session_id {
            request.insert("session_id".to_owned(), session_id.into());
        }
    }
    request.insert("janus".to_owned(), kind.as_wire().into());
    request.insert("transaction".to_owned(), transaction.as_str().into());
    Ok(Value::Object(request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transaction_ids_are_unique() {
        assert_ne!(TransactionId::random(), TransactionId::random());
    }

    #[test]
    fn builds_bare_request() {
        let id = TransactionId::from("t-1");
        let request = build_request(RequestKind::Create, &id, None, None).unwrap();
        assert_eq!(request, json!({"janus": "create", "transaction": "t-1"}));
    }

    #[test]
    fn merges_session_id_and_payload() {
        let id = TransactionId::from("t-2");
        let payload = json!({"plugin": "janus.plugin.streaming", "opaque_id": "abc"});
        let request = build_request(RequestKind::Attach, &id, Some(99), Some(payload)).unwrap();
        assert_eq!(request["janus"], "attach");
        assert_eq!(request["session_id"], 99);
        assert_eq!(request["plugin"], "janus.plugin.streaming");
        assert_eq!(request["opaque_id"], "abc");
    }

    #[test]
    fn payload_session_id_wins() {
        let id = TransactionId::from("t-3");
        let payload = json!({"session_id": 7});
        let request = build_request(RequestKind::Message, &id, Some(99), Some(payload)).unwrap();
        assert_eq!(request["session_id"], 7);
    }

    #[test]
    fn rejects_non_object_payload() {
        let id = TransactionId::from("t-4");
        let result = build_request(RequestKind::Message, &id, None, Some(json!([1, 2])));
        assert!(matches!(result, Err(WireError::PayloadNotObject)));
    }

    #[test]
    fn reply_kind_matching_is_exact() {
        assert!(ReplyKind::Ack.matches(MessageKind::Ack));
        assert!(!ReplyKind::Success.matches(MessageKind::Ack));
        assert!(!ReplyKind::Ack.matches(MessageKind::Success));
        assert!(ReplyKind::Event.matches(MessageKind::Event));
        assert!(!ReplyKind::Event.matches(MessageKind::Error));
    }
}
