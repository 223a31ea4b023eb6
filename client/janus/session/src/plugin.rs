//! Plugin base contract and the per-handle back-reference.
//!
//! The engine dispatches server-pushed events through this contract; the
//! concrete request/response shims (e.g. a streaming-control plugin) are
//! built on top of it in their own crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use janus_wire::{InboundFrame, ReplyKind, RequestKind, WireError};

use crate::broker::Reply;
use crate::client::JanusClient;
use crate::error::ClientError;

/// Body of an `attach` request: the gateway-side plugin package name plus a
/// caller-chosen opaque identifier the gateway echoes into its logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachPayload {
    /// Plugin package name, e.g. `janus.plugin.streaming`.
    pub plugin: String,
    /// Caller-chosen correlation identifier.
    pub opaque_id: String,
}

/// Contract a plugin implementation must satisfy to receive dispatched
/// events from the engine.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Attach-request body for this plugin.
    fn attach_payload(&self) -> AttachPayload;

    /// Currently bound gateway handle id, if attached.
    fn handle_id(&self) -> Option<u64>;

    /// Called after a successful attach with the back-reference the plugin
    /// needs to issue its own transactions.
    fn attached(&self, context: PluginContext);

    /// Called when an attach or detach transaction for this plugin fails.
    fn error(&self, _cause: &ClientError) {}

    /// A plugin-scoped event arrived with no caller awaiting it.
    async fn on_message(&self, data: Value, frame: InboundFrame);

    /// PeerConnection state pushed by the gateway.
    fn webrtc_state(&self, up: bool, reason: Option<&str>);

    /// The gateway hung the media session up.
    fn hangup(&self, reason: Option<&str>) {
        self.webrtc_state(false, reason);
    }

    /// Media started or stopped flowing for one medium.
    fn media_state(&self, medium: &str, receiving: bool);

    /// The gateway reported uplink trouble and NACK pressure.
    fn slow_link(&self, uplink: bool, nacks: u32);

    /// Teardown hook: the handle was released, clear internal references.
    fn detach(&self);
}

/// Back-reference handed to a plugin on successful attach.
///
/// Holds a cloned engine handle and the bound handle id; plugins never
/// touch the transport or the broker directly.
#[derive(Clone)]
pub struct PluginContext {
    client: JanusClient,
    handle_id: u64,
}

impl PluginContext {
    pub(crate) fn new(client: JanusClient, handle_id: u64) -> Self {
        Self { client, handle_id }
    }

    /// The gateway handle id this context is scoped to.
    pub fn handle_id(&self) -> u64 {
        self.handle_id
    }

    /// The engine this handle is attached to.
    pub fn client(&self) -> &JanusClient {
        &self.client
    }

    /// Issue a transaction with `handle_id` injected into the payload.
    pub async fn transaction(
        &self,
        kind: RequestKind,
        reply: ReplyKind,
        payload: Option<Value>,
    ) -> Result<Reply, ClientError> {
        let mut payload = match payload {
            Some(Value::Object(map)) => map,
            Some(_) => return Err(WireError::PayloadNotObject.into()),
            None => serde_json::Map::new(),
        };
        drop(payload.insert("handle_id".to_owned(), self.handle_id.into()));
        self.client
            .transaction(kind, reply, Some(Value::Object(payload)), None)
            .await
    }
}
