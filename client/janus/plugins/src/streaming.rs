//! Control surface for the gateway's streaming plugin.
//!
//! Wraps the engine's plugin contract with typed requests for mountpoint
//! management and playback control. Media itself never flows through here;
//! this is signaling only.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use janus_session::{AttachPayload, ClientError, Plugin, PluginContext, Reply};
use janus_wire::{InboundFrame, ReplyKind, RequestKind};

use crate::sdp;

/// Gateway-side package name of the streaming plugin.
pub const STREAMING_PLUGIN: &str = "janus.plugin.streaming";

/// Capacity of the streaming-event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Events surfaced by a [`StreamingPlugin`].
#[derive(Debug, Clone)]
pub enum StreamingEvent {
    /// Attach completed; the plugin is bound to this handle id.
    Attached(u64),
    /// The gateway reported a playback status change
    /// (`preparing`/`starting`/`started`/...).
    StatusChange(String),
    /// The gateway produced a session description.
    Jsep(Value),
    /// PeerConnection state changed.
    WebrtcState {
        /// Whether the PeerConnection is up.
        up: bool,
        /// Reason accompanying a teardown, if any.
        reason: Option<String>,
    },
    /// Media started or stopped flowing.
    MediaState {
        /// The medium kind (`audio`/`video`).
        medium: String,
        /// Whether the gateway is receiving it.
        receiving: bool,
    },
    /// The gateway reported uplink trouble.
    SlowLink {
        /// Whether the uplink direction is affected.
        uplink: bool,
        /// NACK count over the reporting window.
        nacks: u32,
    },
    /// The handle was detached.
    Detached,
}

/// Errors from streaming-plugin requests.
#[derive(Debug, thiserror::Error)]
pub enum StreamingError {
    /// The underlying transaction failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The gateway accepted the request but the plugin reported an error.
    #[error("streaming request failed with code {0}")]
    Request(i64),

    /// A watch answer arrived without a session description.
    #[error("watch answer carried no jsep")]
    MissingJsep,

    /// The plugin is not attached to a gateway handle.
    #[error("streaming plugin is not attached")]
    NotAttached,
}

/// Parameters for creating a mountpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateStreamParams {
    /// Requested mountpoint id; the gateway picks one when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Mountpoint name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Mountpoint description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the mountpoint carries audio.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<bool>,
    /// Whether the mountpoint carries video.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<bool>,
    /// Hide the mountpoint from `list`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
    /// PIN required to watch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pin: Option<u64>,
    /// Secret required to manage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    /// Persist the mountpoint in the gateway configuration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permanent: Option<bool>,
}

/// Client-side control surface for `janus.plugin.streaming`.
///
/// Construct, attach via `JanusClient::add_plugin`, then drive mountpoints
/// through the request methods; server-pushed state arrives on
/// [`StreamingPlugin::events`].
pub struct StreamingPlugin {
    opaque_id: String,
    filter_direct_candidates: bool,
    context: Mutex<Option<PluginContext>>,
    events: broadcast::Sender<StreamingEvent>,
}

impl StreamingPlugin {
    /// A detached plugin instance.
    pub fn new() -> Arc<Self> {
        Self::with_options(false)
    }

    /// A detached plugin instance; `filter_direct_candidates` strips
    /// host/srflx ICE candidates from gateway SDP and outgoing trickles.
    pub fn with_options(filter_direct_candidates: bool) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            opaque_id: Uuid::new_v4().to_string(),
            filter_direct_candidates,
            context: Mutex::new(None),
            events,
        })
    }

    /// Subscribe to streaming events.
    pub fn events(&self) -> broadcast::Receiver<StreamingEvent> {
        self.events.subscribe()
    }

    fn context(&self) -> Result<PluginContext, StreamingError> {
        self.context
            .lock()
            .expect("context lock poisoned")
            .clone()
            .ok_or(StreamingError::NotAttached)
    }

    fn emit(&self, event: StreamingEvent) {
        let _ = self.events.send(event);
    }

    fn emit_status(&self, data: Option<&Value>) {
        let status = data
            .and_then(|data| data.get("result"))
            .and_then(|result| result.get("status"))
            .and_then(Value::as_str);
        if let Some(status) = status {
            self.emit(StreamingEvent::StatusChange(status.to_owned()));
        }
    }

    async fn request(&self, body: Value, reply: ReplyKind) -> Result<Reply, StreamingError> {
        let context = self.context()?;
        Ok(context
            .transaction(RequestKind::Message, reply, Some(json!({ "body": body })))
            .await?)
    }

    /// Create a mountpoint; resolves with the plugin's data body.
    pub async fn create(&self, params: CreateStreamParams) -> Result<Value, StreamingError> {
        let mut body = serde_json::to_value(&params).unwrap_or_else(|_| json!({}));
        body["request"] = "create".into();
        let reply = self.request(body, ReplyKind::Success).await?;
        let Reply::Plugin { data, .. } = reply else {
            return Ok(Value::Null);
        };
        if let Some(code) = data.get("error_code").and_then(Value::as_i64) {
            warn!(code, "cannot create mountpoint");
            return Err(StreamingError::Request(code));
        }
        Ok(data)
    }

    /// Destroy mountpoint `id`.
    pub async fn destroy(&self, id: u64, permanent: bool) -> Result<(), StreamingError> {
        let body = json!({ "request": "destroy", "id": id, "permanent": permanent });
        let reply = self.request(body, ReplyKind::Success).await?;
        if let Reply::Plugin { data, .. } = reply {
            if let Some(code) = data.get("error_code").and_then(Value::as_i64) {
                warn!(code, id, "cannot destroy mountpoint");
                return Err(StreamingError::Request(code));
            }
        }
        Ok(())
    }

    /// List the mountpoints visible to this handle.
    pub async fn list(&self) -> Result<Vec<Value>, StreamingError> {
        let reply = self.request(json!({ "request": "list" }), ReplyKind::Success).await?;
        let Reply::Plugin { data, .. } = reply else {
            return Ok(Vec::new());
        };
        Ok(data
            .get("list")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Ask for details on mountpoint `id`.
    pub async fn info(&self, id: u64) -> Result<Value, StreamingError> {
        let reply = self
            .request(json!({ "request": "info", "id": id }), ReplyKind::Success)
            .await?;
        match reply {
            Reply::Plugin { data, .. } => Ok(data),
            Reply::Frame(_) => Ok(Value::Null),
        }
    }

    /// Start watching mountpoint `id`; resolves with the gateway's offer.
    pub async fn watch(&self, id: u64) -> Result<Value, StreamingError> {
        let reply = self
            .request(json!({ "request": "watch", "id": id }), ReplyKind::Event)
            .await?;
        let frame = reply.into_frame();
        self.emit_status(frame.plugindata.as_ref().map(|plugindata| &plugindata.data));

        let Some(mut jsep) = frame.jsep else {
            return Err(StreamingError::MissingJsep);
        };
        if self.filter_direct_candidates {
            if let Some(text) = jsep.get("sdp").and_then(Value::as_str) {
                jsep["sdp"] = Value::String(sdp::filter_direct_candidates(text, false));
            }
        }
        self.emit(StreamingEvent::Jsep(jsep.clone()));
        Ok(jsep)
    }

    /// Start playback, optionally answering with `jsep`.
    pub async fn start(&self, jsep: Option<Value>) -> Result<InboundFrame, StreamingError> {
        self.play_state("start", jsep).await
    }

    /// Stop playback.
    pub async fn stop(&self) -> Result<InboundFrame, StreamingError> {
        self.play_state("stop", None).await
    }

    /// Pause playback.
    pub async fn pause(&self) -> Result<InboundFrame, StreamingError> {
        self.play_state("pause", None).await
    }

    /// Switch this viewer to mountpoint `id` without renegotiating.
    pub async fn switch_to(&self, id: u64) -> Result<(), StreamingError> {
        let reply = self
            .request(json!({ "request": "switch", "id": id }), ReplyKind::Success)
            .await?;
        if let Reply::Plugin { data, .. } = reply {
            if let Some(code) = data.get("error_code").and_then(Value::as_i64) {
                warn!(code, id, "cannot switch mountpoint");
                return Err(StreamingError::Request(code));
            }
        }
        Ok(())
    }

    /// Trickle one local ICE candidate to the gateway.
    pub async fn trickle(&self, candidate: Value) -> Result<(), StreamingError> {
        if self.filter_direct_candidates {
            if let Some(line) = candidate.get("candidate").and_then(Value::as_str) {
                if sdp::is_direct_candidate(line) {
                    debug!("suppressing direct candidate");
                    return Ok(());
                }
            }
        }
        let context = self.context()?;
        drop(
            context
                .transaction(
                    RequestKind::Trickle,
                    ReplyKind::Ack,
                    Some(json!({ "candidate": candidate })),
                )
                .await?,
        );
        Ok(())
    }

    /// Signal the end of trickling.
    pub async fn trickle_complete(&self) -> Result<(), StreamingError> {
        let context = self.context()?;
        drop(
            context
                .transaction(
                    RequestKind::Trickle,
                    ReplyKind::Ack,
                    Some(json!({ "candidate": { "completed": true } })),
                )
                .await?,
        );
        Ok(())
    }

    async fn play_state(
        &self,
        request: &str,
        jsep: Option<Value>,
    ) -> Result<InboundFrame, StreamingError> {
        let context = self.context()?;
        let mut payload = json!({ "body": { "request": request } });
        if let Some(jsep) = jsep {
            payload["jsep"] = jsep;
        }
        let reply = context
            .transaction(RequestKind::Message, ReplyKind::Event, Some(payload))
            .await?;
        let frame = reply.into_frame();
        self.emit_status(frame.plugindata.as_ref().map(|plugindata| &plugindata.data));
        Ok(frame)
    }
}

#[async_trait]
impl Plugin for StreamingPlugin {
    fn attach_payload(&self) -> AttachPayload {
        AttachPayload {
            plugin: STREAMING_PLUGIN.to_owned(),
            opaque_id: self.opaque_id.clone(),
        }
    }

    fn handle_id(&self) -> Option<u64> {
        self.context
            .lock()
            .expect("context lock poisoned")
            .as_ref()
            .map(PluginContext::handle_id)
    }

    fn attached(&self, context: PluginContext) {
        let handle_id = context.handle_id();
        *self.context.lock().expect("context lock poisoned") = Some(context);
        self.emit(StreamingEvent::Attached(handle_id));
    }

    fn error(&self, cause: &ClientError) {
        warn!("streaming plugin error: {cause}");
    }

    async fn on_message(&self, data: Value, frame: InboundFrame) {
        let is_status_event = data.get("streaming").and_then(Value::as_str) == Some("event")
            && data.pointer("/result/status").is_some();
        if is_status_event {
            self.emit_status(Some(&data));
        } else {
            debug!(sender = ?frame.sender, "unhandled streaming message: {data}");
        }
    }

    fn webrtc_state(&self, up: bool, reason: Option<&str>) {
        self.emit(StreamingEvent::WebrtcState {
            up,
            reason: reason.map(str::to_owned),
        });
    }

    fn media_state(&self, medium: &str, receiving: bool) {
        self.emit(StreamingEvent::MediaState {
            medium: medium.to_owned(),
            receiving,
        });
    }

    fn slow_link(&self, uplink: bool, nacks: u32) {
        self.emit(StreamingEvent::SlowLink { uplink, nacks });
    }

    fn detach(&self) {
        *self.context.lock().expect("context lock poisoned") = None;
        self.emit(StreamingEvent::Detached);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_params_skip_absent_fields() {
        let params = CreateStreamParams {
            id: Some(42),
            description: Some("camera".to_owned()),
            video: Some(true),
            ..CreateStreamParams::default()
        };
        let body = serde_json::to_value(&params).unwrap();
        assert_eq!(body, json!({"id": 42, "description": "camera", "video": true}));
    }

    #[test]
    fn attach_payload_names_the_streaming_plugin() {
        let plugin = StreamingPlugin::new();
        let payload = plugin.attach_payload();
        assert_eq!(payload.plugin, STREAMING_PLUGIN);
        assert!(!payload.opaque_id.is_empty());
        assert!(plugin.handle_id().is_none());
    }

    #[tokio::test]
    async fn requests_fail_cleanly_while_detached() {
        let plugin = StreamingPlugin::new();
        assert!(matches!(
            plugin.list().await,
            Err(StreamingError::NotAttached)
        ));
        assert!(matches!(
            plugin.watch(1).await,
            Err(StreamingError::NotAttached)
        ));
    }

    #[tokio::test]
    async fn status_events_reach_subscribers() {
        let plugin = StreamingPlugin::new();
        let mut events = plugin.events();
        let frame: InboundFrame = serde_json::from_value(json!({
            "janus": "event",
            "sender": 7,
            "plugindata": {"plugin": STREAMING_PLUGIN, "data": {}},
        }))
        .unwrap();
        plugin
            .on_message(
                json!({"streaming": "event", "result": {"status": "started"}}),
                frame,
            )
            .await;
        match events.try_recv() {
            Ok(StreamingEvent::StatusChange(status)) => assert_eq!(status, "started"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
