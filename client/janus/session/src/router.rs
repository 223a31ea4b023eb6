//! Inbound frame classification and dispatch.
//!
//! Every frame is classified by its `janus` kind and dispatched to the
//! transaction broker, the plugin bound to its `sender` handle, or the
//! engine's event channel. The router never raises for bad input: a noisy
//! transport must not take the engine down.

use std::sync::Arc;
use tracing::{debug, warn};

use janus_wire::{is_teardown_race, InboundFrame, MessageKind};

use crate::broker::Reply;
use crate::client::JanusClient;
use crate::error::ClientError;
use crate::event::ConnectionEvent;
use crate::plugin::Plugin;

pub(crate) async fn route_frame(client: &JanusClient, raw: &str) {
    let frame: InboundFrame = match serde_json::from_str(raw) {
        Ok(frame) => frame,
        Err(error) => {
            debug!("discarding unparseable frame: {error}");
            return;
        }
    };

    let Some(kind) = frame.kind() else {
        let kind = frame.janus.clone();
        debug!(%kind, "passing through frame of unrecognized kind");
        client.emit(ConnectionEvent::Generic { kind, frame });
        return;
    };

    match kind {
        MessageKind::Timeout => on_timeout(client, frame).await,
        MessageKind::Ack => on_ack(client, frame),
        MessageKind::Success => on_success(client, frame),
        MessageKind::WebrtcUp => {
            if let Some(plugin) = sender_plugin(client, &frame) {
                plugin.webrtc_state(true, None);
            }
        }
        MessageKind::Hangup => {
            if let Some(plugin) = sender_plugin(client, &frame) {
                plugin.hangup(frame.reason.as_deref());
            }
        }
        MessageKind::Media => {
            if let Some(plugin) = sender_plugin(client, &frame) {
                let medium = frame.media_type.as_deref().unwrap_or_default();
                plugin.media_state(medium, frame.receiving.unwrap_or(false));
            }
        }
        MessageKind::SlowLink => {
            debug!(
                session = ?frame.session_id,
                nacks = frame.nacks.unwrap_or(0),
                "slow link reported"
            );
            if let Some(plugin) = sender_plugin(client, &frame) {
                plugin.slow_link(frame.uplink.unwrap_or(false), frame.nacks.unwrap_or(0));
            }
        }
        MessageKind::Detached => {
            // Gateway-side handle teardown; binding release happens on the
            // detach reply, so the sender check is all that is done here.
            if frame.sender.is_none() {
                debug!("detached frame without sender");
            }
        }
        MessageKind::Error => on_error(client, frame),
        MessageKind::Event => on_event(client, frame).await,
    }
}

/// The plugin a handle-scoped frame belongs to. Frames without a `sender`,
/// or for a handle that is not attached, are dropped and logged.
fn sender_plugin(client: &JanusClient, frame: &InboundFrame) -> Option<Arc<dyn Plugin>> {
    let Some(sender) = frame.sender else {
        debug!(kind = %frame.janus, "frame without sender");
        return None;
    };
    match client.registry().lookup(sender) {
        Some(plugin) => Some(plugin),
        None => {
            debug!(sender, "frame for a handle that is not attached to this session");
            None
        }
    }
}

async fn on_timeout(client: &JanusClient, frame: InboundFrame) {
    // Stale cross-session noise: only the current session's timeout counts.
    if frame.session_id != client.session_id().await {
        debug!(session = ?frame.session_id, "ignoring timeout for another session");
        return;
    }
    client.emit(ConnectionEvent::Timeout);
}

fn on_ack(client: &JanusClient, frame: InboundFrame) {
    let Some(id) = frame.transaction.clone() else {
        return;
    };
    if client.broker().lookup(&id, Some(MessageKind::Ack)).is_err() {
        return;
    }
    client.broker().resolve(&id, Reply::Frame(frame));
}

fn on_success(client: &JanusClient, frame: InboundFrame) {
    let Some(id) = frame.transaction.clone() else {
        return;
    };
    if client
        .broker()
        .lookup(&id, Some(MessageKind::Success))
        .is_err()
    {
        return;
    }

    let Some(plugindata) = frame.plugindata.clone() else {
        client.broker().resolve(&id, Reply::Frame(frame));
        return;
    };
    let Some(sender) = frame.sender else {
        debug!("success frame carries plugin data but no sender");
        client.broker().resolve(&id, Reply::Frame(frame));
        return;
    };
    if client.registry().lookup(sender).is_none() {
        // Without an attached handle the data cannot be attributed; leave
        // the transaction pending rather than resolve it with orphan data.
        debug!(sender, "dropping plugin success for a handle that is not attached");
        return;
    }
    client.broker().resolve(
        &id,
        Reply::Plugin {
            data: plugindata.data,
            frame,
        },
    );
}

fn on_error(client: &JanusClient, frame: InboundFrame) {
    let code = frame.error.as_ref().map(|error| error.code).unwrap_or(0);
    if code != 0 && !is_teardown_race(code) {
        warn!(
            code,
            reason = frame
                .error
                .as_ref()
                .and_then(|error| error.reason.as_deref())
                .unwrap_or_default(),
            "gateway error reply"
        );
    }
    let Some(id) = frame.transaction.clone() else {
        return;
    };
    // Error frames are not pre-declared, so the lookup skips the kind filter.
    let reason = frame
        .error
        .as_ref()
        .and_then(|error| error.reason.clone())
        .unwrap_or_default();
    client.broker().reject(
        &id,
        ClientError::Gateway {
            code,
            reason,
            frame: Box::new(frame),
        },
    );
}

async fn on_event(client: &JanusClient, frame: InboundFrame) {
    let Some(sender) = frame.sender else {
        debug!("event frame without sender");
        return;
    };
    let Some(plugindata) = frame.plugindata.clone() else {
        debug!("event frame without plugin data");
        return;
    };
    let Some(plugin) = client.registry().lookup(sender) else {
        debug!(sender, "event for a handle that is not attached to this session");
        return;
    };

    if let Some(id) = frame.transaction.clone() {
        if client.broker().lookup(&id, None).is_ok() {
            // A caller awaiting this specific event takes precedence over
            // the plugin's passive message handler.
            match frame.error_code {
                Some(code) => client.broker().reject(
                    &id,
                    ClientError::PluginEvent {
                        code,
                        frame: Box::new(frame),
                    },
                ),
                None => client.broker().resolve(&id, Reply::Frame(frame)),
            }
            return;
        }
    }
    plugin.on_message(plugindata.data, frame).await;
}
