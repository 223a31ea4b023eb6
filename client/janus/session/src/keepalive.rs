//! Keepalive watchdog for an established session.
//!
//! Issues a periodic `keepalive` transaction with a bounded timeout. A
//! missed acknowledgment means the session itself is no longer trustworthy,
//! so the watchdog escalates into a full disconnect and lets the
//! reconnection policy take over.

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use janus_wire::{ReplyKind, RequestKind};

use crate::client::JanusClient;

/// Spawn the watchdog for the connection generation `generation`.
///
/// The first probe goes out one interval after session establishment; each
/// acknowledged probe schedules the next. The task stops on its own when
/// the generation is superseded or the session ends, and is aborted by
/// `disconnect()`/`reset()`.
pub(crate) fn spawn(client: JanusClient, generation: u64) -> JoinHandle<()> {
    tokio::spawn(run(client, generation))
}

async fn run(client: JanusClient, generation: u64) {
    let interval = client.config().keep_alive_interval;
    let timeout = client.config().keep_alive_timeout;
    loop {
        tokio::time::sleep(interval).await;
        if !client.same_generation(generation) || !client.is_session_established().await {
            break;
        }
        let session = client.session_id().await;
        debug!(session = ?session, "sending keepalive");
        match client
            .transaction(RequestKind::KeepAlive, ReplyKind::Ack, None, Some(timeout))
            .await
        {
            Ok(_) => {}
            Err(error) => {
                warn!("keepalive failed, dropping connection: {error}");
                client.detach_keepalive_timer().await;
                client.disconnect().await;
                client.handle_drop().await;
                break;
            }
        }
    }
}
