//! Transaction correlation between outbound requests and inbound replies.
//!
//! Replies are matched by transaction id *and* expected reply kind: one
//! id's lifecycle can legitimately produce different frame kinds at
//! different protocol stages (an immediate `ack` followed by the
//! substantive `success` or `event`), and the filter keeps the
//! acknowledgment from prematurely resolving a caller awaiting the
//! substantive result.

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use janus_wire::{InboundFrame, MessageKind, ReplyKind, TransactionId};

use crate::error::ClientError;

/// A resolved transaction outcome.
#[derive(Debug)]
pub enum Reply {
    /// The raw reply frame.
    Frame(InboundFrame),
    /// A plugin-scoped success reply, reshaped to its data body plus the
    /// frame it was carried in.
    Plugin {
        /// The plugin-provided data body.
        data: Value,
        /// The full frame.
        frame: InboundFrame,
    },
}

impl Reply {
    /// The frame behind this outcome.
    pub fn frame(&self) -> &InboundFrame {
        match self {
            Reply::Frame(frame) | Reply::Plugin { frame, .. } => frame,
        }
    }

    /// Consume the outcome, keeping only the frame.
    pub fn into_frame(self) -> InboundFrame {
        match self {
            Reply::Frame(frame) | Reply::Plugin { frame, .. } => frame,
        }
    }
}

/// Why a kind-filtered lookup produced no match.
///
/// The router treats both cases identically (the frame is simply not for
/// that transaction); the distinction exists for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMiss {
    /// No pending transaction with that id.
    Absent,
    /// A pending transaction exists but expects a different reply kind.
    KindMismatch,
}

pub(crate) type ReplySender = oneshot::Sender<Result<Reply, ClientError>>;

struct Pending {
    reply: ReplyKind,
    sender: ReplySender,
    /// Retained for diagnostic logging when the gateway answers with an
    /// error frame.
    request: Option<Value>,
}

/// Pending request/reply correlations keyed by transaction id.
///
/// Entries live from registration until the moment they resolve, reject, or
/// are discarded; a second resolution for the same id is a no-op because
/// the entry is already gone.
#[derive(Default)]
pub struct TransactionBroker {
    pending: DashMap<TransactionId, Pending>,
}

impl TransactionBroker {
    /// An empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly sent request until a matching reply arrives.
    pub(crate) fn register(
        &self,
        id: TransactionId,
        reply: ReplyKind,
        sender: ReplySender,
        request: Option<Value>,
    ) {
        drop(self.pending.insert(
            id,
            Pending {
                reply,
                sender,
                request,
            },
        ));
    }

    /// Check whether `id` is pending and, when `filter` is given, whether
    /// the pending entry's expected reply kind matches it exactly.
    pub fn lookup(&self, id: &TransactionId, filter: Option<MessageKind>) -> Result<(), LookupMiss> {
        match self.pending.get(id) {
            None => Err(LookupMiss::Absent),
            Some(entry) => match filter {
                Some(kind) if !entry.reply.matches(kind) => Err(LookupMiss::KindMismatch),
                _ => Ok(()),
            },
        }
    }

    /// Resolve `id` with `reply` and remove it. No-op when the entry is
    /// already gone.
    pub(crate) fn resolve(&self, id: &TransactionId, reply: Reply) {
        if let Some((_, pending)) = self.pending.remove(id) {
            if pending.sender.send(Ok(reply)).is_err() {
                debug!(transaction = %id, "reply arrived but the caller is gone");
            }
        }
    }

    /// Reject `id` with `error` and remove it. No-op when the entry is
    /// already gone.
    pub(crate) fn reject(&self, id: &TransactionId, error: ClientError) {
        if let Some((_, pending)) = self.pending.remove(id) {
            if let Some(request) = &pending.request {
                debug!(transaction = %id, request = %request, "rejecting transaction: {error}");
            }
            let _ = pending.sender.send(Err(error));
        }
    }

    /// Drop a pending entry without firing its continuation. Used when the
    /// caller's own deadline elapsed.
    pub(crate) fn discard(&self, id: &TransactionId) {
        drop(self.pending.remove(id));
    }

    /// Number of in-flight transactions.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::oneshot;

    fn frame(kind: &str) -> InboundFrame {
        serde_json::from_value(json!({"janus": kind, "transaction": "t"})).unwrap()
    }

    #[tokio::test]
    async fn resolve_is_at_most_once() {
        let broker = TransactionBroker::new();
        let id = TransactionId::from("t");
        let (tx, rx) = oneshot::channel();
        broker.register(id.clone(), ReplyKind::Success, tx, None);

        broker.resolve(&id, Reply::Frame(frame("success")));
        assert!(broker.is_empty());
        assert!(rx.await.unwrap().is_ok());

        // A second frame with the same id has no pending entry to hit.
        assert_eq!(broker.lookup(&id, None), Err(LookupMiss::Absent));
        broker.resolve(&id, Reply::Frame(frame("success")));
    }

    #[tokio::test]
    async fn kind_filter_is_exact() {
        let broker = TransactionBroker::new();
        let id = TransactionId::from("t");
        let (tx, mut rx) = oneshot::channel();
        broker.register(id.clone(), ReplyKind::Success, tx, None);

        // An ack must not satisfy a transaction awaiting success.
        assert_eq!(
            broker.lookup(&id, Some(MessageKind::Ack)),
            Err(LookupMiss::KindMismatch)
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(broker.len(), 1);

        assert!(broker.lookup(&id, Some(MessageKind::Success)).is_ok());
        // No filter matches any pending entry (the error path).
        assert!(broker.lookup(&id, None).is_ok());
    }

    #[tokio::test]
    async fn reject_fires_the_error_continuation() {
        let broker = TransactionBroker::new();
        let id = TransactionId::from("t");
        let (tx, rx) = oneshot::channel();
        broker.register(
            id.clone(),
            ReplyKind::Success,
            tx,
            Some(json!({"janus": "attach", "transaction": "t"})),
        );

        broker.reject(&id, ClientError::NotConnected);
        assert!(broker.is_empty());
        assert!(matches!(rx.await.unwrap(), Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn discard_drops_without_firing() {
        let broker = TransactionBroker::new();
        let id = TransactionId::from("t");
        let (tx, mut rx) = oneshot::channel();
        broker.register(id.clone(), ReplyKind::Ack, tx, None);

        broker.discard(&id);
        assert!(broker.is_empty());
        // The sender was dropped, not fired.
        assert!(matches!(
            rx.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }
}
