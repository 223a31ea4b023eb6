//! WebSocket transport backed by tokio-tungstenite.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::transport::{Transport, TransportConnection, TransportError, TransportEvent};

/// WebSocket [`Transport`] implementation.
///
/// Each [`Transport::open`] spawns one pump task that dials the gateway with
/// the requested subprotocol, reports `Opened`, and then shuttles frames in
/// both directions until the socket closes or fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

enum WsCommand {
    Send(String),
    Close,
}

struct WsConnection {
    commands: mpsc::UnboundedSender<WsCommand>,
}

impl Transport for WsTransport {
    fn open(
        &self,
        url: &str,
        subprotocol: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn TransportConnection>, TransportError> {
        let mut request = url
            .into_client_request()
            .map_err(|error| TransportError::Open(error.to_string()))?;
        let subprotocol = HeaderValue::from_str(subprotocol)
            .map_err(|error| TransportError::Open(error.to_string()))?;
        drop(
            request
                .headers_mut()
                .insert("Sec-WebSocket-Protocol", subprotocol),
        );

        let (commands, command_rx) = mpsc::unbounded_channel();
        drop(tokio::spawn(run_connection(request, events, command_rx)));
        Ok(Box::new(WsConnection { commands }))
    }
}

impl TransportConnection for WsConnection {
    fn send(&self, frame: String) -> Result<(), TransportError> {
        self.commands
            .send(WsCommand::Send(frame))
            .map_err(|_| TransportError::Send("connection task is gone".to_owned()))
    }

    fn close(&self) {
        let _ = self.commands.send(WsCommand::Close);
    }
}

async fn run_connection(
    request: Request,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut commands: mpsc::UnboundedReceiver<WsCommand>,
) {
    let (socket, _response) = match connect_async(request).await {
        Ok(pair) => pair,
        Err(error) => {
            let _ = events.send(TransportEvent::Errored(error.to_string()));
            return;
        }
    };
    let _ = events.send(TransportEvent::Opened);

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(WsCommand::Send(frame)) => {
                    if let Err(error) = sink.send(Message::Text(frame.into())).await {
                        let _ = events.send(TransportEvent::Errored(error.to_string()));
                        break;
                    }
                }
                Some(WsCommand::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(TransportEvent::Message(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|frame| frame.reason.as_str().to_owned());
                    let _ = events.send(TransportEvent::Closed { reason });
                    break;
                }
                // Pings and pongs are handled by tungstenite; binary frames
                // are not part of the signaling contract.
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    let _ = events.send(TransportEvent::Errored(error.to_string()));
                    break;
                }
                None => {
                    let _ = events.send(TransportEvent::Closed { reason: None });
                    break;
                }
            },
        }
    }
    debug!("websocket pump finished");
}
