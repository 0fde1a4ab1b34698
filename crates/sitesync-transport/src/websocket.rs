//! WebSocket transport implementation using `tokio-tungstenite`.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

use crate::{CloseInfo, ConnectionId, Connector, Socket, SocketEvents, TransportError};

/// What the socket owner asks the socket task to do.
enum Outgoing {
    Text(String),
    Close(CloseInfo),
}

/// A [`Connector`] that opens WebSocket connections.
///
/// Each socket is driven by its own Tokio task, spawned on the runtime
/// that is current when [`open`](Connector::open) is called.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    type Socket = WebSocketSocket;

    fn open(&self, url: &Url, events: SocketEvents) -> Result<Self::Socket, TransportError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let id = events.socket();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        tracing::debug!(%id, %url, "opening WebSocket");
        runtime.spawn(run_socket(url.to_string(), outgoing_rx, events));

        Ok(WebSocketSocket {
            id,
            outgoing: outgoing_tx,
        })
    }
}

/// A single outbound WebSocket.
///
/// Dropping it without calling [`close`](Socket::close) tears the TCP
/// connection down without a close handshake.
pub struct WebSocketSocket {
    id: ConnectionId,
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

impl Socket for WebSocketSocket {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.outgoing
            .send(Outgoing::Text(text))
            .map_err(|_| TransportError::ConnectionClosed(format!("{} is closed", self.id)))
    }

    fn close(&self, code: u16, reason: &str) {
        let _ = self.outgoing.send(Outgoing::Close(CloseInfo::new(code, reason)));
    }
}

/// Unwraps an I/O failure as is; anything else (TLS, HTTP upgrade, protocol)
/// is wrapped under `fallback`.
fn io_error(
    fallback: std::io::ErrorKind,
    e: tokio_tungstenite::tungstenite::Error,
) -> std::io::Error {
    match e {
        tokio_tungstenite::tungstenite::Error::Io(io) => io,
        other => std::io::Error::new(fallback, other),
    }
}

/// Waits for the owner to close (or drop) the socket while the handshake
/// is still running.
async fn closed_before_open(outgoing: &mut mpsc::UnboundedReceiver<Outgoing>) -> CloseInfo {
    loop {
        match outgoing.recv().await {
            Some(Outgoing::Close(info)) => return info,
            Some(Outgoing::Text(_)) => {
                tracing::warn!("dropping frame queued before the handshake completed");
            }
            None => return CloseInfo::abnormal("socket dropped before handshake"),
        }
    }
}

/// Drives one socket from connect to close, reporting through `events`.
async fn run_socket(
    url: String,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    events: SocketEvents,
) {
    let id = events.socket();

    let ws = tokio::select! {
        result = tokio_tungstenite::connect_async(url.as_str()) => match result {
            Ok((ws, _response)) => ws,
            Err(e) => {
                tracing::debug!(%id, error = %e, "WebSocket connect failed");
                events.error(TransportError::ConnectFailed(io_error(
                    std::io::ErrorKind::Other,
                    e,
                )));
                events.closed(CloseInfo::abnormal("connection attempt failed"));
                return;
            }
        },
        info = closed_before_open(&mut outgoing) => {
            tracing::debug!(%id, "socket closed before handshake completed");
            events.closed(info);
            return;
        }
    };

    tracing::debug!(%id, "WebSocket open");
    events.opened();
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            command = outgoing.recv() => match command {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        events.error(TransportError::SendFailed(io_error(
                            std::io::ErrorKind::BrokenPipe,
                            e,
                        )));
                    }
                }
                Some(Outgoing::Close(info)) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(info.code),
                        reason: info.reason.clone().into(),
                    };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        tracing::debug!(%id, error = %e, "close frame not delivered");
                    }
                    events.closed(info);
                    return;
                }
                None => {
                    // Owner dropped the socket without closing it.
                    let _ = sink.close().await;
                    return;
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => events.text(text.as_str()),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => events.text(text),
                    Err(_) => tracing::warn!(%id, len = data.len(), "dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let info = frame
                        .map(|f| CloseInfo::new(u16::from(f.code), f.reason.as_str()))
                        .unwrap_or_else(|| CloseInfo::new(CloseInfo::NO_STATUS, ""));
                    tracing::debug!(%id, close = %info, "peer closed WebSocket");
                    events.closed(info);
                    return;
                }
                Some(Ok(_)) => {} // ping/pong/raw frame
                Some(Err(e)) => {
                    let reason = e.to_string();
                    events.error(TransportError::ReceiveFailed(io_error(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                    events.closed(CloseInfo::abnormal(reason));
                    return;
                }
                None => {
                    events.closed(CloseInfo::abnormal("stream ended"));
                    return;
                }
            }
        }
    }
}
