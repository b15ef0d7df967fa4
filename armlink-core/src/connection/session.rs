// File: src/connection/session.rs
//
// One task per open WebSocket session: forwards queued commands, reads the
// arm's replies, and performs the close handshake on request.

use std::sync::Weak;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use armlink_common::models::ArmTelemetry;
use super::manager::Inner;

const CLOSE_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub(super) enum SessionEnd {
    /// Closed because the manager asked for it.
    Requested,
    ClosedByPeer(Option<String>),
    Error(String),
}

pub(super) async fn run_session(
    id: u64,
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut outgoing: mpsc::UnboundedReceiver<WsMessage>,
    mut shutdown: oneshot::Receiver<()>,
    inner: Weak<Inner>,
) {
    let (mut write_half, mut read_half) = ws_stream.split();
    debug!("[ArmLink] Session #{} task started.", id);

    let end = loop {
        select! {
            maybe_out = outgoing.recv() => {
                match maybe_out {
                    Some(msg) => {
                        if let Err(e) = write_half.send(msg).await {
                            break SessionEnd::Error(format!("write failed: {e}"));
                        }
                    }
                    None => break SessionEnd::Requested,
                }
            }
            maybe_msg = read_half.next() => {
                match maybe_msg {
                    Some(Ok(WsMessage::Text(txt))) => {
                        match ArmTelemetry::parse(&txt) {
                            Some(telemetry) => {
                                if let Some(inner) = inner.upgrade() {
                                    inner.record_telemetry(telemetry);
                                }
                            }
                            None => debug!("[ArmLink] unhandled text from arm: {}", txt.as_str()),
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        break SessionEnd::ClosedByPeer(frame.map(|f| f.reason.to_string()));
                    }
                    Some(Ok(_other)) => {
                        // ping/pong/binary
                    }
                    Some(Err(e)) => break SessionEnd::Error(e.to_string()),
                    None => break SessionEnd::ClosedByPeer(None),
                }
            }
            _ = &mut shutdown => {
                if let Err(e) = write_half.send(WsMessage::Close(None)).await {
                    warn!("[ArmLink] Session #{}: failed to send close frame: {}", id, e);
                } else {
                    // Wait for the arm to acknowledge the close.
                    let ack = tokio::time::timeout(CLOSE_HANDSHAKE_TIMEOUT, async {
                        while let Some(Ok(msg)) = read_half.next().await {
                            if msg.is_close() {
                                break;
                            }
                        }
                    })
                    .await;
                    if ack.is_err() {
                        warn!("[ArmLink] Session #{}: close handshake timed out", id);
                    }
                }
                break SessionEnd::Requested;
            }
        }
    };

    info!("[ArmLink] Session #{} task ended: {:?}", id, end);
    if let Some(inner) = inner.upgrade() {
        inner.finish_session(id, end);
    }
}
