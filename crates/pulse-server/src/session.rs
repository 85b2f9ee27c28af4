//! `WebSocket` session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use pulse_hub::{ClientConnection, ConnectionId, Hub};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Run a `WebSocket` session for a connected client.
///
/// 1. Registers the connection with the hub (which sends the welcome)
/// 2. Routes inbound text and binary frames through the hub
/// 3. Forwards the outbound queue to the socket on a writer task
/// 4. Ends when the client leaves or the hub closes the connection
/// 5. Deregisters on the way out
#[instrument(skip_all, fields(client_id = %id))]
pub async fn run_ws_session(ws: WebSocket, id: ConnectionId, hub: Arc<Hub>, queue_capacity: usize) {
    let (ws_tx, mut ws_rx) = ws.split();

    let (send_tx, send_rx) = mpsc::channel::<Arc<str>>(queue_capacity);
    let connection = Arc::new(ClientConnection::new(id.clone(), send_tx));
    let closed = connection.close_signal();

    let outbound = tokio::spawn(forward_outbound(ws_tx, send_rx, closed.clone()));

    if !hub.register(connection.clone()) {
        debug!("connection refused by hub");
        connection.close();
        let _ = outbound.await;
        return;
    }
    info!("client connected");

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let Some(Ok(msg)) = frame else { break };
                let outcome = match msg {
                    Message::Text(ref t) => hub.handle_message(&id, t.as_str()),
                    Message::Binary(ref data) => hub.handle_bytes(&id, data),
                    Message::Close(_) => {
                        debug!("client sent close frame");
                        break;
                    }
                    // Protocol-level ping/pong is answered by the transport.
                    Message::Ping(_) | Message::Pong(_) => continue,
                };
                debug!(?outcome, "routed client message");
            }
            () = closed.cancelled() => {
                debug!("hub closed connection");
                break;
            }
        }
    }

    connection.close();
    let _ = hub.deregister(&id);
    let _ = outbound.await;
    info!(dropped = connection.drop_count(), age_ms = connection.age().as_millis(), "client disconnected");
}

/// Drain the outbound queue into the socket until the connection closes.
///
/// On a hub-initiated close a Close frame is sent before returning.
async fn forward_outbound(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Arc<str>>,
    closed: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = closed.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            frame = send_rx.recv() => {
                let Some(frame) = frame else { break };
                if ws_tx.send(Message::Text(Utf8Bytes::from(&*frame))).await.is_err() {
                    break;
                }
            }
        }
    }
    let _ = ws_tx.close().await;
}
