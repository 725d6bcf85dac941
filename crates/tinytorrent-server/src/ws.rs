//! WebSocket connection tasks.
//!
//! The socket task only moves frames: outbound work arrives from the event
//! loop over an unbounded channel, inbound client messages are read and
//! dropped.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::broadcast::Outbound;
use crate::router::ServerState;

pub(crate) async fn upgrade(
    State(state): State<Arc<ServerState>>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| serve_socket(state, socket))
}

async fn serve_socket(state: Arc<ServerState>, socket: WebSocket) {
    let id = state.next_client_id();
    let (outbound, mut queue) = mpsc::unbounded_channel();
    if !state.event_loop.open(id, outbound).await {
        debug!(client = id, "event loop stopped; closing websocket");
        return;
    }
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            next = queue.recv() => {
                let message = match next {
                    Some(Outbound::Text(text)) => Message::Text(text.into()),
                    Some(Outbound::Ping) => Message::Ping(Bytes::new()),
                    Some(Outbound::Close) | None => {
                        if let Err(err) = sink.send(Message::Close(None)).await {
                            trace!(client = id, error = %err, "close frame not delivered");
                        }
                        break;
                    }
                };
                if let Err(err) = sink.send(message).await {
                    debug!(client = id, error = %err, "websocket send failed");
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    state.event_loop.close(id).await;
}
