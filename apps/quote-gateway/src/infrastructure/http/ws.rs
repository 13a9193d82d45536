//! `/ws/quotes` WebSocket route.
//!
//! Each socket is registered with the hub as a [`ChannelSink`]. A writer
//! task drains the sink's queue into the socket; the read loop turns text
//! frames into subscription commands and replies to this socket only.
//! On close the sink leaves the hub and the writer flushes what is queued.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::AppState;
use crate::application::services::handle_command;
use crate::infrastructure::broadcast::ChannelSink;

/// Upper bound on flushing queued frames after the read side ends.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub(super) async fn ws_quotes(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, outgoing) = ChannelSink::new(state.client_queue_capacity);
    let connection_id = state.hub.connect(Arc::new(sink));
    let (ws_sender, mut ws_receiver) = socket.split();
    let mut writer = spawn_writer(ws_sender, outgoing);

    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let reply = handle_command(&state.registry, text.as_str()).await;
                if let Err(e) = state.hub.send_to(connection_id, reply.to_json().into()).await {
                    debug!(%connection_id, error = %e, "Reply undeliverable, closing");
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(%connection_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // The hub held the only sender; dropping it ends the writer once drained.
    state.hub.disconnect(connection_id);
    if tokio::time::timeout(DRAIN_TIMEOUT, &mut writer).await.is_err() {
        debug!(%connection_id, "Writer did not drain in time");
        writer.abort();
    }
}

/// Forward queued frames to `ws_sender` until every sender is gone, then
/// close it.
fn spawn_writer<S>(mut ws_sender: S, mut outgoing: mpsc::Receiver<Arc<str>>) -> JoinHandle<()>
where
    S: Sink<Message> + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(text) = outgoing.recv().await {
            if ws_sender.send(Message::Text(text.as_ref().into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    })
}

#[cfg(test)]
mod tests {
    use futures::channel::mpsc as frames;

    use super::*;
    use crate::infrastructure::broadcast::ConnectionSink;

    fn text(message: Message) -> String {
        match message {
            Message::Text(text) => text.as_str().to_string(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn writer_flushes_queue_after_sink_is_dropped() {
        let (sink, outgoing) = ChannelSink::new(8);
        let (socket, mut delivered) = frames::unbounded::<Message>();
        sink.send(Arc::from("reply")).await.unwrap();
        sink.send(Arc::from("push")).await.unwrap();

        let writer = spawn_writer(socket, outgoing);
        drop(sink);
        writer.await.unwrap();

        assert_eq!(text(delivered.next().await.unwrap()), "reply");
        assert_eq!(text(delivered.next().await.unwrap()), "push");
        assert!(delivered.next().await.is_none());
    }

    #[tokio::test]
    async fn writer_stops_when_socket_rejects_frames() {
        let (sink, outgoing) = ChannelSink::new(8);
        let (socket, delivered) = frames::unbounded::<Message>();
        drop(delivered);

        let writer = spawn_writer(socket, outgoing);
        sink.send(Arc::from("lost")).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .unwrap()
            .unwrap();
    }
}
