use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::chat::{ChatMessage, ChatRoom, Membership};
use crate::state::AppState;

#[derive(Deserialize)]
struct ClientFrame {
    username: String,
    body: String,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ServerFrame<'a> {
    Joined { room: &'a str },
    Message(&'a ChatMessage),
    Error { message: String },
}

impl ServerFrame<'_> {
    fn to_message(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                tracing::error!("Failed to encode chat frame: {}", e);
                None
            }
        }
    }
}

pub async fn history(State(state): State<AppState>) -> Json<Vec<ChatMessage>> {
    Json(state.chat.history())
}

pub async fn connect(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let room = state.chat.clone();
    ws.on_upgrade(move |socket| run_member(socket, room))
}

/// Replay history, then relay: client frames are posted to the room and
/// everything the room broadcasts is written back, including our own posts.
async fn run_member(socket: WebSocket, room: Arc<ChatRoom>) {
    let Membership { history, mut live } = room.join();
    let (mut sink, mut stream) = socket.split();
    tracing::debug!(room = room.name(), members = room.member_count(), "Chat member joined");

    let greeting = std::iter::once(ServerFrame::Joined { room: room.name() })
        .chain(history.iter().map(ServerFrame::Message));
    for frame in greeting {
        if let Some(msg) = frame.to_message() {
            if sink.send(msg).await.is_err() {
                return;
            }
        }
    }

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Err(message) = handle_text(&room, text.as_str()) {
                        let reply = ServerFrame::Error { message }.to_message();
                        if let Some(reply) = reply {
                            if sink.send(reply).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("Chat socket error: {}", e);
                    break;
                }
            },
            received = live.recv() => match received {
                Ok(message) => {
                    if let Some(msg) = ServerFrame::Message(&message).to_message() {
                        if sink.send(msg).await.is_err() {
                            break;
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Chat member fell behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    tracing::debug!(room = room.name(), "Chat member left");
}

/// Post one client frame. The error string goes back to the sender only.
fn handle_text(room: &ChatRoom, text: &str) -> Result<ChatMessage, String> {
    let frame: ClientFrame = serde_json::from_str(text)
        .map_err(|_| "expected {\"username\": ..., \"body\": ...}".to_string())?;
    room.post(&frame.username, &frame.body)
        .map_err(|e| e.to_string())
}
