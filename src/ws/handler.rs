//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::{OutboundMessage, RoomCommand, RoomHandle};
use crate::util::rate_limit::PlayerRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMessage, ServerMessage};

/// Outbound queue depth per connection
const OUTBOUND_CAPACITY: usize = 64;

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Display name shown to other players
    pub name: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let client_id = state.allocate_client_id();
    let display_name = query
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("Player_{client_id}"));

    info!(client_id, name = %display_name, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, client_id, display_name, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, client_id: u16, display_name: String, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    // Per-connection outbound queue; the room tick loop feeds it with
    // try_send and must never block on a slow client.
    let (out_tx, mut out_rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_CAPACITY);

    let writer_handle = tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            let payload = match outbound.message.encode() {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(client_id, error = %e, "Failed to encode outbound message");
                    continue;
                }
            };
            if let Err(e) = ws_sink.send(Message::Binary(payload.to_vec())).await {
                debug!(client_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    let welcome = ServerMessage::Welcome {
        client_id,
        server_time: unix_millis(),
    };
    if out_tx.send(OutboundMessage::reliable(welcome)).await.is_err() {
        writer_handle.abort();
        return;
    }

    let rate_limiter = PlayerRateLimiter::new();
    let mut current_room: Option<RoomHandle> = None;

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Binary(data)) => {
                if !rate_limiter.check_input() {
                    warn!(client_id, "Rate limited message");
                    continue;
                }

                let msg = match ClientMessage::decode(Bytes::from(data)) {
                    Ok(msg) => msg,
                    Err(e) => {
                        // Reject this message only; the connection and any
                        // buffered input are unaffected
                        warn!(client_id, error = %e, "Rejected malformed message");
                        continue;
                    }
                };

                match msg {
                    ClientMessage::JoinRoom { room } => {
                        let room_name = if room.is_empty() {
                            state.config.room_name.clone()
                        } else {
                            room
                        };
                        match state.rooms.get(&room_name) {
                            Some(handle) => {
                                // Early occupancy check; the room task has
                                // the final word between ticks
                                if !handle.has_slot() {
                                    warn!(client_id, room = %room_name, "Room is full");
                                    continue;
                                }
                                let join = RoomCommand::Join {
                                    client_id,
                                    display_name: display_name.clone(),
                                    sender: out_tx.clone(),
                                };
                                if handle.command_tx.send(join).await.is_err() {
                                    warn!(client_id, room = %room_name, "Room closed during join");
                                    continue;
                                }
                                current_room = Some(handle);
                            }
                            None => warn!(client_id, room = %room_name, "No such room"),
                        }
                    }
                    ClientMessage::Input(input) => {
                        if let Some(room) = &current_room {
                            let cmd = RoomCommand::Input { client_id, input };
                            if room.command_tx.send(cmd).await.is_err() {
                                debug!(client_id, "Room channel closed");
                                current_room = None;
                            }
                        } else {
                            debug!(client_id, "Input before joining a room");
                        }
                    }
                    ClientMessage::LeaveRoom => {
                        if let Some(room) = current_room.take() {
                            let _ = room.command_tx.send(RoomCommand::Leave { client_id }).await;
                        }
                    }
                    ClientMessage::Ping { t } => {
                        let pong = OutboundMessage::reliable(ServerMessage::Pong { t });
                        let _ = out_tx.send(pong).await;
                    }
                }
            }
            Ok(Message::Text(_)) => {
                warn!(client_id, "Received text message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(client_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(client_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Disconnect counts as leaving the room
    if let Some(room) = current_room.take() {
        let _ = room.command_tx.send(RoomCommand::Leave { client_id }).await;
    }

    writer_handle.abort();
    info!(client_id, "WebSocket connection closed");
}
