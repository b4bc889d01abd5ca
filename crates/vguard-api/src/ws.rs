//! WebSocket transport for progress events.
//!
//! A client connects to `/ws/events` (token in the `token` query parameter
//! or the Authorization header), then joins the channel of its own user id.
//! Admins may join any owner channel and are joined to the admin scope on
//! connect.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use vguard_events::{Channel, ListenerId, ProgressBroadcaster};
use vguard_models::{ClientMessage, ServerMessage};

use crate::auth::AuthUser;
use crate::metrics;
use crate::state::AppState;

/// Global counter for active WebSocket connections.
static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

const WS_SEND_BUFFER_SIZE: usize = 32;
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const WS_CLIENT_TIMEOUT: Duration = Duration::from_secs(90);

/// Queue a JSON message for the socket writer.
async fn send_json<T: Serialize>(tx: &mpsc::Sender<Message>, msg: &T, kind: &str) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(j) => j,
        Err(e) => {
            warn!("Failed to serialize WebSocket message: {}", e);
            return true;
        }
    };
    let sent = tx.send(Message::Text(json)).await.is_ok();
    if sent {
        metrics::record_ws_message_sent(kind);
    }
    sent
}

/// Progress event stream endpoint.
pub async fn ws_events(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    user: AuthUser,
) -> impl IntoResponse {
    let count = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
    metrics::set_ws_active_connections(count);
    metrics::record_ws_connection("events");

    ws.on_upgrade(move |socket| async move {
        handle_events_socket(socket, state.broadcaster, user).await;
        let count = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_ws_active_connections(count);
    })
}

async fn handle_events_socket(
    socket: WebSocket,
    broadcaster: Arc<ProgressBroadcaster>,
    user: AuthUser,
) {
    let (ws_sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);

    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let mut listener = broadcaster.register();
    let listener_id = listener.id;
    let _guard = scopeguard::guard(Arc::clone(&broadcaster), move |b| {
        b.remove_listener(listener_id);
    });

    if user.is_admin() {
        broadcaster.join(listener_id, Channel::Admins);
    }
    info!(uid = %user.uid, listener = %listener_id, "Event stream connected");

    let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            event = listener.receiver.recv() => {
                let Some(event) = event else { break };
                if !send_json(&tx, &event, event.kind.as_str()).await {
                    break;
                }
            }
            client_msg = receiver.next() => {
                match client_msg {
                    Some(Ok(Message::Text(text))) => {
                        last_activity = Instant::now();
                        metrics::record_ws_message_received();
                        let reply = handle_client_message(&broadcaster, listener_id, &user, &text);
                        if !send_json(&tx, &reply, server_message_kind(&reply)).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(uid = %user.uid, "Client closed event stream");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(uid = %user.uid, "WebSocket receive error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {
                        last_activity = Instant::now();
                    }
                }
            }
            _ = heartbeat.tick() => {
                if last_activity.elapsed() > WS_CLIENT_TIMEOUT {
                    info!(uid = %user.uid, "Event stream idle, closing");
                    break;
                }
                if tx.send(Message::Ping(Vec::new())).await.is_err() {
                    warn!("Heartbeat failed, client disconnected");
                    break;
                }
            }
        }
    }

    drop(tx);
    let _ = send_task.await;
    info!(uid = %user.uid, listener = %listener_id, "Event stream disconnected");
}

/// Apply one client control message and build the acknowledgement.
pub fn handle_client_message(
    broadcaster: &ProgressBroadcaster,
    listener_id: ListenerId,
    user: &AuthUser,
    text: &str,
) -> ServerMessage {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => return ServerMessage::error(format!("Invalid message: {}", e)),
    };

    match message {
        ClientMessage::Join { user_id } => {
            if user_id != user.uid && !user.is_admin() {
                warn!(uid = %user.uid, requested = %user_id, "Rejected join of another user's channel");
                return ServerMessage::error("You may only join your own channel");
            }
            if broadcaster.join(listener_id, Channel::owner(user_id.clone())) {
                ServerMessage::joined(user_id)
            } else {
                ServerMessage::error("Connection is no longer registered")
            }
        }
        ClientMessage::Leave { user_id } => {
            broadcaster.leave(listener_id, &Channel::owner(user_id.clone()));
            ServerMessage::left(user_id)
        }
        ClientMessage::Ping => ServerMessage::Pong,
    }
}

fn server_message_kind(msg: &ServerMessage) -> &'static str {
    match msg {
        ServerMessage::Joined { .. } => "joined",
        ServerMessage::Left { .. } => "left",
        ServerMessage::Pong => "pong",
        ServerMessage::Error { .. } => "error",
    }
}
