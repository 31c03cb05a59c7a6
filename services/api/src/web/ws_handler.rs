//! services/api/src/web/ws_handler.rs
//!
//! The WebSocket push channel. Each connection gets a snapshot, then every
//! state change as it happens, and may send the commands in `ClientMessage`.

use crate::{
    error::ApiError,
    web::{
        gate::current_access,
        protocol::{ClientMessage, ServerMessage, StoryboardSnapshot},
        render_task::spawn_render,
        rest::set_quality,
        state::AppState,
    },
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!("New WebSocket connection established.");
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the snapshot so nothing between the two is missed.
    let mut events = app_state.subscribe();
    if let Err(e) = send_snapshot(&mut sender, &app_state).await {
        error!("Failed to send initial snapshot: {:?}", e);
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => {
                let sent = match event {
                    Ok(message) => send_message(&mut sender, &message).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Client fell {} events behind; resending snapshot.", skipped);
                        send_snapshot(&mut sender, &app_state).await
                    }
                    Err(RecvError::Closed) => break,
                };
                if let Err(e) = sent {
                    warn!("Dropping WebSocket client: {:?}", e);
                    break;
                }
            }
            incoming = receiver.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("WebSocket receive error: {:?}", e);
                        break;
                    }
                };

                let reply = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(command) => handle_command(&app_state, command).await,
                    Err(e) => Some(format!("Unrecognized command: {}", e)),
                };
                if let Some(message) = reply {
                    if let Err(e) = send_message(&mut sender, &ServerMessage::Error { message }).await {
                        warn!("Dropping WebSocket client: {:?}", e);
                        break;
                    }
                }
            }
        }
    }
    info!("WebSocket connection closed.");
}

/// Carries out a client command. Returns an error text for the client when
/// the command cannot be carried out; successes are visible through the
/// ordinary event stream.
pub async fn handle_command(app_state: &Arc<AppState>, command: ClientMessage) -> Option<String> {
    match command {
        ClientMessage::SetQuality { quality } => {
            set_quality(app_state, quality).await;
            None
        }
        ClientMessage::GenerateScene { scene_id } => {
            if current_access(app_state).await.blocks() {
                return Some(ACCESS_REQUIRED.to_string());
            }
            match spawn_render(app_state, &scene_id).await {
                Some(_) => None,
                None => Some(format!("No scene with id {}", scene_id)),
            }
        }
        ClientMessage::GenerateAll => {
            if current_access(app_state).await.blocks() {
                return Some(ACCESS_REQUIRED.to_string());
            }
            app_state.render_queue.enqueue_awaiting(app_state).await;
            None
        }
    }
}

pub const ACCESS_REQUIRED: &str = "Select an API key before generating frames.";

async fn send_snapshot(
    sender: &mut SplitSink<WebSocket, Message>,
    app_state: &AppState,
) -> Result<(), ApiError> {
    let storyboard = StoryboardSnapshot::from(&*app_state.session.lock().await);
    send_message(sender, &ServerMessage::Snapshot { storyboard }).await
}

async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), ApiError> {
    let json = serde_json::to_string(message)
        .map_err(|e| ApiError::Internal(format!("Failed to serialize message: {}", e)))?;
    sender.send(Message::Text(json.into())).await?;
    Ok(())
}
