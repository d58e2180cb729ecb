//! WebSocket connection lifecycle: upgrade, per-connection read/write
//! loops, and the implicit disconnect event.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::{ClientToServer, ServerToClient};
use crate::session::{self, AppState};

/// The stable player identity rides on the connection query string, so a
/// reconnect can be matched against pending grace timers.
#[derive(Deserialize)]
pub struct WsParams {
    pub player_id: String,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(WsParams { player_id }): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, player_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, player_id: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerToClient>();

    debug!(player_id, "connection opened");
    session::handle_connect(&state, &player_id, &tx);

    // forward server pushes to the socket; ends when the channel closes
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&msg) else {
                continue;
            };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientToServer>(&text) {
                Ok(event) => session::dispatch(&state, &player_id, event, &tx),
                Err(err) => {
                    let _ = tx.send(ServerToClient::Error {
                        message: format!("bad message: {err}"),
                    });
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    debug!(player_id, "connection closed");
    session::handle_disconnect(&state, &player_id, &tx);
    drop(tx);
    writer.abort();
}
