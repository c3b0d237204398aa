// WebSocket handler for live game events.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};

use super::AppState;
use crate::feed::SubmissionFeed;
use crate::metrics;

/// WebSocket upgrade handler for game event streaming.
pub async fn ws_game<F: SubmissionFeed>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<F>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws<F: SubmissionFeed>(mut socket: WebSocket, state: AppState<F>) {
    let mut rx = state.events.subscribe();
    metrics::CONNECTED_WEBSOCKETS.inc();

    // Forward all events to the client until it disconnects.
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if socket.send(Message::Text(msg.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        break;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("WebSocket client lagged, skipped {n} messages");
                    }
                }
            }
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    metrics::CONNECTED_WEBSOCKETS.dec();
}
