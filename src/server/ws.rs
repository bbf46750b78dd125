use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use crate::server::routes::AppState;

/// GET /ws upgrade endpoint. Each client gets its own broadcast subscription.
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Forward gateway events to one client until it disconnects. Inbound client
/// frames only keep the connection alive; commands arrive over HTTP.
async fn handle_socket(socket: WebSocket, state: AppState) {
    tracing::info!("dashboard client connected");
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.manager.subscribe();

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let text = match event.to_json() {
                            Ok(text) => text,
                            Err(e) => {
                                tracing::error!(error = %e, "event did not serialize");
                                continue;
                            }
                        };
                        if sender.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "client fell behind, frames dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "client socket error");
                        break;
                    }
                }
            }
        }
    }
    tracing::info!("dashboard client disconnected");
}
