//! WebSocket event streaming

use std::sync::Arc;

use axum::{
    extract::{ws::WebSocket, State, WebSocketUpgrade},
    response::Response,
};
use tracing::{debug, error, info};

use crate::supervisor::FastpathSupervisor;

/// WebSocket upgrade handler
pub async fn events_handler(
    ws: WebSocketUpgrade,
    State(supervisor): State<Arc<FastpathSupervisor>>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, supervisor))
}

/// Handle WebSocket connection
async fn handle_socket(mut socket: WebSocket, supervisor: Arc<FastpathSupervisor>) {
    info!("new websocket client connected");

    let mut rx = supervisor.subscribe();
    let mut dropped_count: usize = 0;

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        if dropped_count > 0 {
                            let dropped_event = serde_json::json!({
                                "type": "backpressure",
                                "droppedCount": dropped_count,
                                "ts": chrono::Utc::now().timestamp_millis(),
                            });
                            if let Ok(json) = serde_json::to_string(&dropped_event) {
                                let _ = socket.send(axum::extract::ws::Message::Text(json)).await;
                            }
                            dropped_count = 0;
                        }

                        match serde_json::to_string(&event) {
                            Ok(json) => {
                                if let Err(e) = socket.send(axum::extract::ws::Message::Text(json)).await {
                                    error!("failed to send event to client: {}", e);
                                    break;
                                }
                            }
                            Err(e) => {
                                error!("failed to serialize event: {}", e);
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        dropped_count += n as usize;
                        debug!("client lagging, dropped {} events (total: {})", n, dropped_count);
                    }
                    Err(e) => {
                        error!("event channel error: {}", e);
                        break;
                    }
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(axum::extract::ws::Message::Close(_))) => {
                        debug!("client closed connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("websocket error: {}", e);
                        break;
                    }
                    None => {
                        debug!("websocket closed");
                        break;
                    }
                }
            }
        }
    }

    info!("websocket client disconnected");
}
