//! WebSocket handler for live gold quote streaming
//!
//! Pushes the latest combined quote on a fixed interval until the client
//! disconnects. Each connection gets its own identifier, echoed in every
//! message.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::Serialize;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::handlers::quote::current_quote;
use crate::models::quote::now_millis;
use crate::models::response::QuoteResponse;
use crate::AppState;

/// WebSocket message to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamMessage {
    #[serde(rename = "connected")]
    Connected {
        #[serde(rename = "connectionId")]
        connection_id: String,
        #[serde(rename = "intervalMs")]
        interval_ms: u64,
    },
    #[serde(rename = "quote")]
    Quote {
        #[serde(rename = "connectionId")]
        connection_id: String,
        data: Box<QuoteResponse>,
        timestamp: i64,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(rename = "connectionId")]
        connection_id: String,
        message: String,
    },
    #[serde(rename = "pong")]
    Pong,
}

/// GET /api/gold/stream
///
/// Server messages:
/// ```json
/// { "type": "connected", "connectionId": "...", "intervalMs": 30000 }
/// { "type": "quote", "connectionId": "...", "data": { ... }, "timestamp": 1792116000000 }
/// ```
/// Clients may send `{"action": "ping"}` and receive `{"type": "pong"}`.
pub async fn gold_price_websocket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_message(sender: &mut SplitSink<WebSocket, Message>, msg: &StreamMessage) -> bool {
    let text = match serde_json::to_string(msg) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to serialize stream message: {}", e);
            return true;
        }
    };

    match sender.send(Message::Text(text.into())).await {
        Ok(()) => true,
        Err(e) => {
            debug!("WebSocket send error: {}", e);
            false
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let connection_id = Uuid::new_v4().to_string();
    let stream_interval = state.config.scheduler.stream_interval;

    info!(connection_id = %connection_id, "New gold price WebSocket connection");

    let connected = StreamMessage::Connected {
        connection_id: connection_id.clone(),
        interval_ms: stream_interval.as_millis() as u64,
    };
    if !send_message(&mut sender, &connected).await {
        return;
    }

    // First tick fires immediately so the client gets a quote on connect
    let mut ticker = interval(stream_interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let msg = match current_quote(&state, false).await {
                    Ok(quote) => StreamMessage::Quote {
                        connection_id: connection_id.clone(),
                        data: Box::new(quote),
                        timestamp: now_millis(),
                    },
                    Err(e) => {
                        warn!(connection_id = %connection_id, error = %e, "No quote for stream tick");
                        StreamMessage::Error {
                            connection_id: connection_id.clone(),
                            message: e.to_string(),
                        }
                    }
                };

                if !send_message(&mut sender, &msg).await {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if is_ping(text.as_str()) && !send_message(&mut sender, &StreamMessage::Pong).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!(connection_id = %connection_id, "WebSocket closed by client");
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket receive error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!(connection_id = %connection_id, "Gold price WebSocket connection closed");
}

/// Accepts `ping` or `{"action": "ping"}` / `{"type": "ping"}`
fn is_ping(text: &str) -> bool {
    if text.trim().eq_ignore_ascii_case("ping") {
        return true;
    }
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| {
            v.get("action")
                .or_else(|| v.get("type"))
                .and_then(|a| a.as_str())
                .map(|a| a == "ping")
        })
        .unwrap_or(false)
}
