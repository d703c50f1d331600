use std::convert::Infallible;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse,
    },
};
use chrono::Utc;
use futures::{stream, SinkExt, Stream, StreamExt};
use serde_json::{json, Value};

use crate::api::state::AppState;
use crate::bus::CommandBus;

/// Live feed of the streaming event kinds as Server-Sent Events
///
/// GET /stream
pub async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let subscription = state.bus.subscribe();
    tracing::debug!(subscription = %subscription.id(), "SSE client connected");

    let stream = stream::unfold(subscription, |mut subscription| async move {
        loop {
            let event = subscription.next_event().await?;
            if event.kind.is_streaming() {
                let sse = SseEvent::default().event("update").data(event.to_json());
                return Some((Ok::<_, Infallible>(sse), subscription));
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Every bus event as JSON over a WebSocket
///
/// GET /ws
pub async fn websocket(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.bus))
}

async fn handle_socket(socket: WebSocket, bus: CommandBus) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscription = bus.subscribe();
    let client_id = subscription.id().to_string();
    tracing::info!(client_id = %client_id, "WebSocket client connected");

    let welcome = json!({
        "action": "connection_established",
        "data": {
            "message": "Connected to the event stream",
            "client_id": client_id,
        },
    });
    if sender.send(Message::Text(welcome.to_string())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = subscription.next_event() => match event {
                Some(event) => {
                    if sender.send(Message::Text(event.to_json())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = control_reply(&text) {
                        if sender.send(Message::Text(reply)).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::info!(client_id = %client_id, "WebSocket client disconnected");
}

/// Answer to a client control message, if it needs one
fn control_reply(text: &str) -> Option<String> {
    let message: Value = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid JSON from WebSocket client");
            return None;
        }
    };

    match message.get("action").and_then(Value::as_str) {
        Some("ping") => Some(
            json!({
                "action": "pong",
                "data": { "timestamp": Utc::now().to_rfc3339() },
            })
            .to_string(),
        ),
        _ => None,
    }
}
