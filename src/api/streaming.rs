use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::api::handler::AppState;
use crate::api::websocket::LiveFeedBroadcaster;

/// GET /ws
pub async fn live_updates(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_live_stream(socket, state.live_feed.clone()))
}

async fn handle_live_stream(socket: WebSocket, live_feed: LiveFeedBroadcaster) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = live_feed.subscribe();
    debug!("🔌 Live client connected ({} total)", live_feed.subscriber_count());

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(Message::Ping(payload))) => {
                    if sender.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                // Clients only listen
                Some(Ok(_)) => {}
            },
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(json) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("⚠️ Live client lagged, dropped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    debug!("🔌 Live client disconnected");
}
