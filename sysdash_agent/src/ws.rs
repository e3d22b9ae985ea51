//! WebSocket upgrade and per-connection handler. Pushes every sampled frame.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::state::AppState;

use std::collections::HashMap;
use std::sync::atomic::Ordering;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    if let Some(expected) = state.auth_token.as_ref() {
        match q.get("token") {
            Some(t) if t == expected => {}
            _ => return StatusCode::UNAUTHORIZED.into_response(),
        }
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    // Subscribe before waking the sampler so the first frame is not missed.
    let mut frames = state.frames.subscribe();
    let clients = state.client_count.fetch_add(1, Ordering::Relaxed) + 1;
    state.wake_sampler.notify_one();
    info!("client connected ({} total)", clients);

    // Ensure we decrement on disconnect (drop).
    struct ClientGuard(AppState);
    impl Drop for ClientGuard {
        fn drop(&mut self) {
            let left = self.0.client_count.fetch_sub(1, Ordering::Relaxed) - 1;
            info!("client disconnected ({} left)", left);
        }
    }
    let _guard = ClientGuard(state.clone());

    let (mut tx, mut rx) = socket.split();

    let cached = state.last_frame.read().await.clone();
    if !cached.is_empty() && tx.send(Message::Text(cached)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    if tx.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                // slow socket: drop what it missed and carry on with the newest
                Err(RecvError::Lagged(n)) => debug!("client lagged, skipped {} frames", n),
                Err(RecvError::Closed) => break,
            },
            msg = rx.next() => match msg {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
