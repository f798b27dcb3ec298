// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! WebSocket route for live new-mail events.
//!
//! Browsers cannot set an Authorization header on a WebSocket handshake,
//! so the session token rides in the `token` query parameter and is
//! checked before the upgrade. Each connection only ever receives events
//! for the account named in its token.

use crate::middleware::auth::verify_token;
use crate::services::dispatcher::NewEmailsEvent;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

/// WebSocket routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(ws_handler))
}

#[derive(Deserialize)]
struct WsParams {
    #[serde(default)]
    token: Option<String>,
}

/// Frame sent to the client for each event.
#[derive(Serialize)]
struct WsFrame<'a> {
    event: &'a str,
    data: &'a NewEmailsEvent,
}

/// Authenticate the handshake, then upgrade.
async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, StatusCode> {
    let token = params.token.ok_or(StatusCode::UNAUTHORIZED)?;
    let google_id = verify_token(&token, &state.config.jwt_signing_key)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    Ok(ws.on_upgrade(move |socket| drive_connection(socket, state, google_id)))
}

/// Forward dispatcher events to one connection until either side closes.
async fn drive_connection(socket: WebSocket, state: Arc<AppState>, google_id: String) {
    let mut events = state.dispatcher.subscribe(&google_id);
    let (mut sink, mut stream) = socket.split();

    tracing::info!(google_id = %google_id, "WebSocket connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let frame = WsFrame {
                        event: "new_emails",
                        data: &event,
                    };
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to encode event frame");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Slow consumer; drop the backlog and keep going
                    tracing::warn!(google_id = %google_id, skipped, "WebSocket receiver lagged");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(_)) => break,
                // Inbound frames (including pings, which axum answers
                // automatically) carry nothing we act on.
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::info!(google_id = %google_id, "WebSocket disconnected");
}
