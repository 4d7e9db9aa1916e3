//! Websocket session: authenticate, then pump frames between the socket and
//! the relay until either side goes away.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::messages::{ClientMessage, ServerMessage};
use super::relay::SignalingRelay;
use crate::api::error::ApiError;
use crate::auth::bearer_token;

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

/// GET /ws. Unauthenticated requests are refused before the upgrade.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    State(relay): State<Arc<SignalingRelay>>,
) -> Response {
    let token = params.token.or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .map(str::to_string)
    });

    match relay.authenticate(token.as_deref()) {
        Ok(user_id) => ws.on_upgrade(move |socket| run_session(socket, relay, user_id)),
        Err(err) => {
            debug!("Rejected websocket connection: {}", err);
            ApiError::from(err).into_response()
        }
    }
}

async fn run_session(socket: WebSocket, relay: Arc<SignalingRelay>, user_id: String) {
    let (connection_id, mut outbox) = relay.connect(&user_id).await;
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode outbound message: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => relay.handle(&connection_id, message).await,
                Err(e) => {
                    relay
                        .send_to(
                            &connection_id,
                            ServerMessage::error(format!("Malformed message: {}", e)),
                        )
                        .await;
                }
            },
            Ok(Message::Binary(_)) => {
                relay
                    .send_to(
                        &connection_id,
                        ServerMessage::error("Binary frames are not supported"),
                    )
                    .await;
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Connection {} read error: {}", connection_id, e);
                break;
            }
        }
    }

    // Dropping the outbox sender ends the writer.
    relay.disconnect(&connection_id).await;
    let _ = writer.await;
}
