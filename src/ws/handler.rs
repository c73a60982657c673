use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;
use crate::ws::registry::ConnectionHandle;
use crate::ws::{ClientEvent, ServerEvent};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQueryParams {
    pub token: String,
}

/// WebSocket routes
pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

/// WebSocket upgrade handler. An invalid credential terminates the
/// handshake with 401 — the connection is never registered.
async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsQueryParams>,
) -> Result<Response, AppError> {
    let claims = state.auth.validate_token(&params.token)?;

    tracing::info!(
        identity = %claims.sub,
        username = %claims.username,
        "WebSocket upgrade request"
    );

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, claims)))
}

/// Handle one WebSocket connection for its whole lifetime.
async fn handle_socket(socket: WebSocket, state: AppState, claims: crate::models::Claims) {
    let conn_id = Uuid::new_v4().to_string();

    tracing::info!(
        conn_id = %conn_id,
        identity = %claims.sub,
        "WebSocket connected"
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    state.coordinator.registry().register(ConnectionHandle::new(
        conn_id.clone(),
        claims.sub.clone(),
        claims.username.clone(),
        tx,
    ));

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for sending queued events to the client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                if ws_sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    // Process incoming events
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                dispatch(&text, &conn_id, &state).await;
            }
            Ok(Message::Ping(_)) => {
                tracing::trace!(conn_id = %conn_id, "Ping received");
            }
            Ok(Message::Close(_)) => {
                tracing::info!(conn_id = %conn_id, "WebSocket close received");
                break;
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    tracing::info!(conn_id = %conn_id, identity = %claims.sub, "WebSocket disconnected, cleaning up");

    // Room cleanup runs before the connection is unregistered; failures are
    // logged inside, never raised.
    state.coordinator.disconnect(&conn_id).await;
    send_task.abort();
}

/// Single typed dispatch point for one connection's inbound events. Errors
/// go back to the originating connection only.
async fn dispatch(text: &str, conn_id: &str, state: &AppState) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(conn_id = %conn_id, error = %e, "Malformed inbound event");
            let err = AppError::InvalidValue(format!("Malformed event: {}", e));
            state
                .coordinator
                .registry()
                .send_to(conn_id, ServerEvent::error(&err));
            return;
        }
    };

    let result = match event {
        ClientEvent::JoinRoom { room_id } => state.coordinator.join(conn_id, &room_id).await,
        ClientEvent::LeaveRoom { room_id } => state.coordinator.leave(conn_id, &room_id).await,
        ClientEvent::ChatMessage { room_id, text } => {
            state.coordinator.chat(conn_id, &room_id, &text).await
        }
        ClientEvent::TypingStart { room_id } => {
            state.coordinator.typing(conn_id, &room_id, true).await
        }
        ClientEvent::TypingStop { room_id } => {
            state.coordinator.typing(conn_id, &room_id, false).await
        }
        ClientEvent::WebrtcOffer {
            offer,
            target_conn_id,
            ..
        } => {
            state.relay.relay_offer(conn_id, &target_conn_id, offer);
            Ok(())
        }
        ClientEvent::WebrtcAnswer {
            answer,
            target_conn_id,
            ..
        } => {
            state.relay.relay_answer(conn_id, &target_conn_id, answer);
            Ok(())
        }
        ClientEvent::WebrtcIceCandidate {
            candidate,
            target_conn_id,
            ..
        } => {
            state
                .relay
                .relay_candidate(conn_id, &target_conn_id, candidate);
            Ok(())
        }
        ClientEvent::RoomStatusUpdated { room_id, status } => {
            state
                .coordinator
                .status_change(conn_id, &room_id, &status)
                .await
        }
    };

    if let Err(e) = result {
        tracing::debug!(conn_id = %conn_id, error = %e, "Event handler error");
        state
            .coordinator
            .registry()
            .send_to(conn_id, ServerEvent::error(&e));
    }
}
