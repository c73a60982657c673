use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{
    Claims, CreateRoomRequest, JoinRoomRequest, Participant, Room, RoomInfo, RoomStatus,
    UpdateStatusRequest, Visibility,
};
use crate::security::{access_code_matches, generate_access_code};
use crate::state::AppState;

/// Room routes. These complete before any socket-layer join: the socket
/// layer never creates membership.
pub fn room_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_rooms).post(create_room))
        .route("/{room_id}", get(get_room).delete(delete_room))
        .route("/{room_id}/join", post(join_room))
        .route("/{room_id}/leave", post(leave_room))
        .route("/{room_id}/status", put(update_status))
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Claims> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Auth("Missing Authorization header".to_string()))?;

    state.auth.extract_bearer(header)
}

/// POST /api/v1/rooms - Create a new room
async fn create_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateRoomRequest>,
) -> Result<Json<RoomInfo>> {
    let claims = authenticate(&state, &headers)?;

    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::InvalidValue("Room name is required".to_string()));
    }
    if name.len() > 50 {
        return Err(AppError::InvalidValue(
            "Room name cannot exceed 50 characters".to_string(),
        ));
    }

    let access_code = match request.visibility {
        Visibility::Private => Some(generate_access_code()),
        Visibility::Public => None,
    };

    let room = Room::new(
        name.to_string(),
        &claims.sub,
        &claims.username,
        request.visibility,
        access_code,
        request.capacity,
    );

    state.directory.create(&room).await?;

    tracing::info!(room_id = %room.room_id, name = %room.name, creator = %claims.sub, "Room created");

    Ok(Json(room.info(Some(&claims.sub))))
}

#[derive(Debug, Deserialize)]
struct ListRoomsQuery {
    visibility: Option<Visibility>,
    status: Option<RoomStatus>,
}

/// GET /api/v1/rooms - List rooms, newest first
async fn list_rooms(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListRoomsQuery>,
) -> Result<Json<Vec<RoomInfo>>> {
    let claims = authenticate(&state, &headers)?;

    let rooms = state
        .directory
        .list()
        .await?
        .into_iter()
        .filter(|r| query.visibility.is_none_or(|v| r.visibility == v))
        .filter(|r| query.status.is_none_or(|s| r.status == s))
        .map(|r| r.info(Some(&claims.sub)))
        .collect();

    Ok(Json(rooms))
}

/// GET /api/v1/rooms/{room_id} - Get room information
async fn get_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
) -> Result<Json<RoomInfo>> {
    let claims = authenticate(&state, &headers)?;

    let room = state
        .directory
        .find(&room_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Room {} not found", room_id)))?;

    Ok(Json(room.info(Some(&claims.sub))))
}

/// POST /api/v1/rooms/{room_id}/join - Durable membership join. Access
/// codes are enforced here, and only here.
async fn join_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
    Json(request): Json<JoinRoomRequest>,
) -> Result<Json<RoomInfo>> {
    let claims = authenticate(&state, &headers)?;
    let _guard = state.room_locks.hold(&room_id).await;

    let room = state
        .directory
        .find(&room_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Room {} not found", room_id)))?;

    if let Some(stored_code) = &room.access_code {
        let supplied = request
            .access_code
            .as_deref()
            .ok_or_else(|| {
                AppError::Forbidden("Access code is required for private rooms".to_string())
            })?;
        if !access_code_matches(stored_code, supplied) {
            return Err(AppError::Forbidden("Invalid access code".to_string()));
        }
    }

    // Capacity and membership are re-checked inside the store mutation.
    let updated = state
        .directory
        .insert_participant(&room_id, Participant::new(&claims.sub, &claims.username))
        .await?;

    tracing::info!(room_id = %room_id, identity = %claims.sub, "Joined room (durable)");

    Ok(Json(updated.info(Some(&claims.sub))))
}

/// POST /api/v1/rooms/{room_id}/leave - Drop durable membership
async fn leave_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let claims = authenticate(&state, &headers)?;
    let _guard = state.room_locks.hold(&room_id).await;

    state
        .directory
        .find(&room_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Room {} not found", room_id)))?;

    state
        .directory
        .remove_participant(&room_id, &claims.sub)
        .await?;

    tracing::info!(room_id = %room_id, identity = %claims.sub, "Left room (durable)");

    Ok(Json(serde_json::json!({ "success": true })))
}

/// PUT /api/v1/rooms/{room_id}/status - Creator-only status toggle
async fn update_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<RoomInfo>> {
    let claims = authenticate(&state, &headers)?;
    let status: RoomStatus = request.status.parse()?;

    let _guard = state.room_locks.hold(&room_id).await;

    let room = state
        .directory
        .find(&room_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Room {} not found", room_id)))?;

    if !room.is_creator(&claims.sub) {
        return Err(AppError::Forbidden(
            "Only room creator can update status".to_string(),
        ));
    }

    let updated = state.directory.set_status(&room_id, status).await?;

    Ok(Json(updated.info(Some(&claims.sub))))
}

/// DELETE /api/v1/rooms/{room_id} - Creator-only delete
async fn delete_room(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(room_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let claims = authenticate(&state, &headers)?;
    let _guard = state.room_locks.hold(&room_id).await;

    let room = state
        .directory
        .find(&room_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Room {} not found", room_id)))?;

    if !room.is_creator(&claims.sub) {
        return Err(AppError::Forbidden(
            "Only the room creator can delete this room".to_string(),
        ));
    }

    state.directory.delete(&room_id).await?;
    state.room_locks.forget(&room_id);

    Ok(Json(serde_json::json!({ "success": true })))
}
