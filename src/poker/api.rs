#![forbid(unsafe_code)]

// HTTP endpoints for room lookup and creation, JSend response envelope

use crate::signaling::SignalingServer;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::info;

/// HTTP-level failures, rendered as JSend `fail` envelopes.
#[derive(Debug)]
pub enum ApiError {
    RoomNotFound,
    NameTaken,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::RoomNotFound => (StatusCode::NOT_FOUND, "Room not found."),
            ApiError::NameTaken => (
                StatusCode::BAD_REQUEST,
                "Name already taken, please choose another.",
            ),
        };
        (
            status,
            Json(json!({
                "status": "fail",
                "message": message,
            })),
        )
            .into_response()
    }
}

/// POST /scrumPoker/create — registers a new empty room and returns its id.
pub async fn create_room(State(server): State<SignalingServer>) -> Json<serde_json::Value> {
    let room_id = server.hub().create_room();
    info!("Created room {} via HTTP", room_id);
    Json(json!({
        "status": "success",
        "data": {
            "message": "Room created",
            "roomId": room_id,
        },
    }))
}

/// GET /scrumPoker/{room_id} — checks whether a room exists.
///
/// # Errors
/// Returns `ApiError::RoomNotFound` when no room has this id.
pub async fn room_exists(
    State(server): State<SignalingServer>,
    Path(room_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !server.hub().room_exists(&room_id) {
        return Err(ApiError::RoomNotFound);
    }
    Ok(Json(json!({
        "status": "success",
        "data": {
            "message": "Room exists",
            "roomId": room_id,
        },
    })))
}

/// GET /scrumPoker/{room_id}/player/{player_name} — checks whether a name is
/// still free in a room.
///
/// # Errors
/// Returns `RoomNotFound` for unknown rooms and `NameTaken` when another
/// player already uses the name.
pub async fn check_player_name(
    State(server): State<SignalingServer>,
    Path((room_id, player_name)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let available = server
        .hub()
        .is_name_available(&room_id, &player_name)
        .map_err(|_| ApiError::RoomNotFound)?;
    if !available {
        return Err(ApiError::NameTaken);
    }
    Ok(Json(json!({
        "status": "success",
        "data": {
            "message": format!("Name {player_name} is available"),
            "available": true,
        },
    })))
}
