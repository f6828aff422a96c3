//! HTTP Routes
//!
//! Request/response fallback for clients without a WebSocket, plus the
//! login and room endpoints. Every round operation goes through the same
//! `RoomCoordinator` as the real-time path, so WebSocket peers see moves
//! and resets made over HTTP.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::game::round::{ParticipantId, RoomId, RoomStatus, SessionError};
use crate::network::coordinator::{CoordinatorError, PollOutcome, RoomCoordinator};
use crate::network::directory::{
    DirectoryError, IdentityProvider, InMemoryIdentityProvider, InMemoryRoomDirectory,
    RoomDirectory, RoomRoster,
};

/// State shared across all handlers.
#[derive(Clone)]
pub struct HttpState {
    /// Round coordination.
    pub coordinator: Arc<RoomCoordinator>,
    /// User registry.
    pub identity: Arc<InMemoryIdentityProvider>,
    /// Room registry.
    pub directory: Arc<InMemoryRoomDirectory>,
}

/// Build the HTTP routes.
///
/// - `GET  /health`
/// - `POST /login`, `GET /users/:user_id`
/// - `POST /create-room`, `POST /join-room`, `GET /rooms/:room_id/players`
/// - `GET  /rooms/:room_id/status`
/// - `POST /play`, `GET /state/:room_id/:user_id`
pub fn build_routes(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/login", post(login))
        .route("/users/:user_id", get(get_user))
        .route("/create-room", post(create_room))
        .route("/join-room", post(join_room))
        .route("/rooms/:room_id/players", get(room_players))
        .route("/rooms/:room_id/status", get(room_status))
        .route("/play", post(play))
        .route("/state/:room_id/:user_id", get(poll_state))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] CoordinatorError);

impl From<DirectoryError> for ApiError {
    fn from(e: DirectoryError) -> Self {
        ApiError(e.into())
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        ApiError(e.into())
    }
}

impl ApiError {
    /// HTTP status and machine-readable code.
    pub fn status(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            CoordinatorError::Session(SessionError::InvalidMove(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_MOVE")
            }
            CoordinatorError::Session(SessionError::SessionBusy { .. }) => {
                (StatusCode::CONFLICT, "SESSION_BUSY")
            }
            CoordinatorError::Admission(e) => match e {
                DirectoryError::RoomNotFound(_) => (StatusCode::NOT_FOUND, "ROOM_NOT_FOUND"),
                DirectoryError::UserNotFound(_) => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
                DirectoryError::RoomFull(_) => (StatusCode::CONFLICT, "ROOM_FULL"),
                DirectoryError::ParticipantNotAuthorized { .. } => {
                    (StatusCode::FORBIDDEN, "NOT_AUTHORIZED")
                }
                DirectoryError::InvalidUsername => (StatusCode::BAD_REQUEST, "INVALID_USERNAME"),
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();
        tracing::debug!(status = status.as_u16(), code, "request rejected: {}", self);
        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// REQUEST / RESPONSE TYPES
// =============================================================================

/// `POST /login` body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Requested username.
    pub username: String,
}

/// A user as returned by `/login` and `/users/:user_id`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    /// Participant id.
    pub user_id: ParticipantId,
    /// Display name.
    pub username: String,
}

/// `POST /create-room` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    /// Creator.
    pub user_id: ParticipantId,
    /// Optional room name.
    #[serde(default)]
    pub room_name: Option<String>,
}

/// `POST /join-room` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    /// Room code.
    pub room_id: RoomId,
    /// Joining participant.
    pub user_id: ParticipantId,
}

/// `GET /rooms/:room_id/players` response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayersView {
    /// Room code.
    pub room_id: RoomId,
    /// Room name.
    pub room_name: String,
    /// Members in join order.
    pub players: Vec<UserView>,
}

/// `POST /play` body. Extra fields such as `username` are ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayRequest {
    /// Room code.
    pub room_id: RoomId,
    /// Submitting participant.
    pub user_id: ParticipantId,
    /// Raw move.
    #[serde(rename = "move")]
    pub mv: String,
}

/// `POST /play` response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayResponse {
    /// Always `"move received"`.
    pub status: String,
    /// Moves recorded in the round.
    pub moves_count: usize,
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn health() -> &'static str {
    "OK"
}

async fn login(
    State(state): State<HttpState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<UserView>, ApiError> {
    let user_id = state.identity.login(&request.username).await?;
    let username = state.identity.lookup(&user_id).await?;
    tracing::info!(participant = user_id.short(), "user logged in");
    Ok(Json(UserView { user_id, username }))
}

async fn get_user(
    State(state): State<HttpState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserView>, ApiError> {
    let user_id = ParticipantId::new(user_id);
    let username = state.identity.lookup(&user_id).await?;
    Ok(Json(UserView { user_id, username }))
}

async fn create_room(
    State(state): State<HttpState>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<Json<RoomRoster>, ApiError> {
    state.identity.lookup(&request.user_id).await?;
    let roster = state
        .directory
        .create_room(request.user_id, request.room_name.as_deref())
        .await;
    tracing::info!(room = %roster.room_id, "room created");
    Ok(Json(roster))
}

async fn join_room(
    State(state): State<HttpState>,
    Json(request): Json<JoinRoomRequest>,
) -> Result<Json<RoomRoster>, ApiError> {
    state.identity.lookup(&request.user_id).await?;
    let roster = state
        .directory
        .join_room(&request.room_id, request.user_id)
        .await?;
    Ok(Json(roster))
}

async fn room_players(
    State(state): State<HttpState>,
    Path(room_id): Path<String>,
) -> Result<Json<PlayersView>, ApiError> {
    let roster = state.directory.roster(&room_id).await?;

    let mut players = Vec::with_capacity(roster.players.len());
    for user_id in roster.players {
        let username = state.coordinator.display_name(&room_id, &user_id).await;
        players.push(UserView { user_id, username });
    }

    Ok(Json(PlayersView {
        room_id: roster.room_id,
        room_name: roster.room_name,
        players,
    }))
}

async fn room_status(
    State(state): State<HttpState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomStatus>, ApiError> {
    state.directory.roster(&room_id).await?;
    Ok(Json(state.coordinator.status(&room_id).await))
}

async fn play(
    State(state): State<HttpState>,
    Json(request): Json<PlayRequest>,
) -> Result<Json<PlayResponse>, ApiError> {
    let receipt = state
        .coordinator
        .submit_move(&request.room_id, &request.user_id, &request.mv)
        .await?;
    Ok(Json(PlayResponse {
        status: "move received".to_string(),
        moves_count: receipt.moves_count,
    }))
}

async fn poll_state(
    State(state): State<HttpState>,
    Path((room_id, user_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let outcome = state
        .coordinator
        .poll_state(&room_id, &ParticipantId::new(user_id))
        .await?;

    Ok(match outcome {
        PollOutcome::Waiting => Json(serde_json::json!({ "status": "waiting" })).into_response(),
        PollOutcome::Resolved(report) => Json(report).into_response(),
    })
}
