//! Room Handlers
//!
//! Listing, creation, membership, presence and history of rooms. The REST
//! surface takes identities from the request; it does not authenticate.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::application::dto::{
    ActorFields, CreateRoomRequest, HistoryQuery, HistoryResponse, MembershipRequest,
    MessageResponse, OnlineUsersResponse, RoomListQuery, RoomResponse, SendMessageRequest,
};
use crate::application::services::SendMessage;
use crate::domain::{Identity, MessageKind};
use crate::presentation::http::extractors::{ApiQuery, ValidatedJson};
use crate::shared::error::AppError;
use crate::startup::AppState;

/// GET /rooms
pub async fn list_rooms(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<RoomListQuery>,
) -> Result<Json<Vec<RoomResponse>>, AppError> {
    let rooms = state.chat.list_rooms(query.into_filter()?).await?;
    Ok(Json(rooms.into_iter().map(RoomResponse::from).collect()))
}

/// POST /rooms
pub async fn create_room(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateRoomRequest>,
) -> Result<(StatusCode, Json<RoomResponse>), AppError> {
    let creator = req.creator();
    let room = state
        .chat
        .create_room(req.into_create_room(), &creator)
        .await?;
    Ok((StatusCode::CREATED, Json(RoomResponse::from(room))))
}

/// GET /rooms/{room_id}
pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomResponse>, AppError> {
    let room = state.chat.get_room(&room_id).await?;
    Ok(Json(RoomResponse::from(room)))
}

/// POST /rooms/{room_id}/join
pub async fn join_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    ValidatedJson(req): ValidatedJson<MembershipRequest>,
) -> Result<Json<RoomResponse>, AppError> {
    let room = state.chat.join_room(&room_id, &req.actor(), true).await?;
    Ok(Json(RoomResponse::from(room)))
}

/// POST /rooms/{room_id}/leave
pub async fn leave_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    ValidatedJson(req): ValidatedJson<MembershipRequest>,
) -> Result<Json<RoomResponse>, AppError> {
    let room = state.chat.leave_room(&room_id, &req.actor(), true).await?;
    Ok(Json(RoomResponse::from(room)))
}

/// GET /rooms/{room_id}/online
pub async fn online_users(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<OnlineUsersResponse>, AppError> {
    state.chat.get_room(&room_id).await?;
    let users = state.presence.list_online(&room_id);
    Ok(Json(OnlineUsersResponse::new(room_id, users)))
}

/// GET /rooms/{room_id}/messages
pub async fn get_messages(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let before = query.before()?;
    let reader = query
        .identity_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| reader_identity(&state, id, query.role.as_deref()));

    let page = state
        .chat
        .history(&room_id, reader.as_ref(), query.limit, before)
        .await?;
    Ok(Json(HistoryResponse::new(room_id, page)))
}

/// POST /rooms/{room_id}/messages
pub async fn send_message(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    ValidatedJson(req): ValidatedJson<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let kind = req.kind()?;
    if kind == MessageKind::System {
        return Err(AppError::Validation(
            "type: system messages are generated by the server".into(),
        ));
    }
    let reply_to_id = req.reply_to_id()?;
    let sender = req.sender();

    let message = state
        .chat
        .send(SendMessage {
            room_id,
            sender,
            content: req.content,
            kind,
            reply_to_id,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(MessageResponse::from(message))))
}

/// The connected identity if there is one, else a bare identity for `id`.
fn reader_identity(state: &AppState, id: &str, role: Option<&str>) -> Identity {
    state
        .presence
        .session(id)
        .map(|session| session.identity)
        .unwrap_or_else(|| Identity::new(id, id, role, None))
}
