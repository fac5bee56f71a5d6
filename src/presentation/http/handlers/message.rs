//! Message Handlers
//!
//! Reactions, edits, deletions and read receipts addressed by message id.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::application::dto::{
    parse_message_id, ActorFields, DeleteMessageRequest, EditMessageRequest, MarkReadRequest,
    MarkReadResponse, MessageResponse, ReactionRequest,
};
use crate::presentation::http::extractors::ValidatedJson;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// POST /messages/{message_id}/reactions
///
/// Toggles the emoji for the identity and returns the updated message.
pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    ValidatedJson(req): ValidatedJson<ReactionRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let message_id = parse_message_id(&message_id)?;
    let message = state
        .chat
        .react(message_id, &req.actor(), &req.emoji, None)
        .await?;
    Ok(Json(MessageResponse::from(message)))
}

/// PATCH /messages/{message_id}
pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    ValidatedJson(req): ValidatedJson<EditMessageRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let message_id = parse_message_id(&message_id)?;
    let actor = req.actor();
    let message = state
        .chat
        .edit_message(message_id, &actor, req.content, None)
        .await?;
    Ok(Json(MessageResponse::from(message)))
}

/// DELETE /messages/{message_id}
///
/// Soft delete. The sender or a teacher/admin may delete.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    ValidatedJson(req): ValidatedJson<DeleteMessageRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let message_id = parse_message_id(&message_id)?;
    let message = state
        .chat
        .delete_message(message_id, &req.actor(), None)
        .await?;
    Ok(Json(MessageResponse::from(message)))
}

/// POST /messages/{room_id}/mark-read
pub async fn mark_read(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    ValidatedJson(req): ValidatedJson<MarkReadRequest>,
) -> Result<Json<MarkReadResponse>, AppError> {
    let mut room_ids = vec![room_id];
    for extra in &req.room_ids {
        if !room_ids.contains(extra) {
            room_ids.push(extra.clone());
        }
    }
    let updated = state.chat.mark_read(&room_ids, &req.actor()).await?;
    Ok(Json(MarkReadResponse { room_ids, updated }))
}
