//! WebSocket Message Types
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.
//! Event names are kebab-case; payload fields are camelCase.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::dto::{MessageResponse, RoomResponse};
use crate::domain::{Attachment, DeletedByModel, Identity, Reaction, RoomMetadata, RoomSettings};
use crate::infrastructure::identity::IdentityClaim;
use crate::shared::error::AppError;

/// Events a client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    Identify(IdentityClaim),
    Join(RoomRef),
    Leave(RoomRef),
    Send(SendPayload),
    TypingStart(RoomRef),
    TypingStop(RoomRef),
    React(ReactPayload),
    Delete(MessageRef),
    Edit(EditPayload),
    GetOnlineUsers(RoomRef),
    CreateRoom(CreateRoomPayload),
    MarkRead(MarkReadPayload),
    Ping,
}

impl ClientEvent {
    /// Event name, used for metrics and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Identify(_) => "identify",
            Self::Join(_) => "join",
            Self::Leave(_) => "leave",
            Self::Send(_) => "send",
            Self::TypingStart(_) => "typing-start",
            Self::TypingStop(_) => "typing-stop",
            Self::React(_) => "react",
            Self::Delete(_) => "delete",
            Self::Edit(_) => "edit",
            Self::GetOnlineUsers(_) => "get-online-users",
            Self::CreateRoom(_) => "create-room",
            Self::MarkRead(_) => "mark-read",
            Self::Ping => "ping",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub room_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    pub room_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type", default = "default_message_type")]
    pub message_type: String,
    pub attachment: Option<Attachment>,
    pub reply_to_id: Option<String>,
}

fn default_message_type() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactPayload {
    pub message_id: String,
    pub room_id: Option<String>,
    pub emoji: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub message_id: String,
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditPayload {
    pub message_id: String,
    pub room_id: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomPayload {
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub room_type: Option<String>,
    pub avatar: Option<String>,
    pub settings: Option<RoomSettings>,
    pub metadata: Option<RoomMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadPayload {
    pub room_id: Option<String>,
    #[serde(default)]
    pub room_ids: Vec<String>,
}

impl MarkReadPayload {
    pub fn rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self.room_id.iter().cloned().collect();
        for room in &self.room_ids {
            if !rooms.contains(room) {
                rooms.push(room.clone());
            }
        }
        rooms
    }
}

/// Events the server sends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    Hello(HelloPayload),
    Connected(ConnectedPayload),
    Joined(JoinedPayload),
    UserJoined(PresencePayload),
    UserLeft(PresencePayload),
    Message(MessageResponse),
    MessageEdited(MessageResponse),
    MessageDeleted(MessageDeletedPayload),
    ReactionUpdated(ReactionUpdatedPayload),
    TypingStarted(PresencePayload),
    TypingStopped(PresencePayload),
    OnlineUsers(OnlineUsersPayload),
    RoomCreated(RoomResponse),
    ReadMarked(ReadMarkedPayload),
    Pong(PongPayload),
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hello(_) => "hello",
            Self::Connected(_) => "connected",
            Self::Joined(_) => "joined",
            Self::UserJoined(_) => "user-joined",
            Self::UserLeft(_) => "user-left",
            Self::Message(_) => "message",
            Self::MessageEdited(_) => "message-edited",
            Self::MessageDeleted(_) => "message-deleted",
            Self::ReactionUpdated(_) => "reaction-updated",
            Self::TypingStarted(_) => "typing-started",
            Self::TypingStopped(_) => "typing-stopped",
            Self::OnlineUsers(_) => "online-users",
            Self::RoomCreated(_) => "room-created",
            Self::ReadMarked(_) => "read-marked",
            Self::Pong(_) => "pong",
            Self::Error(_) => "error",
        }
    }

    pub fn user_joined(room_id: &str, identity: Identity) -> Self {
        Self::UserJoined(PresencePayload::new(room_id, identity))
    }

    pub fn user_left(room_id: &str, identity: Identity) -> Self {
        Self::UserLeft(PresencePayload::new(room_id, identity))
    }

    pub fn typing_started(room_id: &str, identity: Identity) -> Self {
        Self::TypingStarted(PresencePayload::new(room_id, identity))
    }

    pub fn typing_stopped(room_id: &str, identity: Identity) -> Self {
        Self::TypingStopped(PresencePayload::new(room_id, identity))
    }

    pub fn error(kind: &str, message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            kind: kind.to_string(),
            message: message.into(),
        })
    }

    /// Error event for a failed request. Storage details stay in the logs.
    pub fn from_error(err: &AppError) -> Self {
        Self::error(err.kind(), err.public_message())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPayload {
    pub heartbeat_interval: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    pub identity_id: String,
    pub identity: Identity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedPayload {
    pub room_id: String,
    pub online_count: usize,
    pub roster: Vec<Identity>,
    /// Identities currently typing in the room
    pub typing: Vec<Identity>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub room_id: String,
    pub identity: Identity,
}

impl PresencePayload {
    pub fn new(room_id: &str, identity: Identity) -> Self {
        Self {
            room_id: room_id.to_string(),
            identity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeletedPayload {
    pub message_id: String,
    pub room_id: String,
    pub deleted_by: String,
    pub deleted_by_model: DeletedByModel,
    pub deleted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionUpdatedPayload {
    pub message_id: String,
    pub room_id: String,
    pub reactions: Vec<Reaction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUsersPayload {
    pub room_id: String,
    pub users: Vec<Identity>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadMarkedPayload {
    pub room_ids: Vec<String>,
    pub updated: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PongPayload {
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub kind: String,
    pub message: String,
}

/// What a connection's writer task receives.
#[derive(Debug, Clone)]
pub enum Outbound {
    Event(Arc<ServerEvent>),
    /// Close the socket with an application close code and reason
    Close { code: u16, reason: String },
}

/// Close code sent to a connection whose identity connected elsewhere.
pub const CLOSE_SESSION_REPLACED: u16 = 4001;
/// Close code for missed heartbeats or a missing identify.
pub const CLOSE_TIMEOUT: u16 = 4002;
