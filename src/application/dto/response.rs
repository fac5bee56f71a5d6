//! Response DTOs
//!
//! Wire shapes shared by the REST API and the gateway. Snowflake ids are
//! sent as strings so clients never lose precision.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::services::HistoryPage;
use crate::domain::{
    Attachment, DeletionState, EditState, Identity, IdentityRef, LastMessage, Message,
    ReadReceipt, Reaction, Room, RoomMember, RoomMetadata, RoomSettings, RoomStats, RoomType,
};
use crate::infrastructure::blob::StoredBlob;

/// Room response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub room_type: RoomType,
    pub avatar: String,
    pub settings: RoomSettings,
    pub members: Vec<RoomMember>,
    pub member_count: usize,
    pub last_message: Option<LastMessage>,
    pub stats: RoomStats,
    pub metadata: RoomMetadata,
    pub is_active: bool,
    pub created_by: IdentityRef,
    pub created_at: DateTime<Utc>,
}

impl From<Room> for RoomResponse {
    fn from(room: Room) -> Self {
        Self {
            member_count: room.members.len(),
            id: room.id,
            name: room.name,
            description: room.description,
            room_type: room.room_type,
            avatar: room.avatar,
            settings: room.settings,
            members: room.members,
            last_message: room.last_message,
            stats: room.stats,
            metadata: room.metadata,
            is_active: room.is_active,
            created_by: room.created_by,
            created_at: room.created_at,
        }
    }
}

/// Reply snapshot with a string id
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyResponse {
    pub message_id: String,
    pub sender_name: String,
    pub content: String,
    pub truncated: bool,
}

/// Message response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: String,
    pub room_id: String,
    pub sender: Identity,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    pub reply_to: Option<ReplyResponse>,
    pub reactions: Vec<Reaction>,
    pub read_by: Vec<ReadReceipt>,
    pub deleted: DeletionState,
    pub edited: EditState,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id.to_string(),
            message_type: message.kind.as_str(),
            attachment: message.kind.attachment().cloned(),
            room_id: message.room_id,
            sender: message.sender,
            content: message.content,
            reply_to: message.reply_to.map(|r| ReplyResponse {
                message_id: r.message_id.to_string(),
                sender_name: r.sender_name,
                content: r.content,
                truncated: r.truncated,
            }),
            reactions: message.reactions,
            read_by: message.read_by,
            deleted: message.deleted,
            edited: message.edited,
            created_at: message.created_at,
        }
    }
}

/// History page response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub room_id: String,
    pub messages: Vec<MessageResponse>,
    pub has_more: bool,
}

impl HistoryResponse {
    pub fn new(room_id: impl Into<String>, page: HistoryPage) -> Self {
        Self {
            room_id: room_id.into(),
            messages: page.messages.into_iter().map(MessageResponse::from).collect(),
            has_more: page.has_more,
        }
    }
}

/// Online users of a room
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUsersResponse {
    pub room_id: String,
    pub users: Vec<Identity>,
    pub count: usize,
}

impl OnlineUsersResponse {
    pub fn new(room_id: impl Into<String>, users: Vec<Identity>) -> Self {
        Self {
            room_id: room_id.into(),
            count: users.len(),
            users,
        }
    }
}

/// Mark-read result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    pub room_ids: Vec<String>,
    pub updated: u64,
}

/// Upload result
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub blob: StoredBlob,
    /// Voice notes only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl From<StoredBlob> for UploadResponse {
    fn from(blob: StoredBlob) -> Self {
        Self {
            blob,
            duration: None,
        }
    }
}
