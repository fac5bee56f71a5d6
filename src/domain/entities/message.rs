//! Message entity and repository trait.
//!
//! Maps to the `chat_messages` table plus `chat_message_reactions` and
//! `chat_message_reads`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::{DeletedByModel, Identity, IdentityRef};
use super::room::{LastMessage, PREVIEW_LENGTH};
use crate::shared::error::AppError;

/// A file carried by a non-text message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Public URL returned by the blob store
    #[serde(rename = "data")]
    pub url: String,
    /// MIME type
    #[serde(rename = "type")]
    pub mime_type: String,
    pub name: String,
    /// Bytes
    pub size: u64,
}

/// Message body variants. Only attachment-bearing kinds carry an attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "attachment", rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    File(Attachment),
    Image(Attachment),
    Video(Attachment),
    Audio(Attachment),
    System,
}

impl MessageKind {
    /// Build a kind from its wire parts.
    pub fn from_parts(kind: &str, attachment: Option<Attachment>) -> Result<Self, AppError> {
        let needs_attachment = |attachment: Option<Attachment>| {
            attachment.ok_or_else(|| {
                AppError::Validation(format!("attachment: required for {} messages", kind))
            })
        };
        let no_attachment = |attachment: &Option<Attachment>| {
            if attachment.is_some() {
                Err(AppError::Validation(format!(
                    "attachment: not allowed for {} messages",
                    kind
                )))
            } else {
                Ok(())
            }
        };

        match kind {
            "text" => no_attachment(&attachment).map(|_| Self::Text),
            "system" => no_attachment(&attachment).map(|_| Self::System),
            "file" => needs_attachment(attachment).map(Self::File),
            "image" => needs_attachment(attachment).map(Self::Image),
            "video" => needs_attachment(attachment).map(Self::Video),
            "audio" => needs_attachment(attachment).map(Self::Audio),
            other => Err(AppError::Validation(format!(
                "type: '{}' is not one of text, file, image, video, audio, system",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::File(_) => "file",
            Self::Image(_) => "image",
            Self::Video(_) => "video",
            Self::Audio(_) => "audio",
            Self::System => "system",
        }
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        match self {
            Self::File(a) | Self::Image(a) | Self::Video(a) | Self::Audio(a) => Some(a),
            Self::Text | Self::System => None,
        }
    }
}

/// Snapshot of the message being replied to, frozen at reply time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplySnapshot {
    pub message_id: i64,
    pub sender_name: String,
    pub content: String,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub users: Vec<IdentityRef>,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub identity: IdentityRef,
    pub read_at: DateTime<Utc>,
}

/// Soft-delete tombstone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionState {
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub deleted_by_model: Option<DeletedByModel>,
}

impl DeletionState {
    pub fn by(actor: &Identity, at: DateTime<Utc>) -> Self {
        Self {
            is_deleted: true,
            deleted_at: Some(at),
            deleted_by: Some(actor.id.clone()),
            deleted_by_model: Some(DeletedByModel::for_role(actor.role)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditState {
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    /// Content as first sent; later edits keep it
    pub original_content: Option<String>,
}

/// The atomic unit of the chat log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Snowflake ID, ordered by persistence
    pub id: i64,
    pub room_id: String,
    /// Sender snapshot captured at send time
    pub sender: Identity,
    pub content: String,
    #[serde(flatten)]
    pub kind: MessageKind,
    pub reply_to: Option<ReplySnapshot>,
    pub reactions: Vec<Reaction>,
    pub read_by: Vec<ReadReceipt>,
    pub deleted: DeletionState,
    pub edited: EditState,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_deleted(&self) -> bool {
        self.deleted.is_deleted
    }

    /// Snapshot used when another message replies to this one.
    pub fn reply_snapshot(&self) -> ReplySnapshot {
        let truncated = self.content.chars().count() > PREVIEW_LENGTH;
        ReplySnapshot {
            message_id: self.id,
            sender_name: self.sender.name.clone(),
            content: self.content.chars().take(PREVIEW_LENGTH).collect(),
            truncated,
        }
    }

    /// Room preview for this message.
    pub fn preview(&self) -> LastMessage {
        let content = if self.content.is_empty() {
            self.kind
                .attachment()
                .map(|a| a.name.as_str())
                .unwrap_or_default()
        } else {
            self.content.as_str()
        };
        LastMessage::new(
            self.id.to_string(),
            content,
            self.created_at,
            self.sender.name.clone(),
            self.kind.as_str(),
        )
    }

    /// Toggle `identity`'s reaction with `emoji`. Returns true when added.
    pub fn toggle_reaction(&mut self, identity: &IdentityRef, emoji: &str) -> bool {
        let position = self.reactions.iter().position(|r| r.emoji == emoji);
        match position {
            Some(idx) => {
                let bucket = &mut self.reactions[idx];
                if let Some(user_idx) = bucket.users.iter().position(|u| u.id == identity.id) {
                    bucket.users.remove(user_idx);
                    bucket.count = bucket.users.len() as i64;
                    if bucket.users.is_empty() {
                        self.reactions.remove(idx);
                    }
                    false
                } else {
                    bucket.users.push(identity.clone());
                    bucket.count = bucket.users.len() as i64;
                    true
                }
            }
            None => {
                self.reactions.push(Reaction {
                    emoji: emoji.to_string(),
                    users: vec![identity.clone()],
                    count: 1,
                });
                true
            }
        }
    }

    /// Add a read receipt unless one exists. Returns true when added.
    pub fn mark_read(&mut self, identity: &IdentityRef, at: DateTime<Utc>) -> bool {
        if self.read_by.iter().any(|r| r.identity.id == identity.id) {
            return false;
        }
        self.read_by.push(ReadReceipt {
            identity: identity.clone(),
            read_at: at,
        });
        true
    }

    /// Replace content, remembering the first original.
    pub fn apply_edit(&mut self, content: String, at: DateTime<Utc>) {
        let original = self
            .edited
            .original_content
            .take()
            .unwrap_or_else(|| self.content.clone());
        self.edited = EditState {
            is_edited: true,
            edited_at: Some(at),
            original_content: Some(original),
        };
        self.content = content;
    }
}

/// Repository trait for Message data access operations.
///
/// Mutations return the stored message afterwards, or `None` when the id
/// does not resolve to a visible (non-deleted) message.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: &Message) -> Result<(), AppError>;

    /// Find a message by id, including soft-deleted ones.
    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError>;

    /// Up to `limit` non-deleted messages of a room created strictly before
    /// `before`, newest first.
    async fn find_recent(
        &self,
        room_id: &str,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<Message>, AppError>;

    async fn soft_delete(&self, id: i64, deletion: &DeletionState)
        -> Result<Option<Message>, AppError>;

    async fn toggle_reaction(
        &self,
        id: i64,
        identity: &IdentityRef,
        emoji: &str,
    ) -> Result<Option<Message>, AppError>;

    async fn update_content(
        &self,
        id: i64,
        content: &str,
        edited: &EditState,
    ) -> Result<Option<Message>, AppError>;

    /// Add missing receipts on every non-deleted message of the rooms.
    /// Returns how many receipts were created.
    async fn mark_read(
        &self,
        room_ids: &[String],
        identity: &IdentityRef,
        at: DateTime<Utc>,
    ) -> Result<u64, AppError>;
}
