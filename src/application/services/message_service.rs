//! Message Service
//!
//! The message store: posting, paged history, soft deletion, reactions,
//! edits and read receipts.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::domain::{
    DeletionState, EditState, Identity, Message, MessageKind, MessageRepository,
};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;
use crate::shared::snowflake::SnowflakeGenerator;

/// Longest accepted message body, in characters.
pub const MAX_CONTENT_LENGTH: usize = 5000;

/// Longest accepted reaction token, in characters.
pub const MAX_EMOJI_LENGTH: usize = 32;

/// A message about to be persisted.
#[derive(Debug, Clone)]
pub struct PostMessage {
    pub room_id: String,
    pub sender: Identity,
    pub content: String,
    pub kind: MessageKind,
    pub reply_to_id: Option<i64>,
}

/// One page of history, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    /// True when older messages exist before the first one returned
    pub has_more: bool,
}

#[derive(Clone)]
pub struct MessageService {
    messages: Arc<dyn MessageRepository>,
    ids: Arc<SnowflakeGenerator>,
    history_default_limit: u32,
    history_max_limit: u32,
}

impl MessageService {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        ids: Arc<SnowflakeGenerator>,
        history_default_limit: u32,
        history_max_limit: u32,
    ) -> Self {
        Self {
            messages,
            ids,
            history_default_limit,
            history_max_limit: history_max_limit.max(1),
        }
    }

    /// Persist a new message and return it as stored.
    ///
    /// A reply target that does not exist or lives in another room is
    /// dropped; a deleted target still yields a snapshot.
    pub async fn post(&self, new: PostMessage) -> Result<Message, AppError> {
        validate_content(&new.content, &new.kind)?;

        let reply_to = match new.reply_to_id {
            Some(target_id) => match self.messages.find_by_id(target_id).await? {
                Some(target) if target.room_id == new.room_id => Some(target.reply_snapshot()),
                _ => {
                    tracing::debug!(
                        room_id = %new.room_id,
                        reply_to_id = target_id,
                        "Dropping unresolved reply target"
                    );
                    None
                }
            },
            None => None,
        };

        let message = Message {
            id: self.ids.generate(),
            room_id: new.room_id,
            sender: new.sender,
            content: new.content,
            kind: new.kind,
            reply_to,
            reactions: Vec::new(),
            read_by: Vec::new(),
            deleted: DeletionState::default(),
            edited: EditState::default(),
            created_at: Utc::now(),
        };

        let started = Instant::now();
        self.messages.insert(&message).await?;
        metrics::record_store_operation("message.insert", started);
        metrics::record_message_persisted(message.kind.as_str());

        tracing::debug!(
            message_id = message.id,
            room_id = %message.room_id,
            sender_id = %message.sender.id,
            message_type = message.kind.as_str(),
            "Message persisted"
        );
        Ok(message)
    }

    /// A non-deleted message by id.
    pub async fn get(&self, message_id: i64) -> Result<Message, AppError> {
        self.messages
            .find_by_id(message_id)
            .await?
            .filter(|m| !m.is_deleted())
            .ok_or_else(|| message_not_found(message_id))
    }

    /// The most recent `limit` visible messages created before `before`,
    /// returned oldest first.
    pub async fn history(
        &self,
        room_id: &str,
        limit: Option<u32>,
        before: Option<DateTime<Utc>>,
    ) -> Result<HistoryPage, AppError> {
        let limit = limit
            .unwrap_or(self.history_default_limit)
            .clamp(1, self.history_max_limit);

        let started = Instant::now();
        let mut messages = self
            .messages
            .find_recent(room_id, before, limit + 1)
            .await?;
        metrics::record_store_operation("message.find_recent", started);

        let has_more = messages.len() > limit as usize;
        messages.truncate(limit as usize);
        messages.reverse();
        Ok(HistoryPage { messages, has_more })
    }

    /// Newest visible message of a room.
    pub async fn latest(&self, room_id: &str) -> Result<Option<Message>, AppError> {
        let mut recent = self.messages.find_recent(room_id, None, 1).await?;
        Ok(recent.pop())
    }

    /// Soft-delete a message. The caller decides whether `actor` may.
    pub async fn soft_delete(&self, message_id: i64, actor: &Identity) -> Result<Message, AppError> {
        let deletion = DeletionState::by(actor, Utc::now());
        let started = Instant::now();
        let message = self
            .messages
            .soft_delete(message_id, &deletion)
            .await?
            .ok_or_else(|| message_not_found(message_id))?;
        metrics::record_store_operation("message.soft_delete", started);
        Ok(message)
    }

    /// Toggle `identity`'s reaction with `emoji`.
    pub async fn react(
        &self,
        message_id: i64,
        identity: &Identity,
        emoji: &str,
    ) -> Result<Message, AppError> {
        let emoji = emoji.trim();
        if emoji.is_empty() {
            return Err(AppError::Validation("emoji: must not be empty".into()));
        }
        if emoji.chars().count() > MAX_EMOJI_LENGTH {
            return Err(AppError::Validation(format!(
                "emoji: must be at most {} characters",
                MAX_EMOJI_LENGTH
            )));
        }

        let started = Instant::now();
        let message = self
            .messages
            .toggle_reaction(message_id, &identity.to_ref(), emoji)
            .await?
            .ok_or_else(|| message_not_found(message_id))?;
        metrics::record_store_operation("message.toggle_reaction", started);
        Ok(message)
    }

    /// Replace the content of a visible message, keeping the first original.
    pub async fn edit(&self, message_id: i64, content: String) -> Result<Message, AppError> {
        let mut message = self.get(message_id).await?;
        validate_content(&content, &message.kind)?;

        message.apply_edit(content, Utc::now());
        let started = Instant::now();
        let updated = self
            .messages
            .update_content(message_id, &message.content, &message.edited)
            .await?
            .ok_or_else(|| message_not_found(message_id))?;
        metrics::record_store_operation("message.update_content", started);
        Ok(updated)
    }

    /// Add a read receipt for `identity` on every visible message of the
    /// rooms. Returns how many receipts were new.
    pub async fn mark_read(&self, room_ids: &[String], identity: &Identity) -> Result<u64, AppError> {
        if room_ids.is_empty() {
            return Ok(0);
        }
        let started = Instant::now();
        let updated = self
            .messages
            .mark_read(room_ids, &identity.to_ref(), Utc::now())
            .await?;
        metrics::record_store_operation("message.mark_read", started);
        Ok(updated)
    }
}

fn validate_content(content: &str, kind: &MessageKind) -> Result<(), AppError> {
    let needs_text = matches!(kind, MessageKind::Text | MessageKind::System);
    if needs_text && content.trim().is_empty() {
        return Err(AppError::Validation(
            "content: must not be empty for text messages".into(),
        ));
    }
    if content.chars().count() > MAX_CONTENT_LENGTH {
        return Err(AppError::Validation(format!(
            "content: must be at most {} characters",
            MAX_CONTENT_LENGTH
        )));
    }
    Ok(())
}

fn message_not_found(message_id: i64) -> AppError {
    AppError::NotFound(format!("Message {} not found", message_id))
}
