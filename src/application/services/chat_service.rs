//! Chat Service
//!
//! Every chat mutation, whether it arrives over the gateway or the REST API,
//! goes through here. Each room has a sequencer; persisting a message,
//! updating the room preview and publishing the event all happen while it is
//! held, so subscribers observe events in persistence order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::message_service::{HistoryPage, MessageService, PostMessage};
use super::room_service::{CreateRoom, RoomService};
use crate::domain::{
    DeletedByModel, Identity, MemberRole, Message, MessageKind, ModerationService, Reaction, Room,
    RoomFilter, RoomType,
};
use crate::shared::error::AppError;

/// Events published after a mutation commits.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    MessageCreated(Message),
    MessageEdited(Message),
    MessageDeleted {
        room_id: String,
        message_id: i64,
        deleted_by: String,
        deleted_by_model: DeletedByModel,
        deleted_at: DateTime<Utc>,
    },
    ReactionUpdated {
        room_id: String,
        message_id: i64,
        reactions: Vec<Reaction>,
    },
    RoomCreated(Room),
}

impl ChatEvent {
    pub fn room_id(&self) -> &str {
        match self {
            Self::MessageCreated(m) | Self::MessageEdited(m) => &m.room_id,
            Self::MessageDeleted { room_id, .. } | Self::ReactionUpdated { room_id, .. } => {
                room_id
            }
            Self::RoomCreated(room) => &room.id,
        }
    }
}

/// Receives committed chat events. Implementations must not block.
pub trait ChatEventSink: Send + Sync {
    fn publish(&self, event: ChatEvent);
}

/// Sink that drops everything.
#[derive(Debug, Default)]
pub struct NullEventSink;

impl ChatEventSink for NullEventSink {
    fn publish(&self, _event: ChatEvent) {}
}

/// A send request from either surface.
#[derive(Debug, Clone)]
pub struct SendMessage {
    pub room_id: String,
    pub sender: Identity,
    pub content: String,
    pub kind: MessageKind,
    pub reply_to_id: Option<i64>,
}

pub struct ChatService {
    rooms: RoomService,
    messages: MessageService,
    sink: Arc<dyn ChatEventSink>,
    sequencers: DashMap<String, Arc<Mutex<()>>>,
    announce_membership: bool,
}

impl ChatService {
    pub fn new(
        rooms: RoomService,
        messages: MessageService,
        sink: Arc<dyn ChatEventSink>,
        announce_membership: bool,
    ) -> Self {
        Self {
            rooms,
            messages,
            sink,
            sequencers: DashMap::new(),
            announce_membership,
        }
    }

    pub fn rooms(&self) -> &RoomService {
        &self.rooms
    }

    pub fn messages(&self) -> &MessageService {
        &self.messages
    }

    fn sequencer(&self, room_id: &str) -> Arc<Mutex<()>> {
        self.sequencers
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn get_room(&self, room_id: &str) -> Result<Room, AppError> {
        self.rooms.get(room_id).await
    }

    pub async fn list_rooms(&self, filter: RoomFilter) -> Result<Vec<Room>, AppError> {
        self.rooms.find(filter).await
    }

    /// Create a room and announce it to every identified connection.
    pub async fn create_room(&self, new_room: CreateRoom, creator: &Identity) -> Result<Room, AppError> {
        let room = self.rooms.create(new_room, creator).await?;
        self.sink.publish(ChatEvent::RoomCreated(room.clone()));
        Ok(room)
    }

    /// Add `identity` to a room's members. Private rooms admit existing
    /// members and staff only. With `announce`, a newly added member gets a
    /// system message in the room.
    pub async fn join_room(
        &self,
        room_id: &str,
        identity: &Identity,
        announce: bool,
    ) -> Result<Room, AppError> {
        self.rooms.get(room_id).await?;
        let sequencer = self.sequencer(room_id);
        let _turn = sequencer.lock().await;
        // Membership is only read under the room's turn
        let room = self.rooms.get(room_id).await?;
        if !room.is_active {
            return Err(AppError::PermissionDenied(format!(
                "Room '{}' is archived",
                room.id
            )));
        }
        if !ModerationService::can_participate(&room, identity) {
            return Err(AppError::PermissionDenied(
                "This room is private".into(),
            ));
        }
        if room.is_member(&identity.id) {
            return Ok(room);
        }

        let room = self
            .rooms
            .add_member(room_id, identity, MemberRole::Member)
            .await?;
        tracing::info!(room_id = %room_id, identity_id = %identity.id, "Member joined room");

        if announce && self.announce_membership {
            let content = format!("{} joined the room", identity.name);
            return self.post_system(room_id, content).await.map(|(room, _)| room);
        }
        Ok(room)
    }

    /// Remove `identity` from a room's members. With `announce`, a removed
    /// member gets a system message in the room.
    pub async fn leave_room(
        &self,
        room_id: &str,
        identity: &Identity,
        announce: bool,
    ) -> Result<Room, AppError> {
        self.rooms.get(room_id).await?;
        let sequencer = self.sequencer(room_id);
        let _turn = sequencer.lock().await;
        // Membership is only read under the room's turn
        let room = self.rooms.get(room_id).await?;
        if !room.is_member(&identity.id) {
            return Ok(room);
        }

        let room = self.rooms.remove_member(room_id, &identity.id).await?;
        tracing::info!(room_id = %room_id, identity_id = %identity.id, "Member left room");

        if announce && self.announce_membership {
            let content = format!("{} left the room", identity.name);
            return self.post_system(room_id, content).await.map(|(room, _)| room);
        }
        Ok(room)
    }

    /// Persist and broadcast a message after room policy checks.
    pub async fn send(&self, request: SendMessage) -> Result<Message, AppError> {
        let room = self.rooms.get(&request.room_id).await?;
        ModerationService::check_send(&room, &request.sender, &request.kind)?;

        let sequencer = self.sequencer(&room.id);
        let _turn = sequencer.lock().await;
        let message = self
            .messages
            .post(PostMessage {
                room_id: request.room_id,
                sender: request.sender,
                content: request.content,
                kind: request.kind,
                reply_to_id: request.reply_to_id,
            })
            .await?;
        self.rooms.record_message_posted(&room.id, &message).await?;
        self.sink.publish(ChatEvent::MessageCreated(message.clone()));
        Ok(message)
    }

    /// Paged history of a room the reader may see. Private rooms need a
    /// reader.
    pub async fn history(
        &self,
        room_id: &str,
        reader: Option<&Identity>,
        limit: Option<u32>,
        before: Option<DateTime<Utc>>,
    ) -> Result<HistoryPage, AppError> {
        let room = self.rooms.get(room_id).await?;
        match reader {
            Some(reader) if !ModerationService::can_participate(&room, reader) => {
                return Err(AppError::PermissionDenied("This room is private".into()));
            }
            None if room.room_type == RoomType::Private => {
                return Err(AppError::Unauthorized(
                    "Reading a private room requires an identity".into(),
                ));
            }
            _ => {}
        }
        self.messages.history(room_id, limit, before).await
    }

    /// Soft-delete a message if `actor` is its sender or staff.
    pub async fn delete_message(
        &self,
        message_id: i64,
        actor: &Identity,
        expected_room: Option<&str>,
    ) -> Result<Message, AppError> {
        let message = self.visible_message(message_id, expected_room).await?;
        if !ModerationService::can_delete(&message, actor) {
            return Err(AppError::PermissionDenied(
                "Only the sender or a teacher/admin can delete this message".into(),
            ));
        }

        let sequencer = self.sequencer(&message.room_id);
        let _turn = sequencer.lock().await;
        let deleted = self.messages.soft_delete(message_id, actor).await?;
        self.refresh_preview_if_latest(&deleted.room_id, deleted.id)
            .await?;

        tracing::info!(
            message_id,
            room_id = %deleted.room_id,
            actor_id = %actor.id,
            "Message deleted"
        );
        self.sink.publish(ChatEvent::MessageDeleted {
            room_id: deleted.room_id.clone(),
            message_id: deleted.id,
            deleted_by: actor.id.clone(),
            deleted_by_model: DeletedByModel::for_role(actor.role),
            deleted_at: deleted.deleted.deleted_at.unwrap_or_else(Utc::now),
        });
        Ok(deleted)
    }

    /// Toggle a reaction on a message in a room the reactor may see.
    pub async fn react(
        &self,
        message_id: i64,
        identity: &Identity,
        emoji: &str,
        expected_room: Option<&str>,
    ) -> Result<Message, AppError> {
        let message = self.visible_message(message_id, expected_room).await?;
        let room = self.rooms.get(&message.room_id).await?;
        if !ModerationService::can_participate(&room, identity) {
            return Err(AppError::PermissionDenied("This room is private".into()));
        }

        let sequencer = self.sequencer(&room.id);
        let _turn = sequencer.lock().await;
        let updated = self.messages.react(message_id, identity, emoji).await?;
        self.sink.publish(ChatEvent::ReactionUpdated {
            room_id: updated.room_id.clone(),
            message_id: updated.id,
            reactions: updated.reactions.clone(),
        });
        Ok(updated)
    }

    /// Replace a message's content. Only its sender may.
    pub async fn edit_message(
        &self,
        message_id: i64,
        actor: &Identity,
        content: String,
        expected_room: Option<&str>,
    ) -> Result<Message, AppError> {
        let message = self.visible_message(message_id, expected_room).await?;
        if !ModerationService::can_edit(&message, actor) {
            return Err(AppError::PermissionDenied(
                "Only the sender can edit this message".into(),
            ));
        }

        let sequencer = self.sequencer(&message.room_id);
        let _turn = sequencer.lock().await;
        let edited = self.messages.edit(message_id, content).await?;
        let room = self.rooms.get(&edited.room_id).await?;
        let is_latest = room
            .last_message
            .as_ref()
            .is_some_and(|last| last.message_id == edited.id.to_string());
        if is_latest {
            self.rooms
                .set_last_message(&room.id, Some(&edited.preview()))
                .await?;
        }
        self.sink.publish(ChatEvent::MessageEdited(edited.clone()));
        Ok(edited)
    }

    /// Mark every visible message of the rooms as read by `identity`.
    pub async fn mark_read(&self, room_ids: &[String], identity: &Identity) -> Result<u64, AppError> {
        let mut unique: Vec<String> = Vec::with_capacity(room_ids.len());
        for room_id in room_ids {
            if unique.contains(room_id) {
                continue;
            }
            self.rooms.get(room_id).await?;
            unique.push(room_id.clone());
        }
        let updated = self.messages.mark_read(&unique, identity).await?;
        tracing::debug!(identity_id = %identity.id, rooms = unique.len(), updated, "Marked read");
        Ok(updated)
    }

    /// Post a system message. The caller holds the room's sequencer.
    async fn post_system(&self, room_id: &str, content: String) -> Result<(Room, Message), AppError> {
        let message = self
            .messages
            .post(PostMessage {
                room_id: room_id.to_string(),
                sender: Identity::system(),
                content,
                kind: MessageKind::System,
                reply_to_id: None,
            })
            .await?;
        let room = self.rooms.record_message_posted(room_id, &message).await?;
        self.sink.publish(ChatEvent::MessageCreated(message.clone()));
        Ok((room, message))
    }

    async fn visible_message(
        &self,
        message_id: i64,
        expected_room: Option<&str>,
    ) -> Result<Message, AppError> {
        let message = self.messages.get(message_id).await?;
        match expected_room {
            Some(room_id) if room_id != message.room_id => Err(AppError::NotFound(format!(
                "Message {} not found in room '{}'",
                message_id, room_id
            ))),
            _ => Ok(message),
        }
    }

    /// Point the room preview at the newest visible message if `message_id`
    /// was the one shown.
    async fn refresh_preview_if_latest(&self, room_id: &str, message_id: i64) -> Result<(), AppError> {
        let room = self.rooms.get(room_id).await?;
        let was_latest = room
            .last_message
            .as_ref()
            .is_some_and(|last| last.message_id == message_id.to_string());
        if !was_latest {
            return Ok(());
        }
        let latest = self.messages.latest(room_id).await?;
        let preview = latest.as_ref().map(Message::preview);
        self.rooms.set_last_message(room_id, preview.as_ref()).await
    }
}
