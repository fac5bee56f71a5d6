//! In-Memory Repository Implementations
//!
//! Process-local stores used by the `memory` storage backend and by tests.
//! Every operation takes the lock once, applies its change, and releases it
//! before returning, so nothing is held across an `.await`.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::{
    DeletionState, EditState, IdentityRef, LastMessage, Message, MessageRepository, Room,
    RoomFilter, RoomMember, RoomRepository,
};
use crate::shared::error::AppError;

/// In-memory room store.
#[derive(Debug, Default)]
pub struct InMemoryRoomRepository {
    rooms: RwLock<HashMap<String, Room>>,
}

impl InMemoryRoomRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutate<F>(&self, room_id: &str, f: F) -> Option<Room>
    where
        F: FnOnce(&mut Room),
    {
        let mut rooms = self.rooms.write();
        let room = rooms.get_mut(room_id)?;
        f(room);
        Some(room.clone())
    }
}

#[async_trait]
impl RoomRepository for InMemoryRoomRepository {
    async fn insert(&self, room: &Room) -> Result<(), AppError> {
        let mut rooms = self.rooms.write();
        if rooms.contains_key(&room.id) {
            return Err(AppError::Conflict(format!("Room '{}' already exists", room.id)));
        }
        rooms.insert(room.id.clone(), room.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Room>, AppError> {
        Ok(self.rooms.read().get(id).cloned())
    }

    async fn find(&self, filter: &RoomFilter) -> Result<Vec<Room>, AppError> {
        let mut rooms: Vec<Room> = self
            .rooms
            .read()
            .values()
            .filter(|r| r.matches(filter))
            .cloned()
            .collect();
        rooms.sort_by(|a, b| {
            b.stats
                .last_activity
                .cmp(&a.stats.last_activity)
                .then_with(|| a.id.cmp(&b.id))
        });
        if filter.limit > 0 {
            rooms.truncate(filter.limit as usize);
        }
        Ok(rooms)
    }

    async fn add_member(
        &self,
        room_id: &str,
        member: &RoomMember,
    ) -> Result<Option<Room>, AppError> {
        Ok(self.mutate(room_id, |room| {
            room.add_member(member.clone());
        }))
    }

    async fn remove_member(
        &self,
        room_id: &str,
        identity_id: &str,
    ) -> Result<Option<Room>, AppError> {
        Ok(self.mutate(room_id, |room| {
            room.remove_member(identity_id);
        }))
    }

    async fn record_message(
        &self,
        room_id: &str,
        preview: &LastMessage,
    ) -> Result<Option<Room>, AppError> {
        Ok(self.mutate(room_id, |room| {
            room.record_message(preview.clone(), Utc::now());
        }))
    }

    async fn set_last_message(
        &self,
        room_id: &str,
        preview: Option<&LastMessage>,
    ) -> Result<(), AppError> {
        self.mutate(room_id, |room| room.last_message = preview.cloned())
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Room '{}' not found", room_id)))
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// In-memory message store, keyed by snowflake id so iteration follows
/// persistence order.
#[derive(Debug, Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<BTreeMap<i64, Message>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutate_visible<F>(&self, id: i64, f: F) -> Option<Message>
    where
        F: FnOnce(&mut Message),
    {
        let mut messages = self.messages.write();
        let message = messages.get_mut(&id).filter(|m| !m.is_deleted())?;
        f(message);
        Some(message.clone())
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn insert(&self, message: &Message) -> Result<(), AppError> {
        let mut messages = self.messages.write();
        if messages.contains_key(&message.id) {
            return Err(AppError::Conflict(format!(
                "Message {} already exists",
                message.id
            )));
        }
        messages.insert(message.id, message.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Message>, AppError> {
        Ok(self.messages.read().get(&id).cloned())
    }

    async fn find_recent(
        &self,
        room_id: &str,
        before: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<Message>, AppError> {
        let messages = self.messages.read();
        Ok(messages
            .values()
            .rev()
            .filter(|m| m.room_id == room_id && !m.is_deleted())
            .filter(|m| before.map_or(true, |b| m.created_at < b))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn soft_delete(
        &self,
        id: i64,
        deletion: &DeletionState,
    ) -> Result<Option<Message>, AppError> {
        Ok(self.mutate_visible(id, |m| m.deleted = deletion.clone()))
    }

    async fn toggle_reaction(
        &self,
        id: i64,
        identity: &IdentityRef,
        emoji: &str,
    ) -> Result<Option<Message>, AppError> {
        Ok(self.mutate_visible(id, |m| {
            m.toggle_reaction(identity, emoji);
        }))
    }

    async fn update_content(
        &self,
        id: i64,
        content: &str,
        edited: &EditState,
    ) -> Result<Option<Message>, AppError> {
        Ok(self.mutate_visible(id, |m| {
            m.content = content.to_string();
            m.edited = edited.clone();
        }))
    }

    async fn mark_read(
        &self,
        room_ids: &[String],
        identity: &IdentityRef,
        at: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        let mut messages = self.messages.write();
        let added = messages
            .values_mut()
            .filter(|m| !m.is_deleted() && room_ids.iter().any(|r| *r == m.room_id))
            .map(|m| m.mark_read(identity, at))
            .filter(|added| *added)
            .count();
        Ok(added as u64)
    }
}
