//! Room Service
//!
//! The room directory: creation, membership, rolling statistics and
//! filtered listing.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::domain::{
    Identity, LastMessage, MemberRole, Message, Room, RoomFilter, RoomMember, RoomMetadata,
    RoomRepository, RoomSettings, RoomStats, RoomType,
};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;
use crate::shared::validation::{validate_not_blank, validate_slug};

/// Input for creating a room.
#[derive(Debug, Clone, Default)]
pub struct CreateRoom {
    /// Explicit slug; generated from type, name and time when absent
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub room_type: String,
    pub avatar: Option<String>,
    pub settings: Option<RoomSettings>,
    pub metadata: Option<RoomMetadata>,
}

/// Rooms that exist on every installation: (id, name, description).
pub const DEFAULT_ROOMS: [(&str, &str, &str); 3] = [
    ("general", "General Discussion", "Open chat for everyone at school"),
    ("students", "Students Group", "Chat room for students"),
    ("teachers", "Teachers Group", "Chat room for teaching staff"),
];

/// Lowercase, ascii-alphanumeric words joined by `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "room".to_string()
    } else {
        slug.chars().take(40).collect::<String>().trim_end_matches('-').to_string()
    }
}

/// Room directory service.
#[derive(Clone)]
pub struct RoomService {
    rooms: Arc<dyn RoomRepository>,
    list_limit: u32,
}

impl RoomService {
    pub fn new(rooms: Arc<dyn RoomRepository>, list_limit: u32) -> Self {
        Self { rooms, list_limit }
    }

    /// Validate and insert a room. The creator becomes its `admin` member.
    pub async fn create(&self, new_room: CreateRoom, creator: &Identity) -> Result<Room, AppError> {
        validate_not_blank(&new_room.name)
            .map_err(|_| AppError::Validation("name: must not be empty".into()))?;
        let room_type = RoomType::parse(&new_room.room_type)?;
        let name = new_room.name.trim().to_string();

        let id = match new_room.id {
            Some(id) => {
                validate_slug(&id).map_err(|_| {
                    AppError::Validation("id: must match [a-z0-9_-]{1,64}".into())
                })?;
                id
            }
            None => format!(
                "{}-{}-{}",
                room_type.as_str(),
                slugify(&name),
                Utc::now().timestamp_millis()
            ),
        };

        let now = Utc::now();
        let mut room = Room {
            id,
            name,
            description: new_room.description.unwrap_or_default().trim().to_string(),
            room_type,
            avatar: new_room
                .avatar
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| room_type.default_avatar().to_string()),
            settings: new_room.settings.unwrap_or_default(),
            members: Vec::new(),
            last_message: None,
            stats: RoomStats {
                total_messages: 0,
                total_members: 0,
                last_activity: now,
            },
            metadata: new_room.metadata.unwrap_or_default(),
            is_active: true,
            created_by: creator.to_ref(),
            created_at: now,
        };
        room.add_member(RoomMember::new(creator, MemberRole::Admin));

        let started = Instant::now();
        self.rooms.insert(&room).await?;
        metrics::record_store_operation("room.insert", started);

        tracing::info!(
            room_id = %room.id,
            room_type = %room.room_type,
            creator_id = %creator.id,
            "Room created"
        );
        Ok(room)
    }

    pub async fn get(&self, room_id: &str) -> Result<Room, AppError> {
        self.rooms
            .find_by_id(room_id)
            .await?
            .ok_or_else(|| room_not_found(room_id))
    }

    /// Rooms matching `filter`, most recently active first. A zero limit
    /// falls back to the configured listing limit.
    pub async fn find(&self, mut filter: RoomFilter) -> Result<Vec<Room>, AppError> {
        if filter.limit == 0 || filter.limit > self.list_limit {
            filter.limit = self.list_limit;
        }
        self.rooms.find(&filter).await
    }

    /// Add `identity` as a member; no-op if already present.
    pub async fn add_member(
        &self,
        room_id: &str,
        identity: &Identity,
        role: MemberRole,
    ) -> Result<Room, AppError> {
        let started = Instant::now();
        let room = self
            .rooms
            .add_member(room_id, &RoomMember::new(identity, role))
            .await?
            .ok_or_else(|| room_not_found(room_id))?;
        metrics::record_store_operation("room.add_member", started);
        Ok(room)
    }

    /// Remove a member by identity id; no-op if not a member.
    pub async fn remove_member(&self, room_id: &str, identity_id: &str) -> Result<Room, AppError> {
        let started = Instant::now();
        let room = self
            .rooms
            .remove_member(room_id, identity_id)
            .await?
            .ok_or_else(|| room_not_found(room_id))?;
        metrics::record_store_operation("room.remove_member", started);
        Ok(room)
    }

    /// Update the preview and counters for a persisted message.
    pub async fn record_message_posted(
        &self,
        room_id: &str,
        message: &Message,
    ) -> Result<Room, AppError> {
        let started = Instant::now();
        let room = self
            .rooms
            .record_message(room_id, &message.preview())
            .await?
            .ok_or_else(|| room_not_found(room_id))?;
        metrics::record_store_operation("room.record_message", started);
        Ok(room)
    }

    pub async fn set_last_message(
        &self,
        room_id: &str,
        preview: Option<&LastMessage>,
    ) -> Result<(), AppError> {
        self.rooms.set_last_message(room_id, preview).await
    }

    /// Create the default rooms that do not exist yet. Returns how many were
    /// created.
    pub async fn ensure_default_rooms(&self) -> Result<usize, AppError> {
        let system = Identity::system();
        let mut created = 0;
        for (id, name, description) in DEFAULT_ROOMS {
            if self.rooms.find_by_id(id).await?.is_some() {
                continue;
            }
            let new_room = CreateRoom {
                id: Some(id.to_string()),
                name: name.to_string(),
                description: Some(description.to_string()),
                room_type: RoomType::Public.as_str().to_string(),
                ..Default::default()
            };
            match self.create(new_room, &system).await {
                Ok(_) => created += 1,
                // Another instance seeded it first.
                Err(AppError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(created)
    }

    pub async fn ping(&self) -> Result<(), AppError> {
        self.rooms.ping().await
    }
}

fn room_not_found(room_id: &str) -> AppError {
    AppError::NotFound(format!("Room '{}' not found", room_id))
}
