//! Room entity and repository trait.
//!
//! Maps to the `chat_rooms` and `chat_room_members` tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::{Identity, IdentityRef};
use crate::shared::error::AppError;

/// Characters kept in a room's last-message preview.
pub const PREVIEW_LENGTH: usize = 100;

/// Room types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    #[default]
    Public,
    Private,
    Subject,
    Group,
    Study,
}

impl RoomType {
    /// Parse a room type, rejecting anything outside the enumerated set.
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s.trim().to_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            "subject" => Ok(Self::Subject),
            "group" => Ok(Self::Group),
            "study" => Ok(Self::Study),
            other => Err(AppError::Validation(format!(
                "type: '{}' is not one of public, private, subject, group, study",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Subject => "subject",
            Self::Group => "group",
            Self::Study => "study",
        }
    }

    /// Avatar used when the creator does not pick one.
    pub fn default_avatar(&self) -> &'static str {
        match self {
            Self::Public => "🌍",
            Self::Subject => "📚",
            Self::Study => "🎓",
            Self::Private | Self::Group => "💬",
        }
    }
}

impl std::fmt::Display for RoomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-room switches for attachments and moderation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomSettings {
    pub allow_file_sharing: bool,
    pub allow_voice_messages: bool,
    pub allow_video_messages: bool,
    pub moderation_enabled: bool,
    /// Bytes
    pub max_file_size: u64,
    /// MIME patterns such as `image/*` or `application/pdf`
    pub allowed_file_types: Vec<String>,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            allow_file_sharing: true,
            allow_voice_messages: true,
            allow_video_messages: true,
            moderation_enabled: false,
            max_file_size: 10 * 1024 * 1024,
            allowed_file_types: ["image/*", "video/*", "audio/*", "application/pdf", "text/*"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl RoomSettings {
    /// Whether `mime` matches one of the allowed patterns.
    pub fn allows_mime(&self, mime: &str) -> bool {
        let mime = mime.trim().to_lowercase();
        self.allowed_file_types.iter().any(|pattern| {
            let pattern = pattern.trim().to_lowercase();
            match pattern.strip_suffix("/*") {
                Some(major) => mime
                    .split_once('/')
                    .map(|(m, _)| m == major)
                    .unwrap_or(false),
                None => pattern == "*/*" || pattern == mime,
            }
        })
    }
}

/// Role of a member inside one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Moderator,
    #[default]
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Moderator => "moderator",
            Self::Member => "member",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "admin" => Self::Admin,
            "moderator" => Self::Moderator,
            _ => Self::Member,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberPermissions {
    pub can_send_messages: bool,
    pub can_delete_messages: bool,
    pub can_add_members: bool,
    pub can_remove_members: bool,
}

impl MemberPermissions {
    /// Default grants for a room role.
    pub fn for_role(role: MemberRole) -> Self {
        match role {
            MemberRole::Admin => Self {
                can_send_messages: true,
                can_delete_messages: true,
                can_add_members: true,
                can_remove_members: true,
            },
            MemberRole::Moderator => Self {
                can_send_messages: true,
                can_delete_messages: true,
                can_add_members: true,
                can_remove_members: false,
            },
            MemberRole::Member => Self {
                can_send_messages: true,
                can_delete_messages: false,
                can_add_members: false,
                can_remove_members: false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMember {
    pub identity: IdentityRef,
    pub role_in_room: MemberRole,
    pub permissions: MemberPermissions,
    pub joined_at: DateTime<Utc>,
}

impl RoomMember {
    pub fn new(identity: &Identity, role: MemberRole) -> Self {
        Self {
            identity: identity.to_ref(),
            role_in_room: role,
            permissions: MemberPermissions::for_role(role),
            joined_at: Utc::now(),
        }
    }
}

/// Denormalized preview of the newest visible message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub message_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sender_name: String,
    pub message_type: String,
}

impl LastMessage {
    /// Build a preview, truncating content to [`PREVIEW_LENGTH`] characters.
    pub fn new(
        message_id: String,
        content: &str,
        timestamp: DateTime<Utc>,
        sender_name: String,
        message_type: &str,
    ) -> Self {
        Self {
            message_id,
            content: content.chars().take(PREVIEW_LENGTH).collect(),
            timestamp,
            sender_name,
            message_type: message_type.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStats {
    pub total_messages: i64,
    pub total_members: i64,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomMetadata {
    pub subject: Option<String>,
    pub class_level: Option<String>,
    pub tags: Vec<String>,
}

/// A conversation scope with members, settings and rolling statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub room_type: RoomType,
    pub avatar: String,
    pub settings: RoomSettings,
    pub members: Vec<RoomMember>,
    pub last_message: Option<LastMessage>,
    pub stats: RoomStats,
    pub metadata: RoomMetadata,
    pub is_active: bool,
    pub created_by: IdentityRef,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn member(&self, identity_id: &str) -> Option<&RoomMember> {
        self.members.iter().find(|m| m.identity.id == identity_id)
    }

    pub fn is_member(&self, identity_id: &str) -> bool {
        self.member(identity_id).is_some()
    }

    /// Append a member unless already present. Returns whether the list changed.
    pub fn add_member(&mut self, member: RoomMember) -> bool {
        if self.is_member(&member.identity.id) {
            return false;
        }
        self.members.push(member);
        self.stats.total_members = self.members.len() as i64;
        true
    }

    /// Remove a member by identity id. Returns whether the list changed.
    pub fn remove_member(&mut self, identity_id: &str) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m.identity.id != identity_id);
        self.stats.total_members = self.members.len() as i64;
        before != self.members.len()
    }

    /// Account for a newly persisted message.
    pub fn record_message(&mut self, preview: LastMessage, now: DateTime<Utc>) {
        self.last_message = Some(preview);
        self.stats.total_messages += 1;
        self.stats.last_activity = now;
    }

    pub fn matches(&self, filter: &RoomFilter) -> bool {
        fn eq_ci(value: &Option<String>, wanted: &Option<String>) -> bool {
            match wanted {
                None => true,
                Some(w) => value
                    .as_deref()
                    .map(|v| v.eq_ignore_ascii_case(w))
                    .unwrap_or(false),
            }
        }

        filter.room_type.map_or(true, |t| t == self.room_type)
            && filter.is_active.map_or(true, |a| a == self.is_active)
            && eq_ci(&self.metadata.subject, &filter.subject)
            && eq_ci(&self.metadata.class_level, &filter.class_level)
    }
}

/// Room listing filter. Results are ordered by last activity, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomFilter {
    pub room_type: Option<RoomType>,
    pub subject: Option<String>,
    pub class_level: Option<String>,
    pub is_active: Option<bool>,
    pub limit: u32,
}

/// Repository trait for Room data access operations.
///
/// Every mutating method applies its change atomically for the room and
/// returns the room as stored afterwards, or `None` when the id does not
/// resolve.
#[async_trait]
pub trait RoomRepository: Send + Sync {
    /// Insert a new room. Fails with `Conflict` if the id is taken.
    async fn insert(&self, room: &Room) -> Result<(), AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Room>, AppError>;

    async fn find(&self, filter: &RoomFilter) -> Result<Vec<Room>, AppError>;

    /// Add a member unless present; `totalMembers` is recomputed.
    async fn add_member(&self, room_id: &str, member: &RoomMember)
        -> Result<Option<Room>, AppError>;

    /// Remove a member if present; `totalMembers` is recomputed.
    async fn remove_member(&self, room_id: &str, identity_id: &str)
        -> Result<Option<Room>, AppError>;

    /// Set `lastMessage`, increment `totalMessages`, bump `lastActivity`.
    async fn record_message(&self, room_id: &str, preview: &LastMessage)
        -> Result<Option<Room>, AppError>;

    /// Replace the preview without touching counters.
    async fn set_last_message(&self, room_id: &str, preview: Option<&LastMessage>)
        -> Result<(), AppError>;

    /// Cheap connectivity probe used by readiness checks.
    async fn ping(&self) -> Result<(), AppError>;
}
