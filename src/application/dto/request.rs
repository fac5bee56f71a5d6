//! Request DTOs
//!
//! Data structures for REST request bodies and query strings. The REST
//! surface trusts the identity fields it is given; the portal in front of it
//! is responsible for authenticating callers.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::application::services::CreateRoom;
use crate::domain::{Attachment, Identity, MessageKind, RoomFilter, RoomMetadata, RoomSettings, RoomType};
use crate::shared::error::AppError;
use crate::shared::validation::{validate_identity_id, validate_not_blank, validate_slug};

fn default_room_type() -> String {
    RoomType::Public.as_str().to_string()
}

fn default_message_type() -> String {
    "text".to_string()
}

/// Create room request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    #[validate(custom(function = validate_slug))]
    pub id: Option<String>,

    #[validate(
        length(min = 1, max = 100, message = "Name must be 1-100 characters"),
        custom(function = validate_not_blank)
    )]
    pub name: String,

    #[validate(length(max = 500, message = "Description must be at most 500 characters"))]
    pub description: Option<String>,

    #[serde(rename = "type", default = "default_room_type")]
    pub room_type: String,

    pub avatar: Option<String>,
    pub settings: Option<RoomSettings>,
    pub metadata: Option<RoomMetadata>,

    #[validate(custom(function = validate_identity_id))]
    pub creator_id: String,
    #[validate(length(min = 1, message = "creatorName is required"))]
    pub creator_name: String,
    pub creator_role: Option<String>,
    pub creator_avatar: Option<String>,
}

impl CreateRoomRequest {
    pub fn creator(&self) -> Identity {
        Identity::new(
            self.creator_id.trim(),
            self.creator_name.trim(),
            self.creator_role.as_deref(),
            self.creator_avatar.clone(),
        )
    }

    pub fn into_create_room(self) -> CreateRoom {
        CreateRoom {
            id: self.id,
            name: self.name,
            description: self.description,
            room_type: self.room_type,
            avatar: self.avatar,
            settings: self.settings,
            metadata: self.metadata,
        }
    }
}

/// Room listing filters
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomListQuery {
    #[serde(rename = "type")]
    pub room_type: Option<String>,
    pub subject: Option<String>,
    pub class_level: Option<String>,
    pub active: Option<bool>,
    pub limit: Option<u32>,
}

impl RoomListQuery {
    pub fn into_filter(self) -> Result<RoomFilter, AppError> {
        let room_type = match self.room_type.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(RoomType::parse(raw)?),
        };
        Ok(RoomFilter {
            room_type,
            subject: self.subject.filter(|s| !s.trim().is_empty()),
            class_level: self.class_level.filter(|s| !s.trim().is_empty()),
            is_active: self.active.or(Some(true)),
            limit: self.limit.unwrap_or(0),
        })
    }
}

/// History query parameters
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
    /// RFC 3339 timestamp or epoch milliseconds
    pub before: Option<String>,
    /// Reader identity; private rooms require it
    #[serde(rename = "identityId")]
    pub identity_id: Option<String>,
    /// Reader role when the reader has no live session
    pub role: Option<String>,
}

impl HistoryQuery {
    pub fn before(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        self.before.as_deref().map(parse_timestamp).transpose()
    }
}

/// Parse an RFC 3339 timestamp or a number of epoch milliseconds.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, AppError> {
    let raw = raw.trim();
    if let Ok(millis) = raw.parse::<i64>() {
        return Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| AppError::Validation(format!("before: '{}' is out of range", raw)));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| AppError::Validation(format!("before: '{}' is not a valid timestamp", raw)))
}

/// Send message request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[validate(custom(function = validate_identity_id))]
    pub sender_id: String,
    #[validate(length(min = 1, message = "senderName is required"))]
    pub sender_name: String,
    pub sender_role: Option<String>,
    pub sender_avatar: Option<String>,

    #[serde(default)]
    pub content: String,

    #[serde(rename = "type", default = "default_message_type")]
    pub message_type: String,

    pub attachment: Option<Attachment>,
    pub reply_to_id: Option<String>,
}

impl SendMessageRequest {
    pub fn sender(&self) -> Identity {
        Identity::new(
            self.sender_id.trim(),
            self.sender_name.trim(),
            self.sender_role.as_deref(),
            self.sender_avatar.clone(),
        )
    }

    pub fn kind(&self) -> Result<MessageKind, AppError> {
        MessageKind::from_parts(&self.message_type, self.attachment.clone())
    }

    pub fn reply_to_id(&self) -> Result<Option<i64>, AppError> {
        parse_optional_id(self.reply_to_id.as_deref(), "replyToId")
    }
}

/// Parse an optional snowflake id; empty strings count as absent.
pub fn parse_optional_id(raw: Option<&str>, field: &str) -> Result<Option<i64>, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| AppError::Validation(format!("{}: '{}' is not a message id", field, raw))),
    }
}

/// Parse a required message id.
pub fn parse_message_id(raw: &str) -> Result<i64, AppError> {
    parse_optional_id(Some(raw), "messageId")?
        .ok_or_else(|| AppError::Validation("messageId: is required".into()))
}

/// Join/leave request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRequest {
    #[validate(custom(function = validate_identity_id))]
    pub identity_id: String,
    pub name: Option<String>,
    pub role: Option<String>,
    pub avatar: Option<String>,
}

/// Reaction toggle request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReactionRequest {
    #[validate(custom(function = validate_identity_id))]
    pub identity_id: String,
    pub name: Option<String>,
    pub role: Option<String>,
    #[validate(length(min = 1, max = 32, message = "emoji must be 1-32 characters"))]
    pub emoji: String,
}

/// Delete message request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMessageRequest {
    #[validate(custom(function = validate_identity_id))]
    pub identity_id: String,
    pub name: Option<String>,
    pub role: Option<String>,
}

/// Edit message request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EditMessageRequest {
    #[validate(custom(function = validate_identity_id))]
    pub identity_id: String,
    pub name: Option<String>,
    pub role: Option<String>,
    #[validate(custom(function = validate_not_blank))]
    pub content: String,
}

/// Mark-read request. The path names one room; more may be listed.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    #[validate(custom(function = validate_identity_id))]
    pub identity_id: String,
    pub name: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub room_ids: Vec<String>,
}

/// Recorded voice note sent as a base64 string, optionally wrapped in a
/// `data:<mime>;base64,` URL.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioUploadRequest {
    #[serde(default)]
    pub audio_data: String,
    pub file_name: Option<String>,
    /// Seconds, as measured by the recorder
    pub duration: Option<f64>,
}

/// A voice note ready for the blob store.
#[derive(Debug, PartialEq)]
pub struct DecodedAudio {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub name: String,
}

pub const DEFAULT_AUDIO_MIME: &str = "audio/mpeg";

impl AudioUploadRequest {
    /// Decode the payload, refusing anything larger than `max_size` bytes.
    pub fn decode(&self, max_size: usize) -> Result<DecodedAudio, AppError> {
        let raw = self.audio_data.trim();
        if raw.is_empty() {
            return Err(AppError::Validation("audioData: no audio data provided".into()));
        }

        let (mime_type, payload) = match raw.strip_prefix("data:") {
            Some(rest) => {
                let (mime, payload) = rest
                    .split_once(";base64,")
                    .ok_or_else(|| AppError::Validation("audioData: malformed data URL".into()))?;
                if mime.is_empty() || payload.is_empty() {
                    return Err(AppError::Validation("audioData: malformed data URL".into()));
                }
                (mime, payload)
            }
            None => (DEFAULT_AUDIO_MIME, raw),
        };

        // Base64 inflates by 4/3, so reject before decoding when it cannot fit
        if payload.len() / 4 * 3 > max_size + 3 {
            return Err(AppError::Validation(format!(
                "audioData: exceeds the {} byte limit",
                max_size
            )));
        }
        let bytes = STANDARD
            .decode(payload)
            .map_err(|e| AppError::Validation(format!("audioData: invalid base64: {}", e)))?;
        if bytes.is_empty() {
            return Err(AppError::Validation("audioData: no audio data provided".into()));
        }
        if bytes.len() > max_size {
            return Err(AppError::Validation(format!(
                "audioData: exceeds the {} byte limit",
                max_size
            )));
        }

        let name = self
            .file_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("voice-{}.webm", Utc::now().timestamp_millis()));

        Ok(DecodedAudio {
            bytes,
            mime_type: mime_type.to_string(),
            name,
        })
    }
}

/// Requests that name their actor by id, optional name and role.
pub trait ActorFields {
    fn actor_parts(&self) -> (&str, Option<&str>, Option<&str>, Option<&str>);

    /// The actor as an identity. The id doubles as the name when none is given.
    fn actor(&self) -> Identity {
        let (id, name, role, avatar) = self.actor_parts();
        let id = id.trim();
        let name = name.map(str::trim).filter(|n| !n.is_empty()).unwrap_or(id);
        Identity::new(id, name, role, avatar.map(String::from))
    }
}

impl ActorFields for MembershipRequest {
    fn actor_parts(&self) -> (&str, Option<&str>, Option<&str>, Option<&str>) {
        (
            &self.identity_id,
            self.name.as_deref(),
            self.role.as_deref(),
            self.avatar.as_deref(),
        )
    }
}

impl ActorFields for ReactionRequest {
    fn actor_parts(&self) -> (&str, Option<&str>, Option<&str>, Option<&str>) {
        (&self.identity_id, self.name.as_deref(), self.role.as_deref(), None)
    }
}

impl ActorFields for DeleteMessageRequest {
    fn actor_parts(&self) -> (&str, Option<&str>, Option<&str>, Option<&str>) {
        (&self.identity_id, self.name.as_deref(), self.role.as_deref(), None)
    }
}

impl ActorFields for EditMessageRequest {
    fn actor_parts(&self) -> (&str, Option<&str>, Option<&str>, Option<&str>) {
        (&self.identity_id, self.name.as_deref(), self.role.as_deref(), None)
    }
}

impl ActorFields for MarkReadRequest {
    fn actor_parts(&self) -> (&str, Option<&str>, Option<&str>, Option<&str>) {
        (&self.identity_id, self.name.as_deref(), self.role.as_deref(), None)
    }
}
