//! Moderation policy domain service.
//!
//! Pure checks over entities. Callers evaluate these before touching the
//! stores; the stores themselves trust the actor they are given.

use crate::domain::entities::{Identity, Message, MessageKind, Room, RoomType};
use crate::shared::error::AppError;

/// Domain service deciding who may do what to rooms and messages.
pub struct ModerationService;

impl ModerationService {
    /// Senders may delete their own messages; admins and teachers may delete any.
    pub fn can_delete(message: &Message, actor: &Identity) -> bool {
        message.sender.id == actor.id || actor.role.is_staff()
    }

    /// Only the sender may edit.
    pub fn can_edit(message: &Message, actor: &Identity) -> bool {
        message.sender.id == actor.id
    }

    /// Private rooms are only visible to their members and to staff.
    pub fn can_participate(room: &Room, actor: &Identity) -> bool {
        room.room_type != RoomType::Private || room.is_member(&actor.id) || actor.role.is_staff()
    }

    /// Check a send against room membership, permissions and settings.
    pub fn check_send(room: &Room, sender: &Identity, kind: &MessageKind) -> Result<(), AppError> {
        if !room.is_active {
            return Err(AppError::PermissionDenied(format!(
                "Room '{}' is archived",
                room.id
            )));
        }
        if !Self::can_participate(room, sender) {
            return Err(AppError::PermissionDenied(
                "Only members can post in a private room".into(),
            ));
        }
        if let Some(member) = room.member(&sender.id) {
            if !member.permissions.can_send_messages {
                return Err(AppError::PermissionDenied(
                    "You are not allowed to send messages in this room".into(),
                ));
            }
        }

        let settings = &room.settings;
        let allowed = match kind {
            MessageKind::Text | MessageKind::System => true,
            MessageKind::File(_) | MessageKind::Image(_) => settings.allow_file_sharing,
            MessageKind::Audio(_) => settings.allow_voice_messages,
            MessageKind::Video(_) => settings.allow_video_messages,
        };
        if !allowed {
            return Err(AppError::PermissionDenied(format!(
                "{} messages are disabled in this room",
                kind.as_str()
            )));
        }

        if let Some(attachment) = kind.attachment() {
            if attachment.size > settings.max_file_size {
                return Err(AppError::Validation(format!(
                    "attachment: {} bytes exceeds the room limit of {} bytes",
                    attachment.size, settings.max_file_size
                )));
            }
            if !settings.allows_mime(&attachment.mime_type) {
                return Err(AppError::Validation(format!(
                    "attachment: type '{}' is not allowed in this room",
                    attachment.mime_type
                )));
            }
        }
        Ok(())
    }
}
