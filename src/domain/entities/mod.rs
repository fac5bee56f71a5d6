//! # Domain Entities
//!
//! Core domain entities of the chat core.
//!
//! - **Identity**: externally-owned actor snapshot (role, display model, avatar)
//! - **Room**: conversation scope with members, settings and rolling stats
//! - **Message**: the atomic unit of the chat log, with reactions, receipts,
//!   reply snapshot, soft-delete tombstone and edit state
//!
//! ## Repository Traits
//!
//! Rooms and messages each have a repository trait defining data access.
//! These traits are implemented in the infrastructure layer (PostgreSQL and
//! in-memory), following the dependency inversion principle.

mod identity;
mod message;
mod room;

pub use identity::{
    DeletedByModel, Identity, IdentityModel, IdentityRef, Role, DEFAULT_AVATAR, SYSTEM_IDENTITY_ID,
};

pub use message::{
    Attachment, DeletionState, EditState, Message, MessageKind, MessageRepository, Reaction,
    ReadReceipt, ReplySnapshot,
};

pub use room::{
    LastMessage, MemberPermissions, MemberRole, Room, RoomFilter, RoomMember, RoomMetadata,
    RoomRepository, RoomSettings, RoomStats, RoomType, PREVIEW_LENGTH,
};

#[cfg(test)]
pub use message::MockMessageRepository;

#[cfg(test)]
pub(crate) use message::fixtures as message_fixtures;
#[cfg(test)]
pub(crate) use room::fixtures as room_fixtures;
