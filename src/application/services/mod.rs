//! Application Services
//!
//! Business logic services that coordinate domain operations.
//!
//! ## Available Services
//!
//! - **RoomService**: Room directory, membership and rolling stats
//! - **MessageService**: Message store, history paging, reactions, receipts
//! - **ChatService**: Sequenced mutations shared by the gateway and REST API

pub mod chat_service;
pub mod message_service;
pub mod room_service;

pub use chat_service::{ChatEvent, ChatEventSink, ChatService, NullEventSink, SendMessage};
pub use message_service::{HistoryPage, MessageService, PostMessage, MAX_CONTENT_LENGTH};
pub use room_service::{slugify, CreateRoom, RoomService, DEFAULT_ROOMS};
