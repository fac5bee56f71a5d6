//! Repository Implementations
//!
//! Concrete implementations of the domain repository traits.
//!
//! ## Available Repositories
//!
//! - **PgRoomRepository** / **PgMessageRepository**: PostgreSQL, used by the
//!   `postgres` storage backend
//! - **InMemoryRoomRepository** / **InMemoryMessageRepository**: process-local,
//!   used by the `memory` backend and in tests
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use school_chat::domain::{MessageRepository, RoomRepository};
//! use school_chat::infrastructure::repositories::{PgMessageRepository, PgRoomRepository};
//!
//! fn setup_repositories(pool: sqlx::PgPool) -> (Arc<dyn RoomRepository>, Arc<dyn MessageRepository>) {
//!     (
//!         Arc::new(PgRoomRepository::new(pool.clone())),
//!         Arc::new(PgMessageRepository::new(pool)),
//!     )
//! }
//! ```

pub mod memory;
pub mod message_repository;
pub mod room_repository;

pub use memory::{InMemoryMessageRepository, InMemoryRoomRepository};
pub use message_repository::PgMessageRepository;
pub use room_repository::PgRoomRepository;
