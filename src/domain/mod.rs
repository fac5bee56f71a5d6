//! # Domain Layer
//!
//! The domain layer contains the core rules of the chat subsystem.
//! It is independent of any external frameworks or infrastructure concerns.
//!
//! ## Structure
//!
//! - **entities**: Identity, Room and Message plus their repository traits
//! - **services**: Domain services for policy that spans entities
//!
//! ## Design Principles
//!
//! - No dependencies on infrastructure or presentation layers
//! - Repository traits define data access contracts
//! - Entities encapsulate their own invariants (member counts, reaction
//!   counts, receipt sets)

pub mod entities;
pub mod services;

// Re-export commonly used types
pub use entities::*;
pub use services::*;
