//! # School Chat Library
//!
//! Real-time chat for the school portal:
//! - Rooms with members, settings and rolling stats
//! - Messages with replies, reactions, read receipts, edits and soft deletes
//! - Presence and typing indicators
//! - A WebSocket gateway and a REST API over the same chat routine
//! - PostgreSQL or in-memory storage
//!
//! ## Architecture
//!
//! - **Domain Layer**: entities, repository traits and room/message policy
//! - **Application Layer**: room directory, message store, chat service and DTOs
//! - **Infrastructure Layer**: repositories, presence registry, identity
//!   provider, blob store and metrics
//! - **Presentation Layer**: HTTP handlers and the WebSocket gateway
//!
//! ## Module Structure
//!
//! ```text
//! school_chat/
//! +-- config/         Configuration management
//! +-- domain/         Entities, repository traits, policy
//! +-- application/    Services and DTOs
//! +-- infrastructure/ Storage, presence, identity, blobs, metrics
//! +-- presentation/   HTTP routes and WebSocket gateway
//! +-- shared/         Errors, validation, snowflake IDs
//! ```

// Configuration module
pub mod config;

// Domain layer
pub mod domain;

// Application layer
pub mod application;

// Infrastructure layer
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
