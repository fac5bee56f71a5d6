//! HTTP Handlers
//!
//! Request handlers for the REST API.

pub mod health;
pub mod message;
pub mod room;
pub mod upload;
