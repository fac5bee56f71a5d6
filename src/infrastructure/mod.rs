//! Infrastructure Layer
//!
//! Contains implementations for external concerns:
//! - Database pool and migrations (PostgreSQL)
//! - Room and message repositories (PostgreSQL and in-memory)
//! - Presence registry (process-local)
//! - Identity provider and blob store
//! - Prometheus metrics

pub mod blob;
pub mod database;
pub mod identity;
pub mod metrics;
pub mod presence;
pub mod repositories;
