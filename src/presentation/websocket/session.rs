//! WebSocket Session Management

use std::time::{Duration, Instant};

use crate::domain::Identity;
use crate::infrastructure::presence::ConnectionId;
use crate::shared::error::AppError;

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Socket open, no identity yet
    Connected,
    Identified,
    InRoom(String),
    Disconnected,
}

/// WebSocket session state
#[derive(Debug)]
pub struct SessionState {
    pub connection_id: ConnectionId,
    pub phase: SessionPhase,
    pub identity: Option<Identity>,
    pub connected_at: Instant,
    pub last_heartbeat: Instant,
}

impl SessionState {
    pub fn new(connection_id: ConnectionId) -> Self {
        let now = Instant::now();
        Self {
            connection_id,
            phase: SessionPhase::Connected,
            identity: None,
            connected_at: now,
            last_heartbeat: now,
        }
    }

    pub fn heartbeat(&mut self) {
        self.last_heartbeat = Instant::now();
    }

    pub fn is_alive(&self, timeout_ms: u64) -> bool {
        self.last_heartbeat.elapsed().as_millis() < timeout_ms as u128
    }

    /// True once a connection has stayed unidentified for longer than `timeout`.
    pub fn identify_expired(&self, timeout: Duration) -> bool {
        self.phase == SessionPhase::Connected && self.connected_at.elapsed() >= timeout
    }

    pub fn identity(&self) -> Result<&Identity, AppError> {
        self.identity
            .as_ref()
            .ok_or_else(|| AppError::Unauthorized("Identify before sending events".into()))
    }

    pub fn active_room(&self) -> Option<&str> {
        match &self.phase {
            SessionPhase::InRoom(room) => Some(room),
            _ => None,
        }
    }

    /// Fails unless the connection is currently in `room_id`.
    pub fn require_room(&self, room_id: &str) -> Result<(), AppError> {
        self.identity()?;
        if self.active_room() == Some(room_id) {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "roomId: join '{}' before using it",
                room_id
            )))
        }
    }
}
