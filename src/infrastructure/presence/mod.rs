//! Presence Registry
//!
//! Tracks which identities hold a live connection, the room each one is
//! active in, and who is typing where. Process-local and never persisted;
//! created at startup and owned by [`AppState`](crate::startup::AppState).
//!
//! Sessions are keyed by identity id. A connection only ever mutates the
//! session it owns: calls carry the caller's [`ConnectionId`] and are ignored
//! once another connection has taken the identity over.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::Identity;

/// Opaque handle of one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Live session of one identity.
#[derive(Debug, Clone)]
pub struct PresenceSession {
    pub identity: Identity,
    pub connection: ConnectionId,
    pub connected_at: DateTime<Utc>,
    pub active_room: Option<String>,
}

/// What an identity left behind when its session ended or was replaced.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceDeparture {
    pub identity: Identity,
    pub connection: ConnectionId,
    /// Rooms the identity was active in
    pub rooms_left: Vec<String>,
    /// Rooms the identity was typing in
    pub stopped_typing: Vec<String>,
}

#[derive(Debug, Clone)]
struct TypingEntry {
    identity: Identity,
    since: Instant,
}

/// In-memory presence and typing registry.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    sessions: DashMap<String, PresenceSession>,
    typing: DashMap<String, HashMap<String, TypingEntry>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite the session for `identity`.
    ///
    /// Re-registering from the same connection refreshes the cached identity
    /// fields and keeps the active room. Registering from a different
    /// connection replaces the old session; its departure is returned so the
    /// caller can announce it.
    pub fn register(
        &self,
        identity: Identity,
        connection: ConnectionId,
    ) -> Option<PresenceDeparture> {
        let replaced = {
            let mut entry = self
                .sessions
                .entry(identity.id.clone())
                .or_insert_with(|| PresenceSession {
                    identity: identity.clone(),
                    connection,
                    connected_at: Utc::now(),
                    active_room: None,
                });

            if entry.connection == connection {
                entry.identity = identity.clone();
                None
            } else {
                let previous = std::mem::replace(
                    &mut *entry,
                    PresenceSession {
                        identity: identity.clone(),
                        connection,
                        connected_at: Utc::now(),
                        active_room: None,
                    },
                );
                Some(previous)
            }
        };

        replaced.map(|previous| {
            tracing::debug!(
                identity_id = %identity.id,
                old_connection = %previous.connection,
                new_connection = %connection,
                "Presence session replaced"
            );
            self.departure_of(previous)
        })
    }

    /// Point the session at `room` (or none). Returns the previous room.
    /// Ignored if `connection` no longer owns the session.
    pub fn set_active_room(
        &self,
        identity_id: &str,
        connection: ConnectionId,
        room: Option<String>,
    ) -> Option<String> {
        let mut session = self.sessions.get_mut(identity_id)?;
        if session.connection != connection {
            return None;
        }
        std::mem::replace(&mut session.active_room, room)
    }

    /// Remove the session owned by `connection`, clearing its typing entries.
    pub fn unregister(
        &self,
        identity_id: &str,
        connection: ConnectionId,
    ) -> Option<PresenceDeparture> {
        let (_, session) = self
            .sessions
            .remove_if(identity_id, |_, s| s.connection == connection)?;
        Some(self.departure_of(session))
    }

    /// Identities currently active in `room_id`, ordered by name.
    pub fn list_online(&self, room_id: &str) -> Vec<Identity> {
        let mut online: Vec<Identity> = self
            .sessions
            .iter()
            .filter(|s| s.active_room.as_deref() == Some(room_id))
            .map(|s| s.identity.clone())
            .collect();
        online.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        online
    }

    pub fn session(&self, identity_id: &str) -> Option<PresenceSession> {
        self.sessions.get(identity_id).map(|s| s.clone())
    }

    pub fn online_total(&self) -> usize {
        self.sessions.len()
    }

    /// Mark `identity` as typing in `room_id`. Returns false if it already was
    /// (the timestamp is refreshed either way).
    pub fn start_typing(&self, room_id: &str, identity: &Identity) -> bool {
        let mut room = self.typing.entry(room_id.to_string()).or_default();
        room.insert(
            identity.id.clone(),
            TypingEntry {
                identity: identity.clone(),
                since: Instant::now(),
            },
        )
        .is_none()
    }

    /// Clear a typing entry. Returns true if there was one.
    pub fn stop_typing(&self, room_id: &str, identity_id: &str) -> bool {
        let removed = match self.typing.get_mut(room_id) {
            Some(mut room) => room.remove(identity_id).is_some(),
            None => false,
        };
        self.typing.remove_if(room_id, |_, entries| entries.is_empty());
        removed
    }

    /// Identities typing in `room_id`.
    pub fn typing_in(&self, room_id: &str) -> Vec<Identity> {
        self.typing
            .get(room_id)
            .map(|room| room.values().map(|e| e.identity.clone()).collect())
            .unwrap_or_default()
    }

    /// Clear `identity_id`'s typing entries older than `ttl`; returns their rooms.
    pub fn expire_typing(&self, identity_id: &str, ttl: Duration) -> Vec<String> {
        let mut expired = Vec::new();
        for mut room in self.typing.iter_mut() {
            let stale = room
                .get(identity_id)
                .map(|e| e.since.elapsed() >= ttl)
                .unwrap_or(false);
            if stale {
                room.remove(identity_id);
                expired.push(room.key().clone());
            }
        }
        self.typing.retain(|_, entries| !entries.is_empty());
        expired
    }

    fn clear_typing(&self, identity_id: &str) -> Vec<String> {
        let mut rooms = Vec::new();
        for mut room in self.typing.iter_mut() {
            if room.remove(identity_id).is_some() {
                rooms.push(room.key().clone());
            }
        }
        self.typing.retain(|_, entries| !entries.is_empty());
        rooms.sort();
        rooms
    }

    fn departure_of(&self, session: PresenceSession) -> PresenceDeparture {
        let stopped_typing = self.clear_typing(&session.identity.id);
        PresenceDeparture {
            rooms_left: session.active_room.into_iter().collect(),
            stopped_typing,
            connection: session.connection,
            identity: session.identity,
        }
    }
}
