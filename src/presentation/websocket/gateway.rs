//! WebSocket Gateway
//!
//! Tracks open connections and the rooms they are subscribed to, and fans
//! server events out to them. Delivery is a push into each connection's
//! unbounded queue, so a publish never waits on a slow socket.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::messages::{
    MessageDeletedPayload, Outbound, ReactionUpdatedPayload, ServerEvent,
};
use crate::application::dto::{MessageResponse, RoomResponse};
use crate::application::services::{ChatEvent, ChatEventSink};
use crate::infrastructure::metrics;
use crate::infrastructure::presence::ConnectionId;

/// An open socket as seen by the gateway.
#[derive(Debug)]
struct ConnectedClient {
    sender: mpsc::UnboundedSender<Outbound>,
    identity_id: Option<String>,
}

pub struct Gateway {
    connections: DashMap<ConnectionId, ConnectedClient>,
    /// Room id to subscribed connections, in subscription order
    room_subscribers: DashMap<String, Vec<ConnectionId>>,
    heartbeat_interval_ms: u64,
}

impl Gateway {
    pub fn new(heartbeat_interval_ms: u64) -> Self {
        Self {
            connections: DashMap::new(),
            room_subscribers: DashMap::new(),
            heartbeat_interval_ms,
        }
    }

    pub fn heartbeat_interval(&self) -> u64 {
        self.heartbeat_interval_ms
    }

    pub fn register(&self, connection: ConnectionId, sender: mpsc::UnboundedSender<Outbound>) {
        self.connections.insert(
            connection,
            ConnectedClient {
                sender,
                identity_id: None,
            },
        );
        self.update_metrics();
    }

    /// Drop a connection and all of its subscriptions. Returns the rooms it
    /// was subscribed to.
    pub fn unregister(&self, connection: ConnectionId) -> Vec<String> {
        if self.connections.remove(&connection).is_none() {
            return Vec::new();
        }
        let mut rooms = Vec::new();
        for mut entry in self.room_subscribers.iter_mut() {
            let before = entry.len();
            entry.retain(|c| *c != connection);
            if entry.len() != before {
                rooms.push(entry.key().clone());
            }
        }
        self.room_subscribers.retain(|_, subscribers| !subscribers.is_empty());
        self.update_metrics();
        rooms
    }

    pub fn is_registered(&self, connection: ConnectionId) -> bool {
        self.connections.contains_key(&connection)
    }

    pub fn mark_identified(&self, connection: ConnectionId, identity_id: &str) {
        if let Some(mut client) = self.connections.get_mut(&connection) {
            client.identity_id = Some(identity_id.to_string());
        }
        self.update_metrics();
    }

    /// Subscribe a registered connection to a room's broadcasts.
    pub fn subscribe(&self, connection: ConnectionId, room_id: &str) {
        if !self.is_registered(connection) {
            return;
        }
        let mut subscribers = self.room_subscribers.entry(room_id.to_string()).or_default();
        if !subscribers.contains(&connection) {
            subscribers.push(connection);
        }
    }

    /// Returns true if the connection was subscribed.
    pub fn unsubscribe(&self, connection: ConnectionId, room_id: &str) -> bool {
        let removed = match self.room_subscribers.get_mut(room_id) {
            Some(mut subscribers) => {
                let before = subscribers.len();
                subscribers.retain(|c| *c != connection);
                subscribers.len() != before
            }
            None => false,
        };
        self.room_subscribers
            .remove_if(room_id, |_, subscribers| subscribers.is_empty());
        removed
    }

    pub fn send_to(&self, connection: ConnectionId, event: ServerEvent) -> bool {
        match self.connections.get(&connection) {
            Some(client) => client.sender.send(Outbound::Event(Arc::new(event))).is_ok(),
            None => false,
        }
    }

    /// Ask a connection's writer to close the socket.
    pub fn close(&self, connection: ConnectionId, code: u16, reason: &str) {
        if let Some(client) = self.connections.get(&connection) {
            let _ = client.sender.send(Outbound::Close {
                code,
                reason: reason.to_string(),
            });
        }
    }

    /// Send to every subscriber of `room_id`, optionally skipping one.
    pub fn broadcast_room(&self, room_id: &str, event: ServerEvent, except: Option<ConnectionId>) {
        let Some(subscribers) = self.room_subscribers.get(room_id) else {
            return;
        };
        let event = Arc::new(event);
        for connection in subscribers.iter().filter(|c| Some(**c) != except) {
            if let Some(client) = self.connections.get(connection) {
                let _ = client.sender.send(Outbound::Event(event.clone()));
            }
        }
    }

    /// Send to every identified connection.
    pub fn broadcast_identified(&self, event: ServerEvent) {
        let event = Arc::new(event);
        for client in self.connections.iter() {
            if client.identity_id.is_some() {
                let _ = client.sender.send(Outbound::Event(event.clone()));
            }
        }
    }

    pub fn subscriber_count(&self, room_id: &str) -> usize {
        self.room_subscribers
            .get(room_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn identified_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|c| c.identity_id.is_some())
            .count()
    }

    fn update_metrics(&self) {
        metrics::set_gateway_connections(self.connection_count(), self.identified_count());
    }
}

impl ChatEventSink for Gateway {
    fn publish(&self, event: ChatEvent) {
        match event {
            ChatEvent::MessageCreated(message) => {
                let room_id = message.room_id.clone();
                self.broadcast_room(
                    &room_id,
                    ServerEvent::Message(MessageResponse::from(message)),
                    None,
                );
            }
            ChatEvent::MessageEdited(message) => {
                let room_id = message.room_id.clone();
                self.broadcast_room(
                    &room_id,
                    ServerEvent::MessageEdited(MessageResponse::from(message)),
                    None,
                );
            }
            ChatEvent::MessageDeleted {
                room_id,
                message_id,
                deleted_by,
                deleted_by_model,
                deleted_at,
            } => {
                let payload = MessageDeletedPayload {
                    message_id: message_id.to_string(),
                    room_id: room_id.clone(),
                    deleted_by,
                    deleted_by_model,
                    deleted_at,
                };
                self.broadcast_room(&room_id, ServerEvent::MessageDeleted(payload), None);
            }
            ChatEvent::ReactionUpdated {
                room_id,
                message_id,
                reactions,
            } => {
                let payload = ReactionUpdatedPayload {
                    message_id: message_id.to_string(),
                    room_id: room_id.clone(),
                    reactions,
                };
                self.broadcast_room(&room_id, ServerEvent::ReactionUpdated(payload), None);
            }
            ChatEvent::RoomCreated(room) => {
                self.broadcast_identified(ServerEvent::RoomCreated(RoomResponse::from(room)));
            }
        }
    }
}
