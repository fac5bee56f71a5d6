//! WebSocket Connection Handler
//!
//! One [`Connection`] per socket drives the session state machine
//! (`Connected -> Identified <-> InRoom -> Disconnected`). The socket task in
//! [`handle_socket`] only moves frames in and out; everything a frame causes
//! happens in `Connection`, which tests drive directly.

use std::time::Duration;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::interval;

use super::messages::{
    ClientEvent, ConnectedPayload, CreateRoomPayload, HelloPayload, JoinedPayload,
    MarkReadPayload, OnlineUsersPayload, Outbound, PongPayload, ReadMarkedPayload, SendPayload,
    ServerEvent, CLOSE_SESSION_REPLACED, CLOSE_TIMEOUT,
};
use super::session::{SessionPhase, SessionState};
use crate::application::dto::{parse_message_id, parse_optional_id};
use crate::application::services::{CreateRoom, SendMessage};
use crate::domain::{Identity, MessageKind, RoomType};
use crate::infrastructure::identity::IdentityClaim;
use crate::infrastructure::metrics;
use crate::infrastructure::presence::{ConnectionId, PresenceDeparture};
use crate::shared::error::AppError;
use crate::startup::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let limits = &state.settings.websocket;
    ws.max_message_size(limits.max_message_size)
        .max_frame_size(limits.max_frame_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (mut connection, mut rx) = Connection::open(&state);
    let connection_id = connection.id();

    tracing::debug!(connection_id = %connection_id, "New WebSocket connection");

    // Forward queued events to the socket
    let mut writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            match outbound {
                Outbound::Event(event) => {
                    let text = match serde_json::to_string(&*event) {
                        Ok(t) => t,
                        Err(e) => {
                            tracing::error!(error = %e, event = event.name(), "Failed to serialize event");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    let _ = sender.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }
    });

    let mut ticker = interval(Duration::from_secs(1));
    ticker.tick().await; // Skip first immediate tick

    let writer_finished = loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => connection.handle_text(text.as_str()).await,
                    Some(Ok(Message::Binary(_))) => {
                        connection.reply(ServerEvent::error("validation", "Binary frames are not supported"));
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => connection.touch(),
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(connection_id = %connection_id, "Connection closed");
                        break false;
                    }
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %connection_id, error = %e, "WebSocket error");
                        break false;
                    }
                }
            }

            _ = ticker.tick() => {
                if let Some(reason) = connection.tick() {
                    tracing::info!(connection_id = %connection_id, reason, "Closing connection");
                    state.gateway.close(connection_id, CLOSE_TIMEOUT, reason);
                    break false;
                }
            }

            _ = &mut writer => break true,
        }
    };

    // Cleanup
    connection.close();
    if !writer_finished && tokio::time::timeout(Duration::from_secs(1), &mut writer).await.is_err() {
        writer.abort();
    }
}

/// Session state machine of one socket.
pub struct Connection {
    state: AppState,
    session: SessionState,
}

impl Connection {
    /// Register a new connection with the gateway and greet it.
    pub fn open(state: &AppState) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = ConnectionId::new();
        state.gateway.register(connection_id, tx);
        state.gateway.send_to(
            connection_id,
            ServerEvent::Hello(HelloPayload {
                heartbeat_interval: state.gateway.heartbeat_interval(),
            }),
        );
        let connection = Self {
            state: state.clone(),
            session: SessionState::new(connection_id),
        };
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.session.connection_id
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn touch(&mut self) {
        self.session.heartbeat();
    }

    fn reply(&self, event: ServerEvent) {
        self.state.gateway.send_to(self.id(), event);
    }

    /// Parse and handle one text frame. Failures are answered with an
    /// `error` event to this connection only.
    pub async fn handle_text(&mut self, text: &str) {
        self.session.heartbeat();
        let event = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                metrics::record_gateway_event("malformed", false);
                self.reply(ServerEvent::error(
                    "validation",
                    format!("Malformed event: {}", e),
                ));
                return;
            }
        };

        let name = event.name();
        match self.handle_event(event).await {
            Ok(()) => metrics::record_gateway_event(name, true),
            Err(err) => {
                metrics::record_gateway_event(name, false);
                tracing::debug!(
                    connection_id = %self.id(),
                    event = name,
                    error = %err,
                    "Gateway event rejected"
                );
                self.reply(ServerEvent::from_error(&err));
            }
        }
    }

    pub async fn handle_event(&mut self, event: ClientEvent) -> Result<(), AppError> {
        if self.session.identity.is_some() && !self.state.gateway.is_registered(self.id()) {
            return Err(AppError::Unauthorized(
                "This session was replaced by a newer connection".into(),
            ));
        }

        match event {
            ClientEvent::Identify(claim) => self.identify(claim).await,
            ClientEvent::Join(r) => self.join(r.room_id).await,
            ClientEvent::Leave(r) => self.leave(&r.room_id),
            ClientEvent::Send(payload) => self.send(payload).await,
            ClientEvent::TypingStart(r) => self.typing(&r.room_id, true),
            ClientEvent::TypingStop(r) => self.typing(&r.room_id, false),
            ClientEvent::React(payload) => {
                let identity = self.session.identity()?.clone();
                let message_id = parse_message_id(&payload.message_id)?;
                self.state
                    .chat
                    .react(message_id, &identity, &payload.emoji, payload.room_id.as_deref())
                    .await?;
                Ok(())
            }
            ClientEvent::Delete(payload) => {
                let identity = self.session.identity()?.clone();
                let message_id = parse_message_id(&payload.message_id)?;
                self.state
                    .chat
                    .delete_message(message_id, &identity, payload.room_id.as_deref())
                    .await?;
                Ok(())
            }
            ClientEvent::Edit(payload) => {
                let identity = self.session.identity()?.clone();
                let message_id = parse_message_id(&payload.message_id)?;
                self.state
                    .chat
                    .edit_message(message_id, &identity, payload.content, payload.room_id.as_deref())
                    .await?;
                Ok(())
            }
            ClientEvent::GetOnlineUsers(r) => {
                self.session.identity()?;
                self.state.chat.get_room(&r.room_id).await?;
                let users = self.state.presence.list_online(&r.room_id);
                self.reply(ServerEvent::OnlineUsers(OnlineUsersPayload {
                    room_id: r.room_id,
                    count: users.len(),
                    users,
                }));
                Ok(())
            }
            ClientEvent::CreateRoom(payload) => self.create_room(payload).await,
            ClientEvent::MarkRead(payload) => self.mark_read(payload).await,
            ClientEvent::Ping => {
                self.reply(ServerEvent::Pong(PongPayload {
                    timestamp: Utc::now(),
                }));
                Ok(())
            }
        }
    }

    async fn identify(&mut self, claim: IdentityClaim) -> Result<(), AppError> {
        let identity = self.state.identity.resolve(&claim).await?;
        if let Some(current) = &self.session.identity {
            if current.id != identity.id {
                return Err(AppError::Validation(
                    "identity: this connection is already identified as someone else".into(),
                ));
            }
        }

        if let Some(previous) = self.state.presence.register(identity.clone(), self.id()) {
            self.evict(previous);
        }
        self.state.gateway.mark_identified(self.id(), &identity.id);
        if self.session.phase == SessionPhase::Connected {
            self.session.phase = SessionPhase::Identified;
        }
        self.session.identity = Some(identity.clone());

        tracing::info!(
            connection_id = %self.id(),
            identity_id = %identity.id,
            role = %identity.role,
            "Connection identified"
        );
        self.reply(ServerEvent::Connected(ConnectedPayload {
            identity_id: identity.id.clone(),
            identity,
        }));
        Ok(())
    }

    /// Close the connection an identity was using before this one and
    /// announce its departure once.
    fn evict(&self, previous: PresenceDeparture) {
        let old = previous.connection;
        tracing::info!(
            identity_id = %previous.identity.id,
            old_connection = %old,
            new_connection = %self.id(),
            "Session replaced"
        );
        self.state.gateway.send_to(
            old,
            ServerEvent::error("session_replaced", "Signed in from another connection"),
        );
        self.state
            .gateway
            .close(old, CLOSE_SESSION_REPLACED, "session replaced");
        self.state.gateway.unregister(old);
        self.announce_departure(&previous);
    }

    fn announce_departure(&self, departure: &PresenceDeparture) {
        let gateway = &self.state.gateway;
        for room_id in &departure.stopped_typing {
            gateway.broadcast_room(
                room_id,
                ServerEvent::typing_stopped(room_id, departure.identity.clone()),
                None,
            );
        }
        for room_id in &departure.rooms_left {
            gateway.broadcast_room(
                room_id,
                ServerEvent::user_left(room_id, departure.identity.clone()),
                None,
            );
        }
    }

    async fn join(&mut self, room_id: String) -> Result<(), AppError> {
        let identity = self.session.identity()?.clone();
        if self.session.active_room() == Some(room_id.as_str()) {
            self.reply_joined(&room_id);
            return Ok(());
        }

        // Persist membership first; a failure leaves the session untouched.
        self.state.chat.join_room(&room_id, &identity, false).await?;

        if let Some(previous) = self.session.active_room().map(str::to_string) {
            self.leave_active(&identity, &previous);
        }
        self.state.gateway.subscribe(self.id(), &room_id);
        self.state
            .presence
            .set_active_room(&identity.id, self.id(), Some(room_id.clone()));
        self.session.phase = SessionPhase::InRoom(room_id.clone());

        self.state.gateway.broadcast_room(
            &room_id,
            ServerEvent::user_joined(&room_id, identity.clone()),
            Some(self.id()),
        );
        self.reply_joined(&room_id);

        tracing::debug!(connection_id = %self.id(), identity_id = %identity.id, room_id = %room_id, "Joined room");
        Ok(())
    }

    fn reply_joined(&self, room_id: &str) {
        let roster = self.state.presence.list_online(room_id);
        self.reply(ServerEvent::Joined(JoinedPayload {
            room_id: room_id.to_string(),
            online_count: roster.len(),
            roster,
            typing: self.state.presence.typing_in(room_id),
        }));
    }

    fn leave(&mut self, room_id: &str) -> Result<(), AppError> {
        let identity = self.session.identity()?.clone();
        self.session.require_room(room_id)?;
        self.leave_active(&identity, room_id);
        Ok(())
    }

    /// Drop out of the active room: unsubscribe, clear presence and typing,
    /// and tell the remaining subscribers.
    fn leave_active(&mut self, identity: &Identity, room_id: &str) {
        let gateway = &self.state.gateway;
        gateway.unsubscribe(self.id(), room_id);
        self.state
            .presence
            .set_active_room(&identity.id, self.id(), None);
        if self.state.presence.stop_typing(room_id, &identity.id) {
            gateway.broadcast_room(
                room_id,
                ServerEvent::typing_stopped(room_id, identity.clone()),
                None,
            );
        }
        gateway.broadcast_room(room_id, ServerEvent::user_left(room_id, identity.clone()), None);
        self.session.phase = SessionPhase::Identified;
    }

    async fn send(&mut self, payload: SendPayload) -> Result<(), AppError> {
        let identity = self.session.identity()?.clone();
        self.session.require_room(&payload.room_id)?;

        let kind = MessageKind::from_parts(&payload.message_type, payload.attachment)?;
        if kind == MessageKind::System {
            return Err(AppError::Validation(
                "type: system messages are generated by the server".into(),
            ));
        }
        let reply_to_id = parse_optional_id(payload.reply_to_id.as_deref(), "replyToId")?;

        self.state
            .chat
            .send(SendMessage {
                room_id: payload.room_id.clone(),
                sender: identity.clone(),
                content: payload.content,
                kind,
                reply_to_id,
            })
            .await?;

        if self.state.presence.stop_typing(&payload.room_id, &identity.id) {
            self.state.gateway.broadcast_room(
                &payload.room_id,
                ServerEvent::typing_stopped(&payload.room_id, identity),
                Some(self.id()),
            );
        }
        Ok(())
    }

    fn typing(&mut self, room_id: &str, started: bool) -> Result<(), AppError> {
        let identity = self.session.identity()?.clone();
        self.session.require_room(room_id)?;

        let event = if started {
            self.state
                .presence
                .start_typing(room_id, &identity)
                .then(|| ServerEvent::typing_started(room_id, identity))
        } else {
            self.state
                .presence
                .stop_typing(room_id, &identity.id)
                .then(|| ServerEvent::typing_stopped(room_id, identity))
        };
        if let Some(event) = event {
            self.state
                .gateway
                .broadcast_room(room_id, event, Some(self.id()));
        }
        Ok(())
    }

    async fn create_room(&mut self, payload: CreateRoomPayload) -> Result<(), AppError> {
        let identity = self.session.identity()?.clone();
        let new_room = CreateRoom {
            id: payload.id,
            name: payload.name,
            description: payload.description,
            room_type: payload
                .room_type
                .unwrap_or_else(|| RoomType::Public.as_str().to_string()),
            avatar: payload.avatar,
            settings: payload.settings,
            metadata: payload.metadata,
        };
        self.state.chat.create_room(new_room, &identity).await?;
        Ok(())
    }

    async fn mark_read(&mut self, payload: MarkReadPayload) -> Result<(), AppError> {
        let identity = self.session.identity()?.clone();
        let mut room_ids = payload.rooms();
        if room_ids.is_empty() {
            match self.session.active_room() {
                Some(room) => room_ids.push(room.to_string()),
                None => {
                    return Err(AppError::Validation(
                        "roomId: name a room or join one first".into(),
                    ))
                }
            }
        }
        let updated = self.state.chat.mark_read(&room_ids, &identity).await?;
        self.reply(ServerEvent::ReadMarked(ReadMarkedPayload { room_ids, updated }));
        Ok(())
    }

    /// Periodic housekeeping. Returns a reason when the connection should be
    /// closed.
    pub fn tick(&mut self) -> Option<&'static str> {
        let limits = &self.state.settings.websocket;
        if self
            .session
            .identify_expired(Duration::from_secs(limits.identify_timeout_secs))
        {
            return Some("identify timeout");
        }
        if !self
            .session
            .is_alive(limits.heartbeat_interval_ms + limits.heartbeat_grace_ms)
        {
            return Some("heartbeat timeout");
        }

        let Some(identity) = self.session.identity.clone() else {
            return None;
        };
        if !self.state.gateway.is_registered(self.id()) {
            return Some("session replaced");
        }
        if limits.typing_ttl_secs > 0 {
            let ttl = Duration::from_secs(limits.typing_ttl_secs);
            for room_id in self.state.presence.expire_typing(&identity.id, ttl) {
                self.state.gateway.broadcast_room(
                    &room_id,
                    ServerEvent::typing_stopped(&room_id, identity.clone()),
                    Some(self.id()),
                );
            }
        }
        None
    }

    /// Tear the connection down: leave the gateway first so the departing
    /// socket is not sent its own departure, then clear presence and tell
    /// the rooms it was in.
    pub fn close(mut self) {
        self.session.phase = SessionPhase::Disconnected;
        self.state.gateway.unregister(self.id());

        if let Some(identity) = &self.session.identity {
            if let Some(departure) = self.state.presence.unregister(&identity.id, self.id()) {
                self.announce_departure(&departure);
            }
            tracing::info!(
                connection_id = %self.id(),
                identity_id = %identity.id,
                "Identity disconnected"
            );
        } else {
            tracing::debug!(connection_id = %self.id(), "Unidentified connection closed");
        }
    }
}
