//! Common Test Utilities
//!
//! An in-memory application for REST tests and in-process gateway clients
//! whose outbound frames are read straight from their queue.

#![allow(dead_code)]

use axum_test::TestServer;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

use school_chat::application::services::CreateRoom;
use school_chat::config::Settings;
use school_chat::domain::Identity;
use school_chat::presentation::http::create_router;
use school_chat::presentation::websocket::{Connection, Outbound};
use school_chat::startup::AppState;

/// Built-in defaults with uploads pointed at `upload_dir`.
pub fn test_settings(upload_dir: &TempDir) -> Settings {
    let mut settings = Settings::defaults().expect("default settings");
    settings.uploads.dir = upload_dir.path().to_string_lossy().into_owned();
    settings
}

/// Test application over the in-memory backend
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    _uploads: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_settings(|_| {}).await
    }

    pub async fn with_settings(configure: impl FnOnce(&mut Settings)) -> Self {
        let uploads = TempDir::new().expect("temp upload dir");
        let mut settings = test_settings(&uploads);
        configure(&mut settings);

        let state = AppState::in_memory(settings);
        let server = TestServer::new(create_router(state.clone())).expect("test server");
        Self {
            server,
            state,
            _uploads: uploads,
        }
    }

    /// Create a room through the API and return its JSON.
    pub async fn create_room(&self, id: &str, creator: (&str, &str, &str)) -> Value {
        self.create_room_with(json!({"id": id, "name": format!("Room {id}")}), creator)
            .await
    }

    pub async fn create_room_with(&self, mut body: Value, creator: (&str, &str, &str)) -> Value {
        let (creator_id, creator_name, creator_role) = creator;
        body["creatorId"] = json!(creator_id);
        body["creatorName"] = json!(creator_name);
        body["creatorRole"] = json!(creator_role);

        let response = self.server.post("/api/v1/rooms").json(&body).await;
        response.assert_status(axum::http::StatusCode::CREATED);
        response.json::<Value>()
    }

    /// Post a text message through the API and return its JSON.
    pub async fn post_text(&self, room_id: &str, sender: (&str, &str, &str), content: &str) -> Value {
        let (id, name, role) = sender;
        let response = self
            .server
            .post(&format!("/api/v1/rooms/{room_id}/messages"))
            .json(&json!({
                "senderId": id,
                "senderName": name,
                "senderRole": role,
                "content": content,
                "type": "text"
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        response.json::<Value>()
    }
}

pub const TEACHER: (&str, &str, &str) = ("t1", "T", "teacher");
pub const STUDENT: (&str, &str, &str) = ("s1", "S", "student");
pub const OTHER_STUDENT: (&str, &str, &str) = ("s2", "Ada", "student");

/// Shared state without an HTTP server, for gateway tests.
pub fn gateway_state() -> (AppState, TempDir) {
    gateway_state_with(|_| {})
}

pub fn gateway_state_with(configure: impl FnOnce(&mut Settings)) -> (AppState, TempDir) {
    let uploads = TempDir::new().expect("temp upload dir");
    let mut settings = test_settings(&uploads);
    configure(&mut settings);
    (AppState::in_memory(settings), uploads)
}

/// Seed a public room created by `creator`.
pub async fn seed_room(state: &AppState, room_id: &str, creator: (&str, &str, &str)) {
    let creator = Identity::new(creator.0, creator.1, Some(creator.2), None);
    state
        .chat
        .create_room(
            CreateRoom {
                id: Some(room_id.to_string()),
                name: format!("Room {room_id}"),
                room_type: "public".into(),
                ..Default::default()
            },
            &creator,
        )
        .await
        .expect("seed room");
}

/// A gateway connection driven in-process.
pub struct TestClient {
    pub connection: Connection,
    rx: UnboundedReceiver<Outbound>,
}

impl TestClient {
    /// Open a connection and consume its `hello` frame.
    pub fn connect(state: &AppState) -> Self {
        let (connection, rx) = Connection::open(state);
        let mut client = Self { connection, rx };
        let hello = client.next_event().expect("hello frame");
        assert_eq!(hello["event"], "hello");
        client
    }

    /// Connect and identify as `(id, name, role)`.
    pub async fn identified(state: &AppState, who: (&str, &str, &str)) -> Self {
        let mut client = Self::connect(state);
        client.identify(who).await;
        let connected = client.expect("connected");
        assert_eq!(connected["identityId"], who.0);
        client
    }

    pub async fn emit(&mut self, frame: Value) {
        self.connection.handle_text(&frame.to_string()).await;
    }

    pub async fn identify(&mut self, who: (&str, &str, &str)) {
        let (id, name, role) = who;
        self.emit(json!({
            "event": "identify",
            "data": {"userId": id, "fullName": name, "role": role}
        }))
        .await;
    }

    pub async fn join(&mut self, room_id: &str) -> Value {
        self.emit(json!({"event": "join", "data": {"roomId": room_id}}))
            .await;
        self.expect("joined")
    }

    pub async fn send_text(&mut self, room_id: &str, content: &str) {
        self.emit(json!({
            "event": "send",
            "data": {"roomId": room_id, "content": content, "type": "text"}
        }))
        .await;
    }

    /// Next queued frame as `{"event", "data"}` JSON, closes as `{"close": code}`.
    pub fn next_event(&mut self) -> Option<Value> {
        match self.rx.try_recv().ok()? {
            Outbound::Event(event) => Some(serde_json::to_value(&*event).expect("serialize event")),
            Outbound::Close { code, reason } => Some(json!({"close": code, "reason": reason})),
        }
    }

    /// All queued frames.
    pub fn drain(&mut self) -> Vec<Value> {
        std::iter::from_fn(|| self.next_event()).collect()
    }

    /// Names of all queued events.
    pub fn drain_names(&mut self) -> Vec<String> {
        self.drain()
            .into_iter()
            .map(|frame| {
                frame["event"]
                    .as_str()
                    .map(String::from)
                    .unwrap_or_else(|| "close".to_string())
            })
            .collect()
    }

    /// Skip frames until `event` arrives and return its data.
    pub fn expect(&mut self, event: &str) -> Value {
        let mut seen = Vec::new();
        while let Some(frame) = self.next_event() {
            if frame["event"] == event {
                return frame["data"].clone();
            }
            seen.push(frame);
        }
        panic!("expected `{event}` event, got {seen:?}");
    }
}
