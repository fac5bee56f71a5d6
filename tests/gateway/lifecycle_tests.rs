//! Connection lifecycle: identify, join/leave, presence, typing, heartbeats
//! and session replacement.

use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::{gateway_state, gateway_state_with, seed_room, TestClient, STUDENT, TEACHER};

#[tokio::test]
async fn test_events_before_identify_are_rejected() {
    let (state, _uploads) = gateway_state();
    seed_room(&state, "general", TEACHER).await;
    let mut client = TestClient::connect(&state);

    client
        .emit(json!({"event": "join", "data": {"roomId": "general"}}))
        .await;

    let error = client.expect("error");
    assert_eq!(error["kind"], "unauthorized");
    assert!(client.connection.session().active_room().is_none());
}

#[tokio::test]
async fn test_malformed_frames_get_an_error_only() {
    let (state, _uploads) = gateway_state();
    let mut client = TestClient::connect(&state);

    client.connection.handle_text("not json").await;
    client
        .emit(json!({"event": "shout", "data": {}}))
        .await;

    let frames = client.drain();
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|f| f["event"] == "error" && f["data"]["kind"] == "validation"));
}

#[tokio::test]
async fn test_identify_requires_id_and_name() {
    let (state, _uploads) = gateway_state();
    let mut client = TestClient::connect(&state);

    client
        .emit(json!({"event": "identify", "data": {"userId": "s1"}}))
        .await;

    assert_eq!(client.expect("error")["kind"], "validation");
    assert_eq!(state.presence.online_total(), 0);
}

#[tokio::test]
async fn test_identify_normalizes_role() {
    let (state, _uploads) = gateway_state();
    let mut client = TestClient::connect(&state);

    client
        .emit(json!({"event": "identify", "data": {"id": "p1", "name": "Pat"}}))
        .await;

    let connected = client.expect("connected");
    assert_eq!(connected["identity"]["role"], "student");
    assert_eq!(connected["identity"]["model"], "User");
    assert_eq!(state.gateway.identified_count(), 1);
}

#[tokio::test]
async fn test_join_reports_roster_and_announces_to_others() {
    let (state, _uploads) = gateway_state();
    seed_room(&state, "algebra-1", TEACHER).await;
    let mut teacher = TestClient::identified(&state, TEACHER).await;
    let mut student = TestClient::identified(&state, STUDENT).await;

    let joined = teacher.join("algebra-1").await;
    assert_eq!(joined["onlineCount"], 1);

    let joined = student.join("algebra-1").await;
    assert_eq!(joined["roomId"], "algebra-1");
    assert_eq!(joined["onlineCount"], 2);
    assert_eq!(joined["typing"], json!([]));

    let announced = teacher.expect("user-joined");
    assert_eq!(announced["identity"]["id"], "s1");
    assert!(student.drain().is_empty());

    let room = state.chat.get_room("algebra-1").await.unwrap();
    assert!(room.is_member("s1"));
    assert_eq!(room.stats.total_members, room.members.len() as i64);
}

#[tokio::test]
async fn test_join_unknown_room_leaves_session_untouched() {
    let (state, _uploads) = gateway_state();
    let mut student = TestClient::identified(&state, STUDENT).await;

    student
        .emit(json!({"event": "join", "data": {"roomId": "nowhere"}}))
        .await;

    assert_eq!(student.expect("error")["kind"], "not_found");
    assert!(student.connection.session().active_room().is_none());
}

#[tokio::test]
async fn test_switching_rooms_leaves_the_previous_one() {
    let (state, _uploads) = gateway_state();
    seed_room(&state, "general", TEACHER).await;
    seed_room(&state, "students", TEACHER).await;
    let mut teacher = TestClient::identified(&state, TEACHER).await;
    let mut student = TestClient::identified(&state, STUDENT).await;
    teacher.join("general").await;
    student.join("general").await;
    teacher.drain();

    student.join("students").await;

    let left = teacher.expect("user-left");
    assert_eq!(left["roomId"], "general");
    assert_eq!(left["identity"]["id"], "s1");
    assert_eq!(state.presence.list_online("general").len(), 1);
    assert_eq!(state.presence.list_online("students").len(), 1);
    assert_eq!(state.gateway.subscriber_count("general"), 1);
}

#[tokio::test]
async fn test_disconnect_emits_exactly_one_user_left() {
    let (state, _uploads) = gateway_state();
    seed_room(&state, "algebra-1", TEACHER).await;
    let mut teacher = TestClient::identified(&state, TEACHER).await;
    let mut student = TestClient::identified(&state, STUDENT).await;
    teacher.join("algebra-1").await;
    student.join("algebra-1").await;
    teacher.drain();

    student.connection.close();

    let frames = teacher.drain();
    let left: Vec<_> = frames.iter().filter(|f| f["event"] == "user-left").collect();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0]["data"]["identity"]["id"], "s1");
    assert!(state.presence.session("s1").is_none());
    assert_eq!(state.presence.list_online("algebra-1").len(), 1);
}

#[tokio::test]
async fn test_leave_requires_being_in_the_room() {
    let (state, _uploads) = gateway_state();
    seed_room(&state, "algebra-1", TEACHER).await;
    let mut student = TestClient::identified(&state, STUDENT).await;

    student
        .emit(json!({"event": "leave", "data": {"roomId": "algebra-1"}}))
        .await;
    assert_eq!(student.expect("error")["kind"], "validation");

    student.join("algebra-1").await;
    student
        .emit(json!({"event": "leave", "data": {"roomId": "algebra-1"}}))
        .await;
    assert!(student.drain().is_empty());
    assert!(student.connection.session().active_room().is_none());

    // Gateway leave only ends live presence
    let room = state.chat.get_room("algebra-1").await.unwrap();
    assert!(room.is_member("s1"));
}

#[tokio::test]
async fn test_typing_start_and_stop_are_broadcast_once() {
    let (state, _uploads) = gateway_state();
    seed_room(&state, "algebra-1", TEACHER).await;
    let mut teacher = TestClient::identified(&state, TEACHER).await;
    let mut student = TestClient::identified(&state, STUDENT).await;
    teacher.join("algebra-1").await;
    student.join("algebra-1").await;
    teacher.drain();

    for _ in 0..2 {
        student
            .emit(json!({"event": "typing-start", "data": {"roomId": "algebra-1"}}))
            .await;
    }
    assert_eq!(teacher.drain_names(), vec!["typing-started"]);
    assert_eq!(state.presence.typing_in("algebra-1").len(), 1);

    // A late joiner sees who is typing
    let mut late = TestClient::identified(&state, ("s2", "Ada", "student")).await;
    let joined = late.join("algebra-1").await;
    assert_eq!(joined["typing"][0]["id"], "s1");
    teacher.drain();

    // Sending clears the indicator
    student.send_text("algebra-1", "done").await;
    assert_eq!(teacher.drain_names(), vec!["message", "typing-stopped"]);
    assert!(state.presence.typing_in("algebra-1").is_empty());

    student
        .emit(json!({"event": "typing-stop", "data": {"roomId": "algebra-1"}}))
        .await;
    assert!(teacher.drain().is_empty());
}

#[tokio::test]
async fn test_disconnect_clears_typing() {
    let (state, _uploads) = gateway_state();
    seed_room(&state, "algebra-1", TEACHER).await;
    let mut teacher = TestClient::identified(&state, TEACHER).await;
    let mut student = TestClient::identified(&state, STUDENT).await;
    teacher.join("algebra-1").await;
    student.join("algebra-1").await;
    student
        .emit(json!({"event": "typing-start", "data": {"roomId": "algebra-1"}}))
        .await;
    teacher.drain();

    student.connection.close();

    assert_eq!(teacher.drain_names(), vec!["typing-stopped", "user-left"]);
    assert!(state.presence.typing_in("algebra-1").is_empty());
}

#[tokio::test]
async fn test_session_replacement_closes_the_old_connection() {
    let (state, _uploads) = gateway_state();
    seed_room(&state, "algebra-1", TEACHER).await;
    let mut teacher = TestClient::identified(&state, TEACHER).await;
    let mut first = TestClient::identified(&state, STUDENT).await;
    teacher.join("algebra-1").await;
    first.join("algebra-1").await;
    teacher.drain();

    let mut second = TestClient::identified(&state, STUDENT).await;

    let frames = first.drain();
    assert_eq!(frames[0]["event"], "error");
    assert_eq!(frames[0]["data"]["kind"], "session_replaced");
    assert_eq!(frames[1]["close"], 4001);

    assert_eq!(teacher.drain_names(), vec!["user-left"]);
    assert_eq!(state.presence.session("s1").unwrap().connection, second.connection.id());

    // The stale connection's own teardown announces nothing further
    first
        .emit(json!({"event": "ping"}))
        .await;
    assert_eq!(first.connection.tick(), Some("session replaced"));
    first.connection.close();
    assert!(teacher.drain().is_empty());
    assert!(state.presence.session("s1").is_some());

    second.join("algebra-1").await;
    assert_eq!(teacher.drain_names(), vec!["user-joined"]);
}

#[tokio::test]
async fn test_reidentify_as_someone_else_is_rejected() {
    let (state, _uploads) = gateway_state();
    let mut client = TestClient::identified(&state, STUDENT).await;

    client.identify(TEACHER).await;

    assert_eq!(client.expect("error")["kind"], "validation");
    assert!(state.presence.session("t1").is_none());
}

#[tokio::test]
async fn test_ping_gets_pong() {
    let (state, _uploads) = gateway_state();
    let mut client = TestClient::identified(&state, STUDENT).await;

    client.emit(json!({"event": "ping"})).await;

    let pong = client.expect("pong");
    assert!(pong["timestamp"].is_string());
}

#[tokio::test]
async fn test_silent_connection_times_out() {
    let (state, _uploads) = gateway_state_with(|s| {
        s.websocket.heartbeat_interval_ms = 0;
        s.websocket.heartbeat_grace_ms = 0;
    });
    let mut client = TestClient::identified(&state, STUDENT).await;

    assert_eq!(client.connection.tick(), Some("heartbeat timeout"));
}

#[tokio::test]
async fn test_unidentified_connection_times_out() {
    let (state, _uploads) = gateway_state_with(|s| s.websocket.identify_timeout_secs = 0);
    let mut client = TestClient::connect(&state);

    assert_eq!(client.connection.tick(), Some("identify timeout"));
}

#[tokio::test]
async fn test_online_users_event() {
    let (state, _uploads) = gateway_state();
    seed_room(&state, "algebra-1", TEACHER).await;
    let mut teacher = TestClient::identified(&state, TEACHER).await;
    let mut student = TestClient::identified(&state, STUDENT).await;
    teacher.join("algebra-1").await;

    student
        .emit(json!({"event": "get-online-users", "data": {"roomId": "algebra-1"}}))
        .await;

    let online = student.expect("online-users");
    assert_eq!(online["count"], 1);
    assert_eq!(online["users"][0]["id"], "t1");
}
