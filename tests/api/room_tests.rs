//! Room API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::{TestApp, OTHER_STUDENT, STUDENT, TEACHER};

#[tokio::test]
async fn test_create_room_with_explicit_id() {
    let app = TestApp::new().await;

    let room = app.create_room("algebra-1", TEACHER).await;

    assert_eq!(room["id"], "algebra-1");
    assert_eq!(room["type"], "public");
    assert_eq!(room["memberCount"], 1);
    assert_eq!(room["stats"]["totalMembers"], 1);
    assert_eq!(room["stats"]["totalMessages"], 0);
    assert_eq!(room["members"][0]["roleInRoom"], "admin");
    assert_eq!(room["createdBy"]["id"], "t1");
}

#[tokio::test]
async fn test_create_room_generates_id_from_name() {
    let app = TestApp::new().await;

    let room = app
        .create_room_with(
            json!({
                "name": "Biology Lab!",
                "type": "subject",
                "metadata": {"subject": "Biology", "classLevel": "10", "tags": []}
            }),
            TEACHER,
        )
        .await;

    let id = room["id"].as_str().unwrap();
    assert!(id.starts_with("subject-biology-lab-"), "unexpected id {id}");
    assert_eq!(room["avatar"], "📚");
}

#[tokio::test]
async fn test_create_room_duplicate_id_conflicts() {
    let app = TestApp::new().await;
    app.create_room("algebra-1", TEACHER).await;

    let response = app
        .server
        .post("/api/v1/rooms")
        .json(&json!({
            "id": "algebra-1",
            "name": "Again",
            "creatorId": "t1",
            "creatorName": "T"
        }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["kind"], "conflict");
}

#[tokio::test]
async fn test_create_room_rejects_blank_name() {
    let app = TestApp::new().await;

    let response = app
        .server
        .post("/api/v1/rooms")
        .json(&json!({"name": "  ", "creatorId": "t1", "creatorName": "T"}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["kind"], "validation");
}

#[tokio::test]
async fn test_malformed_json_is_a_validation_error() {
    let app = TestApp::new().await;

    let response = app
        .server
        .post("/api/v1/rooms")
        .content_type("application/json")
        .bytes("{not json".into())
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["code"], 10002);
}

#[tokio::test]
async fn test_list_rooms_filters_by_subject() {
    let app = TestApp::new().await;
    app.create_room_with(
        json!({"id": "bio", "name": "Bio", "type": "subject", "metadata": {"subject": "Biology"}}),
        TEACHER,
    )
    .await;
    app.create_room_with(
        json!({"id": "chem", "name": "Chem", "type": "subject", "metadata": {"subject": "Chemistry"}}),
        TEACHER,
    )
    .await;

    let response = app
        .server
        .get("/api/v1/rooms")
        .add_query_param("subject", "biology")
        .await;

    response.assert_status_ok();
    let rooms = response.json::<Vec<Value>>();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0]["id"], "bio");
    assert_eq!(rooms[0]["memberCount"], 1);
}

#[tokio::test]
async fn test_list_rooms_rejects_unknown_type() {
    let app = TestApp::new().await;

    let response = app
        .server
        .get("/api/v1/rooms")
        .add_query_param("type", "lobby")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_unknown_room_is_not_found() {
    let app = TestApp::new().await;

    let response = app.server.get("/api/v1/rooms/nowhere").await;

    response.assert_status_not_found();
    assert_eq!(response.json::<Value>()["kind"], "not_found");
}

#[tokio::test]
async fn test_join_and_leave_keep_member_count_consistent() {
    let app = TestApp::new().await;
    app.create_room("algebra-1", TEACHER).await;

    for who in [STUDENT, OTHER_STUDENT, STUDENT] {
        let response = app
            .server
            .post("/api/v1/rooms/algebra-1/join")
            .json(&json!({"identityId": who.0, "name": who.1, "role": who.2}))
            .await;
        response.assert_status_ok();
    }

    let room = app.server.get("/api/v1/rooms/algebra-1").await.json::<Value>();
    assert_eq!(room["memberCount"], 3);
    assert_eq!(room["stats"]["totalMembers"], 3);

    let response = app
        .server
        .post("/api/v1/rooms/algebra-1/leave")
        .json(&json!({"identityId": "s1", "name": "S"}))
        .await;
    response.assert_status_ok();
    let room = response.json::<Value>();
    assert_eq!(room["memberCount"], 2);
    assert_eq!(room["stats"]["totalMembers"], 2);
}

#[tokio::test]
async fn test_join_announces_with_system_message() {
    let app = TestApp::new().await;
    app.create_room("algebra-1", TEACHER).await;

    app.server
        .post("/api/v1/rooms/algebra-1/join")
        .json(&json!({"identityId": "s1", "name": "S"}))
        .await
        .assert_status_ok();

    let history = app
        .server
        .get("/api/v1/rooms/algebra-1/messages")
        .await
        .json::<Value>();
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["type"], "system");
    assert_eq!(messages[0]["content"], "S joined the room");
}

#[tokio::test]
async fn test_join_without_announcements() {
    let app = TestApp::with_settings(|s| s.chat.announce_membership = false).await;
    app.create_room("algebra-1", TEACHER).await;

    app.server
        .post("/api/v1/rooms/algebra-1/join")
        .json(&json!({"identityId": "s1", "name": "S"}))
        .await
        .assert_status_ok();

    let history = app
        .server
        .get("/api/v1/rooms/algebra-1/messages")
        .await
        .json::<Value>();
    assert_eq!(history["messages"], json!([]));
}

#[tokio::test]
async fn test_private_room_rejects_outsiders() {
    let app = TestApp::new().await;
    app.create_room_with(json!({"id": "staff", "name": "Staff", "type": "private"}), TEACHER)
        .await;

    let join = app
        .server
        .post("/api/v1/rooms/staff/join")
        .json(&json!({"identityId": "s1", "name": "S", "role": "student"}))
        .await;
    join.assert_status(StatusCode::FORBIDDEN);

    let history = app
        .server
        .get("/api/v1/rooms/staff/messages")
        .add_query_param("identityId", "s1")
        .await;
    history.assert_status(StatusCode::FORBIDDEN);

    let staff_join = app
        .server
        .post("/api/v1/rooms/staff/join")
        .json(&json!({"identityId": "t2", "name": "Other Teacher", "role": "teacher"}))
        .await;
    staff_join.assert_status_ok();
}

#[tokio::test]
async fn test_private_history_needs_a_reader() {
    let app = TestApp::new().await;
    app.create_room_with(json!({"id": "staff", "name": "Staff", "type": "private"}), TEACHER)
        .await;
    app.post_text("staff", TEACHER, "secret").await;

    let anonymous = app.server.get("/api/v1/rooms/staff/messages").await;
    anonymous.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.json::<Value>()["kind"], "unauthorized");

    // Staff read without joining
    let staff = app
        .server
        .get("/api/v1/rooms/staff/messages")
        .add_query_param("identityId", "t2")
        .add_query_param("role", "teacher")
        .await;
    staff.assert_status_ok();
    let history = staff.json::<Value>();
    let contents: Vec<&str> = history["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert!(contents.contains(&"secret"));

    app.post_text("staff", ("t2", "Other Teacher", "teacher"), "noted").await;
}

#[tokio::test]
async fn test_online_users_of_quiet_room() {
    let app = TestApp::new().await;
    app.create_room("algebra-1", TEACHER).await;

    let response = app.server.get("/api/v1/rooms/algebra-1/online").await;

    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>(),
        json!({"roomId": "algebra-1", "users": [], "count": 0})
    );
    app.server
        .get("/api/v1/rooms/nowhere/online")
        .await
        .assert_status_not_found();
}
