//! Message API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::{TestApp, OTHER_STUDENT, STUDENT, TEACHER};

async fn classroom() -> TestApp {
    let app = TestApp::with_settings(|s| s.chat.announce_membership = false).await;
    app.create_room("algebra-1", TEACHER).await;
    app.server
        .post("/api/v1/rooms/algebra-1/join")
        .json(&json!({"identityId": "s1", "name": "S"}))
        .await
        .assert_status_ok();
    app
}

#[tokio::test]
async fn test_send_message_updates_room_stats() {
    let app = classroom().await;

    let message = app.post_text("algebra-1", STUDENT, "What is x?").await;

    assert_eq!(message["roomId"], "algebra-1");
    assert_eq!(message["sender"]["name"], "S");
    assert_eq!(message["sender"]["role"], "student");
    assert_eq!(message["deleted"]["isDeleted"], false);
    assert!(message["id"].as_str().unwrap().parse::<i64>().is_ok());

    let room = app.server.get("/api/v1/rooms/algebra-1").await.json::<Value>();
    assert_eq!(room["stats"]["totalMessages"], 1);
    assert_eq!(room["lastMessage"]["content"], "What is x?");
    assert_eq!(room["lastMessage"]["senderName"], "S");
}

#[tokio::test]
async fn test_reply_snapshot_is_truncated() {
    let app = classroom().await;
    let long = "x".repeat(150);
    let question = app.post_text("algebra-1", TEACHER, &long).await;

    let response = app
        .server
        .post("/api/v1/rooms/algebra-1/messages")
        .json(&json!({
            "senderId": "s1",
            "senderName": "S",
            "content": "answer",
            "replyToId": question["id"]
        }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let reply = response.json::<Value>();
    assert_eq!(reply["replyTo"]["senderName"], "T");
    assert_eq!(reply["replyTo"]["truncated"], true);
    assert_eq!(reply["replyTo"]["messageId"], question["id"]);
    assert!(reply["replyTo"]["content"].as_str().unwrap().chars().count() <= 100);
}

#[tokio::test]
async fn test_send_rejects_empty_text_and_system_type() {
    let app = classroom().await;

    let empty = app
        .server
        .post("/api/v1/rooms/algebra-1/messages")
        .json(&json!({"senderId": "s1", "senderName": "S", "content": "   "}))
        .await;
    empty.assert_status(StatusCode::BAD_REQUEST);

    let system = app
        .server
        .post("/api/v1/rooms/algebra-1/messages")
        .json(&json!({"senderId": "s1", "senderName": "S", "content": "hi", "type": "system"}))
        .await;
    system.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_send_rejects_blank_or_reserved_sender() {
    let app = classroom().await;

    for sender_id in ["   ", "system"] {
        let response = app
            .server
            .post("/api/v1/rooms/algebra-1/messages")
            .json(&json!({"senderId": sender_id, "senderName": "S", "content": "hi"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    let history = app
        .server
        .get("/api/v1/rooms/algebra-1/messages")
        .await
        .json::<Value>();
    assert!(history["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_send_to_unknown_room_is_not_found() {
    let app = classroom().await;

    let response = app
        .server
        .post("/api/v1/rooms/nowhere/messages")
        .json(&json!({"senderId": "s1", "senderName": "S", "content": "hello"}))
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn test_history_pages_oldest_first() {
    let app = classroom().await;
    for i in 0..5 {
        app.post_text("algebra-1", STUDENT, &format!("m{i}")).await;
    }

    let first = app
        .server
        .get("/api/v1/rooms/algebra-1/messages")
        .add_query_param("limit", 3)
        .await
        .json::<Value>();
    let contents: Vec<&str> = first["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["content"].as_str().unwrap())
        .collect();
    assert_eq!(contents, vec!["m2", "m3", "m4"]);
    assert_eq!(first["hasMore"], true);

    let everything = app
        .server
        .get("/api/v1/rooms/algebra-1/messages")
        .add_query_param("limit", 5)
        .await
        .json::<Value>();
    assert_eq!(everything["messages"].as_array().unwrap().len(), 5);
    assert_eq!(everything["hasMore"], false);
}

#[tokio::test]
async fn test_history_rejects_bad_cursor() {
    let app = classroom().await;

    let response = app
        .server
        .get("/api/v1/rooms/algebra-1/messages")
        .add_query_param("before", "yesterday")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_student_cannot_delete_teacher_message() {
    let app = classroom().await;
    let message = app.post_text("algebra-1", TEACHER, "Homework is due Friday").await;
    let id = message["id"].as_str().unwrap();

    let response = app
        .server
        .delete(&format!("/api/v1/messages/{id}"))
        .json(&json!({"identityId": "s1", "role": "student"}))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["kind"], "permission_denied");

    let history = app
        .server
        .get("/api/v1/rooms/algebra-1/messages")
        .await
        .json::<Value>();
    assert_eq!(history["messages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_teacher_deletes_student_message() {
    let app = classroom().await;
    let first = app.post_text("algebra-1", STUDENT, "first").await;
    let second = app.post_text("algebra-1", STUDENT, "oops").await;
    let id = second["id"].as_str().unwrap();

    let response = app
        .server
        .delete(&format!("/api/v1/messages/{id}"))
        .json(&json!({"identityId": "t1", "name": "T", "role": "teacher"}))
        .await;

    response.assert_status_ok();
    let deleted = response.json::<Value>();
    assert_eq!(deleted["deleted"]["isDeleted"], true);
    assert_eq!(deleted["deleted"]["deletedBy"], "t1");
    assert_eq!(deleted["deleted"]["deletedByModel"], "Teacher");

    let history = app
        .server
        .get("/api/v1/rooms/algebra-1/messages")
        .await
        .json::<Value>();
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["id"], first["id"]);

    // The preview falls back to the newest visible message
    let room = app.server.get("/api/v1/rooms/algebra-1").await.json::<Value>();
    assert_eq!(room["lastMessage"]["content"], "first");

    // A second delete finds nothing
    app.server
        .delete(&format!("/api/v1/messages/{id}"))
        .json(&json!({"identityId": "t1", "role": "teacher"}))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn test_reaction_toggle_returns_to_baseline() {
    let app = classroom().await;
    let message = app.post_text("algebra-1", TEACHER, "Quiz tomorrow").await;
    let id = message["id"].as_str().unwrap();
    let path = format!("/api/v1/messages/{id}/reactions");

    let first = app
        .server
        .post(&path)
        .json(&json!({"identityId": "s1", "name": "S", "emoji": "👍"}))
        .await
        .json::<Value>();
    assert_eq!(first["reactions"][0]["emoji"], "👍");
    assert_eq!(first["reactions"][0]["count"], 1);
    assert_eq!(first["reactions"][0]["users"][0]["id"], "s1");

    let second = app
        .server
        .post(&path)
        .json(&json!({"identityId": "s1", "name": "S", "emoji": "👍"}))
        .await
        .json::<Value>();
    assert_eq!(second["reactions"], message["reactions"]);
}

#[tokio::test]
async fn test_reaction_requires_emoji() {
    let app = classroom().await;
    let message = app.post_text("algebra-1", TEACHER, "Quiz tomorrow").await;
    let id = message["id"].as_str().unwrap();

    let response = app
        .server
        .post(&format!("/api/v1/messages/{id}/reactions"))
        .json(&json!({"identityId": "s1", "emoji": ""}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_edit_keeps_original_content() {
    let app = classroom().await;
    let message = app.post_text("algebra-1", STUDENT, "x = 3").await;
    let id = message["id"].as_str().unwrap();
    let path = format!("/api/v1/messages/{id}");

    let by_other = app
        .server
        .patch(&path)
        .json(&json!({"identityId": "t1", "role": "teacher", "content": "x = 5"}))
        .await;
    by_other.assert_status(StatusCode::FORBIDDEN);

    app.server
        .patch(&path)
        .json(&json!({"identityId": "s1", "content": "x = 4"}))
        .await
        .assert_status_ok();
    let edited = app
        .server
        .patch(&path)
        .json(&json!({"identityId": "s1", "content": "x = 5"}))
        .await
        .json::<Value>();

    assert_eq!(edited["content"], "x = 5");
    assert_eq!(edited["edited"]["isEdited"], true);
    assert_eq!(edited["edited"]["originalContent"], "x = 3");

    let room = app.server.get("/api/v1/rooms/algebra-1").await.json::<Value>();
    assert_eq!(room["lastMessage"]["content"], "x = 5");
}

#[tokio::test]
async fn test_invalid_message_id_is_a_validation_error() {
    let app = classroom().await;

    let response = app
        .server
        .post("/api/v1/messages/not-a-number/reactions")
        .json(&json!({"identityId": "s1", "emoji": "👍"}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_mark_read_is_idempotent() {
    let app = classroom().await;
    app.post_text("algebra-1", TEACHER, "one").await;
    app.post_text("algebra-1", OTHER_STUDENT, "two").await;

    let first = app
        .server
        .post("/api/v1/messages/algebra-1/mark-read")
        .json(&json!({"identityId": "s1", "name": "S"}))
        .await;
    first.assert_status_ok();
    assert_eq!(
        first.json::<Value>(),
        json!({"roomIds": ["algebra-1"], "updated": 2})
    );

    let second = app
        .server
        .post("/api/v1/messages/algebra-1/mark-read")
        .json(&json!({"identityId": "s1", "name": "S"}))
        .await
        .json::<Value>();
    assert_eq!(second["updated"], 0);

    let history = app
        .server
        .get("/api/v1/rooms/algebra-1/messages")
        .await
        .json::<Value>();
    for message in history["messages"].as_array().unwrap() {
        let readers: Vec<&Value> = message["readBy"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|r| r["identity"]["id"] == "s1")
            .collect();
        assert_eq!(readers.len(), 1);
    }
}

#[tokio::test]
async fn test_mark_read_unknown_room_is_not_found() {
    let app = classroom().await;

    app.server
        .post("/api/v1/messages/nowhere/mark-read")
        .json(&json!({"identityId": "s1"}))
        .await
        .assert_status_not_found();
}
