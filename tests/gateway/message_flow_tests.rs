//! Message lifecycle over the gateway: send, reply, react, edit, delete,
//! read receipts and room creation.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use school_chat::application::services::SendMessage;
use school_chat::domain::{Identity, MessageKind};

use crate::common::{gateway_state, seed_room, TestApp, TestClient, OTHER_STUDENT, STUDENT, TEACHER};

#[tokio::test]
async fn test_algebra_room_flow() {
    let (state, _uploads) = gateway_state();
    let mut teacher = TestClient::identified(&state, TEACHER).await;
    teacher
        .emit(json!({
            "event": "create-room",
            "data": {"id": "algebra-1", "name": "Algebra 1", "type": "subject"}
        }))
        .await;
    let created = teacher.expect("room-created");
    assert_eq!(created["id"], "algebra-1");
    assert_eq!(created["stats"]["totalMessages"], 0);
    teacher.join("algebra-1").await;

    let mut student = TestClient::identified(&state, STUDENT).await;
    student.join("algebra-1").await;
    teacher.drain();

    student.send_text("algebra-1", "What is x?").await;

    let message = teacher.expect("message");
    assert_eq!(message["sender"]["name"], "S");
    assert_eq!(message["roomId"], "algebra-1");
    assert_eq!(message["deleted"]["isDeleted"], false);
    assert_eq!(student.expect("message"), message);

    let room = state.chat.get_room("algebra-1").await.unwrap();
    assert_eq!(room.stats.total_messages, 1);
    assert_eq!(
        room.last_message.map(|m| m.content),
        Some("What is x?".to_string())
    );
}

#[tokio::test]
async fn test_reply_snapshot_truncates_long_content() {
    let (state, _uploads) = gateway_state();
    seed_room(&state, "algebra-1", TEACHER).await;
    let mut teacher = TestClient::identified(&state, TEACHER).await;
    let mut student = TestClient::identified(&state, STUDENT).await;
    teacher.join("algebra-1").await;
    student.join("algebra-1").await;

    let long = "Solve for x in each of the following equations and show your working. ".repeat(3);
    teacher.send_text("algebra-1", &long).await;
    let question = student.expect("message");
    teacher.drain();

    student
        .emit(json!({
            "event": "send",
            "data": {"roomId": "algebra-1", "content": "x = 4", "replyToId": question["id"]}
        }))
        .await;

    let reply = teacher.expect("message");
    assert_eq!(reply["replyTo"]["senderName"], "T");
    assert_eq!(reply["replyTo"]["messageId"], question["id"]);
    assert_eq!(reply["replyTo"]["truncated"], true);
    assert_eq!(reply["replyTo"]["content"].as_str().unwrap().chars().count(), 100);
}

#[tokio::test]
async fn test_send_requires_joining_the_room() {
    let (state, _uploads) = gateway_state();
    seed_room(&state, "algebra-1", TEACHER).await;
    let mut student = TestClient::identified(&state, STUDENT).await;

    student.send_text("algebra-1", "hello?").await;

    assert_eq!(student.expect("error")["kind"], "validation");
    let page = state.chat.history("algebra-1", None, None, None).await.unwrap();
    assert!(page.messages.is_empty());
}

#[tokio::test]
async fn test_failed_send_reaches_only_the_sender() {
    let (state, _uploads) = gateway_state();
    seed_room(&state, "algebra-1", TEACHER).await;
    let mut teacher = TestClient::identified(&state, TEACHER).await;
    let mut student = TestClient::identified(&state, STUDENT).await;
    teacher.join("algebra-1").await;
    student.join("algebra-1").await;
    teacher.drain();

    student
        .emit(json!({
            "event": "send",
            "data": {"roomId": "algebra-1", "content": "", "type": "text"}
        }))
        .await;

    assert_eq!(student.drain_names(), vec!["error"]);
    assert!(teacher.drain().is_empty());
}

#[tokio::test]
async fn test_student_cannot_delete_teacher_message() {
    let (state, _uploads) = gateway_state();
    seed_room(&state, "algebra-1", TEACHER).await;
    let mut teacher = TestClient::identified(&state, TEACHER).await;
    let mut student = TestClient::identified(&state, STUDENT).await;
    teacher.join("algebra-1").await;
    student.join("algebra-1").await;
    teacher.send_text("algebra-1", "Homework: page 12").await;
    let message = student.expect("message");
    teacher.drain();

    student
        .emit(json!({
            "event": "delete",
            "data": {"messageId": message["id"], "roomId": "algebra-1"}
        }))
        .await;

    assert_eq!(student.expect("error")["kind"], "permission_denied");
    assert!(teacher.drain().is_empty());
    let page = state.chat.history("algebra-1", None, None, None).await.unwrap();
    assert_eq!(page.messages.len(), 1);
}

#[tokio::test]
async fn test_teacher_deletes_student_message() {
    let (state, _uploads) = gateway_state();
    seed_room(&state, "algebra-1", TEACHER).await;
    let mut teacher = TestClient::identified(&state, TEACHER).await;
    let mut student = TestClient::identified(&state, STUDENT).await;
    teacher.join("algebra-1").await;
    student.join("algebra-1").await;
    student.send_text("algebra-1", "something rude").await;
    let message = teacher.expect("message");
    student.drain();

    teacher
        .emit(json!({
            "event": "delete",
            "data": {"messageId": message["id"], "roomId": "algebra-1"}
        }))
        .await;

    let deleted = student.expect("message-deleted");
    assert_eq!(deleted["messageId"], message["id"]);
    assert_eq!(deleted["deletedBy"], "t1");
    assert_eq!(deleted["deletedByModel"], "Teacher");

    let page = state.chat.history("algebra-1", None, None, None).await.unwrap();
    assert!(page.messages.is_empty());
    let room = state.chat.get_room("algebra-1").await.unwrap();
    assert!(room.last_message.is_none());
}

#[tokio::test]
async fn test_delete_with_wrong_room_is_not_found() {
    let (state, _uploads) = gateway_state();
    seed_room(&state, "algebra-1", TEACHER).await;
    seed_room(&state, "general", TEACHER).await;
    let mut teacher = TestClient::identified(&state, TEACHER).await;
    teacher.join("algebra-1").await;
    teacher.send_text("algebra-1", "hello").await;
    let message = teacher.expect("message");

    teacher
        .emit(json!({
            "event": "delete",
            "data": {"messageId": message["id"], "roomId": "general"}
        }))
        .await;

    assert_eq!(teacher.expect("error")["kind"], "not_found");
}

#[tokio::test]
async fn test_reaction_toggle_is_idempotent() {
    let (state, _uploads) = gateway_state();
    seed_room(&state, "algebra-1", TEACHER).await;
    let mut teacher = TestClient::identified(&state, TEACHER).await;
    let mut student = TestClient::identified(&state, STUDENT).await;
    teacher.join("algebra-1").await;
    student.join("algebra-1").await;
    teacher.send_text("algebra-1", "Test on Monday").await;
    let message = student.expect("message");
    teacher.drain();

    let react = json!({
        "event": "react",
        "data": {"messageId": message["id"], "roomId": "algebra-1", "emoji": "😱"}
    });
    student.emit(react.clone()).await;
    let first = teacher.expect("reaction-updated");
    assert_eq!(first["reactions"][0]["count"], 1);
    assert_eq!(first["reactions"][0]["users"][0]["id"], "s1");

    student.emit(react).await;
    let second = teacher.expect("reaction-updated");
    assert_eq!(second["reactions"], message["reactions"]);
}

#[tokio::test]
async fn test_edit_broadcasts_message_edited() {
    let (state, _uploads) = gateway_state();
    seed_room(&state, "algebra-1", TEACHER).await;
    let mut teacher = TestClient::identified(&state, TEACHER).await;
    let mut student = TestClient::identified(&state, STUDENT).await;
    teacher.join("algebra-1").await;
    student.join("algebra-1").await;
    student.send_text("algebra-1", "x = 3").await;
    let message = teacher.expect("message");

    student
        .emit(json!({
            "event": "edit",
            "data": {"messageId": message["id"], "roomId": "algebra-1", "content": "x = 4"}
        }))
        .await;

    let edited = teacher.expect("message-edited");
    assert_eq!(edited["content"], "x = 4");
    assert_eq!(edited["edited"]["originalContent"], "x = 3");

    teacher
        .emit(json!({
            "event": "edit",
            "data": {"messageId": message["id"], "content": "x = 5"}
        }))
        .await;
    assert_eq!(teacher.expect("error")["kind"], "permission_denied");
}

#[tokio::test]
async fn test_mark_read_twice_keeps_one_receipt() {
    let (state, _uploads) = gateway_state();
    seed_room(&state, "algebra-1", TEACHER).await;
    let mut teacher = TestClient::identified(&state, TEACHER).await;
    let mut student = TestClient::identified(&state, STUDENT).await;
    teacher.join("algebra-1").await;
    student.join("algebra-1").await;
    teacher.send_text("algebra-1", "one").await;
    teacher.send_text("algebra-1", "two").await;
    student.drain();

    student.emit(json!({"event": "mark-read", "data": {}})).await;
    let first = student.expect("read-marked");
    assert_eq!(first, json!({"roomIds": ["algebra-1"], "updated": 2}));

    student
        .emit(json!({"event": "mark-read", "data": {"roomId": "algebra-1"}}))
        .await;
    assert_eq!(student.expect("read-marked")["updated"], 0);

    let page = state.chat.history("algebra-1", None, None, None).await.unwrap();
    for message in &page.messages {
        let receipts = message.read_by.iter().filter(|r| r.identity.id == "s1").count();
        assert_eq!(receipts, 1);
    }
}

#[tokio::test]
async fn test_concurrent_sends_are_observed_in_persisted_order() {
    let (state, _uploads) = gateway_state();
    seed_room(&state, "algebra-1", TEACHER).await;
    let mut observer = TestClient::identified(&state, OTHER_STUDENT).await;
    observer.join("algebra-1").await;

    let chat = Arc::clone(&state.chat);
    let mut tasks = Vec::new();
    for i in 0..20 {
        let chat = Arc::clone(&chat);
        tasks.push(tokio::spawn(async move {
            let sender = Identity::new(format!("s{i}"), format!("Student {i}"), None, None);
            chat.send(SendMessage {
                room_id: "algebra-1".into(),
                sender,
                content: format!("message {i}"),
                kind: MessageKind::Text,
                reply_to_id: None,
            })
            .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let observed: Vec<i64> = observer
        .drain()
        .into_iter()
        .filter(|f| f["event"] == "message")
        .map(|f| f["data"]["id"].as_str().unwrap().parse().unwrap())
        .collect();
    assert_eq!(observed.len(), 20);
    let mut sorted = observed.clone();
    sorted.sort_unstable();
    assert_eq!(observed, sorted);

    let room = state.chat.get_room("algebra-1").await.unwrap();
    assert_eq!(room.stats.total_messages, 20);
}

#[tokio::test]
async fn test_rest_posts_reach_socket_subscribers() {
    let app = TestApp::with_settings(|s| s.chat.announce_membership = false).await;
    app.create_room("algebra-1", TEACHER).await;
    let mut student = TestClient::identified(&app.state, STUDENT).await;
    student.join("algebra-1").await;

    let first = app.post_text("algebra-1", TEACHER, "Homework: page 12").await;
    let second = app.post_text("algebra-1", TEACHER, "Due Friday").await;

    let frames: Vec<_> = student
        .drain()
        .into_iter()
        .filter(|f| f["event"] == "message")
        .map(|f| f["data"].clone())
        .collect();
    assert_eq!(frames, vec![first.clone(), second]);
    assert_eq!(frames[0]["sender"]["name"], "T");

    // And the gateway's own sends land in the same history
    student.send_text("algebra-1", "Got it").await;
    let history = app
        .server
        .get("/api/v1/rooms/algebra-1/messages")
        .await
        .json::<serde_json::Value>();
    let ids: Vec<&serde_json::Value> = history["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| &m["id"])
        .collect();
    assert_eq!(ids.len(), 3);
    assert_eq!(ids[0], &first["id"]);
}
