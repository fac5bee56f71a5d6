//! Upload API Tests

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use serde_json::{json, Value};

use crate::common::{TestApp, STUDENT, TEACHER};

fn pdf_form() -> MultipartForm {
    let part = Part::bytes(b"%PDF-1.4 worksheet".to_vec())
        .file_name("worksheet 1.pdf")
        .mime_type("application/pdf");
    MultipartForm::new().add_part("file", part)
}

#[tokio::test]
async fn test_upload_then_attach_and_serve() {
    let app = TestApp::new().await;
    app.create_room("algebra-1", TEACHER).await;

    let response = app.server.post("/api/v1/uploads").multipart(pdf_form()).await;

    response.assert_status(StatusCode::CREATED);
    let blob = response.json::<Value>();
    let url = blob["data"].as_str().unwrap().to_string();
    assert!(url.starts_with("/uploads/"));
    assert!(url.ends_with("worksheet_1.pdf"));
    assert_eq!(blob["type"], "application/pdf");
    assert_eq!(blob["name"], "worksheet 1.pdf");
    assert_eq!(blob["size"], 18);

    let served = app.server.get(&url).await;
    served.assert_status_ok();
    assert_eq!(served.as_bytes().as_ref(), b"%PDF-1.4 worksheet");

    let message = app
        .server
        .post("/api/v1/rooms/algebra-1/messages")
        .json(&json!({
            "senderId": STUDENT.0,
            "senderName": STUDENT.1,
            "type": "file",
            "attachment": {
                "data": url,
                "type": blob["type"],
                "name": blob["name"],
                "size": blob["size"]
            }
        }))
        .await;
    message.assert_status(StatusCode::CREATED);
    let message = message.json::<Value>();
    assert_eq!(message["type"], "file");
    assert_eq!(message["attachment"]["data"], json!(url));
}

#[tokio::test]
async fn test_upload_requires_file_field() {
    let app = TestApp::new().await;
    let form = MultipartForm::new().add_text("note", "no file here");

    let response = app.server.post("/api/v1/uploads").multipart(form).await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_upload() {
    let app = TestApp::new().await;
    let blob = app
        .server
        .post("/api/v1/uploads")
        .multipart(pdf_form())
        .await
        .json::<Value>();
    let handle = blob["handle"].as_str().unwrap();

    app.server
        .delete(&format!("/api/v1/uploads/{handle}"))
        .await
        .assert_status_ok();
    app.server
        .delete(&format!("/api/v1/uploads/{handle}"))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn test_upload_over_limit_is_rejected() {
    let app = TestApp::with_settings(|s| s.uploads.max_file_size = 8).await;

    let response = app.server.post("/api/v1/uploads").multipart(pdf_form()).await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_voice_note_upload_is_stored_and_served() {
    let app = TestApp::new().await;

    let response = app
        .server
        .post("/api/v1/uploads/audio")
        .json(&json!({
            "audioData": "data:audio/webm;base64,T2dnUw==",
            "fileName": "question 3.webm",
            "duration": 4.2
        }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let blob = response.json::<Value>();
    assert_eq!(blob["type"], "audio/webm");
    assert_eq!(blob["name"], "question 3.webm");
    assert_eq!(blob["size"], 4);
    assert_eq!(blob["duration"], 4.2);
    let url = blob["data"].as_str().unwrap();
    assert!(url.ends_with("question_3.webm"));

    let served = app.server.get(url).await;
    served.assert_status_ok();
    assert_eq!(served.as_bytes().as_ref(), b"OggS");
}

#[tokio::test]
async fn test_voice_note_with_malformed_data_url_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .server
        .post("/api/v1/uploads/audio")
        .json(&json!({"audioData": "data:audio/webm,T2dnUw=="}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["kind"], "validation");
}

#[tokio::test]
async fn test_voice_note_over_limit_is_rejected() {
    let app = TestApp::with_settings(|s| s.uploads.max_file_size = 8).await;

    // "hello world!" decodes to 12 bytes
    let response = app
        .server
        .post("/api/v1/uploads/audio")
        .json(&json!({"audioData": "data:audio/webm;base64,aGVsbG8gd29ybGQh"}))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}
