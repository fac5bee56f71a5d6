//! REST API Tests

mod message_tests;
mod room_tests;
mod upload_tests;
