//! Route Configuration
//!
//! REST API under `/api/v1`, the WebSocket gateway at `/gateway`, uploaded
//! files under the configured public path, plus health and metrics.

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::services::ServeDir;

use super::handlers;
use crate::infrastructure::metrics;
use crate::presentation::middleware::{create_cors_layer, create_trace_layer, track_metrics};
use crate::presentation::websocket::ws_handler;
use crate::startup::AppState;

/// Multipart or JSON framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Create the main router with all middleware applied.
pub fn create_router(state: AppState) -> Router {
    let uploads = &state.settings.uploads;
    let files = ServeDir::new(&uploads.dir);

    Router::new()
        .nest("/api/v1", api_routes(&state))
        // WebSocket gateway endpoint
        .route("/gateway", get(ws_handler))
        .nest_service(&uploads.public_path, files)
        // Health check endpoints
        .route("/health", get(handlers::health::health_check))
        .route("/health/live", get(handlers::health::liveness))
        .route("/health/ready", get(handlers::health::readiness))
        // Prometheus metrics endpoint
        .route("/metrics", get(metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(create_trace_layer())
                .layer(create_cors_layer(&state.settings.cors))
                .layer(middleware::from_fn(track_metrics)),
        )
        .with_state(state)
}

/// Prometheus metrics endpoint handler
async fn metrics_handler() -> impl IntoResponse {
    let metrics = metrics::gather_metrics();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics,
    )
}

/// API v1 routes
fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .nest("/rooms", room_routes())
        .nest("/messages", message_routes())
        .nest("/uploads", upload_routes(state.settings.uploads.max_file_size))
}

fn room_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::room::list_rooms).post(handlers::room::create_room),
        )
        .route("/{room_id}", get(handlers::room::get_room))
        .route("/{room_id}/join", post(handlers::room::join_room))
        .route("/{room_id}/leave", post(handlers::room::leave_room))
        .route("/{room_id}/online", get(handlers::room::online_users))
        .route(
            "/{room_id}/messages",
            get(handlers::room::get_messages).post(handlers::room::send_message),
        )
}

fn message_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/{message_id}",
            patch(handlers::message::edit_message).delete(handlers::message::delete_message),
        )
        .route(
            "/{message_id}/reactions",
            post(handlers::message::toggle_reaction),
        )
        // Segment holds a room id
        .route("/{message_id}/mark-read", post(handlers::message::mark_read))
}

fn upload_routes(max_file_size: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(handlers::upload::upload)
                .layer(DefaultBodyLimit::max(max_file_size + MULTIPART_OVERHEAD)),
        )
        .route(
            "/audio",
            post(handlers::upload::upload_audio)
                .layer(DefaultBodyLimit::max(max_file_size / 3 * 4 + MULTIPART_OVERHEAD)),
        )
        .route("/{handle}", delete(handlers::upload::delete_upload))
}
