use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{chats, messages, socket, uploads, users};

/// Multipart framing on top of the image itself.
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_image_bytes + UPLOAD_OVERHEAD_BYTES;

    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/api/users/profile/{id}", get(users::public_profile))
        .route("/socket", get(socket::ws_upgrade));

    let protected_routes = Router::new()
        .route("/api/chats/create", post(chats::create_chat))
        .route("/api/chats/my-chats", get(chats::my_chats))
        .route("/api/chats/read/{chat_id}", put(chats::mark_read))
        .route("/api/chats/unread-count", get(chats::unread_count))
        .route("/api/chats/{chat_id}", delete(chats::delete_chat))
        .route("/api/messages", post(messages::send_message))
        .route(
            "/api/messages/upload",
            post(uploads::upload_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/messages/{chat_id}", get(messages::get_messages))
        .route("/api/users/profile", get(users::my_profile))
        .route("/api/users/wishlist", get(users::my_wishlist))
        .route("/api/users/admin/status/{id}", patch(users::toggle_user_status))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let uploads_dir = ServeDir::new(&state.config.upload_dir);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service("/uploads", uploads_dir)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
