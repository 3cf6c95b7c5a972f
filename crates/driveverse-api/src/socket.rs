use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::IntoResponse,
};
use serde::Deserialize;

use driveverse_gateway::connection;

use crate::error::{ApiError, ApiResult};
use crate::middleware::{bearer_token, decode_token, resolve_user};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SocketQuery {
    pub token: Option<String>,
}

/// GET /socket: authenticate, then hand the socket to the gateway.
/// Browsers cannot set headers on a WebSocket handshake, so the token may
/// also travel as `?token=`.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<SocketQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> ApiResult<impl IntoResponse> {
    let token = query
        .token
        .as_deref()
        .or_else(|| bearer_token(&headers))
        .ok_or_else(|| ApiError::Unauthorized("No token provided".into()))?;

    let claims = decode_token(&state.config.jwt_secret, token)?;
    let user = resolve_user(&state, &claims).await?;

    let dispatcher = state.dispatcher.clone();
    let db = state.db.clone();
    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, db, user.id)))
}
