use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, warn};
use uuid::Uuid;

use driveverse_db::models::{ChatRow, MessageRow};
use driveverse_db::queries::NewMessage;
use driveverse_types::api::{MessageResponse, SendMessageRequest};
use driveverse_types::models::MessageKind;

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::state::AppState;

/// GET /api/messages/{chat_id}: full history, oldest first. A chat that no
/// longer exists has no messages.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let chat_id = parse_id(&chat_id, "Invalid chat id")?;

    let cid = chat_id.to_string();
    let viewer = user.id.to_string();
    let (chat, rows) = state
        .run_db(move |db| {
            let chat = db.get_chat(&cid, &viewer)?;
            let rows = match &chat {
                Some(_) => db.get_messages(&cid)?,
                None => vec![],
            };
            Ok((chat, rows))
        })
        .await?;

    if let Some(chat) = &chat {
        ensure_participant(chat, &user)?;
    }

    let messages: Vec<MessageResponse> = rows.into_iter().map(message_response).collect();
    Ok(Json(messages))
}

/// POST /api/messages: persist a message, update the chat aggregate, then
/// push it to the participants.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    let (Some(chat_id), Some(content)) = (req.chat_id, req.content) else {
        return Err(ApiError::BadRequest("Missing data".into()));
    };
    if content.trim().is_empty() {
        return Err(ApiError::BadRequest("Missing data".into()));
    }
    let chat_id = parse_id(&chat_id, "Invalid chat id")?;

    let chat = load_chat_for(&state, chat_id, &user).await?;
    let message = persist_and_relay(&state, &chat, &user, content, req.kind).await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Look up a chat and require the caller to take part in it.
pub(crate) async fn load_chat_for(state: &AppState, chat_id: Uuid, user: &AuthUser) -> ApiResult<ChatRow> {
    let cid = chat_id.to_string();
    let viewer = user.id.to_string();
    let chat = state
        .run_db(move |db| db.get_chat(&cid, &viewer))
        .await?
        .ok_or_else(|| ApiError::NotFound("Chat not found".into()))?;

    ensure_participant(&chat, user)?;
    Ok(chat)
}

pub(crate) fn ensure_participant(chat: &ChatRow, user: &AuthUser) -> ApiResult<()> {
    if chat.has_participant(&user.id.to_string()) {
        Ok(())
    } else {
        warn!("{} is not a participant of chat {}", user.id, chat.id);
        Err(ApiError::Forbidden("Not authorized".into()))
    }
}

/// Store the message and relay it. The relay happens only after the row is
/// durable; a dropped push is recovered by the client's next fetch.
pub(crate) async fn persist_and_relay(
    state: &AppState,
    chat: &ChatRow,
    user: &AuthUser,
    content: String,
    kind: MessageKind,
) -> ApiResult<MessageResponse> {
    let sender = user.id.to_string();
    let receiver = parse_id(chat.other_participant(&sender), "Corrupt participant id")
        .map_err(|_| ApiError::Internal(format!("chat {} has a corrupt participant", chat.id)))?;

    let message_id = Uuid::new_v4().to_string();
    let chat_id = chat.id.clone();
    let row = state
        .run_db(move |db| {
            db.insert_message(&NewMessage {
                id: &message_id,
                chat_id: &chat_id,
                sender_id: &sender,
                content: &content,
                kind,
            })
        })
        .await?;

    let message = message_response(row);
    debug!("{} sent {} message {} in chat {}", user.id, kind, message.id, message.chat_id);
    state.dispatcher.relay_message(message.clone(), receiver).await;

    Ok(message)
}

pub(crate) fn parse_id(raw: &str, what: &str) -> ApiResult<Uuid> {
    raw.trim()
        .parse::<Uuid>()
        .map_err(|_| ApiError::BadRequest(what.to_string()))
}

/// Parse a stored timestamp. Rows written by this server are RFC 3339;
/// the bare SQLite `datetime('now')` form is accepted too.
pub(crate) fn parse_timestamp(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    raw.parse::<chrono::DateTime<chrono::Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .ok()
}

pub(crate) fn message_response(row: MessageRow) -> MessageResponse {
    MessageResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt message id '{}': {}", row.id, e);
            Uuid::default()
        }),
        chat_id: row.chat_id.parse().unwrap_or_else(|e| {
            warn!("Corrupt chat_id '{}' on message '{}': {}", row.chat_id, row.id, e);
            Uuid::default()
        }),
        sender: row.sender_id.parse().unwrap_or_else(|e| {
            warn!("Corrupt sender_id '{}' on message '{}': {}", row.sender_id, row.id, e);
            Uuid::default()
        }),
        kind: row.kind.parse().unwrap_or_else(|e| {
            warn!("Message '{}': {}", row.id, e);
            MessageKind::Text
        }),
        seen: row.seen,
        created_at: parse_timestamp(&row.created_at).unwrap_or_else(|| {
            warn!("Corrupt created_at '{}' on message '{}'", row.created_at, row.id);
            chrono::DateTime::default()
        }),
        content: row.content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_accept_both_storage_forms() {
        assert!(parse_timestamp("2026-03-01T10:15:00.123Z").is_some());
        assert!(parse_timestamp("2026-03-01 10:15:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn message_row_converts() {
        let id = Uuid::new_v4();
        let row = MessageRow {
            id: id.to_string(),
            chat_id: Uuid::new_v4().to_string(),
            sender_id: Uuid::new_v4().to_string(),
            content: "/uploads/chat-images/a.png".into(),
            kind: "image".into(),
            seen: true,
            created_at: "2026-03-01T10:15:00.000Z".into(),
        };
        let msg = message_response(row);
        assert_eq!(msg.id, id);
        assert_eq!(msg.kind, MessageKind::Image);
        assert!(msg.seen);
    }
}
