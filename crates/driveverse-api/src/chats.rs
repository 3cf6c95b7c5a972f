use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use driveverse_db::models::{ChatRow, ProfileRow};
use driveverse_types::api::{
    ChatResponse, CreateChatRequest, MarkReadResponse, StatusMessage, UnreadCountResponse,
};
use driveverse_types::models::ParticipantProfile;

use crate::error::{ApiError, ApiResult};
use crate::messages::{ensure_participant, load_chat_for, parse_id, parse_timestamp};
use crate::middleware::AuthUser;
use crate::state::AppState;

/// POST /api/chats/create: the conversation between the caller and a seller,
/// created on first contact.
pub async fn create_chat(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<CreateChatRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    let seller_id = req
        .seller_id
        .ok_or_else(|| ApiError::BadRequest("Missing sellerId".into()))?;
    let seller_id = parse_id(&seller_id, "Invalid sellerId")?;
    if seller_id == user.id {
        return Err(ApiError::BadRequest("Cannot start a chat with yourself".into()));
    }

    let me = user.id.to_string();
    let seller = seller_id.to_string();
    let new_id = Uuid::new_v4().to_string();
    let (chat, created, profiles) = state
        .run_db(move |db| {
            if db.get_user_by_id(&seller)?.is_none() {
                return Ok(None);
            }
            let (chat, created) = db.find_or_create_chat(&new_id, &me, &seller, &me)?;
            let profiles = db.get_profiles(&[chat.participant_lo.clone(), chat.participant_hi.clone()])?;
            Ok(Some((chat, created, profiles)))
        })
        .await?
        .ok_or_else(|| ApiError::NotFound("Seller not found".into()))?;

    if created {
        info!("Chat {} opened between {} and {}", chat.id, user.id, seller_id);
    }

    Ok(Json(chat_response(&chat, &index_profiles(profiles))))
}

/// GET /api/chats/my-chats: inbox, most recent first.
pub async fn my_chats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let me = user.id.to_string();
    let (chats, profiles) = state
        .run_db(move |db| {
            let chats = db.chats_for_user(&me)?;
            let mut ids: Vec<String> = chats
                .iter()
                .flat_map(|c| c.participants().map(str::to_string))
                .collect();
            ids.sort();
            ids.dedup();
            let profiles = db.get_profiles(&ids)?;
            Ok((chats, profiles))
        })
        .await?;

    let profiles = index_profiles(profiles);
    let chats: Vec<ChatResponse> = chats.iter().map(|c| chat_response(c, &profiles)).collect();
    Ok(Json(chats))
}

/// PUT /api/chats/read/{chat_id}: mark everything the other participant sent
/// as seen and push a read receipt for the newest of those messages.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let chat_id = parse_id(&chat_id, "Invalid chat id")?;
    load_chat_for(&state, chat_id, &user).await?;

    let cid = chat_id.to_string();
    let reader = user.id.to_string();
    let outcome = state.run_db(move |db| db.mark_read(&cid, &reader)).await?;

    if let Some(message_id) = outcome.last_marked_id.as_deref().and_then(|id| id.parse::<Uuid>().ok()) {
        let sender_id = outcome
            .last_marked_sender
            .as_deref()
            .and_then(|id| id.parse::<Uuid>().ok());
        state.dispatcher.relay_seen(chat_id, message_id, sender_id).await;
    }

    Ok(Json(MarkReadResponse {
        ok: true,
        marked: outcome.marked,
    }))
}

/// GET /api/chats/unread-count: number of chats with something unread for the caller.
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let me = user.id.to_string();
    let count = state.run_db(move |db| db.unread_chat_count(&me)).await?;
    Ok(Json(UnreadCountResponse { count }))
}

/// DELETE /api/chats/{chat_id}: participants only; removes the messages, then the chat.
pub async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    let chat_id = parse_id(&chat_id, "Invalid chat id")?;

    let cid = chat_id.to_string();
    let viewer = user.id.to_string();
    let chat = state
        .run_db(move |db| db.get_chat(&cid, &viewer))
        .await?
        .ok_or_else(|| ApiError::NotFound("Chat not found".into()))?;
    ensure_participant(&chat, &user)?;

    let cid = chat.id.clone();
    let removed = state.run_db(move |db| db.delete_chat(&cid)).await?;
    info!("{} deleted chat {} ({} messages)", user.id, chat_id, removed);

    Ok(Json(StatusMessage {
        message: "Chat deleted successfully".into(),
    }))
}

fn index_profiles(profiles: Vec<ProfileRow>) -> HashMap<String, ProfileRow> {
    profiles.into_iter().map(|p| (p.id.clone(), p)).collect()
}

pub(crate) fn chat_response(row: &ChatRow, profiles: &HashMap<String, ProfileRow>) -> ChatResponse {
    let participants = row
        .participants()
        .iter()
        .filter_map(|id| {
            let Ok(uuid) = id.parse::<Uuid>() else {
                warn!("Corrupt participant '{}' on chat '{}'", id, row.id);
                return None;
            };
            Some(match profiles.get(*id) {
                Some(p) => ParticipantProfile {
                    id: uuid,
                    name: p.name.clone(),
                    avatar: p.avatar.clone(),
                },
                None => ParticipantProfile {
                    id: uuid,
                    name: "Deleted user".into(),
                    avatar: None,
                },
            })
        })
        .collect();

    ChatResponse {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt chat id '{}': {}", row.id, e);
            Uuid::default()
        }),
        participants,
        last_message: row.last_message.clone(),
        last_message_sender: row.last_message_sender.as_deref().and_then(|s| s.parse().ok()),
        last_message_at: row.last_message_at.as_deref().and_then(parse_timestamp),
        last_message_seen: row.last_message_seen,
        unread_count: row.unread_count,
        created_at: parse_timestamp(&row.created_at).unwrap_or_default(),
    }
}
