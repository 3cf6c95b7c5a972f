use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{error, info, warn};
use uuid::Uuid;

use driveverse_db::Database;
use driveverse_db::models::ChatRow;
use driveverse_types::api::MessageResponse;
use driveverse_types::events::{GatewayCommand, GatewayEvent};

use crate::dispatcher::Dispatcher;
use crate::registry::ConnId;

/// Heartbeat interval: server sends a Ping every 25 seconds.
/// If 2 consecutive Pongs are missed, the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Per-connection context shared by the command handlers.
struct Session {
    dispatcher: Dispatcher,
    db: Arc<Database>,
    conn_id: ConnId,
    user_id: Uuid,
}

/// Handle a WebSocket whose JWT was already validated at the upgrade layer.
/// The client still announces itself with `registerUser` before it receives
/// personal notifications.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, db: Arc<Database>, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    let (conn_id, mut user_rx) = dispatcher.connect(user_id).await;
    info!("{} connected to gateway as {}", user_id, conn_id);

    if let Some(text) = encode(&GatewayEvent::Ready { user_id }) {
        if sender.send(Message::Text(text.into())).await.is_err() {
            dispatcher.disconnect(conn_id).await;
            return;
        }
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward hub events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = user_rx.recv() => {
                    let Some(event) = event else { break };
                    let Some(text) = encode(&event) else { continue };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        // Hub dropped us (blocked) or the peer is gone.
        let _ = sender.send(Message::Close(None)).await;
    });

    // Read commands from client
    let session = Session {
        dispatcher: dispatcher.clone(),
        db,
        conn_id,
        user_id,
    };
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(text.as_str()) {
                    Ok(cmd) => handle_command(&session, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            session.user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.disconnect(conn_id).await;
    info!("{} disconnected from gateway ({})", user_id, conn_id);
}

fn encode(event: &GatewayEvent) -> Option<String> {
    serde_json::to_string(event)
        .map_err(|e| error!("Failed to encode gateway event: {}", e))
        .ok()
}

async fn handle_command(session: &Session, cmd: GatewayCommand) {
    let user_id = session.user_id;

    // A block drops the connection from the hub before the socket closes.
    if !session.dispatcher.is_connected(session.conn_id).await {
        warn!("{} sent a command on a closed connection, ignoring", user_id);
        return;
    }

    match cmd {
        GatewayCommand::RegisterUser { user_id: announced } => {
            let announced = announced.trim();
            if announced.is_empty() {
                return;
            }
            match announced.parse::<Uuid>() {
                Ok(id) if id == user_id => {
                    session.dispatcher.announce(session.conn_id, user_id).await;
                }
                _ => warn!("{} tried to announce as '{}', ignoring", user_id, announced),
            }
        }

        GatewayCommand::JoinChat { chat_id } => {
            if participant_chat(session, chat_id).await.is_some() {
                session.dispatcher.join_conversation(session.conn_id, chat_id).await;
            } else {
                warn!("{} refused join of chat {}: not a participant", user_id, chat_id);
            }
        }

        GatewayCommand::SendMessage {
            chat_id,
            receiver_id,
            sender,
            id,
            content,
            kind,
            created_at,
        } => {
            if sender.is_some_and(|s| s != user_id) {
                warn!("{} relayed a message claiming sender {:?}; using own id", user_id, sender);
            }
            let Some(chat) = participant_chat(session, chat_id).await else {
                warn!("{} refused relay into chat {}: not a participant", user_id, chat_id);
                return;
            };
            let Some(receiver) = other_participant(&chat, user_id) else {
                return;
            };
            if receiver_id != receiver {
                warn!(
                    "{} named receiver {} in chat {}; relaying to {}",
                    user_id, receiver_id, chat_id, receiver
                );
            }

            let message = MessageResponse {
                id,
                chat_id,
                sender: user_id,
                content,
                kind,
                seen: false,
                created_at: created_at.unwrap_or_else(chrono::Utc::now),
            };
            session.dispatcher.relay_message(message, receiver).await;
        }

        GatewayCommand::MarkSeen {
            chat_id,
            message_id,
            sender_id,
        } => {
            let Some(chat) = participant_chat(session, chat_id).await else {
                warn!("{} refused read receipt in chat {}: not a participant", user_id, chat_id);
                return;
            };
            // Only the other participant can have authored what this user read.
            let other = other_participant(&chat, user_id);
            let sender_id = sender_id.filter(|s| Some(*s) == other);
            session.dispatcher.relay_seen(chat_id, message_id, sender_id).await;
        }
    }
}

/// The chat, if this session's user takes part in it.
async fn participant_chat(session: &Session, chat_id: Uuid) -> Option<ChatRow> {
    let db = session.db.clone();
    let cid = chat_id.to_string();
    let uid = session.user_id.to_string();

    let lookup = tokio::task::spawn_blocking(move || {
        db.get_chat(&cid, &uid)
            .map(|chat| chat.filter(|c| c.has_participant(&uid)))
    });
    match lookup.await {
        Ok(Ok(chat)) => chat,
        Ok(Err(e)) => {
            error!("Participant lookup for chat {} failed: {}", chat_id, e);
            None
        }
        Err(e) => {
            error!("spawn_blocking join error: {}", e);
            None
        }
    }
}

fn other_participant(chat: &ChatRow, user_id: Uuid) -> Option<Uuid> {
    let me = user_id.to_string();
    match chat.other_participant(&me).parse() {
        Ok(id) => Some(id),
        Err(e) => {
            error!("Chat {} has a malformed participant id: {}", chat.id, e);
            None
        }
    }
}
