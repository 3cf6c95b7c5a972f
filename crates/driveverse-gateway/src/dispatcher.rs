use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

use driveverse_types::api::MessageResponse;
use driveverse_types::events::{ACCOUNT_BLOCKED_NOTICE, GatewayEvent};

use crate::registry::{ConnId, InMemoryRegistry, PresenceRegistry};

/// Broadcast group a connection can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    /// Personal notification channel, joined on announce.
    User(Uuid),
    /// Shared channel of one conversation, joined on demand.
    Chat(Uuid),
}

/// In-memory hub: connections, their rooms, and who is announced where.
/// Nothing here is durable; delivery is best-effort and at most once.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Who is reachable: user_id -> conn_id
    registry: Arc<dyn PresenceRegistry>,

    /// Every live connection: conn_id -> owner and outbound channel
    connections: RwLock<HashMap<ConnId, Connection>>,

    /// Room membership: room -> conn_ids
    rooms: RwLock<HashMap<Room, HashSet<ConnId>>>,
}

struct Connection {
    user_id: Uuid,
    tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_registry(Arc::new(InMemoryRegistry::new()))
    }

    pub fn with_registry(registry: Arc<dyn PresenceRegistry>) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                registry,
                connections: RwLock::new(HashMap::new()),
                rooms: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a new connection authenticated as `user_id`.
    /// Returns (conn_id, receiver of its events).
    pub async fn connect(&self, user_id: Uuid) -> (ConnId, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .connections
            .write()
            .await
            .insert(conn_id, Connection { user_id, tx });
        (conn_id, rx)
    }

    /// False once the connection was dropped, including by a block.
    pub async fn is_connected(&self, conn_id: ConnId) -> bool {
        self.inner.connections.read().await.contains_key(&conn_id)
    }

    /// Bind `user_id` to this connection and join its personal room.
    /// Repeating the call is harmless.
    pub async fn announce(&self, conn_id: ConnId, user_id: Uuid) {
        self.inner.registry.set(user_id, conn_id);
        self.join(conn_id, Room::User(user_id)).await;
        info!("User {} announced on connection {}", user_id, conn_id);
    }

    /// Join the shared room of a chat. Access control happens before this call.
    pub async fn join_conversation(&self, conn_id: ConnId, chat_id: Uuid) {
        self.join(conn_id, Room::Chat(chat_id)).await;
        debug!("Connection {} joined chat room {}", conn_id, chat_id);
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.registry.get(user_id).is_some()
    }

    /// Push a stored message to the chat room (sender included) and, when the
    /// receiver is someone else, notify the receiver's personal room.
    pub async fn relay_message(&self, message: MessageResponse, receiver_id: Uuid) {
        let chat_id = message.chat_id;
        let sender_id = message.sender;

        let delivered = self
            .emit(
                Room::Chat(chat_id),
                GatewayEvent::ReceiveMessage { message, receiver_id },
            )
            .await;
        debug!("Relayed message in chat {} to {} connections", chat_id, delivered);

        if receiver_id == sender_id {
            return;
        }

        let timestamp = Utc::now();
        if self.is_online(receiver_id) {
            self.emit(
                Room::User(receiver_id),
                GatewayEvent::NewNotification { chat_id, sender_id, timestamp },
            )
            .await;
        }
        self.emit(
            Room::User(receiver_id),
            GatewayEvent::ChatUpdated { chat_id, sender_id, timestamp },
        )
        .await;
    }

    /// Broadcast a read receipt to the chat room, and to the original sender's
    /// personal room when known.
    pub async fn relay_seen(&self, chat_id: Uuid, message_id: Uuid, sender_id: Option<Uuid>) {
        let event = GatewayEvent::MessageSeen {
            chat_id,
            message_id,
            timestamp: Utc::now(),
        };

        self.emit(Room::Chat(chat_id), event.clone()).await;
        if let Some(sender_id) = sender_id {
            self.emit(Room::User(sender_id), event).await;
        }
    }

    /// Tell every connection of `user_id` that the account was blocked, then
    /// cut them off. Each socket drains the notice and closes.
    pub async fn relay_blocked(&self, user_id: Uuid) {
        let owned: Vec<ConnId> = {
            let connections = self.inner.connections.read().await;
            connections
                .iter()
                .filter(|(_, c)| c.user_id == user_id)
                .filter(|(_, c)| {
                    c.tx.send(GatewayEvent::AccountBlocked {
                        message: ACCOUNT_BLOCKED_NOTICE.to_string(),
                    })
                    .is_ok()
                })
                .map(|(conn_id, _)| *conn_id)
                .collect()
        };
        info!("Account-blocked notice for {} reached {} connections", user_id, owned.len());

        for conn_id in owned {
            self.disconnect(conn_id).await;
        }
    }

    /// Forget a connection: drop its outbound channel, room memberships and
    /// any registry entry still pointing at it.
    pub async fn disconnect(&self, conn_id: ConnId) {
        self.inner.connections.write().await.remove(&conn_id);

        let mut rooms = self.inner.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(&conn_id);
            !members.is_empty()
        });

        for user_id in self.inner.registry.remove_connection(conn_id) {
            // Another tab of the same user is still in the personal room.
            if let Some(other) = rooms.get(&Room::User(user_id)).and_then(|m| m.iter().next()) {
                self.inner.registry.set(user_id, *other);
            } else {
                info!("User {} went offline", user_id);
            }
        }
    }

    async fn join(&self, conn_id: ConnId, room: Room) {
        self.inner.rooms.write().await.entry(room).or_default().insert(conn_id);
    }

    /// Fire-and-forget send to every member of a room. Returns how many
    /// connections accepted the event.
    async fn emit(&self, room: Room, event: GatewayEvent) -> usize {
        let rooms = self.inner.rooms.read().await;
        let Some(members) = rooms.get(&room) else {
            return 0;
        };

        let connections = self.inner.connections.read().await;
        members
            .iter()
            .filter_map(|conn_id| connections.get(conn_id))
            .filter(|c| c.tx.send(event.clone()).is_ok())
            .count()
    }
}
