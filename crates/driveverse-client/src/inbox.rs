use tracing::debug;
use uuid::Uuid;

use driveverse_types::api::ChatResponse;
use driveverse_types::events::GatewayEvent;

/// The conversation list plus the header badge.
#[derive(Debug, Default)]
pub struct Inbox {
    chats: Vec<ChatResponse>,
    stale: bool,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chats(&self) -> &[ChatResponse] {
        &self.chats
    }

    /// Chats holding at least one unseen message from the other side.
    pub fn badge(&self) -> usize {
        self.chats.iter().filter(|c| c.unread_count > 0).count()
    }

    /// True once a push says the list is out of date.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Feed a gateway event. Returns true if the caller should re-fetch.
    pub fn apply(&mut self, event: &GatewayEvent) -> bool {
        match event {
            GatewayEvent::NewNotification { chat_id, .. } | GatewayEvent::ChatUpdated { chat_id, .. } => {
                debug!("Inbox stale after activity in chat {}", chat_id);
                self.stale = true;
            }
            _ => {}
        }
        self.stale
    }

    /// Replace the list with a fresh fetch.
    pub fn reconcile(&mut self, chats: Vec<ChatResponse>) {
        self.chats = chats;
        self.stale = false;
    }

    /// Local read: the open chat no longer counts toward the badge.
    pub fn mark_read(&mut self, chat_id: Uuid) {
        if let Some(chat) = self.chats.iter_mut().find(|c| c.id == chat_id) {
            chat.unread_count = 0;
        }
    }

    pub fn remove(&mut self, chat_id: Uuid) {
        self.chats.retain(|c| c.id != chat_id);
    }
}
