use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use driveverse_types::api::MessageResponse;
use driveverse_types::models::MessageKind;

/// Viewers closer than this to the bottom are treated as "at the bottom".
pub const STICKY_BOTTOM_PX: f64 = 80.0;

/// Client-generated id for a message the server has not confirmed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryId {
    Temp(TempId),
    Server(Uuid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatEntry {
    pub id: EntryId,
    pub sender: Uuid,
    pub content: String,
    pub kind: MessageKind,
    pub seen: bool,
    pub created_at: DateTime<Utc>,
    pub delivery: Delivery,
}

impl ChatEntry {
    fn confirmed(message: MessageResponse) -> Self {
        Self {
            id: EntryId::Server(message.id),
            sender: message.sender,
            content: message.content,
            kind: message.kind,
            seen: message.seen,
            created_at: message.created_at,
            delivery: Delivery::Confirmed,
        }
    }
}

/// What happened to a pushed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// Authored by this client, already known, or for another chat.
    Ignored,
    /// Appended; `follow` says whether to scroll to the new bottom.
    Appended { follow: bool },
}

/// Message list of one open conversation.
#[derive(Debug)]
pub struct ChatView {
    chat_id: Uuid,
    me: Uuid,
    entries: Vec<ChatEntry>,
    next_temp: u64,
    at_bottom: bool,
}

impl ChatView {
    pub fn new(chat_id: Uuid, me: Uuid) -> Self {
        Self {
            chat_id,
            me,
            entries: Vec::new(),
            next_temp: 0,
            at_bottom: true,
        }
    }

    pub fn chat_id(&self) -> Uuid {
        self.chat_id
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn is_at_bottom(&self) -> bool {
        self.at_bottom
    }

    /// Replace the confirmed history with a REST fetch. Sends still in
    /// flight stay at the end.
    pub fn load(&mut self, messages: Vec<MessageResponse>) {
        let pending: Vec<ChatEntry> = self
            .entries
            .drain(..)
            .filter(|e| e.delivery == Delivery::Pending)
            .collect();

        self.entries = messages.into_iter().map(ChatEntry::confirmed).collect();
        self.entries.extend(pending);
    }

    /// Optimistically show an outgoing message.
    pub fn begin_send(&mut self, content: impl Into<String>, kind: MessageKind) -> TempId {
        let temp = TempId(self.next_temp);
        self.next_temp += 1;

        self.entries.push(ChatEntry {
            id: EntryId::Temp(temp),
            sender: self.me,
            content: content.into(),
            kind,
            seen: false,
            created_at: Utc::now(),
            delivery: Delivery::Pending,
        });
        // Own sends always scroll.
        self.at_bottom = true;
        temp
    }

    /// Swap the placeholder for the saved message, in place.
    /// Returns false if the placeholder is gone.
    pub fn confirm(&mut self, temp: TempId, saved: MessageResponse) -> bool {
        let Some(pos) = self.position(EntryId::Temp(temp)) else {
            return false;
        };

        let saved_id = EntryId::Server(saved.id);
        self.entries[pos] = ChatEntry::confirmed(saved);

        // A push with the same id may have landed before the REST reply.
        let mut index = 0;
        self.entries.retain(|e| {
            let keep = index == pos || e.id != saved_id;
            index += 1;
            keep
        });
        true
    }

    /// Drop a placeholder whose send failed, handing it back marked `Failed`.
    pub fn fail(&mut self, temp: TempId) -> Option<ChatEntry> {
        let pos = self.position(EntryId::Temp(temp))?;
        let mut entry = self.entries.remove(pos);
        entry.delivery = Delivery::Failed;
        debug!("Send failed in chat {}, placeholder removed", self.chat_id);
        Some(entry)
    }

    /// Merge a pushed message.
    pub fn receive(&mut self, push: MessageResponse) -> Received {
        if push.chat_id != self.chat_id
            || push.sender == self.me
            || self.position(EntryId::Server(push.id)).is_some()
        {
            return Received::Ignored;
        }

        let follow = self.at_bottom;
        self.entries.push(ChatEntry::confirmed(push));
        Received::Appended { follow }
    }

    pub fn update_scroll(&mut self, distance_from_bottom: f64) {
        self.at_bottom = distance_from_bottom < STICKY_BOTTOM_PX;
    }

    /// Flip the read receipt on a message. Returns true if it changed.
    pub fn mark_seen(&mut self, message_id: Uuid) -> bool {
        match self.position(EntryId::Server(message_id)) {
            Some(pos) if !self.entries[pos].seen => {
                self.entries[pos].seen = true;
                true
            }
            _ => false,
        }
    }

    fn position(&self, id: EntryId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }
}
