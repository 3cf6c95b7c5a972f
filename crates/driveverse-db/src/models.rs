//! Database row types. These map directly to SQLite rows and are kept
//! distinct from the driveverse-types API models.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password: Option<String>,
    pub auth_provider: String,
    pub role: String,
    pub status: String,
    pub avatar: Option<String>,
    pub place: String,
    pub created_at: String,
}

/// Insert form of a user. Credentials are optional for federated accounts.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: Option<&'a str>,
    pub auth_provider: &'a str,
    pub role: &'a str,
    pub avatar: Option<&'a str>,
    pub place: &'a str,
}

#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub place: String,
}

/// Chat aggregate. `unread_count` (relative to the querying viewer) and
/// `last_message_seen` are computed from the message table, never stored.
#[derive(Debug, Clone)]
pub struct ChatRow {
    pub id: String,
    pub participant_lo: String,
    pub participant_hi: String,
    pub last_message: String,
    pub last_message_id: Option<String>,
    pub last_message_sender: Option<String>,
    pub last_message_at: Option<String>,
    pub created_at: String,
    pub unread_count: u32,
    pub last_message_seen: bool,
}

impl ChatRow {
    pub fn participants(&self) -> [&str; 2] {
        [&self.participant_lo, &self.participant_hi]
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participant_lo == user_id || self.participant_hi == user_id
    }

    /// The participant that is not `user_id`. Returns `user_id` itself for a
    /// participant-less lookup so callers never relay to a stranger.
    pub fn other_participant<'a>(&'a self, user_id: &'a str) -> &'a str {
        if self.participant_lo == user_id {
            &self.participant_hi
        } else if self.participant_hi == user_id {
            &self.participant_lo
        } else {
            user_id
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub content: String,
    pub kind: String,
    pub seen: bool,
    pub created_at: String,
}

/// Result of marking a chat read.
#[derive(Debug, Clone, Default)]
pub struct ReadOutcome {
    pub marked: usize,
    /// Latest message flipped to seen, if any. Used for the read receipt.
    pub last_marked_id: Option<String>,
    /// Author of that message.
    pub last_marked_sender: Option<String>,
}
