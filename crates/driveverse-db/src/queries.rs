use crate::models::{ChatRow, MessageRow, NewUser, ProfileRow, ReadOutcome, UserRow};
use crate::{Database, now_timestamp};
use anyhow::{Result, anyhow};
use driveverse_types::models::MessageKind;
use rusqlite::Connection;
use tracing::debug;

/// Insert form of a message.
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub id: &'a str,
    pub chat_id: &'a str,
    pub sender_id: &'a str,
    pub content: &'a str,
    pub kind: MessageKind,
}

// Unread is relative to the viewer (?1): unseen messages someone else sent.
const CHAT_COLUMNS: &str = "
    c.id, c.participant_lo, c.participant_hi, c.last_message, c.last_message_id,
    c.last_message_sender, c.last_message_at, c.created_at,
    (SELECT COUNT(*) FROM messages m
        WHERE m.chat_id = c.id AND m.seen = 0 AND m.sender_id <> ?1),
    COALESCE((SELECT m.seen FROM messages m WHERE m.id = c.last_message_id), 0)";

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, password, auth_provider, role, avatar, place, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    user.id,
                    user.name,
                    user.email,
                    user.password_hash,
                    user.auth_provider,
                    user.role,
                    user.avatar,
                    user.place,
                    now_timestamp(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Returns false when no such user exists.
    pub fn set_user_status(&self, id: &str, status: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("UPDATE users SET status = ?2 WHERE id = ?1", (id, status))?;
            Ok(changed == 1)
        })
    }

    pub fn get_wishlist(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT listing_id FROM wishlist WHERE user_id = ?1 ORDER BY listing_id",
            )?;
            let ids = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    /// Batch-fetch public profiles for a set of user IDs.
    pub fn get_profiles(&self, user_ids: &[String]) -> Result<Vec<ProfileRow>> {
        if user_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=user_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, name, avatar, place FROM users WHERE id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = user_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(ProfileRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        avatar: row.get(2)?,
                        place: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Chats --

    /// Find the chat between two users, creating it if absent. The pair is
    /// unordered: (a, b) and (b, a) resolve to the same row. Returns the chat
    /// and whether this call created it.
    pub fn find_or_create_chat(
        &self,
        new_id: &str,
        user_a: &str,
        user_b: &str,
        viewer: &str,
    ) -> Result<(ChatRow, bool)> {
        let (lo, hi) = if user_a <= user_b { (user_a, user_b) } else { (user_b, user_a) };

        self.with_conn(|conn| {
            let created = conn.execute(
                "INSERT OR IGNORE INTO chats (id, participant_lo, participant_hi, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![new_id, lo, hi, now_timestamp()],
            )? == 1;

            let sql = format!(
                "SELECT {CHAT_COLUMNS} FROM chats c WHERE c.participant_lo = ?2 AND c.participant_hi = ?3"
            );
            let chat = conn
                .query_row(&sql, rusqlite::params![viewer, lo, hi], map_chat)
                .optional()?
                .ok_or_else(|| anyhow!("chat for pair ({}, {}) vanished after insert", lo, hi))?;

            Ok((chat, created))
        })
    }

    pub fn get_chat(&self, chat_id: &str, viewer: &str) -> Result<Option<ChatRow>> {
        self.with_conn(|conn| query_chat(conn, chat_id, viewer))
    }

    /// Chats the user takes part in, most recently active first.
    pub fn chats_for_user(&self, user_id: &str) -> Result<Vec<ChatRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CHAT_COLUMNS} FROM chats c
                 WHERE c.participant_lo = ?1 OR c.participant_hi = ?1
                 ORDER BY COALESCE(c.last_message_at, c.created_at) DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], map_chat)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Number of the user's chats holding at least one unseen message from
    /// the other participant. Backs the header badge.
    pub fn unread_chat_count(&self, user_id: &str) -> Result<u32> {
        self.with_conn(|conn| {
            let count: u32 = conn.query_row(
                "SELECT COUNT(*) FROM chats c
                 WHERE (c.participant_lo = ?1 OR c.participant_hi = ?1)
                   AND EXISTS (SELECT 1 FROM messages m
                               WHERE m.chat_id = c.id AND m.seen = 0 AND m.sender_id <> ?1)",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Delete a chat and every message in it. Returns the number of messages removed.
    pub fn delete_chat(&self, chat_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let messages = tx.execute("DELETE FROM messages WHERE chat_id = ?1", [chat_id])?;
            tx.execute("DELETE FROM chats WHERE id = ?1", [chat_id])?;
            tx.commit()?;
            Ok(messages)
        })
    }

    // -- Messages --

    /// Persist a message and refresh the parent chat's last-message fields in
    /// one transaction.
    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<MessageRow> {
        let created_at = now_timestamp();

        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO messages (id, chat_id, sender_id, content, kind, seen, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                rusqlite::params![
                    msg.id,
                    msg.chat_id,
                    msg.sender_id,
                    msg.content,
                    msg.kind.as_str(),
                    created_at,
                ],
            )?;

            let updated = tx.execute(
                "UPDATE chats
                 SET last_message = ?2, last_message_id = ?3, last_message_sender = ?4, last_message_at = ?5
                 WHERE id = ?1",
                rusqlite::params![
                    msg.chat_id,
                    msg.kind.preview(msg.content),
                    msg.id,
                    msg.sender_id,
                    created_at,
                ],
            )?;
            if updated != 1 {
                return Err(anyhow!("chat {} not found", msg.chat_id));
            }
            tx.commit()?;

            debug!("Stored message {} in chat {}", msg.id, msg.chat_id);
            Ok(MessageRow {
                id: msg.id.to_string(),
                chat_id: msg.chat_id.to_string(),
                sender_id: msg.sender_id.to_string(),
                content: msg.content.to_string(),
                kind: msg.kind.as_str().to_string(),
                seen: false,
                created_at,
            })
        })
    }

    /// All messages of a chat in the order they were stored. Unknown chats
    /// yield an empty list.
    pub fn get_messages(&self, chat_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, chat_id))
    }

    /// Mark every message in the chat not sent by `reader` as seen.
    pub fn mark_read(&self, chat_id: &str, reader: &str) -> Result<ReadOutcome> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let pending: Vec<(String, String)> = {
                let mut stmt = tx.prepare(
                    "SELECT id, sender_id FROM messages
                     WHERE chat_id = ?1 AND sender_id <> ?2 AND seen = 0
                     ORDER BY created_at, rowid",
                )?;
                let rows = stmt
                    .query_map((chat_id, reader), |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            };

            tx.execute(
                "UPDATE messages SET seen = 1 WHERE chat_id = ?1 AND sender_id <> ?2 AND seen = 0",
                (chat_id, reader),
            )?;
            tx.commit()?;

            let (last_marked_id, last_marked_sender) = match pending.last() {
                Some((id, sender)) => (Some(id.clone()), Some(sender.clone())),
                None => (None, None),
            };
            Ok(ReadOutcome {
                marked: pending.len(),
                last_marked_id,
                last_marked_sender,
            })
        })
    }
}

fn map_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatRow> {
    Ok(ChatRow {
        id: row.get(0)?,
        participant_lo: row.get(1)?,
        participant_hi: row.get(2)?,
        last_message: row.get(3)?,
        last_message_id: row.get(4)?,
        last_message_sender: row.get(5)?,
        last_message_at: row.get(6)?,
        created_at: row.get(7)?,
        unread_count: row.get(8)?,
        last_message_seen: row.get(9)?,
    })
}

fn query_chat(conn: &Connection, chat_id: &str, viewer: &str) -> Result<Option<ChatRow>> {
    let sql = format!("SELECT {CHAT_COLUMNS} FROM chats c WHERE c.id = ?2");
    let row = conn
        .query_row(&sql, rusqlite::params![viewer, chat_id], map_chat)
        .optional()?;
    Ok(row)
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, email, password, auth_provider, role, status, avatar, place, created_at
         FROM users WHERE id = ?1",
    )?;

    let row = stmt
        .query_row([id], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                auth_provider: row.get(4)?,
                role: row.get(5)?,
                status: row.get(6)?,
                avatar: row.get(7)?,
                place: row.get(8)?,
                created_at: row.get(9)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_messages(conn: &Connection, chat_id: &str) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, chat_id, sender_id, content, kind, seen, created_at
         FROM messages
         WHERE chat_id = ?1
         ORDER BY created_at ASC, rowid ASC",
    )?;

    let rows = stmt
        .query_map([chat_id], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                chat_id: row.get(1)?,
                sender_id: row.get(2)?,
                content: row.get(3)?,
                kind: row.get(4)?,
                seen: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
