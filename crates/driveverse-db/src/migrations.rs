use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users, chats, messages)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                email           TEXT NOT NULL UNIQUE,
                password        TEXT,
                auth_provider   TEXT NOT NULL DEFAULT 'local',
                role            TEXT NOT NULL DEFAULT 'user',
                status          TEXT NOT NULL DEFAULT 'active',
                avatar          TEXT,
                place           TEXT NOT NULL DEFAULT '',
                created_at      TEXT NOT NULL
            );

            CREATE TABLE wishlist (
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                listing_id  TEXT NOT NULL,
                PRIMARY KEY (user_id, listing_id)
            );

            -- participant_lo < participant_hi; the pair is unique so a
            -- conversation between two users exists at most once.
            CREATE TABLE chats (
                id                  TEXT PRIMARY KEY,
                participant_lo      TEXT NOT NULL,
                participant_hi      TEXT NOT NULL,
                last_message        TEXT NOT NULL DEFAULT '',
                last_message_id     TEXT,
                last_message_sender TEXT,
                last_message_at     TEXT,
                created_at          TEXT NOT NULL,
                UNIQUE (participant_lo, participant_hi)
            );

            CREATE INDEX idx_chats_lo ON chats(participant_lo);
            CREATE INDEX idx_chats_hi ON chats(participant_hi);

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                chat_id     TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                sender_id   TEXT NOT NULL,
                content     TEXT NOT NULL,
                kind        TEXT NOT NULL DEFAULT 'text',
                seen        INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_messages_chat ON messages(chat_id, created_at);
            CREATE INDEX idx_messages_unseen ON messages(chat_id, seen, sender_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
