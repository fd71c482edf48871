use crate::Database;
use crate::models::{TextMessageRow, UserRow, VoiceMessageRow};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row};

impl Database {
    // -- Users --

    /// Insert a user. Returns `None` when the username is already taken;
    /// uniqueness is decided by the UNIQUE constraint, not a prior lookup.
    pub fn create_user(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (username) VALUES (?1) ON CONFLICT(username) DO NOTHING",
                [username],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            Ok(Some(UserRow {
                id: conn.last_insert_rowid(),
                username: username.to_string(),
            }))
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, username FROM users ORDER BY id")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn user_exists(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row("SELECT 1 FROM users WHERE id = ?1", [id], |_| Ok(()))
                .optional()?;
            Ok(found.is_some())
        })
    }

    // -- Text messages --

    /// Timestamp assignment and insert happen under the writer lock, so
    /// row order and timestamp order agree.
    pub fn insert_text_message(
        &self,
        sender_id: i64,
        recipient_id: i64,
        content: &str,
    ) -> Result<TextMessageRow> {
        self.with_conn_mut(|conn| {
            let timestamp = self.next_timestamp();
            conn.execute(
                "INSERT INTO text_messages (content, timestamp, sender_id, recipient_id)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![content, timestamp, sender_id, recipient_id],
            )?;
            Ok(TextMessageRow {
                id: conn.last_insert_rowid(),
                content: content.to_string(),
                timestamp,
                sender_id,
                recipient_id,
            })
        })
    }

    /// Text messages exchanged between two users in either direction, oldest first.
    pub fn get_text_conversation(&self, user_a: i64, user_b: i64) -> Result<Vec<TextMessageRow>> {
        self.with_conn(|conn| query_text_conversation(conn, user_a, user_b))
    }

    // -- Voice messages --

    pub fn insert_voice_message(
        &self,
        sender_id: i64,
        recipient_id: i64,
        filename: &str,
        transcription: Option<&str>,
    ) -> Result<VoiceMessageRow> {
        self.with_conn_mut(|conn| {
            let timestamp = self.next_timestamp();
            conn.execute(
                "INSERT INTO voice_messages (filename, timestamp, sender_id, recipient_id, transcription)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![filename, timestamp, sender_id, recipient_id, transcription],
            )?;
            Ok(VoiceMessageRow {
                id: conn.last_insert_rowid(),
                filename: filename.to_string(),
                timestamp,
                sender_id,
                recipient_id,
                transcription: transcription.map(str::to_string),
            })
        })
    }

    pub fn get_voice_conversation(&self, user_a: i64, user_b: i64) -> Result<Vec<VoiceMessageRow>> {
        self.with_conn(|conn| query_voice_conversation(conn, user_a, user_b))
    }
}

fn query_text_conversation(conn: &Connection, user_a: i64, user_b: i64) -> Result<Vec<TextMessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, content, timestamp, sender_id, recipient_id
         FROM text_messages
         WHERE (sender_id = ?1 AND recipient_id = ?2)
            OR (sender_id = ?2 AND recipient_id = ?1)
         ORDER BY timestamp, id",
    )?;

    let rows = stmt
        .query_map([user_a, user_b], text_message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_voice_conversation(conn: &Connection, user_a: i64, user_b: i64) -> Result<Vec<VoiceMessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, filename, timestamp, sender_id, recipient_id, transcription
         FROM voice_messages
         WHERE (sender_id = ?1 AND recipient_id = ?2)
            OR (sender_id = ?2 AND recipient_id = ?1)
         ORDER BY timestamp, id",
    )?;

    let rows = stmt
        .query_map([user_a, user_b], voice_message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn text_message_from_row(row: &Row<'_>) -> rusqlite::Result<TextMessageRow> {
    Ok(TextMessageRow {
        id: row.get(0)?,
        content: row.get(1)?,
        timestamp: row.get(2)?,
        sender_id: row.get(3)?,
        recipient_id: row.get(4)?,
    })
}

fn voice_message_from_row(row: &Row<'_>) -> rusqlite::Result<VoiceMessageRow> {
    Ok(VoiceMessageRow {
        id: row.get(0)?,
        filename: row.get(1)?,
        timestamp: row.get(2)?,
        sender_id: row.get(3)?,
        recipient_id: row.get(4)?,
        transcription: row.get(5)?,
    })
}
