use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (users, text_messages, voice_messages)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                username    TEXT NOT NULL UNIQUE CHECK (username <> '')
            );

            CREATE TABLE text_messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                content         TEXT NOT NULL,
                timestamp       TEXT NOT NULL,
                sender_id       INTEGER NOT NULL REFERENCES users(id),
                recipient_id    INTEGER NOT NULL REFERENCES users(id)
            );

            CREATE INDEX idx_text_messages_pair
                ON text_messages(sender_id, recipient_id, timestamp);

            CREATE TABLE voice_messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                filename        TEXT NOT NULL,
                timestamp       TEXT NOT NULL,
                sender_id       INTEGER NOT NULL REFERENCES users(id),
                recipient_id    INTEGER NOT NULL REFERENCES users(id),
                transcription   TEXT
            );

            CREATE INDEX idx_voice_messages_pair
                ON voice_messages(sender_id, recipient_id, timestamp);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
