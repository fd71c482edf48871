//! Database row types. These map directly to SQLite rows and are kept
//! distinct from the murmur-types wire models so the DB layer stands alone.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct TextMessageRow {
    pub id: i64,
    pub content: String,
    pub timestamp: String,
    pub sender_id: i64,
    pub recipient_id: i64,
}

#[derive(Debug, Clone)]
pub struct VoiceMessageRow {
    pub id: i64,
    pub filename: String,
    pub timestamp: String,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub transcription: Option<String>,
}
