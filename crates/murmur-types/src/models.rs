use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A directory identity. Created once, never renamed or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMessage {
    pub id: i64,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sender_id: i64,
    pub recipient_id: i64,
}

/// A voice note. The audio itself is never kept; `filename` is the sanitized
/// name it was uploaded under and `transcription` is the only durable content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceMessage {
    pub id: i64,
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub transcription: Option<String>,
}
