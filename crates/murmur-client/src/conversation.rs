use chrono::{DateTime, Utc};

use murmur_types::models::{TextMessage, User, VoiceMessage};

/// One row of the merged text + voice view.
#[derive(Debug, Clone)]
pub enum Entry {
    Text(TextMessage),
    Voice(VoiceMessage),
}

impl Entry {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Entry::Text(m) => m.timestamp,
            Entry::Voice(m) => m.timestamp,
        }
    }

    pub fn sender_id(&self) -> i64 {
        match self {
            Entry::Text(m) => m.sender_id,
            Entry::Voice(m) => m.sender_id,
        }
    }

    /// Text content, or the transcription for voice notes.
    pub fn content(&self) -> &str {
        match self {
            Entry::Text(m) => &m.content,
            Entry::Voice(m) => m
                .transcription
                .as_deref()
                .filter(|t| !t.is_empty())
                .unwrap_or("Voice Message"),
        }
    }
}

/// Interleave both modalities by timestamp. The sort is stable, so entries
/// with equal timestamps keep text-before-voice order.
pub fn merge(texts: Vec<TextMessage>, voices: Vec<VoiceMessage>) -> Vec<Entry> {
    let mut entries: Vec<Entry> = texts
        .into_iter()
        .map(Entry::Text)
        .chain(voices.into_iter().map(Entry::Voice))
        .collect();
    entries.sort_by_key(Entry::timestamp);
    entries
}

/// Table rows `[timestamp, sender, content]`.
pub fn rows(entries: &[Entry], users: &[User]) -> Vec<Vec<String>> {
    entries
        .iter()
        .map(|entry| {
            let sender = users
                .iter()
                .find(|u| u.id == entry.sender_id())
                .map(|u| u.username.clone())
                .unwrap_or_else(|| "Unknown".to_string());
            vec![
                entry.timestamp().format("%Y-%m-%d %H:%M:%S").to_string(),
                sender,
                entry.content().to_string(),
            ]
        })
        .collect()
}
