//! Voice message ingestion.
//!
//! An upload moves through `Received → Validated → Stored → Transcribing →
//! Persisted → CleanedUp`. Every check that can reject the request runs
//! before the audio touches disk. Transcription failures never fail the
//! request; the message is stored with a sentinel transcription instead.
//! The transient file is owned by a [`TransientFile`] guard, so it is removed
//! on every exit path, including a dropped request future.

use std::path::Path;
use std::time::Duration;

use axum::{
    Json,
    extract::{
        Query, State,
        multipart::{Multipart, MultipartError, MultipartRejection},
        rejection::QueryRejection,
    },
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use tracing::{debug, info, warn};

use murmur_db::models::VoiceMessageRow;
use murmur_types::api::ConversationQuery;
use murmur_types::models::VoiceMessage;

use crate::error::ApiError;
use crate::messages::{conversation_pair, parse_timestamp};
use crate::storage::{TransientFile, sanitize_filename};
use crate::transcription::{Transcriber, TranscriptionError};
use crate::users::ensure_participants_exist;
use crate::{AppState, run_blocking};

/// Accepted audio extensions, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: &[&str] = &["wav", "mp3", "ogg"];

const SENTINEL_PREFIX: &str = "Transcription failed";

/// A fully received upload with its identities parsed.
#[derive(Debug)]
pub struct VoiceUpload {
    pub filename: String,
    pub audio: Bytes,
    pub sender_id: i64,
    pub recipient_id: i64,
}

/// POST /voice_messages, multipart `file`, `sender_id`, `recipient_id`.
pub async fn upload_voice_message(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let upload = receive(multipart?, state.max_upload_bytes).await?;
    let message = ingest(&state, upload).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /voice_messages?user1_id=&user2_id=
pub async fn get_voice_messages(
    State(state): State<AppState>,
    query: Result<Query<ConversationQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let (user1_id, user2_id) = conversation_pair(query)?;

    let db = state.clone();
    let rows = run_blocking(move || db.db.get_voice_conversation(user1_id, user2_id)).await?;

    let messages: Vec<VoiceMessage> = rows.into_iter().map(voice_message_from_row).collect();
    Ok(Json(messages))
}

/// Received: drain the form and check that every part is present.
async fn receive(mut multipart: Multipart, body_limit: usize) -> Result<VoiceUpload, ApiError> {
    let mut file: Option<(Option<String>, Bytes)> = None;
    let mut sender_id: Option<String> = None;
    let mut recipient_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, body_limit))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().map(str::to_string);
                let data = field.bytes().await.map_err(|e| multipart_error(e, body_limit))?;
                file = Some((filename, data));
            }
            Some("sender_id") => {
                sender_id = Some(field.text().await.map_err(|e| multipart_error(e, body_limit))?);
            }
            Some("recipient_id") => {
                recipient_id =
                    Some(field.text().await.map_err(|e| multipart_error(e, body_limit))?);
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    let (filename, audio) = file.ok_or_else(|| ApiError::InvalidInput("No file part".into()))?;
    let filename = filename
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::InvalidInput("No selected file".into()))?;

    let (Some(sender_id), Some(recipient_id)) = (
        sender_id.filter(|s| !s.trim().is_empty()),
        recipient_id.filter(|s| !s.trim().is_empty()),
    ) else {
        return Err(ApiError::InvalidInput(
            "sender_id and recipient_id are required".into(),
        ));
    };

    Ok(VoiceUpload {
        filename,
        audio,
        sender_id: parse_id("sender_id", &sender_id)?,
        recipient_id: parse_id("recipient_id", &recipient_id)?,
    })
}

/// Run an upload through validation, storage, transcription and persistence.
pub async fn ingest(state: &AppState, upload: VoiceUpload) -> Result<VoiceMessage, ApiError> {
    // Validated: nothing below this block may run for a rejected upload
    if !has_allowed_extension(&upload.filename) {
        return Err(ApiError::UnsupportedMediaType(
            "File type not allowed. Only WAV, MP3, and OGG files are accepted.".into(),
        ));
    }
    if upload.audio.is_empty() {
        return Err(ApiError::InvalidInput("Uploaded file is empty".into()));
    }
    ensure_participants_exist(state, upload.sender_id, upload.recipient_id).await?;

    // Stored under the sanitized name, which is also the one persisted
    let filename = sanitize_filename(&upload.filename);
    let stored: TransientFile = state.uploads.store(&filename, &upload.audio).await?;
    debug!("Voice upload {} stored at {}", filename, stored.path().display());

    // Transcribing
    let transcription = transcribe_best_effort(
        state.transcriber.as_ref(),
        stored.path(),
        state.transcription_timeout,
    )
    .await;

    // Persisted
    let db = state.clone();
    let name = filename.clone();
    let (sender_id, recipient_id) = (upload.sender_id, upload.recipient_id);
    let persisted = run_blocking(move || {
        db.db
            .insert_voice_message(sender_id, recipient_id, &name, Some(transcription.as_str()))
    })
    .await;

    // CleanedUp, whether or not the insert succeeded
    stored.remove().await;

    let row = persisted?;
    info!(
        "Voice message {} ({}) sent from {} to {}",
        row.id, row.filename, sender_id, recipient_id
    );
    Ok(voice_message_from_row(row))
}

/// Transcribe with a deadline. Any failure becomes the sentinel text.
pub async fn transcribe_best_effort(
    transcriber: &dyn Transcriber,
    audio_path: &Path,
    timeout: Duration,
) -> String {
    let outcome = match tokio::time::timeout(timeout, transcriber.transcribe(audio_path)).await {
        Ok(result) => result,
        Err(_) => Err(TranscriptionError::Timeout(timeout)),
    };

    match outcome {
        Ok(text) => text,
        Err(e) => {
            warn!("Transcription of {} failed: {}", audio_path.display(), e);
            sentinel_transcription(&e)
        }
    }
}

pub fn sentinel_transcription(err: &TranscriptionError) -> String {
    format!("{}: {}", SENTINEL_PREFIX, err)
}

pub fn is_sentinel_transcription(text: &str) -> bool {
    text.starts_with(SENTINEL_PREFIX)
}

pub fn has_allowed_extension(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.iter().any(|a| ext.eq_ignore_ascii_case(a)))
        .unwrap_or(false)
}

fn parse_id(field: &str, raw: &str) -> Result<i64, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::InvalidInput(format!("{} must be an integer", field)))
}

fn multipart_error(e: MultipartError, body_limit: usize) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::UploadTooLarge { max: body_limit }
    } else {
        ApiError::InvalidInput(e.body_text())
    }
}

fn voice_message_from_row(row: VoiceMessageRow) -> VoiceMessage {
    VoiceMessage {
        timestamp: parse_timestamp(&row.timestamp, row.id),
        id: row.id,
        filename: row.filename,
        sender_id: row.sender_id,
        recipient_id: row.recipient_id,
        transcription: row.transcription,
    }
}
