use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use murmur_db::models::TextMessageRow;
use murmur_types::api::{ConversationQuery, SendMessageRequest};
use murmur_types::models::TextMessage;

use crate::error::ApiError;
use crate::users::ensure_participants_exist;
use crate::{AppState, run_blocking};

/// POST /messages
pub async fn send_message(
    State(state): State<AppState>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;

    let (Some(sender_id), Some(recipient_id), Some(content)) =
        (req.sender_id, req.recipient_id, req.content.filter(|c| !c.is_empty()))
    else {
        return Err(ApiError::InvalidInput(
            "sender_id, recipient_id, and content are required".into(),
        ));
    };

    if content.chars().count() > state.max_content_length {
        return Err(ApiError::ContentTooLong {
            max: state.max_content_length,
        });
    }

    ensure_participants_exist(&state, sender_id, recipient_id).await?;

    let db = state.clone();
    let row = run_blocking(move || db.db.insert_text_message(sender_id, recipient_id, &content))
        .await?;

    info!("Message {} sent from {} to {}", row.id, sender_id, recipient_id);

    Ok((StatusCode::CREATED, Json(text_message_from_row(row))))
}

/// GET /messages?user1_id=&user2_id=
pub async fn get_messages(
    State(state): State<AppState>,
    query: Result<Query<ConversationQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let (user1_id, user2_id) = conversation_pair(query)?;

    let db = state.clone();
    let rows = run_blocking(move || db.db.get_text_conversation(user1_id, user2_id)).await?;

    let messages: Vec<TextMessage> = rows.into_iter().map(text_message_from_row).collect();
    Ok(Json(messages))
}

/// Both ids of a conversation query, or InvalidInput.
pub(crate) fn conversation_pair(
    query: Result<Query<ConversationQuery>, QueryRejection>,
) -> Result<(i64, i64), ApiError> {
    let Query(query) = query?;
    match (query.user1_id, query.user2_id) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(ApiError::InvalidInput(
            "Both user1_id and user2_id are required".into(),
        )),
    }
}

fn text_message_from_row(row: TextMessageRow) -> TextMessage {
    TextMessage {
        timestamp: parse_timestamp(&row.timestamp, row.id),
        id: row.id,
        content: row.content,
        sender_id: row.sender_id,
        recipient_id: row.recipient_id,
    }
}

pub(crate) fn parse_timestamp(raw: &str, message_id: i64) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        warn!("Corrupt timestamp '{}' on message {}: {}", raw, message_id, e);
        DateTime::default()
    })
}
