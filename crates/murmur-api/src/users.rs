use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use murmur_types::api::CreateUserRequest;
use murmur_types::models::User;

use crate::error::ApiError;
use crate::{AppState, run_blocking};

const MAX_USERNAME_LEN: usize = 80;

/// POST /users
pub async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let username = validate_username(req.username)?;

    let db = state.clone();
    let name = username.clone();
    let row = run_blocking(move || db.db.create_user(&name))
        .await?
        .ok_or_else(|| ApiError::Conflict("Username already exists".into()))?;

    info!("Created user {} ({})", row.username, row.id);

    Ok((
        StatusCode::CREATED,
        Json(User {
            id: row.id,
            username: row.username,
        }),
    ))
}

/// GET /users
pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let rows = run_blocking(move || db.db.list_users()).await?;

    let users: Vec<User> = rows
        .into_iter()
        .map(|row| User {
            id: row.id,
            username: row.username,
        })
        .collect();

    Ok(Json(users))
}

fn validate_username(username: Option<String>) -> Result<String, ApiError> {
    let username = username.as_deref().map(str::trim).unwrap_or_default();
    if username.is_empty() {
        return Err(ApiError::InvalidInput("Username is required".into()));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(ApiError::InvalidInput(format!(
            "Username must be at most {} characters",
            MAX_USERNAME_LEN
        )));
    }
    Ok(username.to_string())
}

/// NotFound unless both participants of a message exist.
pub(crate) async fn ensure_participants_exist(
    state: &AppState,
    sender_id: i64,
    recipient_id: i64,
) -> Result<(), ApiError> {
    let db = state.clone();
    let (sender, recipient) = run_blocking(move || {
        Ok((db.db.user_exists(sender_id)?, db.db.user_exists(recipient_id)?))
    })
    .await?;

    if !sender || !recipient {
        return Err(ApiError::NotFound("Sender or recipient not found".into()));
    }
    Ok(())
}
