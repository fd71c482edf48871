pub mod config;
pub mod error;
pub mod messages;
pub mod storage;
pub mod transcription;
pub mod users;
pub mod voice;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::get,
};

use murmur_db::Database;

use crate::error::ApiError;
use crate::storage::UploadDir;
use crate::transcription::Transcriber;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub uploads: UploadDir,
    pub transcriber: Arc<dyn Transcriber>,
    pub max_content_length: usize,
    pub max_upload_bytes: usize,
    pub transcription_timeout: Duration,
}

/// All routes, without transport layers (CORS, tracing) so tests can drive
/// it directly.
pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/messages", get(messages::get_messages).post(messages::send_message))
        .route(
            "/voice_messages",
            get(voice::get_voice_messages).post(voice::upload_voice_message),
        )
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

pub async fn health() -> &'static str {
    "ok"
}

/// Run blocking DB work off the async runtime.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}
