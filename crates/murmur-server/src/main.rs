use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use murmur_api::config::ServerConfig;
use murmur_api::storage::UploadDir;
use murmur_api::transcription::WhisperTranscriber;
use murmur_api::{AppState, AppStateInner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur=debug,murmur_api=debug,murmur_db=info,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    if config.transcription.api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; voice messages will be stored without transcriptions");
    }

    // Init database and upload directory
    let db = murmur_db::Database::open(&config.db_path)?;
    let uploads = UploadDir::new(config.upload_dir.clone()).await?;
    let leftovers = uploads.sweep().await?;
    if leftovers > 0 {
        warn!("Removed {} leftover uploads from a previous run", leftovers);
    }

    let transcriber = Arc::new(WhisperTranscriber::new(&config.transcription)?);

    let state: AppState = Arc::new(AppStateInner {
        db,
        uploads,
        transcriber,
        max_content_length: config.max_content_length,
        max_upload_bytes: config.max_upload_bytes,
        transcription_timeout: config.transcription.timeout,
    });

    let app = murmur_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Murmur server listening on {}", addr);
    info!(
        "Max message length {} chars, max upload {} bytes, transcription model {}",
        config.max_content_length, config.max_upload_bytes, config.transcription.model
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
