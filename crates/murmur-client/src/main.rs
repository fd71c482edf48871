mod api;
mod audio;
mod config;
mod conversation;
mod session;
mod table;

use crate::config::ClientConfig;
use crate::session::Session;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = ClientConfig::from_env()?;

    let default_filter = if config.debug {
        "murmur_client=debug"
    } else {
        "murmur_client=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut session = match Session::start(config).await {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Failed to start session: {:#}", e);
            eprintln!("Exiting.");
            std::process::exit(1);
        }
    };

    session.run().await
}
