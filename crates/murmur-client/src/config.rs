use anyhow::{Context, Result};

/// Settings for one console session, passed explicitly to everything that
/// needs them.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub username: String,
    pub server_host: String,
    pub server_port: u16,
    pub debug: bool,
    /// Length of a microphone recording.
    pub record_seconds: u64,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_port = match lookup("MURMUR_SERVER_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("invalid value for MURMUR_SERVER_PORT: {:?}", raw))?,
            None => 5000,
        };

        let record_seconds = match lookup("MURMUR_RECORD_SECONDS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .with_context(|| format!("invalid value for MURMUR_RECORD_SECONDS: {:?}", raw))?,
            None => 5,
        };

        // The server trims usernames, so the lookup key has to match
        let username = lookup("MURMUR_USERNAME")
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "DefaultUser".into());

        Ok(Self {
            username,
            server_host: lookup("MURMUR_SERVER_HOST").unwrap_or_else(|| "127.0.0.1".into()),
            server_port,
            debug: lookup("MURMUR_DEBUG")
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            record_seconds,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}
