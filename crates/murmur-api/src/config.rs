use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Server settings, read from `MURMUR_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    /// Maximum text message length, in characters.
    pub max_content_length: usize,
    /// Maximum request body size, in bytes. Bounds voice uploads.
    pub max_upload_bytes: usize,
    pub transcription: TranscriptionConfig,
}

#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            host: get("MURMUR_HOST", "0.0.0.0"),
            port: parse(&lookup, "MURMUR_PORT", 5000)?,
            db_path: get("MURMUR_DB_PATH", "murmur.db").into(),
            upload_dir: get("MURMUR_UPLOAD_DIR", "./voice_messages").into(),
            max_content_length: parse(&lookup, "MURMUR_MAX_CONTENT_LENGTH", 500)?,
            max_upload_bytes: parse(&lookup, "MURMUR_MAX_UPLOAD_BYTES", 100 * 1024 * 1024)?,
            transcription: TranscriptionConfig {
                base_url: get("MURMUR_TRANSCRIPTION_URL", "https://api.openai.com/v1"),
                api_key: lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()),
                model: get("MURMUR_TRANSCRIPTION_MODEL", "whisper-1"),
                timeout: Duration::from_secs(parse(
                    &lookup,
                    "MURMUR_TRANSCRIPTION_TIMEOUT_SECS",
                    30,
                )?),
            },
        })
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ServerConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.max_content_length, 500);
        assert_eq!(config.max_upload_bytes, 100 * 1024 * 1024);
        assert_eq!(config.transcription.model, "whisper-1");
        assert_eq!(config.transcription.timeout, Duration::from_secs(30));
        assert!(config.transcription.api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("MURMUR_PORT", "8080"),
            ("MURMUR_MAX_CONTENT_LENGTH", "140"),
            ("MURMUR_UPLOAD_DIR", "/tmp/murmur-uploads"),
            ("OPENAI_API_KEY", "sk-test"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_content_length, 140);
        assert_eq!(config.upload_dir, PathBuf::from("/tmp/murmur-uploads"));
        assert_eq!(config.transcription.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_invalid_number_is_an_error() {
        let err = config_from(&[("MURMUR_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("MURMUR_PORT"));
    }
}
