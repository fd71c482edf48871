//! Speech-to-text capability.
//!
//! The voice pipeline only sees the [`Transcriber`] trait. Production uses
//! [`WhisperTranscriber`], which talks to an OpenAI-compatible
//! `/audio/transcriptions` endpoint; tests use [`ScriptedTranscriber`].

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::TranscriptionConfig;

#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("no API key configured")]
    MissingApiKey,

    #[error("could not read audio: {0}")]
    Io(#[from] std::io::Error),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the audio file at `audio_path`.
    async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscriptionError>;
}

/// Response body of `/audio/transcriptions`
#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
}

pub struct WhisperTranscriber {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl WhisperTranscriber {
    pub fn new(config: &TranscriptionConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscriptionError> {
        let api_key = self.api_key.as_deref().ok_or(TranscriptionError::MissingApiKey)?;

        let audio = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        debug!("Transcribing {} ({} bytes) with {}", file_name, audio.len(), self.model);

        let form = Form::new()
            .text("model", self.model.clone())
            .part("file", Part::bytes(audio).file_name(file_name));

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: WhisperResponse = response.json().await?;
        info!("Transcription complete ({} chars)", parsed.text.len());
        Ok(parsed.text.trim().to_string())
    }
}

/// What a [`ScriptedTranscriber`] does on every call.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Reply(String),
    Fail(String),
    /// Never completes; exercises the pipeline timeout.
    Stall,
}

/// One observed call: where the audio was and what it contained at that moment.
#[derive(Debug, Clone)]
pub struct ScriptedCall {
    pub path: PathBuf,
    pub audio: Vec<u8>,
}

/// Deterministic transcriber for tests and offline runs.
pub struct ScriptedTranscriber {
    outcome: ScriptedOutcome,
    calls: Mutex<Vec<ScriptedCall>>,
}

impl ScriptedTranscriber {
    pub fn new(outcome: ScriptedOutcome) -> Self {
        Self {
            outcome,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ScriptedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, TranscriptionError> {
        let audio = tokio::fs::read(audio_path).await?;
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ScriptedCall {
                path: audio_path.to_path_buf(),
                audio,
            });

        match &self.outcome {
            ScriptedOutcome::Reply(text) => Ok(text.clone()),
            ScriptedOutcome::Fail(reason) => Err(TranscriptionError::Provider {
                status: 500,
                body: reason.clone(),
            }),
            ScriptedOutcome::Stall => std::future::pending().await,
        }
    }
}
