use anyhow::{Result, bail};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::debug;

use murmur_types::api::{CreateUserRequest, ErrorResponse, SendMessageRequest};
use murmur_types::models::{TextMessage, User, VoiceMessage};

use crate::config::ClientConfig;

/// Name every recording is uploaded under.
const VOICE_UPLOAD_NAME: &str = "voice_message.wav";

/// Thin typed wrapper over the server's REST endpoints.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    debug: bool,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url(),
            debug: config.debug,
        }
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let response = self.http.get(format!("{}/users", self.base_url)).send().await?;
        self.decode(response).await
    }

    pub async fn find_user_id(&self, username: &str) -> Result<Option<i64>> {
        Ok(self
            .list_users()
            .await?
            .into_iter()
            .find(|u| u.username == username)
            .map(|u| u.id))
    }

    pub async fn create_user(&self, username: &str) -> Result<User> {
        let body = CreateUserRequest {
            username: Some(username.to_string()),
        };
        let response = self
            .http
            .post(format!("{}/users", self.base_url))
            .json(&body)
            .send()
            .await?;
        self.decode(response).await
    }

    pub async fn send_text(&self, sender_id: i64, recipient_id: i64, content: &str) -> Result<TextMessage> {
        let body = SendMessageRequest {
            sender_id: Some(sender_id),
            recipient_id: Some(recipient_id),
            content: Some(content.to_string()),
        };
        if self.debug {
            debug!("Sending payload: {}", serde_json::to_string_pretty(&body)?);
        }
        let response = self
            .http
            .post(format!("{}/messages", self.base_url))
            .json(&body)
            .send()
            .await?;
        self.decode(response).await
    }

    pub async fn send_voice(&self, sender_id: i64, recipient_id: i64, audio: Vec<u8>) -> Result<VoiceMessage> {
        if self.debug {
            debug!(
                "Sending voice message: sender_id={} recipient_id={} ({} bytes)",
                sender_id,
                recipient_id,
                audio.len()
            );
        }
        let form = Form::new()
            .text("sender_id", sender_id.to_string())
            .text("recipient_id", recipient_id.to_string())
            .part(
                "file",
                Part::bytes(audio)
                    .file_name(VOICE_UPLOAD_NAME)
                    .mime_str("audio/wav")?,
            );
        let response = self
            .http
            .post(format!("{}/voice_messages", self.base_url))
            .multipart(form)
            .send()
            .await?;
        self.decode(response).await
    }

    pub async fn text_conversation(&self, user_a: i64, user_b: i64) -> Result<Vec<TextMessage>> {
        self.conversation("messages", user_a, user_b).await
    }

    pub async fn voice_conversation(&self, user_a: i64, user_b: i64) -> Result<Vec<VoiceMessage>> {
        self.conversation("voice_messages", user_a, user_b).await
    }

    async fn conversation<T: DeserializeOwned>(&self, path: &str, user_a: i64, user_b: i64) -> Result<Vec<T>> {
        let response = self
            .http
            .get(format!("{}/{}", self.base_url, path))
            .query(&[("user1_id", user_a), ("user2_id", user_b)])
            .send()
            .await?;
        self.decode(response).await
    }

    /// Parse a success body, or turn the server's `{"error"}` body into an error.
    async fn decode<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        if self.debug {
            debug!("Response content: {}", body);
        }
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        bail!("{} ({})", message, status)
    }
}
