use serde::{Deserialize, Serialize};

// -- Users --

/// Fields are optional so that a missing value reaches validation and is
/// reported as a 400 with the usual error body, not a deserializer rejection.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub username: Option<String>,
}

// -- Messages --

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub sender_id: Option<i64>,
    #[serde(default)]
    pub recipient_id: Option<i64>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Query string of `GET /messages` and `GET /voice_messages`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConversationQuery {
    #[serde(default)]
    pub user1_id: Option<i64>,
    #[serde(default)]
    pub user2_id: Option<i64>,
}

// -- Errors --

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
