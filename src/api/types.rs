use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Text form posted by the chat page
#[derive(Deserialize)]
pub struct ChatForm {
    #[serde(default)]
    pub message: String,
}

/// Request payload for the JSON chat endpoint
#[derive(Deserialize, Serialize)]
pub struct ChatRequest {
    /// Session to continue; a new one is opened when absent or unknown
    #[serde(default)]
    pub session_id: Option<Uuid>,
    /// User message
    pub message: String,
}

/// Response payload from the JSON chat endpoint
#[derive(Deserialize, Serialize)]
pub struct ChatResponse {
    /// Session the message was added to
    pub session_id: Uuid,
    /// Model reply, verbatim
    pub reply: String,
}

/// Error payload from the JSON chat endpoint
#[derive(Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
