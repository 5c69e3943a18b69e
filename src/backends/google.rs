//! Google Gemini API client implementation for chat functionality.
//!
//! This module talks to the `generateContent` endpoint of the Gemini API.
//! Every call carries the whole conversation: the instruction turn, the
//! answered user turns with their replies, and the new user turn. Images are
//! sent inline as base64 parts next to their caption.
//!
//! # Example
//! ```no_run
//! use salamatk::builder::LLMBuilder;
//! use salamatk::chat::{ChatMessage, ChatProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = LLMBuilder::new()
//!         .api_key(std::env::var("GOOGLE_API_KEY").unwrap_or_default())
//!         .model("gemini-2.0-flash")
//!         .build()?;
//!
//!     let messages = vec![ChatMessage::user().content("Hello!").build()];
//!     let response = client.chat(&messages).await?;
//!     println!("{}", response);
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{
    chat::{ChatMessage, ChatProvider, ChatResponse, MessageType, Usage},
    error::RelayError,
};

/// Default endpoint root of the Gemini API.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Header carrying the API key, kept out of the URL
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Client for interacting with Google's Gemini API.
pub struct Google {
    /// API key for authentication with Google's API
    pub api_key: String,
    /// Model identifier (e.g. "gemini-2.0-flash")
    pub model: String,
    /// Endpoint root, overridable for proxies and tests
    pub base_url: String,
    /// Maximum number of tokens to generate in responses
    pub max_tokens: Option<u32>,
    /// Sampling temperature between 0.0 and 1.0
    pub temperature: Option<f32>,
    /// Request timeout in seconds
    pub timeout_seconds: Option<u64>,
    /// Top-p sampling parameter
    pub top_p: Option<f32>,
    /// Top-k sampling parameter
    pub top_k: Option<u32>,
    client: Client,
}

/// Request body for chat completions
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleChatRequest<'a> {
    contents: Vec<GoogleChatContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GoogleGenerationConfig>,
}

/// Individual message in a chat conversation
#[derive(Serialize)]
struct GoogleChatContent<'a> {
    /// Role of the message sender ("user" or "model")
    role: &'a str,
    parts: Vec<GoogleContentPart<'a>>,
}

/// One part of a message: either text or inline image bytes
#[derive(Serialize)]
#[serde(untagged)]
enum GoogleContentPart<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GoogleInlineData<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleInlineData<'a> {
    mime_type: &'a str,
    /// Base64 encoded payload
    data: String,
}

/// Configuration parameters for text generation
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

/// Response from the generateContent API
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GoogleChatResponse {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
    usage_metadata: Option<GoogleUsageMetadata>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GoogleCandidate {
    content: Option<GoogleResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct GoogleResponseContent {
    #[serde(default)]
    parts: Vec<GoogleResponsePart>,
}

#[derive(Deserialize, Debug)]
struct GoogleResponsePart {
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GoogleUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

/// Text reply produced by Gemini.
#[derive(Debug, Clone)]
pub struct GoogleResponse {
    text: String,
    usage: Option<Usage>,
}

impl ChatResponse for GoogleResponse {
    fn text(&self) -> Option<String> {
        Some(self.text.clone())
    }

    fn usage(&self) -> Option<Usage> {
        self.usage.clone()
    }
}

impl fmt::Display for GoogleResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl GoogleChatResponse {
    fn into_response(self) -> Result<GoogleResponse, RelayError> {
        let usage = self.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });

        let candidate = self.candidates.into_iter().next().ok_or_else(|| {
            RelayError::Remote("No candidates returned by Google".to_string())
        })?;

        let text = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(RelayError::Remote(format!(
                "Google returned no text (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(GoogleResponse { text, usage })
    }
}

impl Google {
    /// Creates a new Google Gemini client with the specified configuration.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Google API key for authentication
    /// * `model` - Model identifier (defaults to [`DEFAULT_MODEL`])
    /// * `base_url` - Endpoint root (defaults to [`DEFAULT_BASE_URL`])
    /// * `max_tokens` - Maximum tokens in response
    /// * `temperature` - Sampling temperature between 0.0 and 1.0
    /// * `timeout_seconds` - Request timeout in seconds
    /// * `top_p` - Top-p sampling parameter
    /// * `top_k` - Top-k sampling parameter
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api_key: impl Into<String>,
        model: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
        timeout_seconds: Option<u64>,
        top_p: Option<f32>,
        top_k: Option<u32>,
    ) -> Result<Self, RelayError> {
        let mut builder = Client::builder();
        if let Some(sec) = timeout_seconds {
            builder = builder.timeout(Duration::from_secs(sec));
        }
        let client = builder
            .build()
            .map_err(|e| RelayError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            max_tokens,
            temperature,
            timeout_seconds,
            top_p,
            top_k,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{base}/models/{model}:generateContent",
            base = self.base_url,
            model = self.model
        )
    }

    fn build_request<'a>(&self, messages: &'a [ChatMessage]) -> GoogleChatRequest<'a> {
        let contents = messages
            .iter()
            .map(|msg| {
                let mut parts = Vec::with_capacity(2);
                if let MessageType::Image((mime, bytes)) = &msg.message_type {
                    parts.push(GoogleContentPart::InlineData {
                        inline_data: GoogleInlineData {
                            mime_type: mime.mime_type(),
                            data: STANDARD.encode(bytes),
                        },
                    });
                }
                // An uncaptioned image is sent on its own
                if !(msg.is_image() && msg.content.is_empty()) {
                    parts.push(GoogleContentPart::Text { text: &msg.content });
                }
                GoogleChatContent {
                    role: msg.role.wire_name(),
                    parts,
                }
            })
            .collect();

        // Remove generation_config if empty to avoid validation errors
        let generation_config = if self.max_tokens.is_none()
            && self.temperature.is_none()
            && self.top_p.is_none()
            && self.top_k.is_none()
        {
            None
        } else {
            Some(GoogleGenerationConfig {
                max_output_tokens: self.max_tokens,
                temperature: self.temperature,
                top_p: self.top_p,
                top_k: self.top_k,
            })
        };

        GoogleChatRequest {
            contents,
            generation_config,
        }
    }
}

#[async_trait]
impl ChatProvider for Google {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<Box<dyn ChatResponse>, RelayError> {
        if self.api_key.is_empty() {
            return Err(RelayError::Configuration(
                "Missing Google API key".to_string(),
            ));
        }

        let req_body = self.build_request(messages);
        if log::log_enabled!(log::Level::Trace) {
            if let Ok(json) = serde_json::to_string(&req_body) {
                log::trace!("Google request payload: {}", json);
            }
        }

        let resp = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, &self.api_key)
            .json(&req_body)
            .send()
            .await?;

        let status = resp.status();
        log::debug!("Google HTTP status: {}", status);
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::Remote(format!(
                "Google API returned {}: {}",
                status, body
            )));
        }

        let body = resp.text().await?;
        let json_resp: GoogleChatResponse = serde_json::from_str(&body)?;
        Ok(Box::new(json_resp.into_response()?))
    }
}
