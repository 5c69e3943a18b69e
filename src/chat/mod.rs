use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Usage metadata for a chat response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Number of tokens in the prompt
    pub prompt_tokens: u32,
    /// Number of tokens in the completion
    pub completion_tokens: u32,
    /// Total number of tokens used
    pub total_tokens: u32,
}

/// Role of a participant in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    /// The fixed instruction prompt that opens every session
    System,
    /// The user/human participant in the conversation
    User,
    /// The remote model
    Model,
}

impl ChatRole {
    /// Role name used on the wire. Gemini only knows `user` and `model`, so the
    /// instruction prompt travels as a user turn.
    pub fn wire_name(&self) -> &'static str {
        match self {
            ChatRole::System | ChatRole::User => "user",
            ChatRole::Model => "model",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatRole::System => write!(f, "system"),
            ChatRole::User => write!(f, "user"),
            ChatRole::Model => write!(f, "model"),
        }
    }
}

/// The supported MIME type of an uploaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMime {
    /// JPEG image
    JPEG,
    /// PNG image
    PNG,
}

impl ImageMime {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageMime::JPEG => "image/jpeg",
            ImageMime::PNG => "image/png",
        }
    }

    /// Detects the MIME type of an image from its leading bytes.
    ///
    /// Only the two accepted upload formats are recognized; anything else,
    /// including an empty payload, yields `None`.
    pub fn detect(data: &[u8]) -> Option<ImageMime> {
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageMime::JPEG)
        } else if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(ImageMime::PNG)
        } else {
            None
        }
    }
}

/// The type of a message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MessageType {
    /// A text message
    #[default]
    Text,
    /// An image message, with the caption (if any) carried in `content`
    Image((ImageMime, Vec<u8>)),
}

/// A single turn in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// The role of who sent this message
    pub role: ChatRole,
    /// The type of the message (text or image)
    pub message_type: MessageType,
    /// The text content of the message, or the image caption
    pub content: String,
}

impl ChatMessage {
    /// Create a new builder for the instruction turn
    pub fn system() -> ChatMessageBuilder {
        ChatMessageBuilder::new(ChatRole::System)
    }

    /// Create a new builder for a user message
    pub fn user() -> ChatMessageBuilder {
        ChatMessageBuilder::new(ChatRole::User)
    }

    /// Create a new builder for a model reply
    pub fn model() -> ChatMessageBuilder {
        ChatMessageBuilder::new(ChatRole::Model)
    }

    pub fn is_image(&self) -> bool {
        matches!(self.message_type, MessageType::Image(_))
    }
}

/// Builder for ChatMessage
#[derive(Debug)]
pub struct ChatMessageBuilder {
    role: ChatRole,
    message_type: MessageType,
    content: String,
}

impl ChatMessageBuilder {
    /// Create a new ChatMessageBuilder with specified role
    pub fn new(role: ChatRole) -> Self {
        Self {
            role,
            message_type: MessageType::default(),
            content: String::new(),
        }
    }

    /// Set the message content
    pub fn content<S: Into<String>>(mut self, content: S) -> Self {
        self.content = content.into();
        self
    }

    /// Set the message type as Image
    pub fn image(mut self, image_mime: ImageMime, raw_bytes: Vec<u8>) -> Self {
        self.message_type = MessageType::Image((image_mime, raw_bytes));
        self
    }

    /// Build the ChatMessage
    pub fn build(self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            message_type: self.message_type,
            content: self.content,
        }
    }
}

pub trait ChatResponse: std::fmt::Debug + std::fmt::Display + Send {
    fn text(&self) -> Option<String>;
    fn usage(&self) -> Option<Usage> {
        None
    }
}

/// Trait for providers that support chat-style interactions.
#[async_trait]
pub trait ChatProvider: Sync + Send {
    /// Sends a chat request to the provider with a sequence of messages.
    ///
    /// # Arguments
    ///
    /// * `messages` - The conversation history as a slice of chat messages
    ///
    /// # Returns
    ///
    /// The provider's response or an error
    async fn chat(&self, messages: &[ChatMessage]) -> Result<Box<dyn ChatResponse>, RelayError>;
}
