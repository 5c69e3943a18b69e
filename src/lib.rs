//! Salamatk is a small web chat that relays visitor messages and photos to
//! Google Gemini and shows the replies.
//!
//! # Overview
//! Every visitor gets a session holding an ordered log of turns. The first
//! turn is a fixed instruction prompt, sent once; each later text message or
//! image upload is forwarded to the model together with the conversation so
//! far, and the reply is appended and rendered.
//!
//! # Architecture
//! - [`chat`]: turn types and the [`chat::ChatProvider`] seam
//! - [`backends::google`]: the Gemini `generateContent` client
//! - [`session`]: the per-visitor [`session::ChatRelay`]
//! - [`store`]: session id to relay map with idle expiry
//! - [`api`]: axum routes serving the page and a JSON endpoint

// Re-export for convenience
pub use async_trait::async_trait;

/// Backend implementations for supported model providers
pub mod backends;

/// Builder pattern for configuring the model client
pub mod builder;

/// Chat turns and the provider trait
pub mod chat;

/// Command line and environment configuration
pub mod config;

/// Error types and handling
pub mod error;

/// Session turn log and relay
pub mod session;

/// Live sessions keyed by id
pub mod store;

/// HTML rendering of the chat page
pub mod render;

/// HTTP server
pub mod api;

#[inline]
/// Initialize logging using env_logger if the "logging" feature is enabled.
/// This is a no-op if the feature is not enabled.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or("salamatk=info"),
        )
        .try_init();
    }
}
