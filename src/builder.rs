//! Builder for configuring the Gemini backend.
//!
//! Provides a fluent interface over the handful of options the relay exposes,
//! and validates the credential before any request is made.

use crate::{backends::google::Google, error::RelayError};

/// Builder for configuring and instantiating the Gemini client.
#[derive(Debug, Default)]
pub struct LLMBuilder {
    /// API key for authentication with the provider
    api_key: Option<String>,
    /// Base URL for API requests (proxies, tests)
    base_url: Option<String>,
    /// Model identifier/name to use
    model: Option<String>,
    /// Maximum tokens to generate in responses
    max_tokens: Option<u32>,
    /// Temperature parameter for controlling response randomness (0.0-1.0)
    temperature: Option<f32>,
    /// Request timeout duration in seconds
    timeout_seconds: Option<u64>,
    /// Top-p (nucleus) sampling parameter
    top_p: Option<f32>,
    /// Top-k sampling parameter
    top_k: Option<u32>,
}

impl LLMBuilder {
    /// Creates a new empty builder instance with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key for authentication.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL for API requests.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the model identifier to use.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the maximum number of tokens to generate.
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Sets the temperature for controlling response randomness (0.0-1.0).
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the request timeout in seconds.
    pub fn timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    /// Sets the top-p (nucleus) sampling parameter.
    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Sets the top-k sampling parameter.
    pub fn top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Builds the Gemini client.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Configuration` if the API key is missing or blank,
    /// or if the temperature is outside `0.0..=2.0`.
    pub fn build(self) -> Result<Google, RelayError> {
        let api_key = self
            .api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                RelayError::Configuration("No API key provided for Google".to_string())
            })?;

        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(RelayError::Configuration(format!(
                    "Temperature {} is out of range",
                    t
                )));
            }
        }

        Google::new(
            api_key,
            self.model,
            self.base_url,
            self.max_tokens,
            self.temperature,
            self.timeout_seconds,
            self.top_p,
            self.top_k,
        )
    }
}
