//! Process configuration, read from the command line and the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::{
    backends::google::{Google, DEFAULT_MODEL},
    builder::LLMBuilder,
    error::RelayError,
};

/// Instruction prompt used when neither `--prompt` nor `--prompt-file` is given.
pub const DEFAULT_INSTRUCTION: &str = include_str!("instruction.txt");

/// Page title used when none is configured.
pub const DEFAULT_TITLE: &str = "Salamatk - ChatBot";

/// Settings for the chat relay server
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "salamatk",
    about = "Web chat that relays text and images to Google Gemini"
)]
pub struct Config {
    /// Google API key
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Gemini model name
    #[arg(long, env = "SALAMATK_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Override for the Gemini endpoint root
    #[arg(long, env = "GEMINI_BASE_URL")]
    pub base_url: Option<String>,

    /// Address to listen on
    #[arg(long, env = "SALAMATK_ADDR", default_value = "127.0.0.1:8501")]
    pub addr: String,

    /// Title shown on the chat page
    #[arg(long, env = "SALAMATK_TITLE", default_value = DEFAULT_TITLE)]
    pub title: String,

    /// Instruction prompt text
    #[arg(long, env = "SALAMATK_PROMPT", conflicts_with = "prompt_file")]
    pub prompt: Option<String>,

    /// File holding the instruction prompt
    #[arg(long, env = "SALAMATK_PROMPT_FILE")]
    pub prompt_file: Option<PathBuf>,

    /// Seconds of inactivity before a session is dropped
    #[arg(long, env = "SALAMATK_SESSION_TTL", default_value_t = 3600)]
    pub session_ttl: u64,

    /// Timeout for calls to the model, in seconds
    #[arg(long, env = "SALAMATK_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Maximum tokens in a reply
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f32>,
}

impl Config {
    /// Resolves the instruction prompt: inline text, then file, then the
    /// built-in dental assistant prompt.
    pub fn instruction(&self) -> Result<String, RelayError> {
        if let Some(prompt) = &self.prompt {
            return non_empty(prompt.clone(), "SALAMATK_PROMPT");
        }
        if let Some(path) = &self.prompt_file {
            let text = std::fs::read_to_string(path).map_err(|e| {
                RelayError::Configuration(format!(
                    "Cannot read prompt file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            return non_empty(text, "prompt file");
        }
        Ok(DEFAULT_INSTRUCTION.to_string())
    }

    /// Builds the Gemini client from the configured options.
    pub fn build_provider(&self) -> Result<Google, RelayError> {
        let mut builder = LLMBuilder::new().model(&self.model);
        if let Some(key) = &self.api_key {
            builder = builder.api_key(key);
        }
        if let Some(url) = &self.base_url {
            builder = builder.base_url(url);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout_seconds(timeout);
        }
        if let Some(max_tokens) = self.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }
        if let Some(temperature) = self.temperature {
            builder = builder.temperature(temperature);
        }
        builder.build()
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, RelayError> {
        self.addr.parse().map_err(|e| {
            RelayError::Configuration(format!("Invalid listen address {}: {}", self.addr, e))
        })
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl)
    }
}

fn non_empty(text: String, source: &str) -> Result<String, RelayError> {
    if text.trim().is_empty() {
        Err(RelayError::Configuration(format!("{} is empty", source)))
    } else {
        Ok(text)
    }
}
