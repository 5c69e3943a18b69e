use std::fmt;

/// Error types that can occur while relaying a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Missing or invalid credential, prompt or server setting
    Configuration(String),
    /// Network failure or non-success response from the model endpoint
    Remote(String),
}

impl RelayError {
    /// Whether this error came from the model endpoint.
    pub fn is_remote(&self) -> bool {
        matches!(self, RelayError::Remote(_))
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Configuration(e) => write!(f, "Configuration Error: {}", e),
            RelayError::Remote(e) => write!(f, "Remote Error: {}", e),
        }
    }
}

impl std::error::Error for RelayError {}

/// Converts reqwest HTTP errors into RelayErrors
///
/// The request URL is stripped; these messages end up in front of visitors.
impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Remote(err.without_url().to_string())
    }
}

/// Converts malformed provider payloads into RelayErrors
impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Remote(format!("JSON Parse Error: {}", err))
    }
}
