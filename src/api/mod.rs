//! HTTP server exposing the chat page and a small JSON endpoint.
//!
//! Each visitor is identified by a session cookie. The page is re-rendered on
//! every request from the visitor's session, so reloading shows the whole
//! conversation.

mod handlers;
mod types;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::{error::RelayError, store::SessionStore};
use handlers::{handle_api_chat, handle_chat, handle_health, handle_image, handle_index};

pub use types::{ChatForm, ChatRequest, ChatResponse, ErrorResponse};

/// Name of the cookie holding the session id
pub const SESSION_COOKIE: &str = "salamatk_session";

/// Largest accepted request body, image uploads included
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Chat server wrapping a session store
pub struct Server {
    store: Arc<SessionStore>,
    /// Title shown on the page
    title: String,
}

/// Internal server state shared between request handlers
#[derive(Clone)]
struct ServerState {
    store: Arc<SessionStore>,
    title: Arc<str>,
}

impl Server {
    /// Creates a new server instance around the given store
    pub fn new(store: SessionStore, title: impl Into<String>) -> Self {
        Self {
            store: Arc::new(store),
            title: title.into(),
        }
    }

    /// Builds the router without binding a socket
    pub fn router(self) -> Router {
        Router::new()
            .route("/", get(handle_index))
            .route("/chat", post(handle_chat))
            .route("/image", post(handle_image))
            .route("/v1/chat", post(handle_api_chat))
            .route("/health", get(handle_health))
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
            .layer(CorsLayer::permissive())
            .with_state(ServerState {
                store: self.store,
                title: self.title.into(),
            })
    }

    /// Starts the server and listens for requests on the specified address
    ///
    /// # Arguments
    /// * `addr` - Address to bind to (e.g. "127.0.0.1:8501")
    pub async fn run(self, addr: &str) -> Result<(), RelayError> {
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::Configuration(format!("Cannot bind {}: {}", addr, e)))?;
        log::info!("listening on http://{}", addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| RelayError::Configuration(e.to_string()))?;

        Ok(())
    }
}
