use axum::{
    extract::{Multipart, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Form, Json,
};
use uuid::Uuid;

use super::types::{ChatForm, ChatRequest, ChatResponse, ErrorResponse};
use super::{ServerState, SESSION_COOKIE};
use crate::{
    chat::{ChatMessage, ImageMime},
    error::RelayError,
    render::{render_page, Notice, Page},
    session::ChatRelay,
    store::SessionHandle,
};

/// Reads the session id from the `Cookie` header, if any
fn session_cookie(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

fn status_for(err: &RelayError) -> StatusCode {
    match err {
        RelayError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        RelayError::Remote(_) => StatusCode::BAD_GATEWAY,
    }
}

fn page_html(state: &ServerState, turns: &[ChatMessage], notice: Option<Notice>) -> String {
    render_page(&Page {
        title: &state.title,
        turns,
        notice,
    })
}

/// Renders the page for `relay` and attaches the session cookie to new sessions
fn page_response(
    state: &ServerState,
    handle: &SessionHandle,
    relay: &ChatRelay,
    status: StatusCode,
    notice: Option<Notice>,
) -> Response {
    let body = page_html(state, relay.session().displayed_turns(), notice);
    let mut response = (status, Html(body)).into_response();

    if handle.created {
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            SESSION_COOKIE, handle.id
        );
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    response
}

/// 400 page for an unusable upload; the visitor's session, if any, is only read
async fn reject_upload(state: &ServerState, headers: &HeaderMap, notice: Notice) -> Response {
    let body = match state.store.peek(session_cookie(headers)).await {
        Some(relay) => {
            let relay = relay.lock().await;
            page_html(state, relay.session().displayed_turns(), Some(notice))
        }
        None => page_html(state, &[], Some(notice)),
    };
    (StatusCode::BAD_REQUEST, Html(body)).into_response()
}

/// Status and notice for the outcome of a relay call
fn outcome<T>(result: Result<T, RelayError>) -> (StatusCode, Option<Notice>) {
    match result {
        Ok(_) => (StatusCode::OK, None),
        Err(e) => {
            log::warn!("relay failed: {}", e);
            (status_for(&e), Some(Notice::new(e.to_string())))
        }
    }
}

/// Serves the chat page, opening and initializing a session when needed
pub async fn handle_index(State(state): State<ServerState>, headers: HeaderMap) -> Response {
    let handle = state.store.checkout(session_cookie(&headers)).await;
    let mut relay = handle.relay.lock().await;

    let (status, notice) = outcome(relay.initialize().await);
    page_response(&state, &handle, &relay, status, notice)
}

/// Relays a text message posted from the page
pub async fn handle_chat(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Form(form): Form<ChatForm>,
) -> Response {
    let handle = state.store.checkout(session_cookie(&headers)).await;
    let mut relay = handle.relay.lock().await;

    let message = form.message.trim();
    let (status, notice) = if message.is_empty() {
        outcome(relay.initialize().await)
    } else {
        log::debug!("session {}: text message ({} bytes)", handle.id, message.len());
        outcome(relay.send_text(message).await)
    };
    page_response(&state, &handle, &relay, status, notice)
}

/// Relays an uploaded image and its optional caption
///
/// Only JPEG and PNG payloads are accepted; anything else is rejected before
/// the session is touched.
pub async fn handle_image(
    State(state): State<ServerState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mut image: Option<Vec<u8>> = None;
    let mut caption: Option<String> = None;
    let mut read_error = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => match field.name().map(str::to_owned).as_deref() {
                Some("image") => match field.bytes().await {
                    Ok(bytes) => image = Some(bytes.to_vec()),
                    Err(e) => {
                        read_error = Some(e.body_text());
                        break;
                    }
                },
                Some("caption") => match field.text().await {
                    Ok(text) => caption = Some(text.trim().to_string()),
                    Err(e) => {
                        read_error = Some(e.body_text());
                        break;
                    }
                },
                _ => {}
            },
            Ok(None) => break,
            Err(e) => {
                read_error = Some(e.body_text());
                break;
            }
        }
    }

    if let Some(e) = read_error {
        log::warn!("unreadable upload: {}", e);
        let notice = Notice::new(format!("The upload could not be read ({}).", e));
        return reject_upload(&state, &headers, notice).await;
    }

    let image = image.unwrap_or_default();
    let Some(mime) = ImageMime::detect(&image) else {
        let notice = Notice::new("Only JPG and PNG images are accepted.");
        return reject_upload(&state, &headers, notice).await;
    };

    let handle = state.store.checkout(session_cookie(&headers)).await;
    let mut relay = handle.relay.lock().await;

    log::debug!(
        "session {}: {} upload ({} bytes)",
        handle.id,
        mime.mime_type(),
        image.len()
    );
    let caption = caption.filter(|c| !c.is_empty());
    let (status, notice) = outcome(relay.send_image(mime, image, caption.as_deref()).await);
    page_response(&state, &handle, &relay, status, notice)
}

/// JSON counterpart of the text form
pub async fn handle_api_chat(
    State(state): State<ServerState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<ErrorResponse>)> {
    if req.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Empty message".to_string(),
            }),
        ));
    }

    let handle = state.store.checkout(req.session_id).await;
    let mut relay = handle.relay.lock().await;

    let reply = relay.send_text(&req.message).await.map_err(|e| {
        log::warn!("session {}: {}", handle.id, e);
        (
            status_for(&e),
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })?;

    Ok(Json(ChatResponse {
        session_id: handle.id,
        reply,
    }))
}

pub async fn handle_health(State(state): State<ServerState>) -> &'static str {
    log::debug!("health check: {} live session(s)", state.store.len().await);
    "ok"
}
