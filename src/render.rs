//! HTML rendering of the chat page.
//!
//! Visitor input is always escaped. Model replies are Markdown and are turned
//! into HTML, with any raw HTML inside them escaped as plain text. Links are
//! limited to web and mail addresses, and remote images are shown as their
//! alt text only.

use std::fmt::Write as _;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use html_escape::{encode_double_quoted_attribute, encode_text};
use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd};

use crate::chat::{ChatMessage, ChatRole, MessageType};

const STYLE: &str = r#"
body { background-color: white; font-family: sans-serif; margin: 0; }
.main { max-width: 760px; margin: 0 auto; padding: 16px; }
.chat-container { display: flex; flex-direction: column; gap: 10px; margin-bottom: 24px; }
.chat-row { display: flex; width: 100%; }
.chat-row.user { justify-content: flex-end; }
.chat-row.bot { justify-content: flex-start; }
.chat-message { padding: 10px; border-radius: 10px; max-width: 70%; word-wrap: break-word; display: inline-block; background-color: #0077B6; color: white; }
.user-message { text-align: right; white-space: pre-wrap; }
.bot-message { text-align: left; }
.bot-message a { color: #caf0f8; }
.chat-message img { width: 200px; border-radius: 6px; display: block; }
.notice { background: #ffe5e5; color: #8a0000; border-radius: 8px; padding: 10px; margin-bottom: 16px; }
form { display: flex; gap: 8px; margin-bottom: 12px; flex-wrap: wrap; }
input[type=text] { flex: 1; padding: 8px; border-radius: 8px; border: 1px solid #ccc; }
button { background-color: #0077B6; color: white; border-radius: 8px; padding: 8px 16px; border: none; font-size: 16px; font-weight: bold; transition: 0.3s; }
button:hover { background-color: #005f87; }
"#;

/// An error or warning shown above the conversation.
#[derive(Debug, Clone)]
pub struct Notice {
    pub message: String,
}

impl Notice {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Everything the chat page shows for one request.
pub struct Page<'a> {
    pub title: &'a str,
    pub turns: &'a [ChatMessage],
    pub notice: Option<Notice>,
}

/// Converts a model reply from Markdown to HTML.
pub fn render_markdown(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(text, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) if !is_safe_link(&dest_url) => Event::Start(Tag::Link {
            link_type,
            dest_url: CowStr::Borrowed("#"),
            title,
            id,
        }),
        Event::Start(Tag::Image { .. }) => Event::Start(Tag::Emphasis),
        Event::End(TagEnd::Image) => Event::End(TagEnd::Emphasis),
        other => other,
    });

    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Relative links and http(s)/mailto URLs are allowed; any other scheme is not.
fn is_safe_link(url: &str) -> bool {
    let url = url.trim();
    match url.find([':', '/', '?', '#']) {
        Some(i) if url[i..].starts_with(':') => matches!(
            url[..i].to_ascii_lowercase().as_str(),
            "http" | "https" | "mailto"
        ),
        _ => true,
    }
}

fn render_turn(out: &mut String, turn: &ChatMessage) {
    let (row, class) = match turn.role {
        ChatRole::Model => ("bot", "bot-message"),
        ChatRole::User | ChatRole::System => ("user", "user-message"),
    };

    let _ = write!(
        out,
        r#"<div class="chat-row {row}"><div class="chat-message {class}">"#
    );
    match (&turn.message_type, turn.role) {
        (MessageType::Image((mime, bytes)), _) => {
            let _ = write!(
                out,
                r#"<img alt="Uploaded image" src="data:{};base64,{}">"#,
                mime.mime_type(),
                STANDARD.encode(bytes)
            );
            if !turn.content.is_empty() {
                out.push_str(&encode_text(&turn.content));
            }
        }
        (MessageType::Text, ChatRole::Model) => out.push_str(&render_markdown(&turn.content)),
        (MessageType::Text, _) => out.push_str(&encode_text(&turn.content)),
    }
    out.push_str("</div></div>\n");
}

/// Renders the full chat page.
pub fn render_page(page: &Page<'_>) -> String {
    let title = encode_text(page.title);
    let mut out = String::with_capacity(4096);

    let _ = write!(
        out,
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>{STYLE}</style>
</head>
<body>
<div class="main">
<h1>&#x1F9B7; {title}</h1>
"#
    );

    if let Some(notice) = &page.notice {
        let _ = writeln!(
            out,
            r#"<div class="notice" role="alert">{} Please resend your message.</div>"#,
            encode_text(&notice.message)
        );
    }

    out.push_str(r#"<div class="chat-container" id="history">"#);
    out.push('\n');
    for turn in page.turns {
        render_turn(&mut out, turn);
    }
    out.push_str("</div>\n");

    let _ = write!(
        out,
        r#"<form method="post" action="/image" enctype="multipart/form-data">
<label>Upload an image for analysis <input type="file" name="image" accept=".jpg,.jpeg,.png,image/jpeg,image/png" required></label>
<input type="text" name="caption" placeholder="Describe the image (optional)">
<button type="submit">Analyze Image</button>
</form>
<form method="post" action="/chat">
<input type="text" name="message" placeholder="{}" autofocus autocomplete="off">
<button type="submit">Send</button>
</form>
</div>
<script>document.getElementById("history").lastElementChild?.scrollIntoView();</script>
</body>
</html>
"#,
        encode_double_quoted_attribute(&format!("Ask {}...", short_name(page.title)))
    );

    out
}

/// First word of the title, used in the input placeholder.
fn short_name(title: &str) -> &str {
    title
        .split(|c: char| c.is_whitespace() || c == '-')
        .find(|part| !part.is_empty())
        .unwrap_or(title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ImageMime;

    #[test]
    fn markdown_reply_becomes_markup() {
        let html = render_markdown("**Diagnosis**\n\n- gingivitis\n- plaque");
        assert!(html.contains("<strong>Diagnosis</strong>"));
        assert!(html.contains("<li>gingivitis</li>"));
    }

    #[test]
    fn raw_html_in_reply_is_escaped() {
        let html = render_markdown("hello <script>alert(1)</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn script_links_are_neutralized() {
        let html = render_markdown(
            "[book a visit](https://clinic.example/book) or [click](javascript:alert(1)) \
             or [this](JavaScript:void(0))",
        );
        assert!(html.contains(r#"href="https://clinic.example/book""#));
        assert!(!html.to_ascii_lowercase().contains("javascript:"));
        assert_eq!(html.matches(r##"href="#""##).count(), 2);
    }

    #[test]
    fn images_in_reply_are_not_loaded() {
        let html = render_markdown("![x-ray](https://tracker.example/p.png)");
        assert!(!html.contains("<img"));
        assert!(!html.contains("tracker.example"));
        assert!(html.contains("<em>x-ray</em>"));
    }

    #[test]
    fn user_text_is_escaped() {
        let turns = vec![ChatMessage::user().content("<b>pain</b>").build()];
        let html = render_page(&Page {
            title: "Salamatk - ChatBot",
            turns: &turns,
            notice: None,
        });
        assert!(html.contains("&lt;b&gt;pain&lt;/b&gt;"));
        assert!(html.contains(r#"placeholder="Ask Salamatk...""#));
    }

    #[test]
    fn image_turn_is_inlined_with_caption() {
        let turns = vec![ChatMessage::user()
            .content("upper incisor")
            .image(ImageMime::PNG, vec![1, 2, 3])
            .build()];
        let html = render_page(&Page {
            title: "t",
            turns: &turns,
            notice: None,
        });
        assert!(html.contains("data:image/png;base64,AQID"));
        assert!(html.contains("upper incisor"));
    }

    #[test]
    fn notice_asks_to_resend() {
        let html = render_page(&Page {
            title: "t",
            turns: &[],
            notice: Some(Notice::new("Remote Error: 503")),
        });
        assert!(html.contains("Remote Error: 503 Please resend your message."));
    }
}
