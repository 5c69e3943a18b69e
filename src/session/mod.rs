//! Per-visitor conversation state and the relay that drives it.
//!
//! A [`Session`] is an append-only log of turns. The first turn is always the
//! instruction prompt; after it, user turns and model replies follow in the
//! order they happened. A [`ChatRelay`] owns one session and forwards each new
//! user turn, together with the conversation so far, to a [`ChatProvider`].

use std::sync::Arc;

use crate::{
    chat::{ChatMessage, ChatProvider, ChatRole, ImageMime},
    error::RelayError,
};

/// Ordered turn log of one conversation.
#[derive(Debug, Clone, Default)]
pub struct Session {
    turns: Vec<ChatMessage>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// All turns, instruction included, oldest first.
    pub fn turns(&self) -> &[ChatMessage] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Whether the instruction turn has been recorded.
    pub fn is_initialized(&self) -> bool {
        self.turns
            .first()
            .is_some_and(|turn| turn.role == ChatRole::System)
    }

    /// Turns shown to the visitor: everything after the instruction prompt and
    /// the model's acknowledgement of it.
    pub fn displayed_turns(&self) -> &[ChatMessage] {
        let mut start = 0;
        if self.is_initialized() {
            start = 1;
            if self
                .turns
                .get(1)
                .is_some_and(|turn| turn.role == ChatRole::Model)
            {
                start = 2;
            }
        }
        &self.turns[start..]
    }

    /// Conversation to send to the model.
    ///
    /// User turns that never got a reply are left out, except the newest one,
    /// which is the turn being asked about. The instruction is always kept.
    pub fn request_history(&self) -> Vec<ChatMessage> {
        let last = self.turns.len().saturating_sub(1);
        self.turns
            .iter()
            .enumerate()
            .filter(|(i, turn)| match turn.role {
                ChatRole::System | ChatRole::Model => true,
                ChatRole::User => {
                    *i == last
                        || self
                            .turns
                            .get(i + 1)
                            .is_some_and(|next| next.role == ChatRole::Model)
                }
            })
            .map(|(_, turn)| turn.clone())
            .collect()
    }

    fn push(&mut self, turn: ChatMessage) {
        self.turns.push(turn);
    }
}

/// Relays one visitor's conversation to the remote model.
pub struct ChatRelay {
    provider: Arc<dyn ChatProvider>,
    instruction: Arc<str>,
    session: Session,
}

impl ChatRelay {
    /// Creates a relay with an empty session.
    ///
    /// # Arguments
    ///
    /// * `provider` - Remote model shared by all sessions
    /// * `instruction` - Prompt sent as the first turn of the session
    pub fn new(provider: Arc<dyn ChatProvider>, instruction: impl Into<Arc<str>>) -> Self {
        Self {
            provider,
            instruction: instruction.into(),
            session: Session::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Sends the instruction prompt once per session.
    ///
    /// The model's acknowledgement is recorded but never displayed. Calling
    /// this again after the instruction turn exists does nothing, even if the
    /// first attempt failed to get an acknowledgement.
    pub async fn initialize(&mut self) -> Result<(), RelayError> {
        if self.session.is_initialized() {
            return Ok(());
        }

        self.session
            .push(ChatMessage::system().content(&*self.instruction).build());
        log::debug!("sending instruction prompt ({} bytes)", self.instruction.len());
        let reply = self.forward().await?;
        log::debug!("instruction acknowledged ({} bytes)", reply.len());
        Ok(())
    }

    /// Sends a text message and returns the model's reply.
    ///
    /// # Errors
    ///
    /// `RelayError::Remote` if the call fails; the user turn stays in the
    /// session without a reply. When the instruction itself cannot be sent,
    /// the user turn is still recorded but not forwarded.
    pub async fn send_text(&mut self, input: &str) -> Result<String, RelayError> {
        let initialized = self.initialize().await;
        self.session.push(ChatMessage::user().content(input).build());
        initialized?;
        self.forward().await
    }

    /// Sends an image, with an optional caption, and returns the model's reply.
    ///
    /// Image and caption form a single user turn.
    pub async fn send_image(
        &mut self,
        mime: ImageMime,
        image: Vec<u8>,
        caption: Option<&str>,
    ) -> Result<String, RelayError> {
        let initialized = self.initialize().await;
        let turn = ChatMessage::user()
            .content(caption.unwrap_or_default())
            .image(mime, image)
            .build();
        self.session.push(turn);
        initialized?;
        self.forward().await
    }

    /// Sends the conversation and appends the reply on success.
    async fn forward(&mut self) -> Result<String, RelayError> {
        let history = self.session.request_history();
        let response = self.provider.chat(&history).await.inspect_err(|e| {
            log::warn!("remote call failed after {} turns: {}", history.len(), e);
        })?;

        if let Some(usage) = response.usage() {
            log::debug!(
                "tokens: prompt={} completion={} total={}",
                usage.prompt_tokens,
                usage.completion_tokens,
                usage.total_tokens
            );
        }

        let text = response
            .text()
            .filter(|text| !text.is_empty())
            .ok_or_else(|| RelayError::Remote("Model returned an empty reply".to_string()))?;
        self.session.push(ChatMessage::model().content(text.clone()).build());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatResponse, MessageType};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::fmt;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Reply(String);

    impl fmt::Display for Reply {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl ChatResponse for Reply {
        fn text(&self) -> Option<String> {
            Some(self.0.clone())
        }
    }

    /// Answers from a script and records every request it sees.
    #[derive(Default)]
    struct Scripted {
        script: Mutex<VecDeque<Result<String, RelayError>>>,
        requests: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl Scripted {
        fn new(script: Vec<Result<&str, RelayError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into_iter().map(|r| r.map(String::from)).collect()),
                requests: Mutex::default(),
            })
        }

        fn requests(&self) -> Vec<Vec<ChatMessage>> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatProvider for Scripted {
        async fn chat(
            &self,
            messages: &[ChatMessage],
        ) -> Result<Box<dyn ChatResponse>, RelayError> {
            self.requests.lock().unwrap().push(messages.to_vec());
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("default reply".to_string()));
            next.map(|text| Box::new(Reply(text)) as Box<dyn ChatResponse>)
        }
    }

    fn roles(session: &Session) -> Vec<ChatRole> {
        session.turns().iter().map(|t| t.role).collect()
    }

    #[tokio::test]
    async fn instruction_is_first_and_sent_once() {
        let provider = Scripted::new(vec![]);
        let mut relay = ChatRelay::new(provider.clone(), "You are a dental assistant.");

        relay.initialize().await.unwrap();
        relay.initialize().await.unwrap();
        relay.send_text("my tooth hurts").await.unwrap();
        relay.send_text("since yesterday").await.unwrap();
        relay.initialize().await.unwrap();

        let session = relay.session();
        assert_eq!(session.turns()[0].role, ChatRole::System);
        assert_eq!(session.turns()[0].content, "You are a dental assistant.");
        let instruction_turns = session
            .turns()
            .iter()
            .filter(|t| t.role == ChatRole::System)
            .count();
        assert_eq!(instruction_turns, 1);
        // initialize + two messages
        assert_eq!(provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn each_user_turn_gets_one_reply_in_order() {
        let provider = Scripted::new(vec![Ok("ack"), Ok("one"), Ok("two"), Ok("three")]);
        let mut relay = ChatRelay::new(provider, "rules");

        for input in ["a", "b", "c"] {
            relay.send_text(input).await.unwrap();
        }

        let shown: Vec<(ChatRole, &str)> = relay
            .session()
            .displayed_turns()
            .iter()
            .map(|t| (t.role, t.content.as_str()))
            .collect();
        assert_eq!(
            shown,
            vec![
                (ChatRole::User, "a"),
                (ChatRole::Model, "one"),
                (ChatRole::User, "b"),
                (ChatRole::Model, "two"),
                (ChatRole::User, "c"),
                (ChatRole::Model, "three"),
            ]
        );
    }

    #[tokio::test]
    async fn uncaptioned_image_is_one_turn_with_one_reply() {
        let provider = Scripted::new(vec![Ok("ack"), Ok("looks like gingivitis")]);
        let mut relay = ChatRelay::new(provider.clone(), "rules");

        let reply = relay
            .send_image(ImageMime::JPEG, vec![0xFF, 0xD8, 0xFF], None)
            .await
            .unwrap();

        assert_eq!(reply, "looks like gingivitis");
        let shown = relay.session().displayed_turns();
        assert_eq!(shown.len(), 2);
        assert!(matches!(
            shown[0].message_type,
            MessageType::Image((ImageMime::JPEG, _))
        ));
        assert!(shown[0].content.is_empty());
        assert_eq!(shown[1].role, ChatRole::Model);
    }

    #[tokio::test]
    async fn remote_failure_keeps_input_without_reply() {
        let provider = Scripted::new(vec![
            Ok("ack"),
            Err(RelayError::Remote("503".to_string())),
            Ok("second answer"),
        ]);
        let mut relay = ChatRelay::new(provider.clone(), "rules");
        relay.initialize().await.unwrap();

        let err = relay.send_text("first").await.unwrap_err();
        assert!(err.is_remote());
        assert_eq!(
            roles(relay.session()),
            vec![ChatRole::System, ChatRole::Model, ChatRole::User]
        );
        // exactly one attempt for the failed turn
        assert_eq!(provider.requests().len(), 2);

        relay.send_text("second").await.unwrap();
        let last_request = provider.requests().pop().unwrap();
        let sent: Vec<&str> = last_request.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(sent, vec!["rules", "ack", "second"]);
        assert_eq!(relay.session().len(), 5);
    }

    #[tokio::test]
    async fn failed_instruction_is_not_resent() {
        let provider = Scripted::new(vec![
            Err(RelayError::Remote("timeout".to_string())),
            Ok("answer"),
        ]);
        let mut relay = ChatRelay::new(provider.clone(), "rules");

        assert!(relay.initialize().await.is_err());
        relay.send_text("hello").await.unwrap();

        assert_eq!(
            roles(relay.session()),
            vec![ChatRole::System, ChatRole::User, ChatRole::Model]
        );
        assert_eq!(relay.session().displayed_turns().len(), 2);
        let sent = provider.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1][0].role, ChatRole::System);
    }

    #[tokio::test]
    async fn input_survives_failed_instruction_send() {
        let provider = Scripted::new(vec![
            Err(RelayError::Remote("503".to_string())),
            Ok("answer"),
        ]);
        let mut relay = ChatRelay::new(provider.clone(), "rules");

        let err = relay.send_text("my tooth hurts").await.unwrap_err();
        assert!(err.is_remote());
        assert_eq!(
            roles(relay.session()),
            vec![ChatRole::System, ChatRole::User]
        );
        let shown = relay.session().displayed_turns();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].content, "my tooth hurts");
        // only the instruction was attempted
        assert_eq!(provider.requests().len(), 1);

        relay.send_text("still hurts").await.unwrap();
        let requests = provider.requests();
        let sent: Vec<&str> = requests[1]
            .iter()
            .map(|t| t.content.as_str())
            .collect();
        assert_eq!(sent, vec!["rules", "still hurts"]);
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn image_survives_failed_instruction_send() {
        let provider = Scripted::new(vec![Err(RelayError::Remote("timeout".to_string()))]);
        let mut relay = ChatRelay::new(provider.clone(), "rules");

        assert!(relay
            .send_image(ImageMime::PNG, vec![0x89, b'P'], Some("left molar"))
            .await
            .is_err());
        let shown = relay.session().displayed_turns();
        assert_eq!(shown.len(), 1);
        assert!(shown[0].is_image());
        assert_eq!(shown[0].content, "left molar");
        assert_eq!(provider.requests().len(), 1);
    }

    #[test]
    fn empty_session_displays_nothing() {
        let session = Session::new();
        assert!(session.is_empty());
        assert!(!session.is_initialized());
        assert!(session.displayed_turns().is_empty());
        assert!(session.request_history().is_empty());
    }
}
