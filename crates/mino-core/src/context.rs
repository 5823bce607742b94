// ── Message context ──
//
// Everything a handler needs to respond to one inbound chat message:
// the message itself, the parsed command arguments, and handles to the
// HTTP client, event stream, and mailbox.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, warn};

use mino_api::{
    AminoClient, ChatMessage, ControlFrame, EventName, Message, OutgoingMessage, StreamManager,
};

use crate::error::CoreError;
use crate::mailbox::Mailbox;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// ── Runtime ──────────────────────────────────────────────────────────

/// Shared handles every context is built from.
#[derive(Clone)]
pub struct Runtime {
    client: AminoClient,
    stream: Option<StreamManager>,
    mailbox: Arc<Mailbox>,
    intents: bool,
}

impl Runtime {
    pub fn new(client: AminoClient) -> Self {
        Self {
            client,
            stream: None,
            mailbox: Arc::new(Mailbox::default()),
            intents: false,
        }
    }

    pub fn with_stream(mut self, stream: StreamManager) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn with_mailbox(mut self, mailbox: Arc<Mailbox>) -> Self {
        self.mailbox = mailbox;
        self
    }

    pub fn with_intents(mut self, intents: bool) -> Self {
        self.intents = intents;
        self
    }

    pub fn client(&self) -> &AminoClient {
        &self.client
    }

    pub fn stream(&self) -> Option<&StreamManager> {
        self.stream.as_ref()
    }

    pub fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }

    pub fn intents(&self) -> bool {
        self.intents
    }

    fn require_stream(&self) -> Result<&StreamManager, CoreError> {
        self.stream.as_ref().ok_or_else(|| CoreError::ConnectionFailed {
            reason: "event stream is not running".into(),
        })
    }
}

// ── WaitOutcome ──────────────────────────────────────────────────────

/// Result of [`Context::wait_for_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum WaitOutcome {
    /// The user sent exactly the expected text.
    Found,
    /// The user sent something else.
    NotFound,
    /// Nothing arrived in time.
    Timeout,
}

// ── Context ──────────────────────────────────────────────────────────

/// Handler-facing view of one inbound chat message.
#[derive(Clone)]
pub struct Context {
    runtime: Runtime,
    message: Arc<Message>,
    event: EventName,
    command: Option<String>,
    args: String,
}

impl Context {
    pub fn new(runtime: Runtime, message: Arc<Message>, event: EventName) -> Self {
        Self {
            runtime,
            message,
            event,
            command: None,
            args: String::new(),
        }
    }

    /// Mark this context as a command invocation.
    pub(crate) fn with_command(mut self, command: &str, args: &str) -> Self {
        self.command = Some(command.to_owned());
        self.args = args.to_owned();
        self
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn event(&self) -> EventName {
        self.event
    }

    /// Registered name of the invoked command.
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Text after the command token. Empty for plain messages.
    pub fn args(&self) -> &str {
        &self.args
    }

    pub fn username(&self) -> &str {
        self.message.author_name()
    }

    pub fn user_id(&self) -> &str {
        self.message.author_id()
    }

    pub fn chat_id(&self) -> &str {
        self.message.chat_id()
    }

    pub fn com_id(&self) -> i64 {
        self.message.com_id
    }

    pub fn message_id(&self) -> &str {
        self.message.message_id()
    }

    pub fn content(&self) -> &str {
        self.message.content()
    }

    pub fn client(&self) -> &AminoClient {
        &self.runtime.client
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    fn require_chat(&self) -> Result<&str, CoreError> {
        let chat_id = self.chat_id();
        if chat_id.is_empty() {
            return Err(CoreError::MustRunInContext);
        }
        Ok(chat_id)
    }

    // ── Sending ──────────────────────────────────────────────────────

    /// Send a text message to this chat.
    pub async fn send(&self, content: impl Into<String>) -> Result<ChatMessage, CoreError> {
        self.send_with(OutgoingMessage::text(content), None).await
    }

    /// Send a text message quoting the triggering message.
    pub async fn reply(&self, content: impl Into<String>) -> Result<ChatMessage, CoreError> {
        let message = OutgoingMessage::text(content).reply_to(self.message_id());
        self.send_with(message, None).await
    }

    /// Send any message to this chat. With `delete_after`, the sent
    /// message is deleted in the background once the delay passes.
    pub async fn send_with(
        &self,
        message: OutgoingMessage,
        delete_after: Option<Duration>,
    ) -> Result<ChatMessage, CoreError> {
        let chat_id = self.require_chat()?;
        let sent = self
            .client()
            .send_message(self.com_id(), chat_id, &message)
            .await?;

        if let Some(delay) = delete_after {
            if sent.message_id.is_empty() {
                debug!(chat_id, "sent message has no id, skipping delayed delete");
            } else {
                self.schedule_delete(sent.message_id.clone(), delay);
            }
        }
        Ok(sent)
    }

    fn schedule_delete(&self, message_id: String, delay: Duration) {
        let client = self.client().clone();
        let com_id = self.com_id();
        let chat_id = self.chat_id().to_owned();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = client.delete_message(com_id, &chat_id, &message_id).await {
                warn!(error = %e, chat_id, message_id, "delayed delete failed");
            }
        });
    }

    pub async fn send_sticker(&self, sticker_id: &str) -> Result<ChatMessage, CoreError> {
        self.send_with(OutgoingMessage::sticker(sticker_id), None)
            .await
    }

    pub async fn send_image(&self, image: &[u8]) -> Result<ChatMessage, CoreError> {
        self.send_with(OutgoingMessage::image(image, None), None)
            .await
    }

    pub async fn send_gif(&self, gif: &[u8]) -> Result<ChatMessage, CoreError> {
        self.send_with(OutgoingMessage::image(gif, Some("image/gif")), None)
            .await
    }

    /// Send an AAC voice note.
    pub async fn send_audio(&self, audio: &[u8]) -> Result<ChatMessage, CoreError> {
        self.send_with(OutgoingMessage::audio(audio), None).await
    }

    /// Upload media and return its URL.
    pub async fn upload_media(
        &self,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, CoreError> {
        Ok(self.client().upload_media(bytes, content_type).await?)
    }

    /// Delete a message in this chat.
    pub async fn delete(&self, message_id: &str) -> Result<(), CoreError> {
        let chat_id = self.require_chat()?;
        self.client()
            .delete_message(self.com_id(), chat_id, message_id)
            .await?;
        Ok(())
    }

    // ── Live frames ──────────────────────────────────────────────────

    /// Show the typing indicator until the returned guard is dropped.
    pub async fn typing(&self) -> Result<TypingGuard, CoreError> {
        let chat_id = self.require_chat()?.to_owned();
        let stream = self.runtime.require_stream()?.clone();
        stream
            .send(ControlFrame::TypingStart {
                com_id: self.com_id(),
                chat_id: chat_id.clone(),
            })
            .await?;
        Ok(TypingGuard {
            stream,
            com_id: self.com_id(),
            chat_id,
            started: Instant::now(),
        })
    }

    pub async fn join_voice_chat(&self) -> Result<(), CoreError> {
        let frame = ControlFrame::JoinVoice {
            com_id: self.com_id(),
            chat_id: self.require_chat()?.to_owned(),
        };
        Ok(self.runtime.require_stream()?.send(frame).await?)
    }

    pub async fn leave_voice_chat(&self) -> Result<(), CoreError> {
        let frame = ControlFrame::LeaveVoice {
            com_id: self.com_id(),
            chat_id: self.require_chat()?.to_owned(),
        };
        Ok(self.runtime.require_stream()?.send(frame).await?)
    }

    // ── Waiting ──────────────────────────────────────────────────────

    /// Wait for the author of this message to send `text` in this chat.
    ///
    /// Needs intents, since only then does the dispatcher fill the
    /// mailbox. The slot is consumed on every outcome.
    pub async fn wait_for_message(
        &self,
        text: &str,
        timeout: Duration,
    ) -> Result<WaitOutcome, CoreError> {
        if !self.runtime.intents {
            return Err(CoreError::IntentsNotEnabled);
        }
        let chat_id = self.require_chat()?;
        let user_id = self.user_id();
        let mailbox = &self.runtime.mailbox;
        let deadline = Instant::now() + timeout;

        loop {
            match mailbox.take_compare(chat_id, user_id, text) {
                Some(true) => return Ok(WaitOutcome::Found),
                Some(false) => return Ok(WaitOutcome::NotFound),
                None => {}
            }
            if Instant::now() >= deadline {
                mailbox.evict(chat_id, user_id);
                return Ok(WaitOutcome::Timeout);
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("event", &self.event)
            .field("chat_id", &self.chat_id())
            .field("user_id", &self.user_id())
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

// ── TypingGuard ──────────────────────────────────────────────────────

/// Sends "typing stop" with the elapsed time when dropped.
#[must_use = "typing stops as soon as the guard is dropped"]
pub struct TypingGuard {
    stream: StreamManager,
    com_id: i64,
    chat_id: String,
    started: Instant,
}

impl Drop for TypingGuard {
    fn drop(&mut self) {
        let frame = ControlFrame::TypingStop {
            com_id: self.com_id,
            chat_id: std::mem::take(&mut self.chat_id),
            duration: self.started.elapsed(),
        };
        if let Err(e) = self.stream.try_send(frame) {
            debug!(error = %e, "could not queue typing stop");
        }
    }
}

/// Wrap nicknames in the directional marks the app uses for mentions.
pub fn prepare_mentions<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| format!("\u{200e}\u{200f}@{}\u{202c}\u{202d}", name.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use mino_api::{Generator, KeyMaterial};
    use url::Url;

    use super::*;

    fn runtime(intents: bool) -> Runtime {
        let client = AminoClient::with_client(
            reqwest::Client::new(),
            Url::parse("http://127.0.0.1:1").unwrap(),
            Generator::from_material(&KeyMaterial::builtin()).unwrap(),
        );
        Runtime::new(client).with_intents(intents)
    }

    fn context(runtime: Runtime, chat_id: &str) -> Context {
        let mut message = Message {
            com_id: 7,
            ..Message::default()
        };
        message.message.thread_id = chat_id.into();
        message.message.uid = "user-1".into();
        message.message.message_id = "m-1".into();
        message.message.content = Some("!verify".into());
        Context::new(runtime, Arc::new(message), EventName::TextMessage)
    }

    #[tokio::test(start_paused = true)]
    async fn wait_finds_expected_text() {
        let runtime = runtime(true);
        runtime.mailbox().put("chat-1", "user-1", "$verify");
        let ctx = context(runtime.clone(), "chat-1");

        let started = Instant::now();
        let outcome = ctx
            .wait_for_message("$verify", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Found);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(runtime.mailbox().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_reports_other_text() {
        let runtime = runtime(true);
        runtime.mailbox().put("chat-1", "user-1", "nope");
        let ctx = context(runtime.clone(), "chat-1");

        let outcome = ctx
            .wait_for_message("$verify", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::NotFound);
        assert!(runtime.mailbox().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_picks_up_late_message() {
        let runtime = runtime(true);
        let ctx = context(runtime.clone(), "chat-1");

        let mailbox = Arc::clone(runtime.mailbox());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            mailbox.put("chat-1", "user-1", "$verify");
        });

        let outcome = ctx
            .wait_for_message("$verify", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Found);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out() {
        let ctx = context(runtime(true), "chat-1");
        let started = Instant::now();
        let outcome = ctx
            .wait_for_message("$verify", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(outcome, WaitOutcome::Timeout);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(outcome.to_string(), "timeout");
    }

    #[tokio::test]
    async fn wait_needs_intents() {
        let ctx = context(runtime(false), "chat-1");
        let result = ctx.wait_for_message("$verify", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(CoreError::IntentsNotEnabled)));
    }

    #[tokio::test]
    async fn chat_operations_need_a_chat() {
        let ctx = context(runtime(true), "");
        assert!(matches!(ctx.send("hi").await, Err(CoreError::MustRunInContext)));
        assert!(matches!(ctx.delete("m-1").await, Err(CoreError::MustRunInContext)));
        assert!(matches!(
            ctx.wait_for_message("x", Duration::from_secs(1)).await,
            Err(CoreError::MustRunInContext)
        ));
    }

    #[tokio::test]
    async fn typing_needs_a_stream() {
        let ctx = context(runtime(true), "chat-1");
        assert!(matches!(
            ctx.typing().await,
            Err(CoreError::ConnectionFailed { .. })
        ));
    }

    #[test]
    fn accessors_read_the_message() {
        let ctx = context(runtime(false), "chat-1").with_command("verify", "a b");
        assert_eq!(ctx.chat_id(), "chat-1");
        assert_eq!(ctx.user_id(), "user-1");
        assert_eq!(ctx.com_id(), 7);
        assert_eq!(ctx.command(), Some("verify"));
        assert_eq!(ctx.args(), "a b");
        assert_eq!(ctx.event(), EventName::TextMessage);
    }

    #[test]
    fn mentions_are_wrapped() {
        assert_eq!(
            prepare_mentions(["alice", "bob"]),
            vec![
                "\u{200e}\u{200f}@alice\u{202c}\u{202d}".to_string(),
                "\u{200e}\u{200f}@bob\u{202c}\u{202d}".to_string(),
            ]
        );
    }
}
