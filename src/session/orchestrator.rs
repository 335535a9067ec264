use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{error, warn};
use tokio::sync::Mutex as TurnGate;

use crate::capability::{Capability, TempArtifact};
use crate::store::ConversationStore;

use super::message::{Message, Role, Turn};
use super::transcript::Transcript;

/// Fixed opening message shown when a session starts without prior history.
/// Never written back to the store.
pub const GREETING: &str = "Hello! I'm INVADUCTAR GPT, your specialized assistant for invasive ductal carcinoma information. I can help you understand breast cancer diagnosis, treatment options, and provide support. How can I assist you today?";

/// Fixed user-facing wording for a failed text turn. Raw diagnostics are
/// logged, never shown.
const CHAT_FALLBACK: &str =
    "I'm sorry, I'm having trouble connecting to the medical AI system. Please try again later.";

/// Fixed user-facing wording for a failed image turn.
const IMAGE_FALLBACK: &str = "❌ I'm sorry, I couldn't analyze the image. Please ensure it's a valid medical image and try again.";

/// A turn that was rejected before any capability invocation.
/// Rejected turns never touch the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TurnRejected {
    #[error("Message cannot be empty.")]
    EmptyMessage,
    #[error("No image file provided")]
    EmptyImage,
}

/// Which capability a failed turn belonged to. The distinction only
/// matters for wording; both paths end in an appended fallback message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnFailure {
    Chat,
    Image,
}

impl TurnFailure {
    fn label(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Image => "image",
        }
    }

    /// Transcript wording for the paired fallback Assistant message.
    pub fn fallback_text(self) -> &'static str {
        match self {
            Self::Chat => CHAT_FALLBACK,
            Self::Image => IMAGE_FALLBACK,
        }
    }

    /// Generic wording for the HTTP error payload.
    pub fn public_error_text(self) -> &'static str {
        match self {
            Self::Chat => "Failed to process your request",
            Self::Image => "Failed to analyze the image",
        }
    }
}

/// Outcome of an accepted turn. The transcript has already advanced by
/// exactly two messages when this is returned; `failure` tells the caller
/// whether the Assistant half is real output or the fixed fallback.
#[derive(Debug)]
pub struct TurnReceipt {
    pub user: Message,
    pub assistant: Message,
    pub failure: Option<TurnFailure>,
}

/// The conversation session and request-orchestration core.
///
/// `ChatSession` owns the live transcript, dispatches each turn to the
/// matching capability, normalizes the result into a paired User and
/// Assistant entry, and keeps the store loosely in sync. One instance per
/// conversation; handlers share it behind an `Arc`.
pub struct ChatSession {
    transcript: Mutex<Transcript>,
    /// Serializes turns: a second `submit_turn` queues (FIFO) behind the
    /// one currently invoking a capability, so replies can never be
    /// attributed to the wrong user message.
    turn_gate: TurnGate<()>,
    chat: Box<dyn Capability>,
    image: Box<dyn Capability>,
    store: ConversationStore,
    uploads_dir: PathBuf,
}

impl ChatSession {
    /// Rehydrates the transcript from the store. An empty or unreadable
    /// store yields a session with exactly one synthetic greeting; any
    /// recovered history suppresses the greeting.
    pub fn new(
        store: ConversationStore,
        chat: Box<dyn Capability>,
        image: Box<dyn Capability>,
        uploads_dir: PathBuf,
    ) -> Self {
        let history = store.load();
        let mut transcript = Transcript::new();
        if history.is_empty() {
            transcript.push_greeting(GREETING);
        } else {
            for stored in history {
                transcript.push(stored.role, stored.content);
            }
        }

        Self {
            transcript: Mutex::new(transcript),
            turn_gate: TurnGate::new(()),
            chat,
            image,
            store,
            uploads_dir,
        }
    }

    /// Applies one user turn: optimistic User append, capability
    /// invocation, Assistant append (real reply or fixed fallback).
    ///
    /// A failed invocation still advances the transcript by two messages;
    /// a turn is never left half-applied.
    pub async fn submit_turn(&self, turn: Turn) -> Result<TurnReceipt, TurnRejected> {
        let turn = match turn {
            Turn::Text(text) => {
                let trimmed = text.trim().to_string();
                if trimmed.is_empty() {
                    return Err(TurnRejected::EmptyMessage);
                }
                Turn::Text(trimmed)
            }
            Turn::Image { bytes, file_name } => {
                if bytes.is_empty() {
                    return Err(TurnRejected::EmptyImage);
                }
                Turn::Image { bytes, file_name }
            }
        };

        let _gate = self.turn_gate.lock().await;

        let user = match &turn {
            Turn::Text(text) => self.append(Role::User, text.clone()),
            Turn::Image { file_name, .. } => {
                self.append(Role::User, format!("📸 Uploaded image: {file_name}"))
            }
        };

        let (assistant, failure) = match self.invoke(&turn).await {
            Ok(text) => (self.append(Role::Assistant, text), None),
            Err((kind, diagnostic)) => {
                error!("{} turn failed: {diagnostic}", kind.label());
                (self.append(Role::Assistant, kind.fallback_text()), Some(kind))
            }
        };

        self.persist();

        Ok(TurnReceipt {
            user,
            assistant,
            failure,
        })
    }

    /// Durable view of the transcript: everything except the synthetic
    /// greeting, in conversation order.
    pub fn messages(&self) -> Vec<Message> {
        self.transcript().durable_messages().cloned().collect()
    }

    /// The whole transcript, greeting included.
    pub fn full_transcript(&self) -> Vec<Message> {
        self.transcript().messages().to_vec()
    }

    /// Clears the store and any leftover uploaded artifacts, then resets
    /// the transcript to a fresh greeting. Waits for an in-flight turn to
    /// finish first.
    pub async fn reset(&self) -> anyhow::Result<()> {
        let _gate = self.turn_gate.lock().await;
        self.store.clear()?;
        self.sweep_uploads();
        let mut transcript = self.transcript();
        *transcript = Transcript::new();
        transcript.push_greeting(GREETING);
        Ok(())
    }

    async fn invoke(&self, turn: &Turn) -> Result<String, (TurnFailure, String)> {
        match turn {
            Turn::Text(text) => self
                .chat
                .invoke(text)
                .await
                .map_err(|err| (TurnFailure::Chat, err.to_string())),
            Turn::Image { bytes, file_name } => {
                let artifact = TempArtifact::write(&self.uploads_dir, file_name, bytes)
                    .map_err(|err| (TurnFailure::Image, format!("{err:#}")))?;
                let payload = artifact.path().to_string_lossy().into_owned();
                self.image
                    .invoke(&payload)
                    .await
                    .map_err(|err| (TurnFailure::Image, err.to_string()))
                // The artifact guard drops here, removing the temp file on
                // success and failure alike.
            }
        }
    }

    fn append(&self, role: Role, content: impl Into<String>) -> Message {
        self.transcript().push(role, content)
    }

    /// Best-effort write-back after each completed turn. Store trouble is
    /// logged and swallowed; it must never fail the turn.
    fn persist(&self) {
        let durable: Vec<Message> = self.transcript().durable_messages().cloned().collect();
        if let Err(err) = self.store.save(&durable) {
            warn!("failed to persist conversation: {err:#}");
        }
    }

    fn sweep_uploads(&self) {
        let entries = match fs::read_dir(&self.uploads_dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                if let Err(err) = fs::remove_file(&path) {
                    warn!("failed to remove uploaded artifact {}: {err}", path.display());
                }
            }
        }
    }

    fn transcript(&self) -> MutexGuard<'_, Transcript> {
        self.transcript.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityError;

    use std::collections::VecDeque;
    use std::io;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    /// Capability double: replays scripted replies in order, optionally
    /// sleeping first so tests can overlap turns.
    #[derive(Clone)]
    struct MockCapability {
        inner: Arc<MockInner>,
    }

    struct MockInner {
        replies: Mutex<VecDeque<Result<String, String>>>,
        delay: Duration,
        invocations: AtomicUsize,
    }

    impl MockCapability {
        fn scripted(replies: Vec<Result<String, String>>) -> Self {
            Self::with_delay(replies, Duration::ZERO)
        }

        fn with_delay(replies: Vec<Result<String, String>>, delay: Duration) -> Self {
            Self {
                inner: Arc::new(MockInner {
                    replies: Mutex::new(replies.into()),
                    delay,
                    invocations: AtomicUsize::new(0),
                }),
            }
        }

        fn ok(reply: &str) -> Self {
            Self::scripted(vec![Ok(reply.to_string())])
        }

        fn failing(diagnostic: &str) -> Self {
            Self::scripted(vec![Err(diagnostic.to_string())])
        }

        fn invocations(&self) -> usize {
            self.inner.invocations.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Capability for MockCapability {
        fn name(&self) -> &str {
            "mock"
        }

        async fn invoke(&self, _payload: &str) -> Result<String, CapabilityError> {
            self.inner.invocations.fetch_add(1, Ordering::SeqCst);
            if self.inner.delay > Duration::ZERO {
                tokio::time::sleep(self.inner.delay).await;
            }
            let next = {
                let mut replies = self.inner.replies.lock().unwrap();
                replies.pop_front()
            };
            match next {
                Some(Ok(text)) => Ok(text),
                Some(Err(diagnostic)) => Err(CapabilityError::Spawn {
                    program: String::from("mock"),
                    source: io::Error::other(diagnostic),
                }),
                None => Ok(String::from("unscripted reply")),
            }
        }
    }

    fn session_with(dir: &Path, chat: MockCapability, image: MockCapability) -> ChatSession {
        ChatSession::new(
            ConversationStore::new(dir.join("conversation.json")),
            Box::new(chat),
            Box::new(image),
            dir.join("uploads"),
        )
    }

    fn uploads_is_empty(dir: &Path) -> bool {
        match fs::read_dir(dir.join("uploads")) {
            Ok(entries) => entries.count() == 0,
            Err(_) => true,
        }
    }

    #[tokio::test]
    async fn empty_store_starts_with_greeting_and_turn_appends_a_pair() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with(dir.path(), MockCapability::ok("IDC is..."), MockCapability::ok(""));

        let opening = session.full_transcript();
        assert_eq!(opening.len(), 1);
        assert_eq!(opening[0].role, Role::Assistant);
        assert_eq!(opening[0].content, GREETING);

        let receipt = session
            .submit_turn(Turn::Text(String::from("What is IDC?")))
            .await
            .unwrap();
        assert!(receipt.failure.is_none());
        assert_eq!(receipt.user.content, "What is IDC?");
        assert_eq!(receipt.assistant.content, "IDC is...");
        assert!(receipt.assistant.created_at >= receipt.user.created_at);
        assert!(receipt.assistant.id > receipt.user.id);

        let full = session.full_transcript();
        assert_eq!(full.len(), 3);
        assert_eq!(full[1].role, Role::User);
        assert_eq!(full[2].role, Role::Assistant);
        // The greeting stays out of the durable view.
        assert_eq!(session.messages().len(), 2);
    }

    #[tokio::test]
    async fn recovered_history_suppresses_the_greeting() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("conversation.json"),
            r#"[{"type": "human", "content": ""}, {"type": "ai", "content": "hi"}]"#,
        )
        .unwrap();

        let session = session_with(dir.path(), MockCapability::ok("x"), MockCapability::ok("x"));
        let full = session.full_transcript();
        assert_eq!(full.len(), 1);
        assert_eq!(full[0].content, "hi");
        assert_eq!(session.messages().len(), 1);
    }

    #[tokio::test]
    async fn failed_chat_turn_still_appends_a_pair_with_fallback_wording() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with(
            dir.path(),
            MockCapability::failing("interpreter exploded"),
            MockCapability::ok("x"),
        );

        let before = session.full_transcript().len();
        let receipt = session
            .submit_turn(Turn::Text(String::from("hello?")))
            .await
            .unwrap();

        assert_eq!(receipt.failure, Some(TurnFailure::Chat));
        assert_eq!(receipt.assistant.content, TurnFailure::Chat.fallback_text());
        assert_eq!(session.full_transcript().len(), before + 2);
        // The raw diagnostic never reaches the transcript.
        assert!(session
            .full_transcript()
            .iter()
            .all(|message| !message.content.contains("interpreter exploded")));
    }

    #[tokio::test]
    async fn blank_text_turn_is_rejected_without_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let chat = MockCapability::ok("x");
        let session = session_with(dir.path(), chat.clone(), MockCapability::ok("x"));

        let before = session.full_transcript().len();
        let result = session.submit_turn(Turn::Text(String::from("   "))).await;

        assert_eq!(result.unwrap_err(), TurnRejected::EmptyMessage);
        assert_eq!(session.full_transcript().len(), before);
        assert_eq!(chat.invocations(), 0);
    }

    #[tokio::test]
    async fn empty_image_turn_is_rejected_without_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let image = MockCapability::ok("x");
        let session = session_with(dir.path(), MockCapability::ok("x"), image.clone());

        let result = session
            .submit_turn(Turn::Image {
                bytes: Vec::new(),
                file_name: String::from("x.png"),
            })
            .await;

        assert_eq!(result.unwrap_err(), TurnRejected::EmptyImage);
        assert_eq!(image.invocations(), 0);
    }

    #[tokio::test]
    async fn image_turn_cleans_up_its_artifact_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with(
            dir.path(),
            MockCapability::ok("x"),
            MockCapability::ok("Benign findings."),
        );

        let receipt = session
            .submit_turn(Turn::Image {
                bytes: b"not a real png".to_vec(),
                file_name: String::from("scan.png"),
            })
            .await
            .unwrap();

        assert_eq!(receipt.user.content, "📸 Uploaded image: scan.png");
        assert_eq!(receipt.assistant.content, "Benign findings.");
        assert!(uploads_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn failed_image_turn_cleans_up_and_hides_the_reason() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with(
            dir.path(),
            MockCapability::ok("x"),
            MockCapability::failing("decode failed"),
        );

        let receipt = session
            .submit_turn(Turn::Image {
                bytes: b"garbage".to_vec(),
                file_name: String::from("x.png"),
            })
            .await
            .unwrap();

        assert_eq!(receipt.failure, Some(TurnFailure::Image));
        assert_eq!(receipt.user.content, "📸 Uploaded image: x.png");
        assert_eq!(receipt.assistant.content, TurnFailure::Image.fallback_text());
        assert!(session
            .full_transcript()
            .iter()
            .all(|message| !message.content.contains("decode failed")));
        assert!(uploads_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn overlapping_turns_are_applied_in_fifo_order() {
        let dir = tempfile::tempdir().unwrap();
        let chat = MockCapability::with_delay(
            vec![
                Ok(String::from("first reply")),
                Ok(String::from("second reply")),
            ],
            Duration::from_millis(50),
        );
        let session = Arc::new(session_with(dir.path(), chat, MockCapability::ok("x")));

        let (first, second) = tokio::join!(
            session.submit_turn(Turn::Text(String::from("first"))),
            session.submit_turn(Turn::Text(String::from("second"))),
        );
        first.unwrap();
        second.unwrap();

        let contents: Vec<String> = session
            .messages()
            .into_iter()
            .map(|message| message.content)
            .collect();
        assert_eq!(contents, vec!["first", "first reply", "second", "second reply"]);
    }

    #[tokio::test]
    async fn turns_are_persisted_and_reset_starts_over() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with(
            dir.path(),
            MockCapability::ok("an answer"),
            MockCapability::ok("x"),
        );

        session
            .submit_turn(Turn::Text(String::from("a question")))
            .await
            .unwrap();

        // The greeting is not persisted; the pair is.
        let store = ConversationStore::new(dir.path().join("conversation.json"));
        let saved = store.load();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].content, "a question");

        // A stray upload should be swept by reset.
        fs::create_dir_all(dir.path().join("uploads")).unwrap();
        fs::write(dir.path().join("uploads/leftover.png"), b"x").unwrap();

        session.reset().await.unwrap();
        assert!(!dir.path().join("conversation.json").exists());
        assert!(uploads_is_empty(dir.path()));
        let full = session.full_transcript();
        assert_eq!(full.len(), 1);
        assert_eq!(full[0].content, GREETING);
        assert!(session.messages().is_empty());
    }
}
