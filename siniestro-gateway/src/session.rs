//! In-memory session store for the chat proxy.
//!
//! Holds per-session conversation history across requests within the
//! process lifetime. Sessions are created lazily on first use, seeded with
//! the system instructions, grow by appended user/assistant turns, and are
//! trimmed back to system-only history by the periodic eviction sweep once
//! they sit idle past the configured threshold.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Current Unix time in milliseconds.
pub fn unix_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

// ============================================================================
// Message types
// ============================================================================

/// Role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instructions seeded at session creation
    System,
    /// End-user input
    User,
    /// Completion collaborator reply
    Assistant,
}

impl MessageRole {
    /// String form used on the completion wire and in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single message in a session's history.
///
/// Serializes to the `{"role": ..., "content": ...}` shape the completion
/// collaborator consumes, so histories are replayed verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role
    pub role: MessageRole,
    /// Message text
    pub content: String,
}

impl ChatMessage {
    /// Create a message with the given role.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Conversation state for one session.
#[derive(Debug, Clone)]
struct Session {
    /// Ordered message history, system seed first
    history: Vec<ChatMessage>,
    /// Unix milliseconds of the last read or write touching this session
    last_accessed: i64,
}

impl Session {
    fn new(instructions: &str, now_ms: i64) -> Self {
        Self {
            history: vec![ChatMessage::system(instructions)],
            last_accessed: now_ms,
        }
    }
}

// ============================================================================
// SessionStore
// ============================================================================

/// Process-wide session store with idle eviction.
///
/// All mutation goes through one write lock, so an append can never race
/// the eviction sweep on the same session. Completion calls happen outside
/// the lock; callers work on history snapshots.
#[derive(Debug)]
pub struct SessionStore {
    /// Sessions keyed by session identifier
    sessions: RwLock<HashMap<String, Session>>,
    /// Optional cap on per-session history length
    max_history: Option<usize>,
}

impl SessionStore {
    /// Create a new empty store without a history cap.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_history: None,
        }
    }

    /// Set the optional per-session history cap.
    pub fn with_max_history(mut self, cap: Option<usize>) -> Self {
        self.max_history = cap;
        self
    }

    /// Return the session's history, creating the session seeded with
    /// `[system(instructions)]` if it does not exist. Updates the session's
    /// last-access time.
    pub async fn get_or_create(&self, id: &str, instructions: &str) -> Vec<ChatMessage> {
        let now = unix_ms();
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(instructions, now));
        session.last_accessed = now;
        session.history.clone()
    }

    /// Append a user message and return the full history after the append.
    pub async fn append_user(
        &self,
        id: &str,
        text: &str,
        instructions: &str,
    ) -> Vec<ChatMessage> {
        self.append(id, MessageRole::User, text, instructions).await
    }

    /// Append an assistant message and return the full history after the
    /// append.
    pub async fn append_assistant(
        &self,
        id: &str,
        text: &str,
        instructions: &str,
    ) -> Vec<ChatMessage> {
        self.append(id, MessageRole::Assistant, text, instructions)
            .await
    }

    async fn append(
        &self,
        id: &str,
        role: MessageRole,
        text: &str,
        instructions: &str,
    ) -> Vec<ChatMessage> {
        let now = unix_ms();
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(id.to_string())
            .or_insert_with(|| Session::new(instructions, now));

        session.history.push(ChatMessage::new(role, text));
        session.last_accessed = now;

        if let Some(cap) = self.max_history {
            trim_to_cap(&mut session.history, cap);
        }

        session.history.clone()
    }

    /// Trim every session idle longer than `idle_ttl_ms` down to its
    /// system-role messages and reset its last-access time to `now_ms`.
    ///
    /// Sessions are never removed here, only cleared of user/assistant
    /// turns. Returns how many sessions actually lost messages.
    pub async fn evict_idle(&self, now_ms: i64, idle_ttl_ms: i64) -> usize {
        let mut sessions = self.sessions.write().await;
        let mut trimmed = 0;

        for session in sessions.values_mut() {
            if now_ms - session.last_accessed > idle_ttl_ms {
                let before = session.history.len();
                session.history.retain(|m| m.role == MessageRole::System);
                session.last_accessed = now_ms;
                if session.history.len() < before {
                    trimmed += 1;
                }
            }
        }

        if trimmed > 0 {
            tracing::info!(trimmed = trimmed, "Trimmed idle sessions");
        }

        trimmed
    }

    /// Discard every session. Returns how many were dropped.
    pub async fn clear(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let dropped = sessions.len();
        sessions.clear();
        dropped
    }

    /// Number of sessions currently in the store.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop the oldest non-system messages until the history fits the cap.
///
/// System messages are never dropped, even if they alone exceed the cap.
fn trim_to_cap(history: &mut Vec<ChatMessage>, cap: usize) {
    if history.len() <= cap {
        return;
    }

    let system_count = history
        .iter()
        .filter(|m| m.role == MessageRole::System)
        .count();
    let keep_turns = cap.saturating_sub(system_count);
    let total_turns = history.len() - system_count;
    let drop_turns = total_turns.saturating_sub(keep_turns);

    let mut turns_seen = 0;
    history.retain(|m| {
        if m.role == MessageRole::System {
            return true;
        }
        turns_seen += 1;
        turns_seen > drop_turns
    });
}

// ============================================================================
// Tests
// ============================================================================
