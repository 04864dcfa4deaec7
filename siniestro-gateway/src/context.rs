//! Process-scoped chat context.
//!
//! One explicit state object owns every mutable piece the chat proxy needs
//! across requests: the instructions text, the completion client, and the
//! session store. Handlers receive it through axum state; nothing lives in
//! globals.
//!
//! A reload (sentinel input or admin request) re-fetches the instructions,
//! drops every session, and rebuilds the completion client. The fetch runs
//! first, so a failed reload leaves the previous state fully intact.

use crate::completion::CompletionClient;
use crate::instructions::InstructionsClient;
use crate::session::SessionStore;
use siniestro_common::config::ChatConfig;
use siniestro_common::{Error, Result};
use tokio::sync::RwLock;

/// Chat input that triggers a full context reset instead of a completion
/// exchange.
pub const RESET_SENTINEL: &str = "siniestro:reborn";

/// Fixed reply returned after a sentinel-triggered reset.
pub const RESET_CONFIRMATION: &str = "Instrucciones actualizadas. Memoria reiniciada.";

/// Shared state for the chat proxy.
#[derive(Debug)]
pub struct ChatContext {
    settings: ChatConfig,
    instructions_client: InstructionsClient,
    instructions: RwLock<String>,
    completion: RwLock<CompletionClient>,
    sessions: SessionStore,
}

impl ChatContext {
    /// Fetch the instructions and build the completion client.
    ///
    /// Fails when no instructions URL is configured or the document cannot
    /// be fetched. Startup is the wrong time to limp along with an empty
    /// system prompt.
    pub async fn initialize(settings: ChatConfig) -> Result<Self> {
        if settings.instructions_url.is_empty() {
            return Err(Error::Config(
                "chat.instructions_url is not set (see SINIESTRO_INSTRUCTIONS_URL)".to_string(),
            ));
        }

        let instructions_client = InstructionsClient::new(settings.instructions_url.clone());
        let instructions = instructions_client.fetch().await?;
        tracing::info!(bytes = instructions.len(), "Instructions loaded");

        let completion = CompletionClient::new(&settings.completion);
        let sessions = SessionStore::new().with_max_history(settings.max_history);

        Ok(Self {
            settings,
            instructions_client,
            instructions: RwLock::new(instructions),
            completion: RwLock::new(completion),
            sessions,
        })
    }

    /// Session store, for the eviction sweep and diagnostics.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Run one chat exchange and return the assistant reply.
    ///
    /// The sentinel input resets the whole context instead of consulting the
    /// completion collaborator. For everything else the user turn is
    /// appended first and stays in the history even when the collaborator
    /// fails; the failed exchange remains visible to the next one.
    pub async fn respond(
        &self,
        session_id: Option<&str>,
        text: &str,
        model: Option<&str>,
    ) -> Result<String> {
        if text == RESET_SENTINEL {
            let dropped = self.reload().await?;
            tracing::info!(sessions_dropped = dropped, "Context reset via sentinel");
            return Ok(RESET_CONFIRMATION.to_string());
        }

        let session_id = session_id.unwrap_or(&self.settings.default_session);
        let instructions = self.instructions.read().await.clone();

        let history = self
            .sessions
            .append_user(session_id, text, &instructions)
            .await;

        // Clone the client handle out so a slow completion never holds the
        // lock a reload needs.
        let completion = self.completion.read().await.clone();
        let reply = completion.complete(&history, model).await?;

        self.sessions
            .append_assistant(session_id, &reply, &instructions)
            .await;

        Ok(reply)
    }

    /// Re-fetch the instructions, drop every session, and rebuild the
    /// completion client. Returns how many sessions were dropped.
    ///
    /// Nothing is touched until the fresh instructions are in hand.
    pub async fn reload(&self) -> Result<usize> {
        let fresh = self.instructions_client.fetch().await?;

        {
            let mut instructions = self.instructions.write().await;
            *instructions = fresh;
        }
        {
            let mut completion = self.completion.write().await;
            *completion = CompletionClient::new(&self.settings.completion);
        }
        let dropped = self.sessions.clear().await;

        tracing::info!(sessions_dropped = dropped, "Instructions reloaded, sessions cleared");
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MessageRole;
    use serde_json::json;
    use siniestro_common::config::CompletionConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(instructions_url: String, completion_endpoint: String) -> ChatConfig {
        ChatConfig {
            instructions_url,
            completion: CompletionConfig {
                endpoint: completion_endpoint,
                api_key: None,
                model: "gpt-4o".to_string(),
                timeout_secs: 5,
            },
            ..ChatConfig::default()
        }
    }

    async fn mock_instructions(server: &MockServer, body: &str) {
        Mock::given(method("GET"))
            .and(path("/instructions.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    fn completion_response(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
        }))
    }

    #[tokio::test]
    async fn test_initialize_requires_instructions_url() {
        let err = ChatContext::initialize(ChatConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_initialize_fails_when_instructions_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = ChatContext::initialize(settings(server.uri(), server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
    }

    #[tokio::test]
    async fn test_respond_appends_full_exchange() {
        let server = MockServer::start().await;
        mock_instructions(&server, "Eres Siniestro.").await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(completion_response("Hola, soy Siniestro."))
            .mount(&server)
            .await;

        let context = ChatContext::initialize(settings(
            format!("{}/instructions.txt", server.uri()),
            format!("{}/v1/chat/completions", server.uri()),
        ))
        .await
        .unwrap();

        let reply = context.respond(None, "hola", None).await.unwrap();
        assert_eq!(reply, "Hola, soy Siniestro.");

        let history = context.sessions().get_or_create("global", "x").await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, MessageRole::System);
        assert_eq!(history[0].content, "Eres Siniestro.");
        assert_eq!(history[1].content, "hola");
        assert_eq!(history[2].content, "Hola, soy Siniestro.");
    }

    #[tokio::test]
    async fn test_respond_keeps_user_turn_on_collaborator_failure() {
        let server = MockServer::start().await;
        mock_instructions(&server, "seed").await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let context = ChatContext::initialize(settings(
            format!("{}/instructions.txt", server.uri()),
            format!("{}/v1/chat/completions", server.uri()),
        ))
        .await
        .unwrap();

        let err = context.respond(Some("s1"), "hola", None).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));

        // The user turn survives the failed exchange
        let history = context.sessions().get_or_create("s1", "x").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].role, MessageRole::User);
        assert_eq!(history[1].content, "hola");
    }

    #[tokio::test]
    async fn test_sentinel_resets_without_calling_collaborator() {
        let server = MockServer::start().await;
        mock_instructions(&server, "seed").await;
        // Any completion call fails the test
        Mock::given(method("POST"))
            .respond_with(completion_response("should not happen"))
            .expect(0)
            .mount(&server)
            .await;

        let context = ChatContext::initialize(settings(
            format!("{}/instructions.txt", server.uri()),
            format!("{}/v1/chat/completions", server.uri()),
        ))
        .await
        .unwrap();

        context.sessions().append_user("s1", "old turn", "seed").await;
        context.sessions().append_user("s2", "old turn", "seed").await;

        let reply = context
            .respond(Some("s1"), RESET_SENTINEL, None)
            .await
            .unwrap();

        assert_eq!(reply, RESET_CONFIRMATION);
        assert_eq!(context.sessions().session_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_reload_leaves_state_untouched() {
        let server = MockServer::start().await;
        let guard = Mock::given(method("GET"))
            .and(path("/instructions.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("seed"))
            .up_to_n_times(1)
            .mount_as_scoped(&server)
            .await;

        let context = ChatContext::initialize(settings(
            format!("{}/instructions.txt", server.uri()),
            server.uri(),
        ))
        .await
        .unwrap();
        drop(guard);

        // Subsequent fetches now 404
        context.sessions().append_user("s1", "turn", "seed").await;
        assert!(context.reload().await.is_err());

        // Sessions and instructions keep their pre-reload state
        assert_eq!(context.sessions().session_count().await, 1);
        assert_eq!(*context.instructions.read().await, "seed");
    }

    #[tokio::test]
    async fn test_reload_swaps_instructions_and_drops_sessions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/instructions.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("first"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/instructions.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("second"))
            .mount(&server)
            .await;

        let context = ChatContext::initialize(settings(
            format!("{}/instructions.txt", server.uri()),
            server.uri(),
        ))
        .await
        .unwrap();

        context.sessions().append_user("s1", "turn", "first").await;
        let dropped = context.reload().await.unwrap();

        assert_eq!(dropped, 1);
        assert_eq!(context.sessions().session_count().await, 0);
        assert_eq!(*context.instructions.read().await, "second");
    }
}
