//! HTTP routes for the Siniestro gateway.
//!
//! Endpoints:
//! - `GET /health`: liveness probe
//! - `GET /api/v1/qr`: QR image encoding a messaging deep link
//! - `POST /api/v1/chat`: chat proxy backed by the session store
//! - `POST /api/v1/admin/reload`: re-fetch instructions, drop all sessions
//!
//! Every response carries permissive CORS headers; the QR and chat
//! endpoints are called straight from browser contexts.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::context::ChatContext;
use crate::deeplink::{self, LinkTarget};
use crate::qr;
use siniestro_common::config::{Config, QrConfig};
use siniestro_common::Result;

// ============================================================================
// State
// ============================================================================

/// Shared state for the gateway HTTP server.
pub struct AppState {
    /// Chat proxy context (instructions, completion client, sessions)
    pub chat: ChatContext,
    /// QR deep-link settings
    pub qr: QrConfig,
}

/// Create the shared gateway state from configuration.
///
/// Fetches the instructions document once; a failure here is fatal to
/// startup.
pub async fn create_state(config: &Config) -> Result<Arc<AppState>> {
    let chat = ChatContext::initialize(config.chat.clone()).await?;

    Ok(Arc::new(AppState {
        chat,
        qr: config.qr.clone(),
    }))
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    reply: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct ReloadResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    sessions_dropped: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

// ============================================================================
// Health Routes
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "siniestro-gateway",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============================================================================
// Chat
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChatRequest {
    /// User input; required and non-empty
    #[serde(default)]
    message: Option<String>,
    /// Session key; absent means the configured default session
    #[serde(default)]
    session: Option<String>,
    /// Per-request completion model override
    #[serde(default)]
    model: Option<String>,
}

async fn chat(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    // Parsed by hand so any malformed body lands on the same validation
    // response, with no session created and no collaborator call.
    let Ok(request) = serde_json::from_slice::<ChatRequest>(&body) else {
        return (StatusCode::BAD_REQUEST, "message is required").into_response();
    };

    let message = match request.message {
        Some(ref m) if !m.is_empty() => m.as_str(),
        _ => return (StatusCode::BAD_REQUEST, "message is required").into_response(),
    };

    match state
        .chat
        .respond(
            request.session.as_deref(),
            message,
            request.model.as_deref(),
        )
        .await
    {
        Ok(reply) => (StatusCode::OK, Json(ChatResponse { reply })).into_response(),
        Err(e) => {
            // Detail stays in the logs; callers get a generic message
            let trace_id = uuid::Uuid::new_v4().to_string();
            tracing::error!(trace_id = %trace_id, error = %e, "Chat exchange failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "failed to process message".to_string(),
                }),
            )
                .into_response()
        }
    }
}

// ============================================================================
// QR Deep Links
// ============================================================================

#[derive(Debug, Deserialize)]
struct QrQuery {
    contact_number: Option<String>,
    token: Option<String>,
    /// `"1"` appends a newline to the prefilled text
    enter: Option<String>,
    /// `"1"` switches from the WhatsApp template to the Telegram bot link
    telegram: Option<String>,
}

async fn qr_code(State(state): State<Arc<AppState>>, Query(params): Query<QrQuery>) -> Response {
    let contact_number = params.contact_number.as_deref().unwrap_or("");
    let token = params.token.as_deref().unwrap_or("");
    if contact_number.is_empty() || token.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "token and contact_number are required".to_string(),
            }),
        )
            .into_response();
    }

    let target = if params.telegram.as_deref() == Some("1") {
        LinkTarget::Telegram
    } else {
        LinkTarget::WhatsApp
    };
    let append_newline = params.enter.as_deref() == Some("1");

    let png = deeplink::build_deep_link(
        target,
        contact_number,
        token,
        append_newline,
        &state.qr.telegram_bot,
    )
    .and_then(|link| qr::render_png(&link, state.qr.image_size));

    match png {
        Ok(png) => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(png);
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "image/png"),
                    (header::CONTENT_DISPOSITION, "attachment; filename=\"qr.png\""),
                ],
                encoded,
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "QR generation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "failed to generate QR code".to_string(),
                }),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Admin
// ============================================================================

async fn admin_reload(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.chat.reload().await {
        Ok(dropped) => (
            StatusCode::OK,
            Json(ReloadResponse {
                success: true,
                sessions_dropped: Some(dropped),
                error: None,
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Instructions reload failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ReloadResponse {
                    success: false,
                    sessions_dropped: None,
                    error: Some("failed to reload instructions".to_string()),
                }),
            )
        }
    }
}

// ============================================================================
// Router Builder
// ============================================================================

/// Build the gateway HTTP router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        // Health endpoint
        .route("/health", get(health))
        // QR deep links
        .route("/api/v1/qr", get(qr_code))
        // Chat proxy
        .route("/api/v1/chat", post(chat))
        // Admin
        .route("/api/v1/admin/reload", post(admin_reload))
        .layer(cors)
        .with_state(state)
}
