//! Siniestro Gateway - QR deep links and a session-backed chat proxy.
//!
//! The gateway serves two small HTTP surfaces:
//! - QR images encoding WhatsApp/Telegram deep links
//! - a chat proxy that replays per-session history to an OpenAI-compatible
//!   completion endpoint
//!
//! ## Architecture
//!
//! ```text
//! Browser ──► GET /api/v1/qr ──► deep link ──► PNG (base64)
//!
//! Caller ──► POST /api/v1/chat ──► SessionStore ──► completion endpoint
//!                                       ▲
//!                          eviction sweep (periodic)
//! ```
//!
//! Sessions live in process memory only; a restart or reload starts every
//! conversation over.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod completion;
pub mod context;
pub mod deeplink;
pub mod instructions;
pub mod qr;
pub mod routes;
pub mod session;

// Re-export commonly used types
pub use completion::CompletionClient;
pub use context::{ChatContext, RESET_CONFIRMATION, RESET_SENTINEL};
pub use deeplink::{build_deep_link, LinkTarget};
pub use instructions::InstructionsClient;
pub use routes::{build_router, create_state, AppState};
pub use session::{ChatMessage, MessageRole, SessionStore};

use siniestro_common::config::Config;
use std::net::SocketAddr;

/// Start the gateway HTTP server.
///
/// Fetches the instructions document, spawns the session eviction sweep,
/// and serves until the listener fails.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = SocketAddr::from((
        config.bind_address().parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    let state = routes::create_state(config).await?;
    let router = routes::build_router(state.clone());

    // Spawn the eviction sweep for idle sessions
    let sweep_state = state.clone();
    let idle_ttl_ms = config.idle_ttl_ms();
    let sweep_interval = config.sweep_interval();
    let sweep_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);

        loop {
            interval.tick().await;
            sweep_state
                .chat
                .sessions()
                .evict_idle(session::unix_ms(), idle_ttl_ms)
                .await;
        }
    });

    tracing::info!("Starting Siniestro Gateway on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    // Clean up on shutdown
    sweep_handle.abort();

    Ok(())
}
