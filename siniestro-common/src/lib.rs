//! Siniestro Common - Shared configuration, errors, and logging for the
//! Siniestro services.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Error types and handling utilities
//! - Logging setup and noise filtering

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    ChatConfig, CompletionConfig, Config, ObservabilityConfig, QrConfig, ServerConfig,
};
pub use error::{Error, Result};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{ChatConfig, CompletionConfig, Config, QrConfig};
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
}
