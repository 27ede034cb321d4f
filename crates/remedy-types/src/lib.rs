//! Shared error taxonomy and event sinks for the remedy workspace.
//!
//! This crate provides the foundational types used across all other remedy crates:
//! - `RemedyError`: unified error taxonomy
//! - `EventSink`: injectable observability sink, with tracing and recording
//!   implementations

pub mod events;

pub use events::{EventLevel, EventSink, Observable, RecordingSink, TracingSink};

use std::path::PathBuf;

/// Unified error type for all remedy subsystems.
#[derive(Debug, thiserror::Error)]
pub enum RemedyError {
    // === Job Control Errors ===
    /// `status` is `None` when the request never produced an HTTP response.
    #[error("Job control '{operation}' failed: {message}")]
    JobControl {
        operation: String,
        status: Option<u16>,
        message: String,
    },

    // === Model Provider Errors ===
    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    RequestTimeout { provider: String, timeout_ms: u64 },

    #[error("Malformed response from {provider}: {message}")]
    MalformedResponse { provider: String, message: String },

    // === Notification Errors ===
    #[error("Notification delivery failed: {0}")]
    Notification(String),

    // === Configuration Errors ===
    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Failed to parse config: {0}")]
    ConfigParse(String),

    #[error("Missing required configuration key: {0}")]
    MissingKey(String),

    #[error("Invalid value for '{field}': {message}")]
    InvalidConfig { field: String, message: String },

    // === Predicate Errors ===
    #[error("Predicate parse error at offset {offset}: {message}")]
    PredicateParse { offset: usize, message: String },

    #[error("Predicate evaluation failed: {0}")]
    PredicateEval(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl RemedyError {
    /// Returns `true` if the error is transient and the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RemedyError::RateLimited { .. }
                | RemedyError::RequestTimeout { .. }
                | RemedyError::ProviderError { retryable: true, .. }
                | RemedyError::JobControl { status: None, .. }
        ) || matches!(self, RemedyError::JobControl { status: Some(s), .. } if *s >= 500)
    }

    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RemedyError::AuthError { .. }
                | RemedyError::ConfigNotFound(_)
                | RemedyError::ConfigParse(_)
                | RemedyError::MissingKey(_)
                | RemedyError::InvalidConfig { .. }
                | RemedyError::PredicateParse { .. }
        )
    }

    /// Returns `true` when a job-control call failed before any response arrived.
    pub fn is_transport(&self) -> bool {
        matches!(self, RemedyError::JobControl { status: None, .. })
    }
}

/// A convenience alias for `Result<T, RemedyError>`.
pub type Result<T> = std::result::Result<T, RemedyError>;
