//! ABOUTME: Error types and handling for the document processing pipeline core
//! ABOUTME: Provides PipelineError enum and Result type alias shared across docflow crates

use std::time::Duration;
use thiserror::Error;

/// Comprehensive error enum for pipeline-core operations.
///
/// Mirrors the taxonomy laid out for error handling: transient transport
/// failures, parse/format failures, storage failures, circuit-open
/// rejections, configuration failures, and unknown-document-kind failures.
/// Validation low-quality outcomes are intentionally *not* represented here
/// — they are a normal, data-carrying outcome on `PipelineState`, not an
/// error.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transient transport error calling {service}: {message}")]
    Transient { service: String, message: String },

    #[error("failed to parse response from {source_kind}: {message}")]
    ParseFormat {
        source_kind: String,
        message: String,
    },

    #[error("storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("circuit open for service '{service}', retry after {retry_after:?}")]
    CircuitOpen {
        service: String,
        retry_after: Duration,
    },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("unknown document kind for reference '{reference}'")]
    UnknownKind { reference: String },

    #[error("{message}")]
    Internal { message: String },
}

impl PipelineError {
    /// Build a generic internal error, the catch-all variant used when no
    /// more specific variant applies.
    #[must_use]
    pub fn general(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Build a storage error wrapping an underlying source error.
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// True for failure kinds that the retry wrapper (C1) should retry.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, PipelineError>;
