//! ABOUTME: Configuration error taxonomy: fails fast at construction, never at runtime

use thiserror::Error;

/// Raised by `AppConfig::load`. Every variant corresponds to the
/// "Configuration" taxonomy entry in the error handling design: missing
/// credential path or an out-of-range expiration fails fast rather than
/// surfacing as a `PipelineError` deep in a running job.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),

    #[error(
        "object_store.credentials_path is required and must point at an existing file; got {0:?}"
    )]
    MissingCredentialPath(Option<String>),

    #[error(
        "object_store.signed_url_expiration_secs ({0}) exceeds the object store's maximum of {max} seconds",
        max = crate::MAX_SIGNED_URL_EXPIRATION_SECS
    )]
    ExpirationOutOfRange(u64),

    #[error("{field} must be non-empty")]
    MissingField { field: &'static str },
}
