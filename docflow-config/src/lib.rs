//! ABOUTME: Layered configuration (C: §10.3): defaults -> optional TOML file -> env
//! ABOUTME: overrides, mirroring the env-var enumeration in §6 with fail-fast validation

pub mod error;

pub use error::ConfigError;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hard ceiling on signed-URL lifetime (7 days), matching the object
/// store client's own `MAX_SIGNED_URL_EXPIRATION` constant.
pub const MAX_SIGNED_URL_EXPIRATION_SECS: u64 = 604_800;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStoreSettings {
    pub project_id: String,
    pub bucket: String,
    pub credentials_path: Option<String>,
    pub signed_url_expiration_secs: u64,
}

impl Default for ObjectStoreSettings {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            bucket: String::new(),
            credentials_path: None,
            signed_url_expiration_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/docflow".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterSettings {
    pub url_mode_endpoint: String,
    pub file_mode_endpoint: String,
    pub timeout_secs: u64,
    pub temp_dir: String,
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            url_mode_endpoint: "http://localhost:8088/convert/by-url".to_string(),
            file_mode_endpoint: "http://localhost:8088/convert/to-zip".to_string(),
            timeout_secs: 120,
            temp_dir: std::env::temp_dir().to_string_lossy().into_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub model_name: String,
    pub max_attempts: u32,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            model_name: "gpt-4o-mini".to_string(),
            max_attempts: 3,
        }
    }
}

/// Closed set per §9 "Polymorphism over ... embedding providers": the
/// provider kind is a configuration value, not something discovered at
/// runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingProviderKind {
    LocalModel,
    ApiProvider,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider_kind: EmbeddingProviderKind,
    pub model_name: String,
    pub dimension: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider_kind: EmbeddingProviderKind::LocalModel,
            model_name: "text-embedding-3-small".to_string(),
            dimension: 1536,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 60,
        }
    }
}

/// One breaker configuration per external service named in §4.1's minimum
/// coverage list: converter, object store, LLM gateway, embedding
/// provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub converter: BreakerSettings,
    pub object_store: BreakerSettings,
    pub llm: BreakerSettings,
    pub embedding: BreakerSettings,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            converter: BreakerSettings::default(),
            object_store: BreakerSettings::default(),
            llm: BreakerSettings::default(),
            embedding: BreakerSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub exponential_base: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            exponential_base: 2.0,
        }
    }
}

/// Opaque passthrough fields: the core never interprets these (§6, §10.3
/// — "the core does not interpret them, matching the Non-goals").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingSettings {
    pub api_key: Option<String>,
    pub project: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub object_store: ObjectStoreSettings,
    pub database: DatabaseSettings,
    pub converter: ConverterSettings,
    pub validation: ValidationSettings,
    pub embedding: EmbeddingSettings,
    pub circuit_breakers: CircuitBreakerSettings,
    pub retry: RetrySettings,
    pub tracing: TracingSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            object_store: ObjectStoreSettings::default(),
            database: DatabaseSettings::default(),
            converter: ConverterSettings::default(),
            validation: ValidationSettings::default(),
            embedding: EmbeddingSettings::default(),
            circuit_breakers: CircuitBreakerSettings::default(),
            retry: RetrySettings::default(),
            tracing: TracingSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads defaults, layers an optional TOML file on top (missing file is
    /// not an error), then layers `DOCFLOW__SECTION__FIELD`-style
    /// environment variables, and validates the result.
    pub fn load(toml_path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = config::Config::try_from(&AppConfig::default())?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = toml_path {
            builder = builder.add_source(
                config::File::from(path).required(false).format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix("DOCFLOW")
                .separator("__")
                .try_parsing(true),
        );

        let raw: AppConfig = builder.build()?.try_deserialize()?;
        raw.validate()?;
        Ok(raw)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.object_store.credentials_path.as_deref().unwrap_or("").is_empty() {
            return Err(ConfigError::MissingCredentialPath(
                self.object_store.credentials_path.clone(),
            ));
        }
        if self.object_store.signed_url_expiration_secs > MAX_SIGNED_URL_EXPIRATION_SECS {
            return Err(ConfigError::ExpirationOutOfRange(
                self.object_store.signed_url_expiration_secs,
            ));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::MissingField { field: "database.url" });
        }
        Ok(())
    }
}
