//! Asahi error types

/// Asahi error types
///
/// One variant per stable error kind. Kinds are part of the wire
/// contract: callers match on [`AsahiError::kind()`] rather than on
/// display strings.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum AsahiError {
    /// Input rejected before any work was done.
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The registry holds zero models; nothing can be routed.
    #[error("no models available in registry")]
    NoModelsAvailable,

    /// Upstream LLM call failed after retries.
    #[error("provider error: {0}")]
    Provider(String),

    /// Embedding call failed after retries, or returned a malformed vector.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Similarity-store backend I/O failure.
    #[error("similarity store error: {0}")]
    SimilarityStore(String),

    /// Queue or scheduler inconsistency.
    #[error("batching error: {0}")]
    Batching(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("observability error: {0}")]
    Observability(String),
}

impl AsahiError {
    /// Stable machine-readable error kind.
    ///
    /// These codes are the caller-facing contract; new variants get new
    /// codes, existing codes never change meaning.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::ModelNotFound(_) => "model_not_found",
            Self::NoModelsAvailable => "no_models_available",
            Self::Provider(_) => "provider",
            Self::Embedding(_) => "embedding",
            Self::SimilarityStore(_) => "similarity_store",
            Self::Batching(_) => "batching",
            Self::Configuration(_) => "configuration",
            Self::Observability(_) => "observability",
        }
    }

    /// Whether this error is transient and the operation may succeed on
    /// retry.
    ///
    /// Used by the retry helpers to decide whether a failed provider or
    /// embedding call is worth repeating. Validation, registry, and
    /// configuration errors are permanent.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::Embedding(_) | Self::SimilarityStore(_)
        )
    }

    /// Shorthand for a validation error on a named field.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for AsahiError {
    fn from(err: serde_json::Error) -> Self {
        AsahiError::Observability(err.to_string())
    }
}

/// Result type alias for Asahi operations
pub type Result<T> = std::result::Result<T, AsahiError>;
