//! Unified error types for the pipeline.
//!
//! Error codes:
//! - BACKEND_001: Unknown backend
//! - FEED_001: Raw collection failed
//! - ENRICH_001-002: Enrichment and identity batch failures
//! - STUDY_001: Study failed
//! - STORE_001, QUEUE_001, REGISTRY_001: Collaborator failures
//! - CONFIG_001-002: Configuration and backend parameter errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used by the failure policy and in run outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownBackend,
    Feed,
    Enrich,
    Study,
    Store,
    Queue,
    Registry,
    Config,
    Internal,
}

impl ErrorKind {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownBackend => "BACKEND_001",
            Self::Feed => "FEED_001",
            Self::Enrich => "ENRICH_001",
            Self::Study => "STUDY_001",
            Self::Store => "STORE_001",
            Self::Queue => "QUEUE_001",
            Self::Registry => "REGISTRY_001",
            Self::Config => "CONFIG_001",
            Self::Internal => "INTERNAL_001",
        }
    }
}

/// Unified error type for the pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// No connector registered under this name. Never swallowed.
    #[error("[BACKEND_001] unknown backend {0}")]
    UnknownBackend(String),

    #[error("[FEED_001] feeding {backend} failed: {message}")]
    Feed {
        backend: String,
        origin: Option<String>,
        message: String,
    },

    #[error("[ENRICH_001] enriching {backend} failed: {message}")]
    Enrich {
        backend: String,
        origin: Option<String>,
        message: String,
    },

    /// Submitting an identity batch to the registry failed.
    #[error("[ENRICH_002] identity batch of {size} from {connector} rejected: {message}")]
    IdentityBatch {
        connector: String,
        size: usize,
        message: String,
    },

    /// Never swallowed: aggregate outputs may be inconsistent.
    #[error("[STUDY_001] study {name} failed: {message}")]
    Study { name: String, message: String },

    #[error("[STORE_001] store error: {0}")]
    Store(String),

    #[error("[QUEUE_001] queue error: {0}")]
    Queue(String),

    #[error("[REGISTRY_001] identity registry error: {0}")]
    Registry(String),

    #[error("[CONFIG_001] configuration error: {0}")]
    Config(String),

    #[error("[CONFIG_002] invalid backend params: {0}")]
    InvalidParams(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn unknown_backend(name: impl Into<String>) -> Self {
        Self::UnknownBackend(name.into())
    }

    pub fn feed(backend: impl Into<String>, origin: Option<&str>, msg: impl Into<String>) -> Self {
        Self::Feed {
            backend: backend.into(),
            origin: origin.map(str::to_string),
            message: msg.into(),
        }
    }

    pub fn enrich(backend: impl Into<String>, origin: Option<&str>, msg: impl Into<String>) -> Self {
        Self::Enrich {
            backend: backend.into(),
            origin: origin.map(str::to_string),
            message: msg.into(),
        }
    }

    pub fn identity_batch(connector: impl Into<String>, size: usize, msg: impl Into<String>) -> Self {
        Self::IdentityBatch {
            connector: connector.into(),
            size,
            message: msg.into(),
        }
    }

    pub fn study(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Study {
            name: name.into(),
            message: msg.into(),
        }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn queue(msg: impl Into<String>) -> Self {
        Self::Queue(msg.into())
    }

    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the classification of this error.
    ///
    /// Identity batch failures abort the enrichment run they belong to, so
    /// they classify as enrichment failures.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownBackend(_) => ErrorKind::UnknownBackend,
            Self::Feed { .. } => ErrorKind::Feed,
            Self::Enrich { .. } | Self::IdentityBatch { .. } => ErrorKind::Enrich,
            Self::Study { .. } => ErrorKind::Study,
            Self::Store(_) => ErrorKind::Store,
            Self::Queue(_) => ErrorKind::Queue,
            Self::Registry(_) => ErrorKind::Registry,
            Self::Config(_) | Self::InvalidParams(_) => ErrorKind::Config,
            Self::Serialization(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Get the error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::IdentityBatch { .. } => "ENRICH_002",
            Self::InvalidParams(_) => "CONFIG_002",
            _ => self.kind().code(),
        }
    }

    /// Whether the failure policy may downgrade this error to a logged
    /// outcome. Unknown backends and study failures always reach the caller.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::UnknownBackend(_) | Self::Study { .. })
    }
}
