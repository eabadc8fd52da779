use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::attachment::AttachmentError;
use crate::capability::CapabilityError;
use crate::config::ConfigError;
use crate::models::{CapabilityKind, OperationKind};
use crate::remote::RemoteProviderError;

/// Closed set of failure categories a caller can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CapabilityUnavailable,
    CapabilityDownloading,
    ContentTooShort,
    ContentTooLarge,
    SchemaInvalid,
    RemoteProviderError,
    InvalidCredentials,
    Unknown,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CapabilityUnavailable => "capability_unavailable",
            Self::CapabilityDownloading => "capability_downloading",
            Self::ContentTooShort => "content_too_short",
            Self::ContentTooLarge => "content_too_large",
            Self::SchemaInvalid => "schema_invalid",
            Self::RemoteProviderError => "remote_provider_error",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Unknown => "unknown",
        }
    }

    /// Downloading is the only state a caller can resolve by waiting and asking again.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::CapabilityDownloading)
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{capability} capability is unavailable: {reason}")]
    CapabilityUnavailable {
        capability: CapabilityKind,
        reason: String,
    },
    #[error("{capability} model is still downloading")]
    CapabilityDownloading { capability: CapabilityKind },
    #[error("content is too short to {operation}: {actual} chars, minimum {minimum}")]
    ContentTooShort {
        operation: &'static str,
        actual: usize,
        minimum: usize,
    },
    #[error("content is too large: {actual} {unit}, limit {limit}")]
    ContentTooLarge {
        actual: usize,
        limit: usize,
        unit: &'static str,
    },
    #[error("thread has no attachment at index {0}")]
    MissingAttachment(usize),
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error(transparent)]
    Remote(#[from] RemoteProviderError),
    #[error(transparent)]
    Attachment(#[from] AttachmentError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{operation} failed: {message}")]
    Internal {
        operation: OperationKind,
        message: String,
    },
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CapabilityUnavailable { .. } => ErrorKind::CapabilityUnavailable,
            Self::CapabilityDownloading { .. } => ErrorKind::CapabilityDownloading,
            Self::ContentTooShort { .. } => ErrorKind::ContentTooShort,
            Self::ContentTooLarge { .. } => ErrorKind::ContentTooLarge,
            Self::MissingAttachment(_) | Self::Attachment(_) => ErrorKind::Unknown,
            Self::Capability(err) => err.kind(),
            Self::Remote(err) => err.kind(),
            Self::Config(_) | Self::Internal { .. } => ErrorKind::Unknown,
        }
    }
}
