//! Contract between the orchestrator and whatever hosts the on-device models.
//!
//! The host answers availability probes per [`CapabilityKind`] and creates
//! sessions from a [`SessionConfig`]. Sessions are driven exclusively through
//! [`crate::session::SessionManager`].

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::models::{CapabilityKind, CapabilityStatus};

pub mod registry;

pub use registry::{CapabilityRegistry, StatusChange};

pub type CapabilityFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, CapabilityError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("availability probe failed: {0}")]
    ProbeFailed(String),
    #[error("capability session could not be created: {0}")]
    CreateFailed(String),
    #[error("capability session failed: {0}")]
    InvocationFailed(String),
    #[error("capability did not respond within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
    #[error("capability does not accept this input: {0}")]
    UnsupportedInput(String),
}

impl CapabilityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProbeFailed(_)
            | Self::CreateFailed(_)
            | Self::InvocationFailed(_)
            | Self::Timeout { .. } => ErrorKind::CapabilityUnavailable,
            Self::UnsupportedInput(_) => ErrorKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SummaryStyle {
    Tldr,
    KeyPoints,
    Teaser,
    Headline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLength {
    Short,
    Medium,
    Long,
}

/// Configuration a session is created with. Two requests share a session only
/// when their configurations serialize identically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "capability", rename_all = "snake_case")]
pub enum SessionConfig {
    Summarizer {
        style: SummaryStyle,
        length: SummaryLength,
        shared_context: Option<String>,
    },
    Translator {
        source_language: String,
        target_language: String,
    },
    LanguageModel {
        system_prompt: String,
        temperature_milli: u32,
    },
    ImageAnalyzer {
        instruction: String,
    },
}

impl SessionConfig {
    pub fn summarizer(style: SummaryStyle, length: SummaryLength) -> Self {
        Self::Summarizer {
            style,
            length,
            shared_context: None,
        }
    }

    pub fn translator(source_language: &str, target_language: &str) -> Self {
        Self::Translator {
            source_language: source_language.trim().to_ascii_lowercase(),
            target_language: target_language.trim().to_ascii_lowercase(),
        }
    }

    pub const fn capability(&self) -> CapabilityKind {
        match self {
            Self::Summarizer { .. } => CapabilityKind::Summarize,
            Self::Translator { .. } => CapabilityKind::Translate,
            Self::LanguageModel { .. } => CapabilityKind::Generate,
            Self::ImageAnalyzer { .. } => CapabilityKind::AnalyzeImage,
        }
    }

    pub fn key(&self) -> SessionKey {
        SessionKey {
            capability: self.capability(),
            config_hash: config_hash(self),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub capability: CapabilityKind,
    pub config_hash: String,
}

fn config_hash(config: &SessionConfig) -> String {
    let serialized = serde_json::to_vec(config).unwrap_or_default();
    let digest = Sha256::digest(serialized);
    digest
        .iter()
        .take(12)
        .map(|byte| format!("{byte:02x}"))
        .collect::<String>()
}

#[derive(Debug, Clone)]
pub enum CapabilityInput {
    Text(String),
    Image {
        bytes: Vec<u8>,
        mime_type: String,
        instruction: String,
    },
}

impl CapabilityInput {
    pub fn char_len(&self) -> usize {
        match self {
            Self::Text(text) => text.chars().count(),
            Self::Image { instruction, .. } => instruction.chars().count(),
        }
    }
}

/// One configured, stateful instance of a capability.
pub trait CapabilitySession: Send {
    fn invoke<'a>(&'a mut self, input: CapabilityInput) -> CapabilityFuture<'a, String>;

    /// Releases the underlying model instance. Called exactly once per session.
    fn destroy(&mut self);
}

pub trait CapabilityBackend: Send + Sync {
    fn availability<'a>(&'a self, capability: CapabilityKind)
    -> CapabilityFuture<'a, CapabilityStatus>;

    fn create<'a>(
        &'a self,
        config: &'a SessionConfig,
    ) -> CapabilityFuture<'a, Box<dyn CapabilitySession>>;
}

#[cfg(test)]
mod tests {
    use super::{SessionConfig, SummaryLength, SummaryStyle};
    use crate::models::CapabilityKind;

    #[test]
    fn summarizer_styles_produce_distinct_keys() {
        let tldr = SessionConfig::summarizer(SummaryStyle::Tldr, SummaryLength::Short).key();
        let key_points =
            SessionConfig::summarizer(SummaryStyle::KeyPoints, SummaryLength::Short).key();

        assert_eq!(tldr.capability, CapabilityKind::Summarize);
        assert_ne!(tldr, key_points);
        assert_eq!(
            tldr,
            SessionConfig::summarizer(SummaryStyle::Tldr, SummaryLength::Short).key()
        );
    }

    #[test]
    fn translator_key_normalizes_language_codes() {
        assert_eq!(
            SessionConfig::translator("EN ", "de").key(),
            SessionConfig::translator("en", "DE").key()
        );
        assert_ne!(
            SessionConfig::translator("en", "de").key(),
            SessionConfig::translator("de", "en").key()
        );
    }
}
