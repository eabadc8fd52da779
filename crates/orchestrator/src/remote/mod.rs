//! User-supplied remote model providers, used only when a request allows it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::RemoteProviderConfig;
use crate::drafts::Draft;
use crate::error::ErrorKind;

mod anthropic;
mod gemini;
mod http;
mod openai;
mod prompts;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiCompatibleProvider;
pub use prompts::{IMAGE_DESCRIPTION_INSTRUCTION, SUMMARY_SYSTEM_PROMPT};

pub type RemoteFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, RemoteProviderError>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
}

impl RemoteProviderKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }

    pub const fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Anthropic => "claude-3-5-haiku-latest",
            Self::Gemini => "gemini-1.5-flash",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "openai" | "openrouter" => Some(Self::OpenAi),
            "anthropic" | "claude" => Some(Self::Anthropic),
            "gemini" | "google" => Some(Self::Gemini),
            _ => None,
        }
    }
}

impl fmt::Display for RemoteProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteCredentials {
    pub provider: RemoteProviderKind,
    pub api_key: String,
    #[serde(default)]
    pub model: Option<String>,
}

impl RemoteCredentials {
    pub fn new(provider: RemoteProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: api_key.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl AsRef<str>) -> Self {
        let trimmed = model.as_ref().trim();
        if !trimmed.is_empty() {
            self.model = Some(trimmed.to_string());
        }
        self
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn api_key(&self) -> Result<&str, RemoteProviderError> {
        let key = self.api_key.trim();
        if key.is_empty() {
            return Err(RemoteProviderError::InvalidCredentials);
        }
        Ok(key)
    }
}

impl fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("provider", &self.provider)
            .field("api_key", &"[redacted]")
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSummary {
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RemoteImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub instruction: String,
}

#[derive(Debug, Error)]
pub enum RemoteProviderError {
    #[error("remote provider credentials are missing or were rejected")]
    InvalidCredentials,
    #[error("remote provider returned status {status} (code={code}): {message}")]
    Http {
        status: u16,
        code: String,
        message: String,
    },
    #[error("remote provider request timed out")]
    Timeout,
    #[error("remote provider request failed: {0}")]
    Transport(String),
    #[error("remote provider output could not be parsed: {0}")]
    UnparseableOutput(String),
    #[error("no remote provider is configured for {0}")]
    NotConfigured(RemoteProviderKind),
    #[error("failed to build remote provider http client: {0}")]
    HttpClient(String),
}

impl RemoteProviderError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCredentials => ErrorKind::InvalidCredentials,
            _ => ErrorKind::RemoteProviderError,
        }
    }
}

pub trait RemoteProvider: Send + Sync {
    fn kind(&self) -> RemoteProviderKind;

    fn summarize<'a>(
        &'a self,
        text: &'a str,
        credentials: &'a RemoteCredentials,
    ) -> RemoteFuture<'a, RemoteSummary>;

    /// `prompt` already carries the draft instructions; the raw drafts come back
    /// unvalidated.
    fn generate_drafts<'a>(
        &'a self,
        prompt: &'a str,
        credentials: &'a RemoteCredentials,
    ) -> RemoteFuture<'a, Vec<Draft>>;

    fn describe_image<'a>(
        &'a self,
        image: &'a RemoteImage,
        credentials: &'a RemoteCredentials,
    ) -> RemoteFuture<'a, String>;
}

/// One provider per kind, picked by the credentials on each request.
#[derive(Clone, Default)]
pub struct RemoteProviders {
    providers: Vec<Arc<dyn RemoteProvider>>,
}

impl RemoteProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &RemoteProviderConfig) -> Result<Self, RemoteProviderError> {
        Ok(Self::new()
            .with(Arc::new(OpenAiCompatibleProvider::new(config)?))
            .with(Arc::new(AnthropicProvider::new(config)?))
            .with(Arc::new(GeminiProvider::new(config)?)))
    }

    /// Registers `provider`, replacing any earlier one of the same kind.
    pub fn with(mut self, provider: Arc<dyn RemoteProvider>) -> Self {
        self.providers
            .retain(|existing| existing.kind() != provider.kind());
        self.providers.push(provider);
        self
    }

    pub fn get(&self, kind: RemoteProviderKind) -> Result<&dyn RemoteProvider, RemoteProviderError> {
        self.providers
            .iter()
            .find(|provider| provider.kind() == kind)
            .map(|provider| provider.as_ref())
            .ok_or(RemoteProviderError::NotConfigured(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::{RemoteCredentials, RemoteProviderError, RemoteProviderKind};
    use crate::error::ErrorKind;

    #[test]
    fn debug_output_never_contains_the_key() {
        let credentials = RemoteCredentials::new(RemoteProviderKind::OpenAi, "sk-live-123456");
        let rendered = format!("{credentials:?}");

        assert!(!rendered.contains("sk-live-123456"));
        assert!(rendered.contains("[redacted]"));
    }

    #[test]
    fn blank_key_is_invalid_credentials() {
        let credentials = RemoteCredentials::new(RemoteProviderKind::Gemini, "   ");
        let err = credentials.api_key().expect_err("blank key must fail");

        assert!(matches!(err, RemoteProviderError::InvalidCredentials));
        assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
    }

    #[test]
    fn model_defaults_per_provider() {
        let credentials = RemoteCredentials::new(RemoteProviderKind::Anthropic, "key");
        assert_eq!(credentials.model(), "claude-3-5-haiku-latest");
        assert_eq!(credentials.with_model(" claude-opus ").model(), "claude-opus");
    }

    #[test]
    fn provider_names_parse_leniently() {
        assert_eq!(
            RemoteProviderKind::parse("OpenRouter"),
            Some(RemoteProviderKind::OpenAi)
        );
        assert_eq!(RemoteProviderKind::parse("mistral"), None);
    }
}
