use std::time::Duration;

use thiserror::Error;

use crate::config_env::{optional_trimmed_env, parse_number_env, parse_url_env};
use crate::models::OperationKind;

const DEFAULT_HARD_CAP_CHARS: usize = 32_000;
const DEFAULT_SUMMARIZE_TOKEN_BUDGET: usize = 4_000;
const DEFAULT_DRAFT_TOKEN_BUDGET: usize = 8_000;
const DEFAULT_ATTACHMENT_TOKEN_BUDGET: usize = 4_000;
const DEFAULT_CHARS_PER_TOKEN: usize = 4;
const DEFAULT_REMOTE_MAX_CHARS: usize = 100_000;
const DEFAULT_MIN_SUMMARY_CHARS: usize = 50;
const DEFAULT_TRUNCATION_RESERVE_CHARS: usize = 100;
const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 30;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 60_000;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_REMOTE_MAX_RETRIES: u32 = 0;
const MAX_REMOTE_RETRIES: u32 = 1;
const DEFAULT_REMOTE_RETRY_BACKOFF_MS: u64 = 250;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    MissingVar(String),
    #[error("invalid integer in env var {key}: {value}")]
    ParseInt { key: String, value: String },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Size and token thresholds consulted by the fallback policy.
///
/// These depend on the context window of whatever model backs the local
/// capability, so every value is overridable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentLimits {
    pub hard_cap_chars: usize,
    pub summarize_token_budget: usize,
    pub draft_token_budget: usize,
    pub attachment_token_budget: usize,
    pub chars_per_token: usize,
}

impl Default for ContentLimits {
    fn default() -> Self {
        Self {
            hard_cap_chars: DEFAULT_HARD_CAP_CHARS,
            summarize_token_budget: DEFAULT_SUMMARIZE_TOKEN_BUDGET,
            draft_token_budget: DEFAULT_DRAFT_TOKEN_BUDGET,
            attachment_token_budget: DEFAULT_ATTACHMENT_TOKEN_BUDGET,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl ContentLimits {
    pub fn token_budget(&self, operation: OperationKind) -> usize {
        match operation {
            OperationKind::Summarize => self.summarize_token_budget,
            OperationKind::Draft => self.draft_token_budget,
            OperationKind::AnalyzeAttachment => self.attachment_token_budget,
        }
    }

    /// Largest input the local capability accepts for `operation`.
    pub fn local_char_limit(&self, operation: OperationKind) -> usize {
        self.token_budget(operation)
            .saturating_mul(self.chars_per_token)
            .min(self.hard_cap_chars)
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub limits: ContentLimits,
    pub remote_max_chars: usize,
    pub min_summary_chars: usize,
    pub truncation_reserve_chars: usize,
    pub poll_interval_seconds: u64,
    pub operation_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            limits: ContentLimits::default(),
            remote_max_chars: DEFAULT_REMOTE_MAX_CHARS,
            min_summary_chars: DEFAULT_MIN_SUMMARY_CHARS,
            truncation_reserve_chars: DEFAULT_TRUNCATION_RESERVE_CHARS,
            poll_interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS,
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            limits: ContentLimits {
                hard_cap_chars: parse_number_env(
                    "THREADWISE_HARD_CAP_CHARS",
                    defaults.limits.hard_cap_chars,
                )?,
                summarize_token_budget: parse_number_env(
                    "THREADWISE_SUMMARIZE_TOKEN_BUDGET",
                    defaults.limits.summarize_token_budget,
                )?,
                draft_token_budget: parse_number_env(
                    "THREADWISE_DRAFT_TOKEN_BUDGET",
                    defaults.limits.draft_token_budget,
                )?,
                attachment_token_budget: parse_number_env(
                    "THREADWISE_ATTACHMENT_TOKEN_BUDGET",
                    defaults.limits.attachment_token_budget,
                )?,
                chars_per_token: parse_number_env(
                    "THREADWISE_CHARS_PER_TOKEN",
                    defaults.limits.chars_per_token,
                )?,
            },
            remote_max_chars: parse_number_env(
                "THREADWISE_REMOTE_MAX_CHARS",
                defaults.remote_max_chars,
            )?,
            min_summary_chars: parse_number_env(
                "THREADWISE_MIN_SUMMARY_CHARS",
                defaults.min_summary_chars,
            )?,
            truncation_reserve_chars: parse_number_env(
                "THREADWISE_TRUNCATION_RESERVE_CHARS",
                defaults.truncation_reserve_chars,
            )?,
            poll_interval_seconds: parse_number_env(
                "THREADWISE_POLL_INTERVAL_SECONDS",
                defaults.poll_interval_seconds,
            )?,
            operation_timeout_ms: parse_number_env(
                "THREADWISE_OPERATION_TIMEOUT_MS",
                defaults.operation_timeout_ms,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("THREADWISE_HARD_CAP_CHARS", self.limits.hard_cap_chars),
            (
                "THREADWISE_SUMMARIZE_TOKEN_BUDGET",
                self.limits.summarize_token_budget,
            ),
            ("THREADWISE_DRAFT_TOKEN_BUDGET", self.limits.draft_token_budget),
            (
                "THREADWISE_ATTACHMENT_TOKEN_BUDGET",
                self.limits.attachment_token_budget,
            ),
            ("THREADWISE_CHARS_PER_TOKEN", self.limits.chars_per_token),
            ("THREADWISE_REMOTE_MAX_CHARS", self.remote_max_chars),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "{key} must be greater than 0"
                )));
            }
        }
        if self.poll_interval_seconds == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "THREADWISE_POLL_INTERVAL_SECONDS must be greater than 0".to_string(),
            ));
        }
        if self.operation_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "THREADWISE_OPERATION_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }
        if self.remote_max_chars < self.limits.hard_cap_chars {
            return Err(ConfigError::InvalidConfiguration(
                "THREADWISE_REMOTE_MAX_CHARS must not be smaller than THREADWISE_HARD_CAP_CHARS"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[derive(Debug, Clone)]
pub struct RemoteProviderConfig {
    pub openai_base_url: String,
    pub anthropic_base_url: String,
    pub gemini_base_url: String,
    pub timeout_ms: u64,
    /// Extra attempts on a transient provider failure. Zero unless the caller opts in.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for RemoteProviderConfig {
    fn default() -> Self {
        Self {
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            anthropic_base_url: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            timeout_ms: DEFAULT_REMOTE_TIMEOUT_MS,
            max_retries: DEFAULT_REMOTE_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_REMOTE_RETRY_BACKOFF_MS,
        }
    }
}

impl RemoteProviderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            openai_base_url: parse_url_env(
                "THREADWISE_OPENAI_BASE_URL",
                &defaults.openai_base_url,
            )?,
            anthropic_base_url: parse_url_env(
                "THREADWISE_ANTHROPIC_BASE_URL",
                &defaults.anthropic_base_url,
            )?,
            gemini_base_url: parse_url_env(
                "THREADWISE_GEMINI_BASE_URL",
                &defaults.gemini_base_url,
            )?,
            timeout_ms: parse_number_env("THREADWISE_REMOTE_TIMEOUT_MS", defaults.timeout_ms)?,
            max_retries: parse_number_env("THREADWISE_REMOTE_MAX_RETRIES", defaults.max_retries)?,
            retry_backoff_ms: parse_number_env(
                "THREADWISE_REMOTE_RETRY_BACKOFF_MS",
                defaults.retry_backoff_ms,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidConfiguration(
                "THREADWISE_REMOTE_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }
        if self.max_retries > MAX_REMOTE_RETRIES {
            return Err(ConfigError::InvalidConfiguration(format!(
                "THREADWISE_REMOTE_MAX_RETRIES must be at most {MAX_REMOTE_RETRIES}"
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Reads a required variable, used by the eval harness for live credentials.
pub fn require_env(key: &str) -> Result<String, ConfigError> {
    optional_trimmed_env(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()))
}

pub fn optional_env(key: &str) -> Option<String> {
    optional_trimmed_env(key)
}
