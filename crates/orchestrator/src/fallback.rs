use serde::Serialize;

use crate::config::ContentLimits;
use crate::content::estimate_tokens;
use crate::models::{CapabilityStatus, OperationKind, ProcessingMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackTrigger {
    None,
    ModelUnavailable,
    ModelDownloading,
    ContentTooLarge,
    TokenLimitExceeded,
}

impl FallbackTrigger {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ModelUnavailable => "model_unavailable",
            Self::ModelDownloading => "model_downloading",
            Self::ContentTooLarge => "content_too_large",
            Self::TokenLimitExceeded => "token_limit_exceeded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackDecision {
    pub should_use_remote: bool,
    pub reason: String,
    pub trigger: FallbackTrigger,
}

impl FallbackDecision {
    fn local(reason: impl Into<String>, trigger: FallbackTrigger) -> Self {
        Self {
            should_use_remote: false,
            reason: reason.into(),
            trigger,
        }
    }

    fn remote(reason: impl Into<String>, trigger: FallbackTrigger) -> Self {
        Self {
            should_use_remote: true,
            reason: reason.into(),
            trigger,
        }
    }

    /// The local model is still downloading; the caller has to come back later
    /// instead of taking the remote path.
    pub fn must_wait(&self) -> bool {
        self.trigger == FallbackTrigger::ModelDownloading
    }
}

/// Chooses where an operation runs. Pure: the same inputs always give the same decision.
///
/// Device-only mode is checked before anything else and never yields a remote path.
pub fn decide(
    operation: OperationKind,
    mode: ProcessingMode,
    status: CapabilityStatus,
    content_length: usize,
    limits: &ContentLimits,
) -> FallbackDecision {
    if mode == ProcessingMode::DeviceOnly {
        return FallbackDecision::local("device-only mode", FallbackTrigger::None);
    }

    match status {
        CapabilityStatus::Unavailable | CapabilityStatus::Error | CapabilityStatus::Unknown => {
            return FallbackDecision::remote(
                format!("on-device model is {}", status.as_str()),
                FallbackTrigger::ModelUnavailable,
            );
        }
        CapabilityStatus::Downloading => {
            return FallbackDecision::local(
                "on-device model is downloading; wait and retry",
                FallbackTrigger::ModelDownloading,
            );
        }
        CapabilityStatus::Ready => {}
    }

    if content_length > limits.hard_cap_chars {
        return FallbackDecision::remote(
            format!(
                "content length {content_length} exceeds on-device limit of {} chars",
                limits.hard_cap_chars
            ),
            FallbackTrigger::ContentTooLarge,
        );
    }

    let estimated_tokens = estimate_tokens(content_length, limits.chars_per_token);
    let budget = limits.token_budget(operation);
    if estimated_tokens > budget {
        return FallbackDecision::remote(
            format!(
                "estimated {estimated_tokens} tokens exceeds {} budget of {budget}",
                operation.as_str()
            ),
            FallbackTrigger::TokenLimitExceeded,
        );
    }

    FallbackDecision::local("on-device processing", FallbackTrigger::None)
}
