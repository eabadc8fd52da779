use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::drafts::DraftSet;
use crate::error::ErrorKind;
use crate::remote::RemoteCredentials;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender_name: String,
    pub body: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub subject: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Pdf,
    Docx,
    Xlsx,
}

impl AttachmentKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Xlsx => "xlsx",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub kind: AttachmentKind,
    pub size_bytes: u64,
    pub source_ref: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Summarize,
    Generate,
    Translate,
    AnalyzeImage,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 4] = [
        Self::Summarize,
        Self::Generate,
        Self::Translate,
        Self::AnalyzeImage,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Summarize => "summarize",
            Self::Generate => "generate",
            Self::Translate => "translate",
            Self::AnalyzeImage => "analyze_image",
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityStatus {
    Ready,
    Downloading,
    Unavailable,
    Unknown,
    Error,
}

impl CapabilityStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Downloading => "downloading",
            Self::Unavailable => "unavailable",
            Self::Unknown => "unknown",
            Self::Error => "error",
        }
    }

    /// Whether a poll reporting `next` may replace `self` in the cache.
    ///
    /// Nothing returns to `unknown` once a probe has answered, and a ready
    /// capability does not fall back to downloading within one polling session.
    pub const fn can_transition_to(self, next: CapabilityStatus) -> bool {
        !matches!(
            (self, next),
            (Self::Ready, Self::Downloading)
                | (Self::Ready, Self::Unknown)
                | (Self::Downloading, Self::Unknown)
                | (Self::Unavailable, Self::Unknown)
                | (Self::Error, Self::Unknown)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    DeviceOnly,
    #[default]
    Hybrid,
}

impl ProcessingMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeviceOnly => "device_only",
            Self::Hybrid => "hybrid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Summarize,
    Draft,
    AnalyzeAttachment,
}

impl OperationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Summarize => "summarize",
            Self::Draft => "draft",
            Self::AnalyzeAttachment => "analyze_attachment",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Professional,
    Friendly,
    Formal,
    Casual,
}

impl Tone {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Professional => "professional",
            Self::Friendly => "friendly",
            Self::Formal => "formal",
            Self::Casual => "casual",
        }
    }

    /// Unrecognized tones fall back to the default rather than failing the request.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "friendly" | "warm" => Self::Friendly,
            "formal" => Self::Formal,
            "casual" | "informal" => Self::Casual,
            _ => Self::Professional,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub kind: OperationKind,
    pub thread: Thread,
    pub tone: Option<Tone>,
    pub guidance: Option<String>,
    pub processing_mode: ProcessingMode,
    pub remote_credentials: Option<RemoteCredentials>,
    /// Which of `thread.attachments` to analyze; defaults to the first one.
    pub attachment_index: Option<usize>,
}

impl OperationRequest {
    pub fn new(kind: OperationKind, thread: Thread, processing_mode: ProcessingMode) -> Self {
        Self {
            kind,
            thread,
            tone: None,
            guidance: None,
            processing_mode,
            remote_credentials: None,
            attachment_index: None,
        }
    }

    pub fn with_tone(mut self, tone: Tone) -> Self {
        self.tone = Some(tone);
        self
    }

    pub fn with_guidance(mut self, guidance: impl AsRef<str>) -> Self {
        let trimmed = guidance.as_ref().trim();
        if !trimmed.is_empty() {
            self.guidance = Some(trimmed.to_string());
        }
        self
    }

    pub fn with_remote_credentials(mut self, credentials: RemoteCredentials) -> Self {
        self.remote_credentials = Some(credentials);
        self
    }

    pub fn with_attachment_index(mut self, index: usize) -> Self {
        self.attachment_index = Some(index);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub summary: String,
    pub key_points: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftSource {
    ModelOutput,
    DeterministicFallback,
}

impl DraftSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ModelOutput => "model_output",
            Self::DeterministicFallback => "deterministic_fallback",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedDrafts {
    pub drafts: DraftSet,
    pub source: DraftSource,
    /// Set whenever the drafts were synthesized instead of taken from a capability.
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentAnalysis {
    pub attachment_name: String,
    pub kind: AttachmentKind,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OperationResult<T> {
    Ok {
        value: T,
        used_fallback_provider: bool,
    },
    Err {
        kind: ErrorKind,
        message: String,
    },
}

impl<T> OperationResult<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Ok { value, .. } => Some(value),
            Self::Err { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Ok { .. } => None,
            Self::Err { kind, .. } => Some(*kind),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationResult<U> {
        match self {
            Self::Ok {
                value,
                used_fallback_provider,
            } => OperationResult::Ok {
                value: f(value),
                used_fallback_provider,
            },
            Self::Err { kind, message } => OperationResult::Err { kind, message },
        }
    }

    pub fn used_fallback_provider(&self) -> bool {
        matches!(
            self,
            Self::Ok {
                used_fallback_provider: true,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{CapabilityStatus, Tone};

    #[test]
    fn ready_never_regresses_to_downloading() {
        assert!(!CapabilityStatus::Ready.can_transition_to(CapabilityStatus::Downloading));
        assert!(CapabilityStatus::Ready.can_transition_to(CapabilityStatus::Unavailable));
        assert!(CapabilityStatus::Downloading.can_transition_to(CapabilityStatus::Ready));
    }

    #[test]
    fn answered_statuses_never_return_to_unknown() {
        for status in [
            CapabilityStatus::Ready,
            CapabilityStatus::Downloading,
            CapabilityStatus::Unavailable,
            CapabilityStatus::Error,
        ] {
            assert!(!status.can_transition_to(CapabilityStatus::Unknown));
        }
        assert!(CapabilityStatus::Unknown.can_transition_to(CapabilityStatus::Downloading));
    }

    #[test]
    fn tone_parsing_defaults_to_professional() {
        assert_eq!(Tone::parse_lenient(" Friendly "), Tone::Friendly);
        assert_eq!(Tone::parse_lenient("sarcastic"), Tone::Professional);
    }
}
