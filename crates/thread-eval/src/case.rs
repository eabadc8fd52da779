use std::collections::BTreeMap;

use orchestrator::ErrorKind;
use orchestrator::models::{
    CapabilityKind, CapabilityStatus, DraftSource, OperationKind, ProcessingMode, Thread, Tone,
};
use orchestrator::remote::RemoteProviderKind;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct EvalCaseFixture {
    pub case_id: String,
    pub description: String,
    pub operation: OperationKind,
    #[serde(default)]
    pub processing_mode: ProcessingMode,
    #[serde(default)]
    pub include_in_live_smoke: bool,
    pub thread: Thread,
    /// Repeats the last message body until the thread body reaches this many
    /// characters, for oversized-content cases.
    #[serde(default)]
    pub pad_last_message_to_chars: Option<usize>,
    /// Free-form tone name, read the way a client request would be.
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub guidance: Option<String>,
    #[serde(default)]
    pub attachment_index: Option<usize>,
    #[serde(default)]
    pub attachment_content: Option<AttachmentFixture>,
    /// Capabilities missing here report `ready`.
    #[serde(default)]
    pub capability_statuses: BTreeMap<CapabilityKind, CapabilityStatus>,
    #[serde(default)]
    pub capability_outputs: BTreeMap<CapabilityKind, Vec<ScriptedOutput>>,
    #[serde(default)]
    pub remote: Option<MockedRemoteFixture>,
    pub expectations: CaseExpectations,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttachmentFixture {
    Text { text: String },
    Image { base64: String, mime_type: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ScriptedOutput {
    Text(String),
    Error(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct MockedRemoteFixture {
    #[serde(default = "default_remote_provider")]
    pub provider: RemoteProviderKind,
    pub response: MockedRemoteResponse,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MockedRemoteResponse {
    /// Raw provider text; summaries and drafts are parsed from it as JSON.
    Text(String),
    HttpError(u16),
    InvalidCredentials,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaseExpectations {
    #[serde(default)]
    pub error_kind: Option<ErrorKind>,
    #[serde(default)]
    pub used_fallback_provider: Option<bool>,
    #[serde(default)]
    pub draft_source: Option<DraftSource>,
    #[serde(default)]
    pub expect_warning: Option<bool>,
    #[serde(default)]
    pub message_excludes: Vec<String>,
    #[serde(default)]
    pub quality: QualityExpectations,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QualityExpectations {
    #[serde(default)]
    pub min_key_points: Option<usize>,
    #[serde(default)]
    pub summary_contains: Vec<String>,
    #[serde(default)]
    pub description_contains: Vec<String>,
}

fn default_remote_provider() -> RemoteProviderKind {
    RemoteProviderKind::OpenAi
}

impl EvalCaseFixture {
    pub fn tone(&self) -> Option<Tone> {
        self.tone.as_deref().map(Tone::parse_lenient)
    }

    /// The fixture thread with any requested padding applied.
    pub fn thread(&self) -> Thread {
        let mut thread = self.thread.clone();
        let Some(target) = self.pad_last_message_to_chars else {
            return thread;
        };

        let current = thread
            .messages
            .iter()
            .map(|message| message.body.chars().count())
            .sum::<usize>();
        if let Some(last) = thread.messages.last_mut() {
            let seed = last.body.clone();
            if seed.is_empty() {
                return thread;
            }
            let mut total = current;
            while total < target {
                last.body.push(' ');
                last.body.push_str(&seed);
                total += seed.chars().count() + 1;
            }
        }
        thread
    }
}

#[cfg(test)]
mod tests {
    use orchestrator::models::Tone;

    use super::EvalCaseFixture;

    fn minimal_case(tone: &str) -> EvalCaseFixture {
        serde_json::from_value(serde_json::json!({
            "case_id": "tone",
            "description": "tone",
            "operation": "draft",
            "tone": tone,
            "thread": { "subject": "Tone", "messages": [] },
            "expectations": {}
        }))
        .expect("fixture should deserialize")
    }

    #[test]
    fn tone_names_are_read_leniently() {
        assert_eq!(minimal_case(" Warm ").tone(), Some(Tone::Friendly));
        assert_eq!(minimal_case("FORMAL").tone(), Some(Tone::Formal));
        assert_eq!(minimal_case("pirate").tone(), Some(Tone::Professional));
    }

    #[test]
    fn padding_grows_the_last_message_past_the_target() {
        let case: EvalCaseFixture = serde_json::from_value(serde_json::json!({
            "case_id": "padding",
            "description": "padding",
            "operation": "summarize",
            "pad_last_message_to_chars": 500,
            "thread": {
                "subject": "Padding",
                "messages": [
                    { "sender_name": "Ana", "body": "first message" },
                    { "sender_name": "Ben", "body": "second message body" }
                ]
            },
            "expectations": {}
        }))
        .expect("fixture should deserialize");

        let thread = case.thread();
        let total = thread
            .messages
            .iter()
            .map(|message| message.body.chars().count())
            .sum::<usize>();

        assert!(total >= 500);
        assert_eq!(thread.messages[0].body, "first message");
        assert!(thread.messages[1].body.starts_with("second message body second"));
    }
}
