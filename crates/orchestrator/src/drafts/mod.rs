//! Reply drafts: prompt, raw model text, extracted JSON, schema check, and the
//! canned fallback used whenever the check fails. Every step is a plain function
//! so each transition can be tested on its own.

mod contract;
mod fallback;
mod prompt;
mod sanitize;

use serde_json::json;
use tracing::warn;

pub use contract::{
    DRAFT_COUNT, Draft, DraftSet, DraftValidationError, DraftsContract, MAX_BODY_CHARS,
    MAX_SUBJECT_CHARS, MAX_TYPE_CHARS, MIN_BODY_CHARS, drafts_schema, extract_json,
    validate_drafts,
};
pub use fallback::{reply_subject, synthesize_fallback};
pub use prompt::{DRAFT_SYSTEM_PROMPT, DraftContext, build_draft_prompt};
pub use sanitize::{clamp_chars, sanitize_field, sanitize_untrusted_text};

use crate::models::{DraftSource, GeneratedDrafts, Tone};

pub const FALLBACK_WARNING_UNPARSEABLE: &str =
    "The model's reply could not be used, so template drafts are shown instead.";
pub const FALLBACK_WARNING_NO_OUTPUT: &str =
    "The model did not produce a reply, so template drafts are shown instead.";

/// Final stage for text returned by a capability session. `None` means the
/// capability produced nothing usable; the result always holds three drafts.
pub fn resolve_drafts(raw_output: Option<&str>, tone: Tone, thread_subject: &str) -> GeneratedDrafts {
    let Some(raw_output) = raw_output else {
        return fallback_drafts(tone, thread_subject, FALLBACK_WARNING_NO_OUTPUT);
    };

    let validated = extract_json(raw_output).and_then(|payload| validate_drafts(&payload));
    accept_or_fallback(validated, tone, thread_subject)
}

/// Same stage for drafts a remote provider already parsed into structs.
pub fn resolve_provider_drafts(drafts: &[Draft], tone: Tone, thread_subject: &str) -> GeneratedDrafts {
    let payload = json!({ "drafts": drafts });
    accept_or_fallback(validate_drafts(&payload), tone, thread_subject)
}

fn accept_or_fallback(
    validated: Result<DraftSet, DraftValidationError>,
    tone: Tone,
    thread_subject: &str,
) -> GeneratedDrafts {
    match validated {
        Ok(drafts) => GeneratedDrafts {
            drafts,
            source: DraftSource::ModelOutput,
            warning: None,
        },
        Err(err) => {
            warn!(tone = tone.as_str(), "draft output rejected, using fallback drafts: {err}");
            fallback_drafts(tone, thread_subject, FALLBACK_WARNING_UNPARSEABLE)
        }
    }
}

pub fn fallback_drafts(tone: Tone, thread_subject: &str, warning: &str) -> GeneratedDrafts {
    GeneratedDrafts {
        drafts: synthesize_fallback(tone, thread_subject),
        source: DraftSource::DeterministicFallback,
        warning: Some(warning.to_string()),
    }
}
