use orchestrator::OperationOutput;
use orchestrator::drafts::{
    DRAFT_COUNT, MAX_BODY_CHARS, MAX_SUBJECT_CHARS, MAX_TYPE_CHARS, MIN_BODY_CHARS,
};
use orchestrator::models::{DraftSource, GeneratedDrafts};

use crate::case::QualityExpectations;

pub fn evaluate_quality(output: &OperationOutput, expectations: &QualityExpectations) -> Vec<String> {
    let mut issues = Vec::new();

    match output {
        OperationOutput::Summary(summary) => {
            require_non_empty_text("output.summary", &summary.summary, &mut issues);
            require_all_non_empty("output.key_points", &summary.key_points, &mut issues);
            require_min_len(
                "output.key_points",
                summary.key_points.len(),
                expectations.min_key_points,
                &mut issues,
            );
            require_contains(
                "output.summary",
                &summary.summary,
                &expectations.summary_contains,
                &mut issues,
            );
        }
        OperationOutput::Drafts(drafts) => check_drafts(drafts, &mut issues),
        OperationOutput::Attachment(analysis) => {
            require_non_empty_text("output.description", &analysis.description, &mut issues);
            require_contains(
                "output.description",
                &analysis.description,
                &expectations.description_contains,
                &mut issues,
            );
        }
    }

    issues
}

fn check_drafts(drafts: &GeneratedDrafts, issues: &mut Vec<String>) {
    let items = drafts.drafts.as_slice();
    if items.len() != DRAFT_COUNT {
        issues.push(format!(
            "output.drafts: expected {DRAFT_COUNT} drafts, got {}",
            items.len()
        ));
    }

    for (index, draft) in items.iter().enumerate() {
        require_char_range(
            &format!("output.drafts[{index}].type"),
            &draft.r#type,
            1,
            MAX_TYPE_CHARS,
            issues,
        );
        require_char_range(
            &format!("output.drafts[{index}].subject"),
            &draft.subject,
            1,
            MAX_SUBJECT_CHARS,
            issues,
        );
        require_char_range(
            &format!("output.drafts[{index}].body"),
            &draft.body,
            MIN_BODY_CHARS,
            MAX_BODY_CHARS,
            issues,
        );
    }

    match (drafts.source, drafts.warning.is_some()) {
        (DraftSource::DeterministicFallback, false) => {
            issues.push("output.warning: fallback drafts must carry a warning".to_string());
        }
        (DraftSource::ModelOutput, true) => {
            issues.push("output.warning: model drafts must not carry a warning".to_string());
        }
        _ => {}
    }
}

fn require_non_empty_text(field: &str, value: &str, issues: &mut Vec<String>) {
    if value.trim().is_empty() {
        issues.push(format!("{field}: must be non-empty"));
    }
}

fn require_all_non_empty(field: &str, values: &[String], issues: &mut Vec<String>) {
    for (index, value) in values.iter().enumerate() {
        if value.trim().is_empty() {
            issues.push(format!("{field}[{index}]: must be non-empty"));
        }
    }
}

fn require_min_len(
    field: &str,
    actual: usize,
    expected_min: Option<usize>,
    issues: &mut Vec<String>,
) {
    if let Some(expected_min) = expected_min
        && actual < expected_min
    {
        issues.push(format!(
            "{field}: expected at least {expected_min} items, got {actual}"
        ));
    }
}

fn require_char_range(field: &str, value: &str, min: usize, max: usize, issues: &mut Vec<String>) {
    let chars = value.chars().count();
    if chars < min || chars > max {
        issues.push(format!(
            "{field}: expected {min}..={max} chars, got {chars}"
        ));
    }
}

fn require_contains(field: &str, value: &str, needles: &[String], issues: &mut Vec<String>) {
    let haystack = value.to_lowercase();
    for needle in needles {
        if !haystack.contains(&needle.to_lowercase()) {
            issues.push(format!("{field}: expected to mention {needle:?}"));
        }
    }
}
