use std::sync::LazyLock;

use jsonschema::JSONSchema;
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::sanitize::sanitize_field;
use crate::error::ErrorKind;

pub const DRAFT_COUNT: usize = 3;
pub const MAX_TYPE_CHARS: usize = 50;
pub const MAX_SUBJECT_CHARS: usize = 100;
pub const MIN_BODY_CHARS: usize = 10;
pub const MAX_BODY_CHARS: usize = 1_500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    #[serde(rename = "type")]
    pub r#type: String,
    pub subject: String,
    pub body: String,
}

/// Exactly three drafts, shortest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftSet([Draft; DRAFT_COUNT]);

impl DraftSet {
    pub fn new(drafts: [Draft; DRAFT_COUNT]) -> Self {
        Self(drafts)
    }

    pub fn as_slice(&self) -> &[Draft] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Draft> {
        self.0.iter()
    }

    pub fn into_inner(self) -> [Draft; DRAFT_COUNT] {
        self.0
    }
}

impl<'a> IntoIterator for &'a DraftSet {
    type Item = &'a Draft;
    type IntoIter = std::slice::Iter<'a, Draft>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Shape a capability or remote provider is asked to return.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DraftsContract {
    #[schemars(length(min = 3, max = 3))]
    pub drafts: Vec<DraftContractItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DraftContractItem {
    #[serde(rename = "type")]
    #[schemars(length(min = 1, max = 50))]
    pub kind: String,
    #[schemars(length(min = 1, max = 100))]
    pub subject: String,
    #[schemars(length(min = 10, max = 1500))]
    pub body: String,
}

#[derive(Debug, Error)]
pub enum DraftValidationError {
    #[error("model output contains no json object")]
    NoJsonObject,
    #[error("model output is not valid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("draft schema failed to compile: {0}")]
    SchemaCompile(String),
    #[error("draft output failed schema validation: {0:?}")]
    SchemaViolation(Vec<String>),
}

impl DraftValidationError {
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::SchemaInvalid
    }
}

pub fn drafts_schema() -> Value {
    serde_json::to_value(schema_for!(DraftsContract)).unwrap_or(Value::Null)
}

static DRAFTS_VALIDATOR: LazyLock<Result<JSONSchema, String>> = LazyLock::new(|| {
    JSONSchema::compile(&drafts_schema()).map_err(|err| err.to_string())
});

/// Substring from the first `{` to the last `}`, parsed as JSON. Models tend to
/// wrap the object in prose or code fences.
pub fn extract_json(raw: &str) -> Result<Value, DraftValidationError> {
    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        return Err(DraftValidationError::NoJsonObject);
    };
    if end < start {
        return Err(DraftValidationError::NoJsonObject);
    }

    Ok(serde_json::from_str(&raw[start..=end])?)
}

/// Accepts `payload` only when every draft passes; there is no partial acceptance.
/// Accepted fields are sanitized before they are returned.
pub fn validate_drafts(payload: &Value) -> Result<DraftSet, DraftValidationError> {
    let validator = DRAFTS_VALIDATOR
        .as_ref()
        .map_err(|message| DraftValidationError::SchemaCompile(message.clone()))?;

    if let Err(validation_errors) = validator.validate(payload) {
        let errors = validation_errors
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(DraftValidationError::SchemaViolation(errors));
    }

    let contract: DraftsContract = serde_json::from_value(payload.clone())?;
    let mut drafts = Vec::with_capacity(DRAFT_COUNT);
    for (index, item) in contract.drafts.into_iter().enumerate() {
        let draft = Draft {
            r#type: sanitize_field(&item.kind, MAX_TYPE_CHARS),
            subject: sanitize_field(&item.subject, MAX_SUBJECT_CHARS),
            body: sanitize_field(&item.body, MAX_BODY_CHARS),
        };
        if draft.r#type.is_empty()
            || draft.subject.is_empty()
            || draft.body.chars().count() < MIN_BODY_CHARS
        {
            return Err(DraftValidationError::SchemaViolation(vec![format!(
                "draft {index} is empty after sanitization"
            )]));
        }
        drafts.push(draft);
    }

    let drafts: [Draft; DRAFT_COUNT] = drafts.try_into().map_err(|drafts: Vec<Draft>| {
        DraftValidationError::SchemaViolation(vec![format!(
            "expected {DRAFT_COUNT} drafts, got {}",
            drafts.len()
        )])
    })?;
    Ok(DraftSet::new(drafts))
}
