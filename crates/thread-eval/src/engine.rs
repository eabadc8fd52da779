use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use orchestrator::attachment::{AttachmentContent, InMemoryAttachmentResolver};
use orchestrator::config::{
    ConfigError, OrchestratorConfig, RemoteProviderConfig, optional_env, require_env,
};
use orchestrator::models::{DraftSource, OperationRequest, OperationResult};
use orchestrator::remote::{
    RemoteCredentials, RemoteProviderError, RemoteProviderKind, RemoteProviders,
};
use orchestrator::{OperationOutput, Orchestrator};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info};

use crate::case::{AttachmentFixture, EvalCaseFixture};
use crate::cli::{CliOptions, EvalMode};
use crate::fixture_io::{FixtureIoError, FixtureStore};
use crate::mocked::{FixtureBackend, FixtureRemoteProvider};
use crate::quality::evaluate_quality;

const LIVE_PROVIDER_ENV: &str = "THREADWISE_REMOTE_PROVIDER";
const LIVE_API_KEY_ENV: &str = "THREADWISE_REMOTE_API_KEY";
const LIVE_MODEL_ENV: &str = "THREADWISE_REMOTE_MODEL";
const MOCKED_API_KEY: &str = "eval-mocked-key";

#[derive(Debug)]
pub struct EvalSummary {
    mode: EvalMode,
    update_goldens: bool,
    results: Vec<CaseResult>,
}

impl EvalSummary {
    pub fn has_failures(&self) -> bool {
        self.results
            .iter()
            .any(|result| !result.failures.is_empty())
    }

    pub fn print(&self) {
        println!(
            "Thread Eval Harness ({})",
            if self.update_goldens {
                "mocked/update-goldens"
            } else {
                self.mode.as_str()
            }
        );

        let mut passed = 0usize;
        for result in &self.results {
            if result.failures.is_empty() {
                passed += 1;
                println!("[PASS] {}: {}", result.case_id, result.description);
            } else {
                println!("[FAIL] {}: {}", result.case_id, result.description);
                for failure in &result.failures {
                    println!("  - {failure}");
                }
            }

            for note in &result.notes {
                println!("  * {note}");
            }
        }

        let total = self.results.len();
        let failed = total.saturating_sub(passed);
        println!(
            "Summary: {} total, {} passed, {} failed",
            total, passed, failed
        );
    }
}

#[derive(Debug)]
struct CaseResult {
    case_id: String,
    description: String,
    failures: Vec<String>,
    notes: Vec<String>,
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Fixtures(#[from] FixtureIoError),
    #[error("failed to read live configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to initialize remote providers in live mode: {0}")]
    RemoteProvider(#[from] RemoteProviderError),
    #[error("unknown remote provider in {LIVE_PROVIDER_ENV}: {0}")]
    UnknownProvider(String),
    #[error("live mode requires at least one fixture with include_in_live_smoke=true")]
    NoLiveCases,
    #[error("no fixture case matches {0}")]
    NoMatchingCases(String),
}

/// Remote providers and credentials shared by every case in a live run.
struct LiveRemote {
    config: OrchestratorConfig,
    providers: RemoteProviders,
    credentials: RemoteCredentials,
}

impl LiveRemote {
    fn from_env() -> Result<Self, EvalError> {
        let raw_provider = require_env(LIVE_PROVIDER_ENV)?;
        let provider = RemoteProviderKind::parse(&raw_provider)
            .ok_or(EvalError::UnknownProvider(raw_provider))?;
        let mut credentials = RemoteCredentials::new(provider, require_env(LIVE_API_KEY_ENV)?);
        if let Some(model) = optional_env(LIVE_MODEL_ENV) {
            credentials = credentials.with_model(model);
        }

        Ok(Self {
            config: OrchestratorConfig::from_env()?,
            providers: RemoteProviders::from_config(&RemoteProviderConfig::from_env()?)?,
            credentials,
        })
    }
}

pub async fn run_eval(options: &CliOptions) -> Result<EvalSummary, EvalError> {
    let store = FixtureStore::default();
    let mut cases = store.load_cases()?;

    cases.retain(|case| options.selects(&case.case_id, case.operation));
    if cases.is_empty() {
        return Err(EvalError::NoMatchingCases(options.describe_filters()));
    }

    let live = if options.mode == EvalMode::Live {
        cases.retain(|case| case.include_in_live_smoke);
        if cases.is_empty() {
            return Err(EvalError::NoLiveCases);
        }
        Some(LiveRemote::from_env()?)
    } else {
        None
    };

    info!(
        mode = options.mode.as_str(),
        cases = cases.len(),
        "running thread eval cases"
    );

    let mut results = Vec::with_capacity(cases.len());
    for case in &cases {
        let result = run_case(case, options, &store, live.as_ref()).await;
        results.push(result);
    }

    Ok(EvalSummary {
        mode: options.mode,
        update_goldens: options.update_goldens,
        results,
    })
}

async fn run_case(
    case: &EvalCaseFixture,
    options: &CliOptions,
    store: &FixtureStore,
    live: Option<&LiveRemote>,
) -> CaseResult {
    let mut failures = Vec::new();
    let mut notes = Vec::new();

    let (config, backend, remote, credentials) = match live {
        Some(live) => (
            live.config.clone(),
            FixtureBackend::unavailable(),
            live.providers.clone(),
            Some(live.credentials.clone()),
        ),
        None => {
            let mut remote = RemoteProviders::new();
            let mut credentials = None;
            if let Some(fixture) = &case.remote {
                remote = remote.with(Arc::new(FixtureRemoteProvider::new(fixture)));
                credentials = Some(RemoteCredentials::new(fixture.provider, MOCKED_API_KEY));
            }
            (
                OrchestratorConfig::default(),
                FixtureBackend::new(
                    case.capability_statuses.clone(),
                    &case.capability_outputs,
                ),
                remote,
                credentials,
            )
        }
    };

    let resolver = match attachment_resolver(case) {
        Ok(resolver) => resolver,
        Err(message) => {
            failures.push(format!("fixture: {message}"));
            return CaseResult {
                case_id: case.case_id.clone(),
                description: case.description.clone(),
                failures,
                notes,
            };
        }
    };

    let orchestrator = Orchestrator::new(config, Arc::new(backend), remote)
        .with_attachment_resolver(Arc::new(resolver));
    let request = build_request(case, credentials);
    let result = orchestrator.execute(&request).await;
    orchestrator.shutdown().await;
    debug!(case_id = %case.case_id, ok = result.is_ok(), "case finished");

    match options.mode {
        EvalMode::Mocked => check_expectations(case, &result, &mut failures),
        EvalMode::Live => check_live_smoke(&result, &mut failures),
    }
    if let OperationResult::Ok { value, .. } = &result {
        for issue in evaluate_quality(value, &case.expectations.quality) {
            failures.push(format!("quality: {issue}"));
        }
    }
    notes.push(describe_outcome(&result));

    if options.mode == EvalMode::Mocked {
        let snapshot = json!({
            "case_id": case.case_id,
            "description": case.description,
            "request": {
                "operation": request.kind,
                "processing_mode": request.processing_mode,
                "tone": request.tone,
                "guidance": request.guidance,
                "attachment_index": request.attachment_index,
                "remote_provider": request.remote_credentials.as_ref().map(|c| c.provider),
            },
            "result": result,
        });
        if options.update_goldens {
            match store.write_golden(&case.case_id, &snapshot) {
                Ok(path) => notes.push(format!("golden updated: {}", path.display())),
                Err(err) => failures.push(format!("golden_update: {err}")),
            }
        } else {
            compare_golden_snapshot(store, &case.case_id, &snapshot, &mut failures, &mut notes);
        }
    }

    CaseResult {
        case_id: case.case_id.clone(),
        description: case.description.clone(),
        failures,
        notes,
    }
}

fn build_request(case: &EvalCaseFixture, credentials: Option<RemoteCredentials>) -> OperationRequest {
    let mut request = OperationRequest::new(case.operation, case.thread(), case.processing_mode);
    if let Some(tone) = case.tone() {
        request = request.with_tone(tone);
    }
    if let Some(guidance) = &case.guidance {
        request = request.with_guidance(guidance);
    }
    if let Some(index) = case.attachment_index {
        request = request.with_attachment_index(index);
    }
    if let Some(credentials) = credentials {
        request = request.with_remote_credentials(credentials);
    }
    request
}

fn attachment_resolver(case: &EvalCaseFixture) -> Result<InMemoryAttachmentResolver, String> {
    let mut resolver = InMemoryAttachmentResolver::new();
    let Some(fixture) = &case.attachment_content else {
        return Ok(resolver);
    };

    let index = case.attachment_index.unwrap_or(0);
    let Some(attachment) = case.thread.attachments.get(index) else {
        return Err(format!("attachment_content given but no attachment at index {index}"));
    };

    let content = match fixture {
        AttachmentFixture::Text { text } => AttachmentContent::Text(text.clone()),
        AttachmentFixture::Image { base64, mime_type } => AttachmentContent::Image {
            bytes: STANDARD
                .decode(base64.trim())
                .map_err(|err| format!("attachment image is not valid base64: {err}"))?,
            mime_type: mime_type.clone(),
        },
    };
    resolver.insert(attachment.source_ref.clone(), content);
    Ok(resolver)
}

fn check_expectations(
    case: &EvalCaseFixture,
    result: &OperationResult<OperationOutput>,
    failures: &mut Vec<String>,
) {
    let expectations = &case.expectations;

    match (expectations.error_kind, result) {
        (Some(expected), OperationResult::Err { kind, message }) => {
            if *kind != expected {
                failures.push(format!(
                    "error_kind: expected={}, actual={}",
                    expected.as_str(),
                    kind.as_str()
                ));
            }
            for needle in &expectations.message_excludes {
                if message.contains(needle.as_str()) {
                    failures.push(format!("message: must not contain {needle:?}, got {message:?}"));
                }
            }
        }
        (Some(expected), OperationResult::Ok { .. }) => {
            failures.push(format!(
                "error_kind: expected={}, actual=ok",
                expected.as_str()
            ));
        }
        (None, OperationResult::Err { kind, message }) => {
            failures.push(format!(
                "outcome: expected ok, got {} ({message})",
                kind.as_str()
            ));
        }
        (None, OperationResult::Ok { .. }) => {}
    }

    if let Some(expected) = expectations.used_fallback_provider
        && result.is_ok()
        && result.used_fallback_provider() != expected
    {
        failures.push(format!(
            "used_fallback_provider: expected={expected}, actual={}",
            result.used_fallback_provider()
        ));
    }

    if let Some(OperationOutput::Drafts(drafts)) = result.value() {
        if let Some(expected) = expectations.draft_source
            && drafts.source != expected
        {
            failures.push(format!(
                "draft_source: expected={}, actual={}",
                expected.as_str(),
                drafts.source.as_str()
            ));
        }
        if let Some(expected) = expectations.expect_warning
            && drafts.warning.is_some() != expected
        {
            failures.push(format!(
                "warning: expected present={expected}, actual={:?}",
                drafts.warning
            ));
        }
    }
}

/// Live runs always go through the remote provider, so the only expectation is
/// a usable model answer.
fn check_live_smoke(result: &OperationResult<OperationOutput>, failures: &mut Vec<String>) {
    match result {
        OperationResult::Err { kind, message } => {
            failures.push(format!("provider_request: {} ({message})", kind.as_str()));
        }
        OperationResult::Ok {
            value,
            used_fallback_provider,
        } => {
            if !used_fallback_provider {
                failures.push("used_fallback_provider: live smoke must use the remote provider".to_string());
            }
            if let OperationOutput::Drafts(drafts) = value
                && drafts.source != DraftSource::ModelOutput
            {
                failures.push(format!(
                    "draft_source: live smoke requires model_output, got {}",
                    drafts.source.as_str()
                ));
            }
        }
    }
}

fn describe_outcome(result: &OperationResult<OperationOutput>) -> String {
    match result {
        OperationResult::Ok {
            value,
            used_fallback_provider,
        } => {
            let path = if *used_fallback_provider { "remote" } else { "on-device" };
            match value {
                OperationOutput::Drafts(drafts) => {
                    format!("ok via {path}, drafts from {}", drafts.source.as_str())
                }
                OperationOutput::Summary(summary) => {
                    format!("ok via {path}, {} key points", summary.key_points.len())
                }
                OperationOutput::Attachment(analysis) => {
                    format!("ok via {path}, {} attachment", analysis.kind.as_str())
                }
            }
        }
        OperationResult::Err { kind, message } if kind.is_retryable() => {
            format!("{} (retry later): {message}", kind.as_str())
        }
        OperationResult::Err { kind, message } => format!("{}: {message}", kind.as_str()),
    }
}

fn compare_golden_snapshot(
    store: &FixtureStore,
    case_id: &str,
    actual: &Value,
    failures: &mut Vec<String>,
    notes: &mut Vec<String>,
) {
    let path = store.golden_path(case_id);
    match store.read_golden(case_id) {
        Ok(expected) if expected == *actual => {}
        Ok(_) => failures.push(format!(
            "golden_snapshot: mismatch for {} (rerun with --update-goldens to intentionally refresh)",
            path.display()
        )),
        Err(err) if err.is_not_found() => notes.push(format!(
            "golden_snapshot: none recorded at {} (rerun with --update-goldens)",
            path.display()
        )),
        Err(err) => failures.push(format!("golden_snapshot: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use orchestrator::models::OperationKind;

    use super::run_eval;
    use crate::cli::{CliOptions, EvalMode};

    #[tokio::test]
    async fn mocked_fixtures_meet_their_expectations() {
        let options = CliOptions {
            mode: EvalMode::Mocked,
            update_goldens: false,
            case_filter: None,
            operation_filter: None,
        };

        let summary = run_eval(&options).await.expect("fixtures should load");

        let failing = summary
            .results
            .iter()
            .filter(|result| !result.failures.is_empty())
            .map(|result| format!("{}: {:?}", result.case_id, result.failures))
            .collect::<Vec<_>>();
        assert!(failing.is_empty(), "{failing:#?}");
        assert!(summary.results.len() >= 10);
    }

    #[tokio::test]
    async fn case_filter_without_matches_is_an_error() {
        let options = CliOptions {
            mode: EvalMode::Mocked,
            update_goldens: false,
            case_filter: Some("no_such_case".to_string()),
            operation_filter: None,
        };

        assert!(run_eval(&options).await.is_err());
    }

    #[tokio::test]
    async fn operation_filter_keeps_only_that_operation() {
        let options = CliOptions {
            mode: EvalMode::Mocked,
            update_goldens: false,
            case_filter: None,
            operation_filter: Some(OperationKind::AnalyzeAttachment),
        };

        let summary = run_eval(&options).await.expect("fixtures should load");

        assert!(!summary.results.is_empty());
        assert!(
            summary
                .results
                .iter()
                .all(|result| result.case_id.starts_with("attachment_"))
        );
    }
}
