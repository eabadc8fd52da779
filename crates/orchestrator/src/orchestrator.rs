use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::attachment::{AttachmentContent, AttachmentResolver};
use crate::capability::{
    CapabilityBackend, CapabilityError, CapabilityInput, CapabilityRegistry, SessionConfig,
    SummaryLength, SummaryStyle,
};
use crate::config::OrchestratorConfig;
use crate::content::{body_char_len, char_len, flatten, truncate_with_reserve};
use crate::drafts::{
    DRAFT_SYSTEM_PROMPT, DraftContext, FALLBACK_WARNING_NO_OUTPUT, build_draft_prompt,
    fallback_drafts, resolve_drafts, resolve_provider_drafts, sanitize_field,
};
use crate::error::{ErrorKind, OrchestratorError};
use crate::fallback::{self, FallbackTrigger};
use crate::models::{
    AttachmentAnalysis, CapabilityKind, CapabilityStatus, GeneratedDrafts, OperationKind,
    OperationRequest, OperationResult, ProcessingMode, Summary, Tone,
};
use crate::remote::{
    IMAGE_DESCRIPTION_INSTRUCTION, RemoteCredentials, RemoteImage, RemoteProvider,
    RemoteProviderError, RemoteProviders, RemoteSummary,
};
use crate::sanitizer;
use crate::session::{SessionManager, SessionRetention};
use crate::telemetry::{ExecutionPath, OperationTimer, ProviderHealth};

const DRAFT_TEMPERATURE_MILLI: u32 = 700;
const MAX_KEY_POINTS: usize = 8;
const MAX_DESCRIPTION_CHARS: usize = 2_000;
const MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;
const ATTACHMENT_SHARED_CONTEXT: &str = "The text comes from a file attached to an email.";

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OperationOutput {
    Summary(Summary),
    Drafts(GeneratedDrafts),
    Attachment(AttachmentAnalysis),
}

/// Where one operation ended up running and why.
#[derive(Debug, Clone, Copy)]
struct OperationTrace {
    path: ExecutionPath,
    trigger: FallbackTrigger,
    /// The remote call failed but the operation still produced a result.
    remote_failed: bool,
}

impl OperationTrace {
    fn new() -> Self {
        Self {
            path: ExecutionPath::None,
            trigger: FallbackTrigger::None,
            remote_failed: false,
        }
    }
}

enum Route<'a> {
    Local,
    Remote {
        provider: &'a dyn RemoteProvider,
        credentials: &'a RemoteCredentials,
    },
}

/// Entry point for every AI feature. Picks the execution path per request, runs
/// it, and turns every failure into a sanitized [`OperationResult::Err`].
pub struct Orchestrator {
    config: OrchestratorConfig,
    backend: Arc<dyn CapabilityBackend>,
    registry: Arc<CapabilityRegistry>,
    sessions: SessionManager,
    remote: RemoteProviders,
    attachments: Option<Arc<dyn AttachmentResolver>>,
    provider_health: ProviderHealth,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        backend: Arc<dyn CapabilityBackend>,
        remote: RemoteProviders,
    ) -> Self {
        let registry = Arc::new(CapabilityRegistry::new(
            Arc::clone(&backend),
            config.poll_interval(),
        ));

        Self {
            config,
            backend,
            registry,
            sessions: SessionManager::new(),
            remote,
            attachments: None,
            provider_health: ProviderHealth::default(),
        }
    }

    pub fn with_attachment_resolver(mut self, resolver: Arc<dyn AttachmentResolver>) -> Self {
        self.attachments = Some(resolver);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn provider_health(&self) -> &ProviderHealth {
        &self.provider_health
    }

    /// Stops the poll loop and destroys every cached session.
    pub async fn shutdown(&self) {
        self.registry.stop_polling();
        self.sessions.release_all().await;
    }

    pub async fn execute(&self, request: &OperationRequest) -> OperationResult<OperationOutput> {
        match request.kind {
            OperationKind::Summarize => self.summarize(request).await.map(OperationOutput::Summary),
            OperationKind::Draft => self.draft(request).await.map(OperationOutput::Drafts),
            OperationKind::AnalyzeAttachment => self
                .analyze_attachment(request)
                .await
                .map(OperationOutput::Attachment),
        }
    }

    pub async fn summarize(&self, request: &OperationRequest) -> OperationResult<Summary> {
        let timer = OperationTimer::start(OperationKind::Summarize);
        let mut trace = OperationTrace::new();
        let result = self.run_summarize(request, &mut trace).await;
        self.finish(&timer, &trace, result, |_| None)
    }

    /// Always yields three drafts unless the request itself cannot be served:
    /// an unusable capability response is replaced with canned drafts.
    pub async fn draft(&self, request: &OperationRequest) -> OperationResult<GeneratedDrafts> {
        let timer = OperationTimer::start(OperationKind::Draft);
        let mut trace = OperationTrace::new();
        let result = self.run_draft(request, &mut trace).await;
        self.finish(&timer, &trace, result, |drafts| Some(drafts.source.as_str()))
    }

    pub async fn analyze_attachment(
        &self,
        request: &OperationRequest,
    ) -> OperationResult<AttachmentAnalysis> {
        let timer = OperationTimer::start(OperationKind::AnalyzeAttachment);
        let mut trace = OperationTrace::new();
        let result = self.run_analyze_attachment(request, &mut trace).await;
        self.finish(&timer, &trace, result, |analysis| Some(analysis.kind.as_str()))
    }

    async fn run_summarize(
        &self,
        request: &OperationRequest,
        trace: &mut OperationTrace,
    ) -> Result<Summary, OrchestratorError> {
        let body_chars = body_char_len(&request.thread);
        if body_chars < self.config.min_summary_chars {
            return Err(OrchestratorError::ContentTooShort {
                operation: OperationKind::Summarize.as_str(),
                actual: body_chars,
                minimum: self.config.min_summary_chars,
            });
        }

        let text = flatten(&request.thread);
        let route = self
            .plan(
                request,
                OperationKind::Summarize,
                CapabilityKind::Summarize,
                char_len(&text),
                trace,
            )
            .await?;

        match route {
            Route::Remote {
                provider,
                credentials,
            } => self.summarize_remote(provider, credentials, &text).await,
            Route::Local => match self.summarize_local(&text).await {
                Ok(summary) => Ok(summary),
                Err(err) => {
                    let (provider, credentials) = self.remote_fallback(request, &err)?;
                    trace.path = ExecutionPath::Remote(provider.kind());
                    self.summarize_remote(provider, credentials, &text).await
                }
            },
        }
    }

    async fn summarize_local(&self, text: &str) -> Result<Summary, CapabilityError> {
        let prepared = self.prepare_local(text, OperationKind::Summarize);
        let summary = self
            .invoke_local(
                &SessionConfig::summarizer(SummaryStyle::Tldr, SummaryLength::Medium),
                SessionRetention::KeepWarm,
                CapabilityInput::Text(prepared.clone()),
            )
            .await?;

        let key_points = match self
            .invoke_local(
                &SessionConfig::summarizer(SummaryStyle::KeyPoints, SummaryLength::Medium),
                SessionRetention::KeepWarm,
                CapabilityInput::Text(prepared),
            )
            .await
        {
            Ok(raw) => parse_key_points(&raw),
            Err(err) => {
                warn!(
                    operation = "summarize",
                    "key point extraction failed, returning summary only: {err}"
                );
                Vec::new()
            }
        };

        Ok(Summary {
            summary: summary.trim().to_string(),
            key_points,
        })
    }

    async fn summarize_remote(
        &self,
        provider: &dyn RemoteProvider,
        credentials: &RemoteCredentials,
        text: &str,
    ) -> Result<Summary, OrchestratorError> {
        let prepared = self.prepare_remote(text);
        let RemoteSummary {
            summary,
            key_points,
        } = provider.summarize(&prepared, credentials).await?;

        Ok(Summary {
            summary: summary.trim().to_string(),
            key_points: key_points
                .iter()
                .map(|point| point.trim())
                .filter(|point| !point.is_empty())
                .take(MAX_KEY_POINTS)
                .map(str::to_string)
                .collect(),
        })
    }

    async fn run_draft(
        &self,
        request: &OperationRequest,
        trace: &mut OperationTrace,
    ) -> Result<GeneratedDrafts, OrchestratorError> {
        let thread = &request.thread;
        let tone = request.tone.unwrap_or_default();
        let body_chars = body_char_len(thread);
        if body_chars == 0 {
            return Err(OrchestratorError::ContentTooShort {
                operation: OperationKind::Draft.as_str(),
                actual: 0,
                minimum: 1,
            });
        }

        let text = flatten(thread);
        let route = self
            .plan(
                request,
                OperationKind::Draft,
                CapabilityKind::Generate,
                char_len(&text),
                trace,
            )
            .await?;
        let context = DraftContext::from_thread(thread);

        let (provider, credentials) = match route {
            Route::Remote {
                provider,
                credentials,
            } => (provider, credentials),
            Route::Local => {
                let prepared = self.prepare_local(&text, OperationKind::Draft);
                let prompt = build_draft_prompt(
                    tone,
                    request.guidance.as_deref(),
                    &context.clone().with_excerpt(prepared),
                    &thread.subject,
                );
                let session = SessionConfig::LanguageModel {
                    system_prompt: DRAFT_SYSTEM_PROMPT.to_string(),
                    temperature_milli: DRAFT_TEMPERATURE_MILLI,
                };

                match self
                    .invoke_local(
                        &session,
                        SessionRetention::SingleUse,
                        CapabilityInput::Text(prompt),
                    )
                    .await
                {
                    Ok(raw) => return Ok(resolve_drafts(Some(&raw), tone, &thread.subject)),
                    Err(err) => match self.remote_fallback(request, &err) {
                        Ok(remote) => {
                            trace.path = ExecutionPath::Remote(remote.0.kind());
                            remote
                        }
                        Err(_) => {
                            warn!(
                                operation = "draft",
                                "language model failed, using fallback drafts: {err}"
                            );
                            return Ok(resolve_drafts(None, tone, &thread.subject));
                        }
                    },
                }
            }
        };

        let prepared = self.prepare_remote(&text);
        let prompt = build_draft_prompt(
            tone,
            request.guidance.as_deref(),
            &context.with_excerpt(prepared),
            &thread.subject,
        );
        self.draft_remote(provider, credentials, &prompt, tone, &thread.subject, trace)
            .await
    }

    async fn draft_remote(
        &self,
        provider: &dyn RemoteProvider,
        credentials: &RemoteCredentials,
        prompt: &str,
        tone: Tone,
        subject: &str,
        trace: &mut OperationTrace,
    ) -> Result<GeneratedDrafts, OrchestratorError> {
        match provider.generate_drafts(prompt, credentials).await {
            Ok(drafts) => Ok(resolve_provider_drafts(&drafts, tone, subject)),
            Err(RemoteProviderError::InvalidCredentials) => {
                Err(RemoteProviderError::InvalidCredentials.into())
            }
            Err(err) => {
                warn!(
                    operation = "draft",
                    provider = %provider.kind(),
                    "remote draft generation failed, using fallback drafts: {err}"
                );
                trace.remote_failed = true;
                Ok(fallback_drafts(tone, subject, FALLBACK_WARNING_NO_OUTPUT))
            }
        }
    }

    async fn run_analyze_attachment(
        &self,
        request: &OperationRequest,
        trace: &mut OperationTrace,
    ) -> Result<AttachmentAnalysis, OrchestratorError> {
        let index = request.attachment_index.unwrap_or(0);
        let attachment = request
            .thread
            .attachments
            .get(index)
            .ok_or(OrchestratorError::MissingAttachment(index))?;
        let resolver = self
            .attachments
            .as_ref()
            .ok_or_else(|| OrchestratorError::Internal {
                operation: OperationKind::AnalyzeAttachment,
                message: "no attachment resolver is configured".to_string(),
            })?;

        let description = match resolver.resolve(attachment).await? {
            AttachmentContent::Image { bytes, mime_type } => {
                let image = RemoteImage {
                    bytes,
                    mime_type,
                    instruction: IMAGE_DESCRIPTION_INSTRUCTION.to_string(),
                };
                self.describe_image(request, image, trace).await?
            }
            AttachmentContent::Text(text) => self.describe_document(request, &text, trace).await?,
        };

        Ok(AttachmentAnalysis {
            attachment_name: attachment.name.clone(),
            kind: attachment.kind,
            description: sanitize_field(&description, MAX_DESCRIPTION_CHARS),
        })
    }

    async fn describe_image(
        &self,
        request: &OperationRequest,
        image: RemoteImage,
        trace: &mut OperationTrace,
    ) -> Result<String, OrchestratorError> {
        if image.bytes.len() > MAX_IMAGE_BYTES {
            return Err(OrchestratorError::ContentTooLarge {
                actual: image.bytes.len(),
                limit: MAX_IMAGE_BYTES,
                unit: "bytes",
            });
        }

        let route = self
            .plan(
                request,
                OperationKind::AnalyzeAttachment,
                CapabilityKind::AnalyzeImage,
                0,
                trace,
            )
            .await?;

        if let Route::Remote {
            provider,
            credentials,
        } = route
        {
            return Ok(provider.describe_image(&image, credentials).await?);
        }

        let session = SessionConfig::ImageAnalyzer {
            instruction: image.instruction.clone(),
        };
        let input = CapabilityInput::Image {
            bytes: image.bytes.clone(),
            mime_type: image.mime_type.clone(),
            instruction: image.instruction.clone(),
        };
        match self
            .invoke_local(&session, SessionRetention::SingleUse, input)
            .await
        {
            Ok(description) => Ok(description),
            Err(err) => {
                let (provider, credentials) = self.remote_fallback(request, &err)?;
                trace.path = ExecutionPath::Remote(provider.kind());
                Ok(provider.describe_image(&image, credentials).await?)
            }
        }
    }

    async fn describe_document(
        &self,
        request: &OperationRequest,
        text: &str,
        trace: &mut OperationTrace,
    ) -> Result<String, OrchestratorError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(OrchestratorError::ContentTooShort {
                operation: OperationKind::AnalyzeAttachment.as_str(),
                actual: 0,
                minimum: 1,
            });
        }

        let route = self
            .plan(
                request,
                OperationKind::AnalyzeAttachment,
                CapabilityKind::Summarize,
                char_len(text),
                trace,
            )
            .await?;

        if let Route::Remote {
            provider,
            credentials,
        } = route
        {
            let summary = provider
                .summarize(&self.prepare_remote(text), credentials)
                .await?;
            return Ok(describe_remote_summary(summary));
        }

        let session = SessionConfig::Summarizer {
            style: SummaryStyle::Tldr,
            length: SummaryLength::Medium,
            shared_context: Some(ATTACHMENT_SHARED_CONTEXT.to_string()),
        };
        let prepared = self.prepare_local(text, OperationKind::AnalyzeAttachment);
        match self
            .invoke_local(
                &session,
                SessionRetention::KeepWarm,
                CapabilityInput::Text(prepared),
            )
            .await
        {
            Ok(description) => Ok(description),
            Err(err) => {
                let (provider, credentials) = self.remote_fallback(request, &err)?;
                trace.path = ExecutionPath::Remote(provider.kind());
                let summary = provider
                    .summarize(&self.prepare_remote(text), credentials)
                    .await?;
                Ok(describe_remote_summary(summary))
            }
        }
    }

    /// Resolves the execution path for one operation. Errors here are the
    /// non-recoverable cases: a downloading model, or no usable path at all.
    async fn plan<'a>(
        &'a self,
        request: &'a OperationRequest,
        operation: OperationKind,
        capability: CapabilityKind,
        content_length: usize,
        trace: &mut OperationTrace,
    ) -> Result<Route<'a>, OrchestratorError> {
        let status = self.capability_status(capability).await;
        let decision = fallback::decide(
            operation,
            request.processing_mode,
            status,
            content_length,
            &self.config.limits,
        );
        trace.trigger = decision.trigger;
        debug!(
            operation = operation.as_str(),
            capability = %capability,
            status = status.as_str(),
            mode = request.processing_mode.as_str(),
            content_length,
            use_remote = decision.should_use_remote,
            trigger = decision.trigger.as_str(),
            "fallback decision"
        );

        if decision.must_wait() || status == CapabilityStatus::Downloading {
            return Err(OrchestratorError::CapabilityDownloading { capability });
        }

        if decision.should_use_remote {
            if let Some(credentials) = request.remote_credentials.as_ref() {
                let provider = self.remote.get(credentials.provider)?;
                trace.path = ExecutionPath::Remote(provider.kind());
                return Ok(Route::Remote {
                    provider,
                    credentials,
                });
            }
            if status != CapabilityStatus::Ready {
                return Err(OrchestratorError::CapabilityUnavailable {
                    capability,
                    reason: decision.reason,
                });
            }
            debug!(
                operation = operation.as_str(),
                "no remote provider configured; truncating for the on-device model"
            );
        } else if status != CapabilityStatus::Ready {
            return Err(OrchestratorError::CapabilityUnavailable {
                capability,
                reason: format!("on-device model is {}", status.as_str()),
            });
        }

        trace.path = ExecutionPath::Local;
        Ok(Route::Local)
    }

    /// Remote path taken after the local capability failed mid-request. Only
    /// hybrid requests carrying credentials qualify; otherwise the local error
    /// is returned as is.
    fn remote_fallback<'a>(
        &'a self,
        request: &'a OperationRequest,
        local_error: &CapabilityError,
    ) -> Result<(&'a dyn RemoteProvider, &'a RemoteCredentials), OrchestratorError> {
        let credentials = match (request.processing_mode, request.remote_credentials.as_ref()) {
            (ProcessingMode::Hybrid, Some(credentials)) => credentials,
            _ => {
                return Err(OrchestratorError::Capability(clone_capability_error(
                    local_error,
                )));
            }
        };

        let provider = self.remote.get(credentials.provider)?;
        warn!(
            operation = request.kind.as_str(),
            provider = %provider.kind(),
            "on-device capability failed, retrying with remote provider: {local_error}"
        );
        Ok((provider, credentials))
    }

    async fn capability_status(&self, capability: CapabilityKind) -> CapabilityStatus {
        self.registry.require(capability);
        match self.registry.get(capability) {
            CapabilityStatus::Unknown => {
                let timeout = self.config.operation_timeout();
                match tokio::time::timeout(timeout, self.registry.refresh(capability)).await {
                    Ok(status) => status,
                    Err(_) => {
                        warn!(
                            capability = %capability,
                            timeout_ms = timeout_millis(timeout),
                            "capability availability probe timed out"
                        );
                        CapabilityStatus::Error
                    }
                }
            }
            status => status,
        }
    }

    async fn invoke_local(
        &self,
        config: &SessionConfig,
        retention: SessionRetention,
        input: CapabilityInput,
    ) -> Result<String, CapabilityError> {
        // One deadline covers waiting for the slot, creating the session and invoking it.
        let timeout = self.config.operation_timeout();
        let deadline = tokio::time::Instant::now() + timeout;
        let acquired = tokio::time::timeout_at(
            deadline,
            self.sessions
                .acquire_from(self.backend.as_ref(), config, retention),
        )
        .await;
        let mut lease = match acquired {
            Ok(lease) => lease?,
            Err(_) => {
                warn!(
                    capability = %config.capability(),
                    timeout_ms = timeout_millis(timeout),
                    "capability session was not available before the deadline"
                );
                return Err(CapabilityError::Timeout {
                    timeout_ms: timeout_millis(timeout),
                });
            }
        };
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let output = match lease.invoke_with_deadline(input, remaining).await {
            Err(CapabilityError::Timeout { .. }) => {
                return Err(CapabilityError::Timeout {
                    timeout_ms: timeout_millis(timeout),
                });
            }
            result => result?,
        };

        if output.trim().is_empty() {
            lease.discard();
            return Err(CapabilityError::InvocationFailed(
                "capability returned no text".to_string(),
            ));
        }
        Ok(output)
    }

    fn prepare_local(&self, text: &str, operation: OperationKind) -> String {
        truncate_with_reserve(
            text,
            self.config.limits.local_char_limit(operation),
            self.config.truncation_reserve_chars,
        )
    }

    fn prepare_remote(&self, text: &str) -> String {
        truncate_with_reserve(
            text,
            self.config.remote_max_chars,
            self.config.truncation_reserve_chars,
        )
    }

    fn finish<T>(
        &self,
        timer: &OperationTimer,
        trace: &OperationTrace,
        result: Result<T, OrchestratorError>,
        output_source: impl Fn(&T) -> Option<&'static str>,
    ) -> OperationResult<T> {
        // Only provider outages count against provider health; a rejected key is the caller's.
        let provider_failed = match &result {
            Ok(_) => Some(trace.remote_failed),
            Err(err) if err.kind() == ErrorKind::RemoteProviderError => Some(true),
            Err(_) => None,
        };
        let health = match (trace.path, provider_failed) {
            (ExecutionPath::Remote(provider), Some(failed)) => {
                Some(self.provider_health.record(provider, !failed, Instant::now()))
            }
            _ => None,
        };
        let used_fallback_provider = matches!(trace.path, ExecutionPath::Remote(_));

        match result {
            Ok(value) => {
                timer
                    .finish(trace.path, trace.trigger, Ok(output_source(&value)), health)
                    .emit();
                OperationResult::Ok {
                    value,
                    used_fallback_provider,
                }
            }
            Err(err) => {
                let kind = err.kind();
                timer
                    .finish(trace.path, trace.trigger, Err(kind.as_str()), health)
                    .emit();
                debug!(
                    operation_id = %timer.operation_id(),
                    error_kind = kind.as_str(),
                    "unsanitized failure: {err}"
                );
                OperationResult::Err {
                    kind,
                    message: sanitizer::sanitize(&err.to_string()),
                }
            }
        }
    }
}

fn timeout_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

/// `CapabilityError` holds only strings and numbers, so the local failure can be
/// surfaced after a remote fallback was ruled out.
fn clone_capability_error(err: &CapabilityError) -> CapabilityError {
    match err {
        CapabilityError::ProbeFailed(message) => CapabilityError::ProbeFailed(message.clone()),
        CapabilityError::CreateFailed(message) => CapabilityError::CreateFailed(message.clone()),
        CapabilityError::InvocationFailed(message) => {
            CapabilityError::InvocationFailed(message.clone())
        }
        CapabilityError::Timeout { timeout_ms } => CapabilityError::Timeout {
            timeout_ms: *timeout_ms,
        },
        CapabilityError::UnsupportedInput(message) => {
            CapabilityError::UnsupportedInput(message.clone())
        }
    }
}

/// Summarizer key-point output is a bulleted or numbered list, one point per line.
fn parse_key_points(raw: &str) -> Vec<String> {
    raw.lines()
        .map(strip_list_marker)
        .filter(|line| !line.is_empty())
        .take(MAX_KEY_POINTS)
        .map(str::to_string)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim().trim_start_matches(['-', '*', '•']).trim_start();
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        if let Some(rest) = line[digits..].strip_prefix(['.', ')']) {
            return rest.trim();
        }
    }
    line.trim()
}

fn describe_remote_summary(summary: RemoteSummary) -> String {
    let mut description = summary.summary.trim().to_string();
    for point in summary
        .key_points
        .iter()
        .map(|point| point.trim())
        .filter(|point| !point.is_empty())
    {
        description.push_str("\n- ");
        description.push_str(point);
    }
    description
}
