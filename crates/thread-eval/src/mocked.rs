//! Deterministic stand-ins for the on-device capabilities and the remote
//! providers, driven entirely by one fixture.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use orchestrator::capability::{
    CapabilityBackend, CapabilityError, CapabilityFuture, CapabilityInput, CapabilitySession,
    SessionConfig,
};
use orchestrator::drafts::Draft;
use orchestrator::models::{CapabilityKind, CapabilityStatus};
use orchestrator::remote::{
    RemoteCredentials, RemoteFuture, RemoteImage, RemoteProvider, RemoteProviderError,
    RemoteProviderKind, RemoteSummary,
};
use serde::Deserialize;

use crate::case::{MockedRemoteFixture, MockedRemoteResponse, ScriptedOutput};

#[derive(Default)]
struct ScriptState {
    outputs: HashMap<CapabilityKind, VecDeque<ScriptedOutput>>,
}

/// Every capability reports its fixture status (default `ready`) and answers
/// invocations from the fixture's queue in order.
#[derive(Clone)]
pub struct FixtureBackend {
    statuses: BTreeMap<CapabilityKind, CapabilityStatus>,
    state: Arc<Mutex<ScriptState>>,
}

impl FixtureBackend {
    pub fn new(
        statuses: BTreeMap<CapabilityKind, CapabilityStatus>,
        outputs: &BTreeMap<CapabilityKind, Vec<ScriptedOutput>>,
    ) -> Self {
        let outputs = outputs
            .iter()
            .map(|(capability, queue)| (*capability, queue.iter().cloned().collect()))
            .collect();
        Self {
            statuses,
            state: Arc::new(Mutex::new(ScriptState { outputs })),
        }
    }

    /// Every capability unavailable, so live runs always reach the remote provider.
    pub fn unavailable() -> Self {
        let statuses = CapabilityKind::ALL
            .into_iter()
            .map(|capability| (capability, CapabilityStatus::Unavailable))
            .collect();
        Self::new(statuses, &BTreeMap::new())
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CapabilityBackend for FixtureBackend {
    fn availability<'a>(
        &'a self,
        capability: CapabilityKind,
    ) -> CapabilityFuture<'a, CapabilityStatus> {
        Box::pin(async move {
            Ok(self
                .statuses
                .get(&capability)
                .copied()
                .unwrap_or(CapabilityStatus::Ready))
        })
    }

    fn create<'a>(
        &'a self,
        config: &'a SessionConfig,
    ) -> CapabilityFuture<'a, Box<dyn CapabilitySession>> {
        Box::pin(async move {
            let session: Box<dyn CapabilitySession> = Box::new(FixtureSession {
                capability: config.capability(),
                backend: self.clone(),
            });
            Ok(session)
        })
    }
}

struct FixtureSession {
    capability: CapabilityKind,
    backend: FixtureBackend,
}

impl CapabilitySession for FixtureSession {
    fn invoke<'a>(&'a mut self, _input: CapabilityInput) -> CapabilityFuture<'a, String> {
        Box::pin(async move {
            let next = self
                .backend
                .lock()
                .outputs
                .get_mut(&self.capability)
                .and_then(VecDeque::pop_front);

            match next {
                Some(ScriptedOutput::Text(text)) => Ok(text),
                Some(ScriptedOutput::Error(message)) => {
                    Err(CapabilityError::InvocationFailed(message))
                }
                None => Err(CapabilityError::InvocationFailed(format!(
                    "fixture has no {} output left",
                    self.capability
                ))),
            }
        })
    }

    fn destroy(&mut self) {}
}

/// Remote provider that answers every call with the fixture's canned response.
pub struct FixtureRemoteProvider {
    kind: RemoteProviderKind,
    response: MockedRemoteResponse,
}

impl FixtureRemoteProvider {
    pub fn new(fixture: &MockedRemoteFixture) -> Self {
        Self {
            kind: fixture.provider,
            response: fixture.response.clone(),
        }
    }

    fn text(&self, credentials: &RemoteCredentials) -> Result<&str, RemoteProviderError> {
        credentials.api_key()?;
        match &self.response {
            MockedRemoteResponse::Text(text) => Ok(text),
            MockedRemoteResponse::HttpError(status) => Err(RemoteProviderError::Http {
                status: *status,
                code: "mocked".to_string(),
                message: "mocked provider failure".to_string(),
            }),
            MockedRemoteResponse::InvalidCredentials => {
                Err(RemoteProviderError::InvalidCredentials)
            }
        }
    }
}

#[derive(Deserialize)]
struct DraftsPayload {
    drafts: Vec<Draft>,
}

impl RemoteProvider for FixtureRemoteProvider {
    fn kind(&self) -> RemoteProviderKind {
        self.kind
    }

    fn summarize<'a>(
        &'a self,
        _text: &'a str,
        credentials: &'a RemoteCredentials,
    ) -> RemoteFuture<'a, RemoteSummary> {
        Box::pin(async move {
            let text = self.text(credentials)?;
            serde_json::from_str(text)
                .map_err(|err| RemoteProviderError::UnparseableOutput(err.to_string()))
        })
    }

    fn generate_drafts<'a>(
        &'a self,
        _prompt: &'a str,
        credentials: &'a RemoteCredentials,
    ) -> RemoteFuture<'a, Vec<Draft>> {
        Box::pin(async move {
            let text = self.text(credentials)?;
            serde_json::from_str::<DraftsPayload>(text)
                .map(|payload| payload.drafts)
                .map_err(|err| RemoteProviderError::UnparseableOutput(err.to_string()))
        })
    }

    fn describe_image<'a>(
        &'a self,
        _image: &'a RemoteImage,
        credentials: &'a RemoteCredentials,
    ) -> RemoteFuture<'a, String> {
        Box::pin(async move { self.text(credentials).map(str::to_string) })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use orchestrator::capability::{
        CapabilityBackend, CapabilityInput, SessionConfig, SummaryLength, SummaryStyle,
    };
    use orchestrator::models::{CapabilityKind, CapabilityStatus};

    use super::FixtureBackend;
    use crate::case::ScriptedOutput;

    #[tokio::test]
    async fn scripted_outputs_are_consumed_in_order() {
        let outputs = BTreeMap::from([(
            CapabilityKind::Summarize,
            vec![
                ScriptedOutput::Text("first".to_string()),
                ScriptedOutput::Error("boom".to_string()),
            ],
        )]);
        let backend = FixtureBackend::new(BTreeMap::new(), &outputs);
        let config = SessionConfig::summarizer(SummaryStyle::Tldr, SummaryLength::Short);
        let mut session = backend.create(&config).await.expect("session");

        let first = session
            .invoke(CapabilityInput::Text("x".to_string()))
            .await
            .expect("first output");
        assert_eq!(first, "first");
        assert!(
            session
                .invoke(CapabilityInput::Text("x".to_string()))
                .await
                .is_err()
        );
        assert_eq!(
            backend
                .availability(CapabilityKind::Generate)
                .await
                .expect("status"),
            CapabilityStatus::Ready
        );
    }

    #[tokio::test]
    async fn unavailable_backend_reports_every_capability_unavailable() {
        let backend = FixtureBackend::unavailable();
        for capability in CapabilityKind::ALL {
            assert_eq!(
                backend.availability(capability).await.expect("status"),
                CapabilityStatus::Unavailable
            );
        }
    }
}
