#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use orchestrator::capability::{
    CapabilityBackend, CapabilityError, CapabilityFuture, CapabilityInput, CapabilitySession,
    SessionConfig,
};
use orchestrator::models::{CapabilityKind, CapabilityStatus, Message, Thread};

#[derive(Debug, Clone)]
pub enum Scripted {
    Text(String),
    Fail(String),
    /// Never answers; only useful with paused time and a deadline.
    Hang,
}

#[derive(Debug, Clone)]
pub struct Invocation {
    pub capability: CapabilityKind,
    pub text: String,
}

#[derive(Default)]
struct BackendState {
    statuses: HashMap<CapabilityKind, VecDeque<CapabilityStatus>>,
    outputs: HashMap<CapabilityKind, VecDeque<Scripted>>,
    invocations: Vec<Invocation>,
    probes: usize,
    hanging_availability: Vec<CapabilityKind>,
    hanging_create: bool,
}

/// In-memory capability host. Statuses default to `ready`; each probe pops the
/// next scripted status and the last one sticks.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    state: Arc<Mutex<BackendState>>,
    created: Arc<AtomicUsize>,
    destroyed: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(self, capability: CapabilityKind, status: CapabilityStatus) -> Self {
        self.with_statuses(capability, &[status])
    }

    pub fn with_statuses(self, capability: CapabilityKind, statuses: &[CapabilityStatus]) -> Self {
        self.lock()
            .statuses
            .insert(capability, statuses.iter().copied().collect());
        self
    }

    pub fn with_output(self, capability: CapabilityKind, output: Scripted) -> Self {
        self.lock()
            .outputs
            .entry(capability)
            .or_default()
            .push_back(output);
        self
    }

    /// Availability checks for `capability` never answer.
    pub fn with_hanging_availability(self, capability: CapabilityKind) -> Self {
        self.lock().hanging_availability.push(capability);
        self
    }

    /// Session creation never answers.
    pub fn with_hanging_create(self) -> Self {
        self.lock().hanging_create = true;
        self
    }

    pub fn with_text(self, capability: CapabilityKind, text: &str) -> Self {
        self.with_output(capability, Scripted::Text(text.to_string()))
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.lock().invocations.clone()
    }

    pub fn probes(&self) -> usize {
        self.lock().probes
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BackendState> {
        self.state.lock().expect("backend state lock")
    }
}

impl CapabilityBackend for ScriptedBackend {
    fn availability<'a>(
        &'a self,
        capability: CapabilityKind,
    ) -> CapabilityFuture<'a, CapabilityStatus> {
        Box::pin(async move {
            let (status, hang) = {
                let mut state = self.lock();
                state.probes += 1;
                let status = match state.statuses.get_mut(&capability) {
                    Some(queue) if queue.len() > 1 => queue.pop_front(),
                    Some(queue) => queue.front().copied(),
                    None => None,
                };
                (status, state.hanging_availability.contains(&capability))
            };
            if hang {
                std::future::pending::<()>().await;
            }
            Ok(status.unwrap_or(CapabilityStatus::Ready))
        })
    }

    fn create<'a>(
        &'a self,
        config: &'a SessionConfig,
    ) -> CapabilityFuture<'a, Box<dyn CapabilitySession>> {
        Box::pin(async move {
            let hang = self.lock().hanging_create;
            if hang {
                std::future::pending::<()>().await;
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            let session: Box<dyn CapabilitySession> = Box::new(ScriptedSession {
                capability: config.capability(),
                backend: self.clone(),
            });
            Ok(session)
        })
    }
}

struct ScriptedSession {
    capability: CapabilityKind,
    backend: ScriptedBackend,
}

impl CapabilitySession for ScriptedSession {
    fn invoke<'a>(&'a mut self, input: CapabilityInput) -> CapabilityFuture<'a, String> {
        Box::pin(async move {
            let text = match &input {
                CapabilityInput::Text(text) => text.clone(),
                CapabilityInput::Image { instruction, .. } => instruction.clone(),
            };
            let scripted = {
                let mut state = self.backend.lock();
                state.invocations.push(Invocation {
                    capability: self.capability,
                    text,
                });
                state
                    .outputs
                    .get_mut(&self.capability)
                    .and_then(VecDeque::pop_front)
            };

            match scripted {
                Some(Scripted::Text(text)) => Ok(text),
                Some(Scripted::Fail(message)) => Err(CapabilityError::InvocationFailed(message)),
                Some(Scripted::Hang) => {
                    std::future::pending::<()>().await;
                    Err(CapabilityError::InvocationFailed("unreachable".to_string()))
                }
                None => Err(CapabilityError::InvocationFailed(
                    "no scripted output left".to_string(),
                )),
            }
        })
    }

    fn destroy(&mut self) {
        self.backend.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn thread(bodies: &[&str]) -> Thread {
    Thread {
        subject: "Launch review".to_string(),
        messages: bodies
            .iter()
            .enumerate()
            .map(|(index, body)| Message {
                sender_name: if index % 2 == 0 { "Ana" } else { "Ben" }.to_string(),
                body: (*body).to_string(),
                timestamp: None,
            })
            .collect(),
        attachments: Vec::new(),
    }
}

pub const VALID_DRAFTS: &str = r#"{"drafts":[
  {"type":"Quick reply","subject":"Re: Launch review","body":"Friday works for me."},
  {"type":"Standard reply","subject":"Re: Launch review","body":"Thanks Ana, Friday works. I will bring the updated plan."},
  {"type":"Detailed reply","subject":"Re: Launch review","body":"Thanks Ana, Friday works well. I will bring the updated launch plan and the budget numbers so we can close the open questions."}
]}"#;
