use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::CapabilityBackend;
use crate::models::{CapabilityKind, CapabilityStatus};

const STATUS_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub capability: CapabilityKind,
    pub previous: CapabilityStatus,
    pub current: CapabilityStatus,
}

#[derive(Default)]
struct PollLoopState {
    required: BTreeSet<CapabilityKind>,
    handle: Option<JoinHandle<()>>,
}

/// Cached availability of every capability kind, refreshed by polling the backend.
///
/// Reads go through [`CapabilityRegistry::get`] and never wait on a probe. The
/// background loop only runs while some required capability is not ready.
pub struct CapabilityRegistry {
    backend: Arc<dyn CapabilityBackend>,
    statuses: RwLock<HashMap<CapabilityKind, CapabilityStatus>>,
    events: broadcast::Sender<StatusChange>,
    poll_interval: Duration,
    poll_loop: Mutex<PollLoopState>,
}

impl CapabilityRegistry {
    pub fn new(backend: Arc<dyn CapabilityBackend>, poll_interval: Duration) -> Self {
        let (events, _) = broadcast::channel(STATUS_EVENT_CAPACITY);
        let statuses = CapabilityKind::ALL
            .iter()
            .map(|kind| (*kind, CapabilityStatus::Unknown))
            .collect();

        Self {
            backend,
            statuses: RwLock::new(statuses),
            events,
            poll_interval,
            poll_loop: Mutex::new(PollLoopState::default()),
        }
    }

    pub fn get(&self, capability: CapabilityKind) -> CapabilityStatus {
        self.read_statuses()
            .get(&capability)
            .copied()
            .unwrap_or(CapabilityStatus::Unknown)
    }

    pub fn snapshot(&self) -> HashMap<CapabilityKind, CapabilityStatus> {
        self.read_statuses().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.events.subscribe()
    }

    /// Probes every capability kind. A failing probe marks only its own kind as `error`.
    pub async fn poll(&self) -> HashMap<CapabilityKind, CapabilityStatus> {
        for capability in CapabilityKind::ALL {
            self.refresh(capability).await;
        }
        self.snapshot()
    }

    pub async fn refresh(&self, capability: CapabilityKind) -> CapabilityStatus {
        let probed = match self.backend.availability(capability).await {
            Ok(status) => status,
            Err(err) => {
                warn!(capability = %capability, "capability availability probe failed: {err}");
                CapabilityStatus::Error
            }
        };
        self.record(capability, probed)
    }

    /// Marks `capability` as needed by a caller and makes sure the poll loop runs
    /// while it is not ready. Must be called from within a tokio runtime.
    pub fn require(self: &Arc<Self>, capability: CapabilityKind) {
        let mut state = self.lock_poll_loop();
        state.required.insert(capability);
        if self.get(capability) != CapabilityStatus::Ready {
            self.ensure_poll_loop(&mut state);
        }
    }

    pub fn is_polling(&self) -> bool {
        self.lock_poll_loop()
            .handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn stop_polling(&self) {
        if let Some(handle) = self.lock_poll_loop().handle.take() {
            handle.abort();
        }
    }

    fn ensure_poll_loop(self: &Arc<Self>, state: &mut PollLoopState) {
        if state
            .handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
        {
            return;
        }

        debug!(
            required = state.required.len(),
            "starting capability poll loop"
        );
        state.handle = Some(tokio::spawn(run_poll_loop(Arc::downgrade(self))));
    }

    /// Ends the loop once every required capability is ready. Runs under the loop
    /// lock so a concurrent `require` either sees the loop alive or restarts it.
    fn settle_poll_loop(&self) -> bool {
        let mut state = self.lock_poll_loop();
        let settled = state
            .required
            .iter()
            .all(|capability| self.get(*capability) == CapabilityStatus::Ready);
        if settled {
            state.handle = None;
            info!("all required capabilities ready; capability poll loop stopped");
        }
        settled
    }

    fn record(&self, capability: CapabilityKind, probed: CapabilityStatus) -> CapabilityStatus {
        let change = {
            let mut statuses = self.write_statuses();
            let previous = statuses
                .get(&capability)
                .copied()
                .unwrap_or(CapabilityStatus::Unknown);

            if previous == probed {
                return previous;
            }
            if !previous.can_transition_to(probed) {
                debug!(
                    capability = %capability,
                    previous = previous.as_str(),
                    probed = probed.as_str(),
                    "ignoring regressive capability status"
                );
                return previous;
            }

            statuses.insert(capability, probed);
            StatusChange {
                capability,
                previous,
                current: probed,
            }
        };

        info!(
            capability = %capability,
            previous = change.previous.as_str(),
            current = change.current.as_str(),
            "capability status changed"
        );
        // Nobody listening is fine; the cache is the source of truth.
        let _ = self.events.send(change);
        change.current
    }

    fn read_statuses(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<CapabilityKind, CapabilityStatus>> {
        match self.statuses.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_statuses(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<CapabilityKind, CapabilityStatus>> {
        match self.statuses.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_poll_loop(&self) -> MutexGuard<'_, PollLoopState> {
        match self.poll_loop.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

async fn run_poll_loop(registry: Weak<CapabilityRegistry>) {
    loop {
        let Some(strong) = registry.upgrade() else {
            return;
        };
        strong.poll().await;
        if strong.settle_poll_loop() {
            return;
        }
        let interval = strong.poll_interval;
        drop(strong);

        tokio::time::sleep(interval).await;
    }
}
