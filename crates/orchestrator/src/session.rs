use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use crate::capability::{
    CapabilityBackend, CapabilityError, CapabilityInput, CapabilitySession, SessionConfig,
    SessionKey,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRetention {
    /// Cached under its key and reused by later calls with the same configuration.
    KeepWarm,
    /// Destroyed as soon as the lease is dropped.
    SingleUse,
}

type SessionSlot = Arc<AsyncMutex<Option<Box<dyn CapabilitySession>>>>;

/// Owns every live capability session, at most one per [`SessionKey`].
///
/// Slots are never removed from the map once created: a task waiting on a slot
/// must not race a replacement slot for the same key.
#[derive(Default)]
pub struct SessionManager {
    slots: Mutex<HashMap<SessionKey, SessionSlot>>,
    live: Arc<AtomicUsize>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions created and not yet destroyed.
    pub fn live_sessions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Waits for exclusive use of the session keyed by `config`, creating it with
    /// `factory` when no live session is cached. A failed creation caches nothing.
    pub async fn acquire<F, Fut>(
        &self,
        config: &SessionConfig,
        retention: SessionRetention,
        factory: F,
    ) -> Result<SessionLease, CapabilityError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Box<dyn CapabilitySession>, CapabilityError>>,
    {
        let key = config.key();
        let slot = self.slot_for(&key);
        let mut guard = slot.lock_owned().await;

        if guard.is_none() {
            let session = factory().await?;
            self.live.fetch_add(1, Ordering::SeqCst);
            debug!(
                capability = %key.capability,
                session_key = %key.config_hash,
                "capability session created"
            );
            *guard = Some(session);
        }

        Ok(SessionLease {
            key,
            guard,
            retention,
            discard: false,
            live: Arc::clone(&self.live),
        })
    }

    pub async fn acquire_from(
        &self,
        backend: &dyn CapabilityBackend,
        config: &SessionConfig,
        retention: SessionRetention,
    ) -> Result<SessionLease, CapabilityError> {
        self.acquire(config, retention, || backend.create(config))
            .await
    }

    /// Destroys the cached session for `key`, waiting for any current lease to end.
    pub async fn release(&self, key: &SessionKey) {
        let slot = self.lock_slots().get(key).cloned();
        if let Some(slot) = slot {
            let mut guard = slot.lock().await;
            destroy_slot(key, &mut guard, &self.live);
        }
    }

    pub async fn release_all(&self) {
        let slots = self
            .lock_slots()
            .iter()
            .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
            .collect::<Vec<_>>();

        for (key, slot) in slots {
            let mut guard = slot.lock().await;
            destroy_slot(&key, &mut guard, &self.live);
        }
    }

    fn slot_for(&self, key: &SessionKey) -> SessionSlot {
        let mut slots = self.lock_slots();
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    fn lock_slots(&self) -> MutexGuard<'_, HashMap<SessionKey, SessionSlot>> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Exclusive use of one session. Dropping the lease releases it on every exit
/// path: single-use and discarded sessions are destroyed, warm ones stay cached.
pub struct SessionLease {
    key: SessionKey,
    guard: OwnedMutexGuard<Option<Box<dyn CapabilitySession>>>,
    retention: SessionRetention,
    discard: bool,
    live: Arc<AtomicUsize>,
}

impl SessionLease {
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// A failed invocation marks the session for destruction.
    pub async fn invoke(&mut self, input: CapabilityInput) -> Result<String, CapabilityError> {
        let Some(session) = self.guard.as_mut() else {
            return Err(CapabilityError::InvocationFailed(
                "session was released".to_string(),
            ));
        };

        let result = session.invoke(input).await;
        if result.is_err() {
            self.discard = true;
        }
        result
    }

    /// Like [`SessionLease::invoke`], bounded by `timeout`. The capability API has
    /// no cancellation of its own, so a timed-out session is discarded.
    pub async fn invoke_with_deadline(
        &mut self,
        input: CapabilityInput,
        timeout: Duration,
    ) -> Result<String, CapabilityError> {
        let outcome = tokio::time::timeout(timeout, self.invoke(input)).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                self.discard = true;
                Err(CapabilityError::Timeout {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    pub fn discard(&mut self) {
        self.discard = true;
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if self.discard || self.retention == SessionRetention::SingleUse {
            destroy_slot(&self.key, &mut self.guard, &self.live);
        }
    }
}

fn destroy_slot(
    key: &SessionKey,
    slot: &mut Option<Box<dyn CapabilitySession>>,
    live: &AtomicUsize,
) {
    if let Some(mut session) = slot.take() {
        session.destroy();
        live.fetch_sub(1, Ordering::SeqCst);
        debug!(
            capability = %key.capability,
            session_key = %key.config_hash,
            "capability session destroyed"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::{SessionManager, SessionRetention};
    use crate::capability::{
        CapabilityError, CapabilityFuture, CapabilityInput, CapabilitySession, SessionConfig,
        SummaryLength, SummaryStyle,
    };

    struct CountingSession {
        destroyed: Arc<AtomicUsize>,
        fail: bool,
        delay: Option<Duration>,
    }

    impl CapabilitySession for CountingSession {
        fn invoke<'a>(&'a mut self, input: CapabilityInput) -> CapabilityFuture<'a, String> {
            Box::pin(async move {
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                if self.fail {
                    return Err(CapabilityError::InvocationFailed("boom".to_string()));
                }
                match input {
                    CapabilityInput::Text(text) => Ok(format!("echo: {text}")),
                    CapabilityInput::Image { .. } => Ok("image".to_string()),
                }
            })
        }

        fn destroy(&mut self) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn session(
        destroyed: &Arc<AtomicUsize>,
        fail: bool,
        delay: Option<Duration>,
    ) -> Box<dyn CapabilitySession> {
        Box::new(CountingSession {
            destroyed: Arc::clone(destroyed),
            fail,
            delay,
        })
    }

    fn tldr() -> SessionConfig {
        SessionConfig::summarizer(SummaryStyle::Tldr, SummaryLength::Short)
    }

    #[tokio::test]
    async fn warm_sessions_are_reused() {
        let manager = SessionManager::new();
        let destroyed = Arc::new(AtomicUsize::new(0));
        let created = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let created = Arc::clone(&created);
            let destroyed = Arc::clone(&destroyed);
            let mut lease = manager
                .acquire(&tldr(), SessionRetention::KeepWarm, || async move {
                    created.fetch_add(1, Ordering::SeqCst);
                    Ok(session(&destroyed, false, None))
                })
                .await
                .expect("lease");
            lease
                .invoke(CapabilityInput::Text("hi".to_string()))
                .await
                .expect("invoke");
        }

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(manager.live_sessions(), 1);

        manager.release(&tldr().key()).await;
        assert_eq!(manager.live_sessions(), 0);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_creation_frees_the_slot() {
        let manager = SessionManager::new();
        let destroyed = Arc::new(AtomicUsize::new(0));

        let abandoned = tokio::time::timeout(
            Duration::from_secs(1),
            manager.acquire(&tldr(), SessionRetention::KeepWarm, || async {
                std::future::pending::<Result<Box<dyn CapabilitySession>, CapabilityError>>()
                    .await
            }),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(manager.live_sessions(), 0);

        let destroyed_by_factory = Arc::clone(&destroyed);
        let mut lease = tokio::time::timeout(
            Duration::from_secs(1),
            manager.acquire(&tldr(), SessionRetention::KeepWarm, || async move {
                Ok(session(&destroyed_by_factory, false, None))
            }),
        )
        .await
        .expect("slot should be free after the abandoned creation")
        .expect("lease");
        let output = lease
            .invoke(CapabilityInput::Text("after".to_string()))
            .await
            .expect("invoke");
        assert_eq!(output, "echo: after");
    }

    #[tokio::test]
    async fn single_use_sessions_are_destroyed_on_drop() {
        let manager = SessionManager::new();
        let destroyed = Arc::new(AtomicUsize::new(0));
        {
            let destroyed = Arc::clone(&destroyed);
            let mut lease = manager
                .acquire(&tldr(), SessionRetention::SingleUse, || async move {
                    Ok(session(&destroyed, false, None))
                })
                .await
                .expect("lease");
            lease
                .invoke(CapabilityInput::Text("once".to_string()))
                .await
                .expect("invoke");
        }

        assert_eq!(manager.live_sessions(), 0);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_invocation_discards_warm_session() {
        let manager = SessionManager::new();
        let destroyed = Arc::new(AtomicUsize::new(0));
        {
            let destroyed = Arc::clone(&destroyed);
            let mut lease = manager
                .acquire(&tldr(), SessionRetention::KeepWarm, || async move {
                    Ok(session(&destroyed, true, None))
                })
                .await
                .expect("lease");
            assert!(
                lease
                    .invoke(CapabilityInput::Text("x".to_string()))
                    .await
                    .is_err()
            );
        }

        assert_eq!(manager.live_sessions(), 0);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn creation_failure_caches_nothing() {
        let manager = SessionManager::new();
        let err = manager
            .acquire(&tldr(), SessionRetention::KeepWarm, || async {
                Err(CapabilityError::CreateFailed("no model".to_string()))
            })
            .await
            .err()
            .expect("creation must fail");

        assert!(matches!(err, CapabilityError::CreateFailed(_)));
        assert_eq!(manager.live_sessions(), 0);

        let destroyed = Arc::new(AtomicUsize::new(0));
        let retry = manager
            .acquire(&tldr(), SessionRetention::KeepWarm, || async move {
                Ok(session(&destroyed, false, None))
            })
            .await;
        assert!(retry.is_ok(), "a later acquire must create a fresh session");
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_session_is_destroyed() {
        let manager = SessionManager::new();
        let destroyed = Arc::new(AtomicUsize::new(0));
        {
            let destroyed = Arc::clone(&destroyed);
            let mut lease = manager
                .acquire(&tldr(), SessionRetention::KeepWarm, || async move {
                    Ok(session(&destroyed, false, Some(Duration::from_secs(120))))
                })
                .await
                .expect("lease");
            let err = lease
                .invoke_with_deadline(
                    CapabilityInput::Text("slow".to_string()),
                    Duration::from_secs(5),
                )
                .await
                .expect_err("must time out");
            assert!(matches!(err, CapabilityError::Timeout { timeout_ms: 5_000 }));
        }

        assert_eq!(manager.live_sessions(), 0);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }
}
