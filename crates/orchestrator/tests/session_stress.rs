use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use orchestrator::capability::{
    CapabilityFuture, CapabilityInput, CapabilitySession, SessionConfig, SummaryLength,
    SummaryStyle,
};
use orchestrator::session::{SessionManager, SessionRetention};

const CONCURRENT_CALLS: usize = 1_000;

#[derive(Default)]
struct Counters {
    created: AtomicUsize,
    destroyed: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    max_alive: AtomicUsize,
    invocations: AtomicUsize,
}

impl Counters {
    fn alive(&self) -> usize {
        self.created.load(Ordering::SeqCst) - self.destroyed.load(Ordering::SeqCst)
    }
}

/// Records how many callers are inside `invoke` at once.
struct ProbeSession {
    counters: Arc<Counters>,
}

impl CapabilitySession for ProbeSession {
    fn invoke<'a>(&'a mut self, input: CapabilityInput) -> CapabilityFuture<'a, String> {
        Box::pin(async move {
            let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.counters.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.counters
                .max_alive
                .fetch_max(self.counters.alive(), Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.counters.invocations.fetch_add(1, Ordering::SeqCst);
            self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("{} chars", input.char_len()))
        })
    }

    fn destroy(&mut self) {
        self.counters.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

async fn run_concurrent_calls(
    retention: SessionRetention,
) -> (Arc<SessionManager>, Arc<Counters>) {
    let manager = Arc::new(SessionManager::new());
    let counters = Arc::new(Counters::default());
    let config = SessionConfig::summarizer(SummaryStyle::Tldr, SummaryLength::Short);

    let tasks = (0..CONCURRENT_CALLS)
        .map(|index| {
            let manager = Arc::clone(&manager);
            let counters = Arc::clone(&counters);
            let config = config.clone();
            tokio::spawn(async move {
                let mut lease = manager
                    .acquire(&config, retention, move || async move {
                        counters.created.fetch_add(1, Ordering::SeqCst);
                        let session: Box<dyn CapabilitySession> =
                            Box::new(ProbeSession { counters });
                        Ok(session)
                    })
                    .await
                    .expect("session should be created");
                lease
                    .invoke(CapabilityInput::Text(format!("message {index}")))
                    .await
                    .expect("invocation should succeed")
            })
        })
        .collect::<Vec<_>>();

    for task in tasks {
        task.await.expect("task should join");
    }

    (manager, counters)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn warm_session_is_never_invoked_concurrently() {
    let (manager, counters) = run_concurrent_calls(SessionRetention::KeepWarm).await;

    assert_eq!(counters.invocations.load(Ordering::SeqCst), CONCURRENT_CALLS);
    assert_eq!(counters.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(counters.created.load(Ordering::SeqCst), 1);
    assert_eq!(manager.live_sessions(), 1);

    manager.release_all().await;
    assert_eq!(manager.live_sessions(), 0);
    assert_eq!(counters.destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_use_sessions_never_overlap_for_one_key() {
    let (manager, counters) = run_concurrent_calls(SessionRetention::SingleUse).await;

    assert_eq!(counters.invocations.load(Ordering::SeqCst), CONCURRENT_CALLS);
    assert_eq!(counters.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(counters.max_alive.load(Ordering::SeqCst), 1);
    assert_eq!(counters.created.load(Ordering::SeqCst), CONCURRENT_CALLS);
    assert_eq!(counters.destroyed.load(Ordering::SeqCst), CONCURRENT_CALLS);
    assert_eq!(manager.live_sessions(), 0);
}
