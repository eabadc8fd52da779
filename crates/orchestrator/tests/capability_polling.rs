mod support;

use std::sync::Arc;
use std::time::Duration;

use orchestrator::capability::CapabilityRegistry;
use orchestrator::models::{CapabilityKind, CapabilityStatus};

use support::ScriptedBackend;

const POLL_INTERVAL: Duration = Duration::from_secs(10);

fn registry_for(backend: &ScriptedBackend) -> Arc<CapabilityRegistry> {
    Arc::new(CapabilityRegistry::new(
        Arc::new(backend.clone()),
        POLL_INTERVAL,
    ))
}

async fn wait_until_idle(registry: &CapabilityRegistry) {
    tokio::time::timeout(Duration::from_secs(300), async {
        while registry.is_polling() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("poll loop should settle");
}

#[tokio::test(start_paused = true)]
async fn poll_loop_runs_until_the_required_capability_is_ready() {
    let backend = ScriptedBackend::new().with_statuses(
        CapabilityKind::Generate,
        &[
            CapabilityStatus::Downloading,
            CapabilityStatus::Downloading,
            CapabilityStatus::Ready,
        ],
    );
    let registry = registry_for(&backend);
    let mut events = registry.subscribe();

    registry.require(CapabilityKind::Generate);
    assert!(registry.is_polling());

    let mut generate_statuses = Vec::new();
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            let change = events.recv().await.expect("event channel open");
            if change.capability == CapabilityKind::Generate {
                generate_statuses.push(change.current);
                if change.current == CapabilityStatus::Ready {
                    break;
                }
            }
        }
    })
    .await
    .expect("generate should become ready");

    assert_eq!(
        generate_statuses,
        vec![CapabilityStatus::Downloading, CapabilityStatus::Ready]
    );

    wait_until_idle(&registry).await;
    assert_eq!(registry.get(CapabilityKind::Generate), CapabilityStatus::Ready);
    assert_eq!(backend.probes(), 3 * CapabilityKind::ALL.len());
}

#[tokio::test(start_paused = true)]
async fn ready_capability_never_regresses_to_downloading() {
    let backend = ScriptedBackend::new().with_statuses(
        CapabilityKind::Summarize,
        &[CapabilityStatus::Ready, CapabilityStatus::Downloading],
    );
    let registry = registry_for(&backend);

    registry.poll().await;
    assert_eq!(registry.get(CapabilityKind::Summarize), CapabilityStatus::Ready);

    registry.poll().await;
    assert_eq!(registry.get(CapabilityKind::Summarize), CapabilityStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn stopped_poll_loop_restarts_on_the_next_requirement() {
    let backend = ScriptedBackend::new()
        .with_status(CapabilityKind::AnalyzeImage, CapabilityStatus::Downloading);
    let registry = registry_for(&backend);

    registry.require(CapabilityKind::AnalyzeImage);
    assert!(registry.is_polling());
    registry.stop_polling();
    assert!(!registry.is_polling());

    registry.require(CapabilityKind::AnalyzeImage);
    assert!(registry.is_polling());
    registry.stop_polling();
}

#[tokio::test(start_paused = true)]
async fn ready_requirements_do_not_start_the_loop() {
    let backend = ScriptedBackend::new();
    let registry = registry_for(&backend);

    registry.poll().await;
    registry.require(CapabilityKind::Summarize);

    assert!(!registry.is_polling());
}

#[tokio::test(start_paused = true)]
async fn settled_poll_loop_restarts_for_a_new_requirement() {
    let backend = ScriptedBackend::new()
        .with_statuses(
            CapabilityKind::Generate,
            &[CapabilityStatus::Downloading, CapabilityStatus::Ready],
        )
        .with_statuses(
            CapabilityKind::AnalyzeImage,
            &[
                CapabilityStatus::Downloading,
                CapabilityStatus::Downloading,
                CapabilityStatus::Downloading,
                CapabilityStatus::Ready,
            ],
        );
    let registry = registry_for(&backend);

    registry.require(CapabilityKind::Generate);
    wait_until_idle(&registry).await;
    assert_eq!(registry.get(CapabilityKind::Generate), CapabilityStatus::Ready);
    assert_eq!(
        registry.get(CapabilityKind::AnalyzeImage),
        CapabilityStatus::Downloading
    );

    let mut events = registry.subscribe();
    registry.require(CapabilityKind::AnalyzeImage);
    assert!(registry.is_polling());

    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            let change = events.recv().await.expect("event channel open");
            if change.capability == CapabilityKind::AnalyzeImage
                && change.current == CapabilityStatus::Ready
            {
                break;
            }
        }
    })
    .await
    .expect("image analysis should become ready");

    wait_until_idle(&registry).await;
    assert_eq!(
        registry.get(CapabilityKind::AnalyzeImage),
        CapabilityStatus::Ready
    );
}
