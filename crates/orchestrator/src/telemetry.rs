use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{info, warn};
use uuid::Uuid;

use crate::fallback::FallbackTrigger;
use crate::models::OperationKind;
use crate::remote::RemoteProviderKind;

const PROVIDER_DEGRADATION_FAILURE_THRESHOLD: u32 = 5;
const PROVIDER_DEGRADATION_DURATION_THRESHOLD: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    Local,
    Remote(RemoteProviderKind),
    /// Rejected before any capability or provider was called.
    None,
}

impl ExecutionPath {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote(_) => "remote",
            Self::None => "none",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDegradationAlert {
    pub provider: RemoteProviderKind,
    pub consecutive_failures: u32,
    pub degraded_for_seconds: u64,
}

/// One record per finished operation. Carries no thread content.
#[derive(Debug, Clone)]
pub struct OperationTelemetryEvent {
    pub operation_id: Uuid,
    pub operation: &'static str,
    pub path: &'static str,
    pub provider: Option<&'static str>,
    pub outcome: &'static str,
    pub latency_ms: u64,
    pub trigger: &'static str,
    pub output_source: Option<&'static str>,
    pub error_kind: Option<&'static str>,
    pub provider_degradation_alert: Option<ProviderDegradationAlert>,
    pub provider_recovered: bool,
}

impl OperationTelemetryEvent {
    pub fn emit(&self) {
        if self.outcome == "success" {
            info!(
                operation_id = %self.operation_id,
                operation = self.operation,
                path = self.path,
                provider = self.provider.unwrap_or("none"),
                latency_ms = self.latency_ms,
                trigger = self.trigger,
                output_source = self.output_source.unwrap_or("none"),
                provider_recovered = self.provider_recovered,
                "operation completed"
            );
        } else {
            warn!(
                operation_id = %self.operation_id,
                operation = self.operation,
                path = self.path,
                provider = self.provider.unwrap_or("none"),
                latency_ms = self.latency_ms,
                trigger = self.trigger,
                error_kind = self.error_kind.unwrap_or("unknown"),
                "operation failed"
            );
        }

        if let Some(alert) = &self.provider_degradation_alert {
            warn!(
                provider = %alert.provider,
                consecutive_failures = alert.consecutive_failures,
                degraded_for_seconds = alert.degraded_for_seconds,
                "remote provider degraded"
            );
        }
    }
}

/// Builder for [`OperationTelemetryEvent`], started when an operation begins.
#[derive(Debug)]
pub struct OperationTimer {
    operation_id: Uuid,
    operation: OperationKind,
    started_at: Instant,
}

impl OperationTimer {
    pub fn start(operation: OperationKind) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            operation,
            started_at: Instant::now(),
        }
    }

    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }

    pub fn finish(
        &self,
        path: ExecutionPath,
        trigger: FallbackTrigger,
        outcome: Result<Option<&'static str>, &'static str>,
        health: Option<ProviderHealthTransition>,
    ) -> OperationTelemetryEvent {
        let health = health.unwrap_or_default();
        let (outcome, output_source, error_kind) = match outcome {
            Ok(output_source) => ("success", output_source, None),
            Err(error_kind) => ("failure", None, Some(error_kind)),
        };

        OperationTelemetryEvent {
            operation_id: self.operation_id,
            operation: self.operation.as_str(),
            path: path.as_str(),
            provider: match path {
                ExecutionPath::Remote(provider) => Some(provider.as_str()),
                ExecutionPath::Local | ExecutionPath::None => None,
            },
            outcome,
            latency_ms: duration_to_millis(self.started_at.elapsed()),
            trigger: trigger.as_str(),
            output_source,
            error_kind,
            provider_degradation_alert: health.degradation_alert,
            provider_recovered: health.recovered,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderHealthTransition {
    pub degradation_alert: Option<ProviderDegradationAlert>,
    pub recovered: bool,
}

#[derive(Debug, Clone, Default)]
struct ProviderHealthState {
    consecutive_failures: u32,
    first_failure_at: Option<Instant>,
    alert_open: bool,
}

/// Tracks consecutive remote failures per provider and raises one alert when a
/// provider stays broken past both thresholds.
#[derive(Debug)]
pub struct ProviderHealth {
    failure_threshold: u32,
    duration_threshold: Duration,
    states: Mutex<HashMap<RemoteProviderKind, ProviderHealthState>>,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self::new(
            PROVIDER_DEGRADATION_FAILURE_THRESHOLD,
            PROVIDER_DEGRADATION_DURATION_THRESHOLD,
        )
    }
}

impl ProviderHealth {
    pub fn new(failure_threshold: u32, duration_threshold: Duration) -> Self {
        Self {
            failure_threshold,
            duration_threshold,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn consecutive_failures(&self, provider: RemoteProviderKind) -> u32 {
        self.lock_states()
            .get(&provider)
            .map_or(0, |state| state.consecutive_failures)
    }

    pub fn record(
        &self,
        provider: RemoteProviderKind,
        succeeded: bool,
        now: Instant,
    ) -> ProviderHealthTransition {
        let mut states = self.lock_states();

        if succeeded {
            let recovered = states
                .remove(&provider)
                .is_some_and(|state| state.alert_open);
            return ProviderHealthTransition {
                degradation_alert: None,
                recovered,
            };
        }

        let state = states.entry(provider).or_default();
        if state.consecutive_failures == 0 {
            state.first_failure_at = Some(now);
        }

        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        let degraded_for = state
            .first_failure_at
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default();

        if !state.alert_open
            && state.consecutive_failures >= self.failure_threshold
            && degraded_for >= self.duration_threshold
        {
            state.alert_open = true;
            return ProviderHealthTransition {
                degradation_alert: Some(ProviderDegradationAlert {
                    provider,
                    consecutive_failures: state.consecutive_failures,
                    degraded_for_seconds: degraded_for.as_secs(),
                }),
                recovered: false,
            };
        }

        ProviderHealthTransition::default()
    }

    fn lock_states(&self) -> MutexGuard<'_, HashMap<RemoteProviderKind, ProviderHealthState>> {
        match self.states.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
