//! Checker
//!
//! Dispatches every planned (subject, check) pair through its channel, retries
//! transient failures, classifies observations and folds the results into a
//! `RunSummary`.
//!
//! A work item first takes its session lock (if its channel serializes per
//! target), then a pool slot for each channel attempt. Items queued behind a
//! busy session hold no slot, so they never delay unrelated targets.

mod invocation;
mod plan;

pub use invocation::{Invocation, InvocationState};
pub use plan::{plan, WorkItem};

use crate::aggregate::Aggregator;
use crate::channel::{Channel, ChannelError, ChannelOutput, ChannelSet};
use crate::contracts::*;
use crate::error::{EngineError, Result};
use crate::policy;
use crate::registry::CheckRegistry;
use crate::telemetry::AuditMetrics;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Semaphore};

/// Detail recorded for work cut off by the run deadline
pub const RUN_DEADLINE_DETAIL: &str = "run deadline exceeded";

/// Audit engine
pub struct AuditEngine {
    channels: ChannelSet,
    options: AuditOptions,
    metrics: Option<Arc<AuditMetrics>>,
}

impl AuditEngine {
    pub fn new(channels: ChannelSet, options: AuditOptions) -> Self {
        Self {
            channels,
            options,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<AuditMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn options(&self) -> &AuditOptions {
        &self.options
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    /// Run every applicable check against the inventory
    ///
    /// Only empty inputs are errors; every per-check failure becomes an
    /// UNKNOWN result.
    pub async fn run(&self, inventory: &Inventory, registry: &CheckRegistry) -> Result<RunSummary> {
        if inventory.is_empty() {
            return Err(EngineError::EmptyInventory);
        }
        if registry.is_empty() {
            return Err(EngineError::EmptyCatalog);
        }

        let items = plan(inventory, registry);
        let inputs_hash = compute_inputs_hash(inventory, registry);
        let mut aggregator = Aggregator::new(self.options.report_type)
            .with_demo_mode(self.channels.is_simulated())
            .with_inputs_hash(inputs_hash)
            .with_started_at(Utc::now());

        tracing::info!(
            targets = inventory.targets.len(),
            clusters = inventory.clusters.len(),
            checks = registry.len(),
            work_items = items.len(),
            concurrency = self.options.pool_size(),
            demo = self.channels.is_simulated(),
            "Starting audit run"
        );

        let locks = self.session_locks(&items);
        let dispatched: Vec<AtomicU32> = items.iter().map(|_| AtomicU32::new(0)).collect();
        let slots = Semaphore::new(self.options.pool_size());
        let deadline = self
            .options
            .run_timeout()
            .map(|d| tokio::time::Instant::now() + d);
        let mut finished = vec![false; items.len()];

        {
            let slots = &slots;
            let dispatched = &dispatched;
            let mut pending: FuturesUnordered<_> = items
                .iter()
                .zip(locks)
                .enumerate()
                .map(move |(idx, (item, lock))| async move {
                    (idx, self.execute(item, lock, slots, &dispatched[idx]).await)
                })
                .collect();

            loop {
                let next = match deadline {
                    Some(deadline) => match tokio::time::timeout_at(deadline, pending.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            tracing::warn!(
                                remaining = finished.iter().filter(|f| !**f).count(),
                                "Run deadline exceeded, finalizing pending checks as UNKNOWN"
                            );
                            break;
                        }
                    },
                    None => pending.next().await,
                };

                let Some((idx, results)) = next else {
                    break;
                };
                finished[idx] = true;
                for result in results {
                    self.fold(&mut aggregator, result);
                }
            }
        }

        for (idx, item) in items.iter().enumerate().filter(|(idx, _)| !finished[*idx]) {
            let failure = ChannelFailure::timeout(RUN_DEADLINE_DETAIL);
            let result = build_result(
                &item.check,
                item.subject.result_subject(),
                RawObservation::Failure(failure),
                dispatched[idx].load(Ordering::Relaxed),
            );
            self.fold(&mut aggregator, result);
        }

        let summary = aggregator.finish();
        if let Some(metrics) = &self.metrics {
            metrics.record_run(summary.exit_status);
        }

        tracing::info!(
            run_id = %summary.run_id,
            results = summary.total(),
            ok = summary.counts.ok,
            warning = summary.counts.warning,
            critical = summary.counts.critical,
            unknown = summary.counts.unknown,
            duration_ms = summary.duration_ms,
            exit = summary.exit_code(),
            "Audit run complete"
        );

        Ok(summary)
    }

    fn fold(&self, aggregator: &mut Aggregator, result: CheckResult) {
        if let Some(metrics) = &self.metrics {
            metrics.record_result(&result);
        }
        aggregator.fold(result);
    }

    /// One lock per session key, shared by every item using that session
    fn session_locks(&self, items: &[WorkItem]) -> Vec<Option<Arc<Mutex<()>>>> {
        let mut sessions: HashMap<String, Arc<Mutex<()>>> = HashMap::new();
        items
            .iter()
            .map(|item| {
                let channel = self.channels.get(item.check.channel)?;
                let key = channel.session_key(&item.subject, &item.check)?;
                Some(Arc::clone(sessions.entry(key).or_default()))
            })
            .collect()
    }

    /// Run one work item to completion
    ///
    /// `dispatched` mirrors the attempt count so an item cut off by the run
    /// deadline still reports how often it reached its channel.
    async fn execute(
        &self,
        item: &WorkItem,
        session: Option<Arc<Mutex<()>>>,
        slots: &Semaphore,
        dispatched: &AtomicU32,
    ) -> Vec<CheckResult> {
        let check = &item.check;
        let host = item.subject.host_name();
        let mut invocation = Invocation::new(&check.id, host);

        let Some(channel) = self.channels.get(check.channel) else {
            invocation.advance(InvocationState::Classified);
            let failure =
                ChannelFailure::connection(format!("no channel configured for {}", check.channel));
            return vec![build_result(
                check,
                item.subject.result_subject(),
                RawObservation::Failure(failure),
                0,
            )];
        };

        let _session = match &session {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        let outcome = loop {
            let attempt_outcome = {
                let Ok(_slot) = slots.acquire().await else {
                    break Err(ChannelError::Connection("worker pool closed".to_string()));
                };
                invocation.advance(InvocationState::Dispatched);
                dispatched.store(invocation.attempts(), Ordering::Relaxed);
                self.invoke(channel.as_ref(), item).await
            };
            let attempt = invocation.attempts();

            match attempt_outcome {
                Ok(output) => {
                    invocation.advance(InvocationState::Succeeded);
                    break Ok(output);
                }
                Err(err) => {
                    invocation.advance(match err {
                        ChannelError::Timeout(_) => InvocationState::TimedOut,
                        _ => InvocationState::Failed,
                    });

                    if err.is_retryable() && attempt <= self.options.max_retries {
                        let backoff = self.options.backoff_for(attempt);
                        tracing::warn!(
                            check_id = %check.id,
                            host,
                            attempt,
                            backoff_ms = backoff.as_millis() as u64,
                            error = %err,
                            "Check failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break Err(err);
                }
            }
        };

        invocation.advance(InvocationState::Classified);
        finalize(item, outcome, invocation.attempts())
    }

    /// One bounded channel invocation
    async fn invoke(
        &self,
        channel: &dyn Channel,
        item: &WorkItem,
    ) -> std::result::Result<ChannelOutput, ChannelError> {
        let kind = item.check.channel.as_str();
        let _in_flight = self.metrics.as_ref().map(|m| m.track_in_flight());
        let started = Instant::now();
        let bound = self.options.check_timeout();

        let outcome = match tokio::time::timeout(bound, channel.fetch(&item.subject, &item.check))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(ChannelError::Timeout(format!(
                "no response within {}ms",
                bound.as_millis()
            ))),
        };

        if let Some(metrics) = &self.metrics {
            let label = match &outcome {
                Ok(_) => "succeeded",
                Err(ChannelError::Timeout(_)) => "timed_out",
                Err(_) => "failed",
            };
            metrics.record_attempt(kind, label, started.elapsed().as_secs_f64());
        }

        outcome
    }
}

/// Turn a channel outcome into results, fanning out per-resource output
fn finalize(
    item: &WorkItem,
    outcome: std::result::Result<ChannelOutput, ChannelError>,
    attempts: u32,
) -> Vec<CheckResult> {
    let subject = item.subject.result_subject();
    match outcome {
        Err(err) => vec![build_result(
            &item.check,
            subject,
            RawObservation::Failure(err.into_failure()),
            attempts,
        )],
        Ok(ChannelOutput::Single(observation)) => {
            vec![build_result(&item.check, subject, observation, attempts)]
        }
        Ok(ChannelOutput::PerResource(resources)) if resources.is_empty() => vec![build_result(
            &item.check,
            subject,
            RawObservation::Value(ObservedValue::Absent),
            attempts,
        )],
        Ok(ChannelOutput::PerResource(resources)) => resources
            .into_iter()
            .map(|resource| {
                build_result(
                    &item.check,
                    subject.clone().with_resource(resource.name),
                    resource.observation,
                    attempts,
                )
            })
            .collect(),
    }
}

fn build_result(
    check: &CheckDefinition,
    subject: ResultSubject,
    observation: RawObservation,
    attempts: u32,
) -> CheckResult {
    let verdict = policy::evaluate(&observation, check);
    tracing::debug!(
        check_id = %check.id,
        host = %subject.display_name(),
        severity = %verdict.severity,
        "classified"
    );

    let (observed, error) = match observation {
        RawObservation::Value(value) => (Some(value), None),
        RawObservation::Failure(failure) => (None, Some(failure)),
    };

    let mut result = CheckResult::new(
        &check.id,
        &check.name,
        check.category,
        subject,
        verdict.severity,
        observed,
        check.policy.describe(),
        verdict.message,
    )
    .with_unit(&check.unit)
    .with_priority(check.priority)
    .with_attempts(attempts);

    if let Some(failure) = error {
        result = result.with_error(failure);
    }
    result
}

/// Deterministic hash of the run inputs
pub fn compute_inputs_hash(inventory: &Inventory, registry: &CheckRegistry) -> String {
    let mut identities: Vec<String> = inventory
        .targets
        .iter()
        .map(|t| format!("host:{}/{}", t.environment, t.hostname))
        .chain(
            inventory
                .clusters
                .iter()
                .map(|c| format!("cluster:{}/{}", c.environment, c.name)),
        )
        .collect();
    identities.sort();

    let mut check_ids: Vec<&str> = registry.iter().map(|c| c.id.as_str()).collect();
    check_ids.sort_unstable();

    let mut hasher = Sha256::new();
    for identity in &identities {
        hasher.update(identity.as_bytes());
        hasher.update([0u8]);
    }
    for id in check_ids {
        hasher.update(id.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ResourceObservation, SimulatedChannel, Subject};

    fn target(name: &str) -> Target {
        Target::new(Environment::Dev, name, Role::Worker)
    }

    fn disk() -> CheckDefinition {
        CheckDefinition::new(
            "OS-001",
            "Disk usage",
            CheckCategory::Os,
            ChannelKind::RemoteShell,
            "df",
            ThresholdPolicy::UpperBound {
                warning: 80.0,
                critical: 95.0,
            },
        )
        .with_unit("%")
    }

    #[test]
    fn test_inputs_hash_is_order_independent() {
        let registry = CheckRegistry::new(vec![disk()]).unwrap();
        let a = Inventory::new(vec![target("a"), target("b")], vec![]);
        let b = Inventory::new(vec![target("b"), target("a")], vec![]);
        assert_eq!(compute_inputs_hash(&a, &registry), compute_inputs_hash(&b, &registry));

        let c = Inventory::new(vec![target("a")], vec![]);
        assert_ne!(compute_inputs_hash(&a, &registry), compute_inputs_hash(&c, &registry));
    }

    #[test]
    fn test_finalize_empty_per_resource_is_absent() {
        let item = WorkItem::new(
            Subject::Cluster(ClusterRef {
                name: "dev".into(),
                environment: Environment::Dev,
                api_host: Target::new(Environment::Dev, "dev-m1", Role::Master),
                nodes: vec![],
            }),
            Arc::new(
                CheckDefinition::new(
                    "K8S-004",
                    "Failed pods",
                    CheckCategory::Cluster,
                    ChannelKind::ClusterQuery,
                    "kubectl get pods -A",
                    ThresholdPolicy::AcceptedStates {
                        accepted: vec!["Running".into(), "Succeeded".into()],
                        on_mismatch: Severity::Warning,
                    },
                )
                .with_fan_out(FanOut::PerResource),
            ),
        );

        let results = finalize(&item, Ok(ChannelOutput::PerResource(vec![])), 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].severity, Severity::Ok);
        assert_eq!(results[0].observed, Some(ObservedValue::Absent));

        let results = finalize(
            &item,
            Ok(ChannelOutput::PerResource(vec![
                ResourceObservation::new("web-1", RawObservation::state("Running")),
                ResourceObservation::new("web-2", RawObservation::state("CrashLoopBackOff")),
            ])),
            1,
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].subject.resource.as_deref(), Some("web-2"));
        assert_eq!(results[1].severity, Severity::Warning);
    }

    #[tokio::test]
    async fn test_missing_channel_is_unknown_connection_error() {
        let engine = AuditEngine::new(ChannelSet::new(), AuditOptions::default());
        let inventory = Inventory::new(vec![target("dev-w1")], vec![]);
        let registry = CheckRegistry::new(vec![disk()]).unwrap();

        let summary = engine.run(&inventory, &registry).await.unwrap();
        assert_eq!(summary.total(), 1);
        let result = &summary.results[0];
        assert_eq!(result.severity, Severity::Unknown);
        assert_eq!(result.error.as_ref().map(|e| e.kind), Some(FailureKind::Connection));
        assert_eq!(result.attempts, 0);
    }

    #[tokio::test]
    async fn test_empty_inputs_are_preconditions() {
        let engine = AuditEngine::new(
            ChannelSet::simulated(SimulatedChannel::new(1)),
            AuditOptions::default(),
        );
        let registry = CheckRegistry::new(vec![disk()]).unwrap();

        assert!(matches!(
            engine.run(&Inventory::default(), &registry).await,
            Err(EngineError::EmptyInventory)
        ));
        assert!(matches!(
            engine
                .run(
                    &Inventory::new(vec![target("dev-w1")], vec![]),
                    &CheckRegistry::default()
                )
                .await,
            Err(EngineError::EmptyCatalog)
        ));
    }

    #[tokio::test]
    async fn test_disk_scenario_warning() {
        let sim = SimulatedChannel::new(0).with_script("OS-001", "dev-w1", RawObservation::number(92.0));
        let engine = AuditEngine::new(ChannelSet::simulated(sim), AuditOptions::default());
        let inventory = Inventory::new(vec![target("dev-w1")], vec![]);
        let registry = CheckRegistry::new(vec![disk()]).unwrap();

        let summary = engine.run(&inventory, &registry).await.unwrap();
        assert_eq!(summary.results[0].severity, Severity::Warning);
        assert_eq!(summary.results[0].observed_display(), "92%");
        assert_eq!(summary.exit_code(), 1);
        assert!(summary.demo_mode);
    }
}
