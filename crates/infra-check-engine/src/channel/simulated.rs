//! Simulated channel for demo mode and tests
//!
//! Every value is drawn from SHA-256 over `(seed, check, subject, resource)`,
//! so a fixed seed reproduces the same run without touching the network.

use super::{Channel, ChannelError, ChannelOutput, ResourceObservation, Subject};
use crate::contracts::*;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

const WILDCARD: &str = "*";

#[derive(Debug, Clone)]
pub struct SimulatedChannel {
    seed: u64,
    anomaly_rate: f64,
    scripts: HashMap<(String, String), ChannelOutput>,
}

impl Default for SimulatedChannel {
    fn default() -> Self {
        Self::new(0)
    }
}

impl SimulatedChannel {
    /// Simulator with a 10% anomaly rate
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            anomaly_rate: 0.1,
            scripts: HashMap::new(),
        }
    }

    /// Share of draws that produce a WARNING/CRITICAL-worthy value
    pub fn with_anomaly_rate(mut self, rate: f64) -> Self {
        self.anomaly_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Fixed output for `check_id` on `host` (`"*"` for every host)
    pub fn with_script(
        mut self,
        check_id: impl Into<String>,
        host: impl Into<String>,
        output: impl Into<ChannelOutput>,
    ) -> Self {
        self.scripts
            .insert((check_id.into(), host.into()), output.into());
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn scripted(&self, check_id: &str, host: &str) -> Option<&ChannelOutput> {
        self.scripts
            .get(&(check_id.to_string(), host.to_string()))
            .or_else(|| {
                self.scripts
                    .get(&(check_id.to_string(), WILDCARD.to_string()))
            })
    }

    /// Uniform draw in [0, 1)
    fn draw(&self, parts: &[&str]) -> f64 {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(bytes) >> 11) as f64 / (1u64 << 53) as f64
    }

    fn synthesize(&self, check: &CheckDefinition, key: &[&str]) -> RawObservation {
        let pick = |salt: &str| {
            let mut parts = key.to_vec();
            parts.push(salt);
            self.draw(&parts)
        };

        let anomaly = pick("anomaly") < self.anomaly_rate;
        if anomaly && pick("outage") < 0.1 {
            return RawObservation::Failure(ChannelFailure::connection(
                "simulated connection failure",
            ));
        }
        let d = pick("value");

        let value = match &check.policy {
            ThresholdPolicy::Informational => {
                ObservedValue::Text(format!("v1.{}.{}", 24 + (d * 6.0) as u32, (d * 97.0) as u32 % 10))
            }
            ThresholdPolicy::UpperBound { warning, critical } => {
                let n = if anomaly {
                    warning + (critical * 1.1 - warning) * d
                } else {
                    warning * (0.2 + 0.6 * d)
                };
                ObservedValue::Number((n * 10.0).round() / 10.0)
            }
            ThresholdPolicy::AcceptedStates { accepted, .. } => {
                simulate_state(check.channel, accepted, anomaly, d)
            }
            ThresholdPolicy::CountBands { .. } => {
                ObservedValue::Number(if anomaly { 1.0 + (d * 6.0).floor() } else { 0.0 })
            }
            ThresholdPolicy::ReplicaMatch => {
                let desired = 1 + (d * 4.0) as u32;
                let ready = if anomaly {
                    desired - 1 - (pick("ready") * desired as f64) as u32 % desired
                } else {
                    desired
                };
                ObservedValue::Replicas { ready, desired }
            }
        };
        RawObservation::Value(value)
    }
}

fn simulate_state(kind: ChannelKind, accepted: &[String], anomaly: bool, d: f64) -> ObservedValue {
    let first = accepted.first().map(String::as_str).unwrap_or("ok");
    let status_class = accepted
        .iter()
        .find_map(|a| a.strip_suffix("xx").and_then(|p| p.parse::<u16>().ok()));

    if kind == ChannelKind::NetworkProbe {
        let millis = 5 + (d * 200.0) as u64;
        let status = match (anomaly, status_class) {
            (true, _) => Some(503),
            (false, Some(class)) => Some(class * 100),
            (false, None) => None,
        };
        return ObservedValue::Latency { millis, status };
    }

    if anomaly {
        ObservedValue::State(format!("Not{}", first))
    } else {
        ObservedValue::State(first.to_string())
    }
}

#[async_trait]
impl Channel for SimulatedChannel {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn fetch(
        &self,
        subject: &Subject,
        check: &CheckDefinition,
    ) -> Result<ChannelOutput, ChannelError> {
        if let Some(output) = self.scripted(&check.id, subject.host_name()) {
            return Ok(output.clone());
        }

        let env = subject.environment();
        let host = subject.host_name();
        let resource = match subject {
            Subject::Service { endpoint, .. } => endpoint.name.as_str(),
            _ => "",
        };

        match subject {
            Subject::Cluster(cluster) if check.is_per_resource() => {
                let names: Vec<String> = if cluster.nodes.is_empty() {
                    (1..=3).map(|i| format!("{}-node-{}", cluster.name, i)).collect()
                } else {
                    cluster.nodes.clone()
                };
                let resources = names
                    .into_iter()
                    .map(|name| {
                        let observation =
                            self.synthesize(check, &[check.id.as_str(), env.as_str(), host, name.as_str()]);
                        ResourceObservation::new(name, observation)
                    })
                    .collect();
                Ok(ChannelOutput::PerResource(resources))
            }
            _ => Ok(ChannelOutput::Single(self.synthesize(
                check,
                &[check.id.as_str(), env.as_str(), host, resource],
            ))),
        }
    }
}
