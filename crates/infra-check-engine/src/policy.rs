//! Threshold policy
//!
//! Pure classification of an observation against a check's threshold policy.
//! No I/O; the same inputs always produce the same severity.

use crate::contracts::*;

/// Severity plus the human message that goes with it
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub severity: Severity,
    pub message: String,
}

impl Verdict {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

/// Classify an observation
///
/// A failure marker is UNKNOWN whatever the policy kind.
pub fn classify(observation: &RawObservation, check: &CheckDefinition) -> Severity {
    evaluate(observation, check).severity
}

/// Classify an observation and explain the outcome
pub fn evaluate(observation: &RawObservation, check: &CheckDefinition) -> Verdict {
    let value = match observation {
        RawObservation::Failure(failure) => {
            return Verdict::new(Severity::Unknown, failure.to_string());
        }
        RawObservation::Value(value) => value,
    };

    match &check.policy {
        ThresholdPolicy::Informational => match value {
            ObservedValue::Absent => Verdict::new(Severity::Ok, "No data returned"),
            _ => Verdict::new(Severity::Ok, "Information collected"),
        },
        ThresholdPolicy::UpperBound { warning, critical } => {
            upper_bound(value, *warning, *critical)
        }
        ThresholdPolicy::AcceptedStates {
            accepted,
            on_mismatch,
        } => accepted_states(value, accepted, *on_mismatch),
        ThresholdPolicy::CountBands { bands } => count_bands(value, bands),
        ThresholdPolicy::ReplicaMatch => replica_match(value),
    }
}

/// Numeric reading of a value, when it has one
pub fn numeric(value: &ObservedValue) -> Option<f64> {
    match value {
        ObservedValue::Number(n) => Some(*n),
        ObservedValue::Latency { millis, .. } => Some(*millis as f64),
        ObservedValue::Text(s) | ObservedValue::State(s) => parse_number(s),
        ObservedValue::Replicas { .. } | ObservedValue::Absent => None,
    }
}

/// Parse `92`, `92%`, ` 1.5 ` into a number
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim().trim_end_matches('%').trim();
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn upper_bound(value: &ObservedValue, warning: f64, critical: f64) -> Verdict {
    let Some(n) = numeric(value) else {
        return Verdict::new(
            Severity::Unknown,
            format!("Non-numeric value '{}' for numeric threshold", value),
        );
    };

    if n >= critical {
        Verdict::new(
            Severity::Critical,
            format!("Threshold exceeded (>= {})", trim(critical)),
        )
    } else if n >= warning {
        Verdict::new(
            Severity::Warning,
            format!("Approaching threshold (>= {})", trim(warning)),
        )
    } else {
        Verdict::new(Severity::Ok, "Within threshold")
    }
}

fn accepted_states(value: &ObservedValue, accepted: &[String], on_mismatch: Severity) -> Verdict {
    let observed = match value {
        ObservedValue::Absent => return Verdict::new(Severity::Ok, "No resources reported"),
        ObservedValue::Latency {
            status: Some(code), ..
        } => code.to_string(),
        ObservedValue::Latency { status: None, .. } => "open".to_string(),
        ObservedValue::Number(n) => trim(*n),
        ObservedValue::Text(s) | ObservedValue::State(s) => s.trim().to_string(),
        ObservedValue::Replicas { ready, desired } => format!("{}/{}", ready, desired),
    };

    if accepted.iter().any(|a| state_matches(a, &observed)) {
        Verdict::new(Severity::Ok, format!("State {} as expected", observed))
    } else {
        Verdict::new(
            on_mismatch,
            format!("Unexpected state {} (expected {})", observed, accepted.join("|")),
        )
    }
}

/// Case-insensitive match; `2xx` style patterns match a status class
fn state_matches(pattern: &str, observed: &str) -> bool {
    let pattern = pattern.trim();
    if pattern.eq_ignore_ascii_case(observed) {
        return true;
    }
    let p = pattern.as_bytes();
    let o = observed.as_bytes();
    p.len() == 3
        && o.len() == 3
        && p[0].is_ascii_digit()
        && p[1..].iter().all(|c| c.eq_ignore_ascii_case(&b'x'))
        && o.iter().all(|c| c.is_ascii_digit())
        && p[0] == o[0]
}

fn count_bands(value: &ObservedValue, bands: &[CountBand]) -> Verdict {
    let count = match value {
        ObservedValue::Absent => 0.0,
        other => match numeric(other) {
            Some(n) => n,
            None => {
                return Verdict::new(
                    Severity::Unknown,
                    format!("Non-numeric count '{}'", other),
                )
            }
        },
    };

    if count < 0.0 {
        return Verdict::new(Severity::Unknown, format!("Negative count {}", trim(count)));
    }
    if count == 0.0 {
        return Verdict::new(Severity::Ok, "None found");
    }

    let severity = bands
        .iter()
        .filter(|band| band.at_least as f64 <= count)
        .max_by_key(|band| band.at_least)
        .map(|band| band.severity)
        .unwrap_or(Severity::Warning);

    let message = match severity {
        Severity::Critical => format!("Immediate action required ({} found)", trim(count)),
        _ => format!("Attention needed ({} found)", trim(count)),
    };
    Verdict::new(severity, message)
}

fn replica_match(value: &ObservedValue) -> Verdict {
    match value {
        ObservedValue::Absent => Verdict::new(Severity::Ok, "No workloads reported"),
        ObservedValue::Replicas { ready, desired } => {
            if ready >= desired {
                Verdict::new(Severity::Ok, "All replicas ready")
            } else if *ready == 0 {
                Verdict::new(
                    Severity::Critical,
                    format!("No replicas ready (0/{})", desired),
                )
            } else {
                Verdict::new(
                    Severity::Warning,
                    format!("Replicas degraded ({}/{})", ready, desired),
                )
            }
        }
        other => Verdict::new(
            Severity::Unknown,
            format!("Expected ready/desired, got '{}'", other),
        ),
    }
}

fn trim(n: f64) -> String {
    ObservedValue::Number(n).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn check(policy: ThresholdPolicy) -> CheckDefinition {
        CheckDefinition::new(
            "T-001",
            "test",
            CheckCategory::Os,
            ChannelKind::RemoteShell,
            "true",
            policy,
        )
    }

    fn disk() -> CheckDefinition {
        check(ThresholdPolicy::UpperBound {
            warning: 80.0,
            critical: 95.0,
        })
    }

    #[test]
    fn test_upper_bound_bands() {
        let check = disk();
        assert_eq!(classify(&RawObservation::number(50.0), &check), Severity::Ok);
        assert_eq!(classify(&RawObservation::number(80.0), &check), Severity::Warning);
        assert_eq!(classify(&RawObservation::number(92.0), &check), Severity::Warning);
        assert_eq!(classify(&RawObservation::number(95.0), &check), Severity::Critical);
        assert_eq!(classify(&RawObservation::text("97%"), &check), Severity::Critical);
        assert_eq!(classify(&RawObservation::text("n/a"), &check), Severity::Unknown);
    }

    #[test]
    fn test_informational_always_ok() {
        let check = check(ThresholdPolicy::Informational);
        let verdict = evaluate(&RawObservation::text("5.15.0-91-generic"), &check);
        assert_eq!(verdict.severity, Severity::Ok);
        assert_eq!(verdict.message, "Information collected");
    }

    #[test]
    fn test_accepted_states() {
        let node = check(ThresholdPolicy::AcceptedStates {
            accepted: vec!["Ready".to_string()],
            on_mismatch: Severity::Critical,
        });
        assert_eq!(classify(&RawObservation::state("ready"), &node), Severity::Ok);
        assert_eq!(classify(&RawObservation::state("NotReady"), &node), Severity::Critical);
        assert_eq!(
            classify(&RawObservation::Value(ObservedValue::Absent), &node),
            Severity::Ok
        );
    }

    #[test]
    fn test_accepted_status_class() {
        let http = check(ThresholdPolicy::AcceptedStates {
            accepted: vec!["2xx".to_string(), "3xx".to_string(), "open".to_string()],
            on_mismatch: Severity::Critical,
        });
        let latency = |status| {
            RawObservation::Value(ObservedValue::Latency { millis: 5, status })
        };
        assert_eq!(classify(&latency(Some(200)), &http), Severity::Ok);
        assert_eq!(classify(&latency(Some(302)), &http), Severity::Ok);
        assert_eq!(classify(&latency(None), &http), Severity::Ok);
        assert_eq!(classify(&latency(Some(503)), &http), Severity::Critical);
    }

    #[test]
    fn test_count_bands_default() {
        let zombies = check(ThresholdPolicy::count());
        assert_eq!(classify(&RawObservation::number(0.0), &zombies), Severity::Ok);
        assert_eq!(classify(&RawObservation::number(1.0), &zombies), Severity::Warning);
        assert_eq!(classify(&RawObservation::number(3.0), &zombies), Severity::Warning);
        assert_eq!(classify(&RawObservation::number(4.0), &zombies), Severity::Critical);
        assert_eq!(classify(&RawObservation::number(-1.0), &zombies), Severity::Unknown);
    }

    #[test]
    fn test_count_bands_custom() {
        let pending = check(ThresholdPolicy::CountBands {
            bands: vec![CountBand {
                at_least: 1,
                severity: Severity::Critical,
            }],
        });
        assert_eq!(classify(&RawObservation::number(1.0), &pending), Severity::Critical);
    }

    #[test]
    fn test_replica_match() {
        let deploy = check(ThresholdPolicy::ReplicaMatch);
        let replicas =
            |ready, desired| RawObservation::Value(ObservedValue::Replicas { ready, desired });
        assert_eq!(classify(&replicas(3, 3), &deploy), Severity::Ok);
        assert_eq!(classify(&replicas(1, 3), &deploy), Severity::Warning);
        assert_eq!(classify(&replicas(0, 3), &deploy), Severity::Critical);
        assert_eq!(classify(&replicas(0, 0), &deploy), Severity::Ok);
    }

    fn any_policy() -> impl Strategy<Value = ThresholdPolicy> {
        prop_oneof![
            Just(ThresholdPolicy::Informational),
            (0.0f64..100.0, 0.0f64..100.0).prop_map(|(a, b)| ThresholdPolicy::UpperBound {
                warning: a.min(b),
                critical: a.max(b),
            }),
            Just(ThresholdPolicy::AcceptedStates {
                accepted: vec!["Ready".to_string()],
                on_mismatch: Severity::Critical,
            }),
            Just(ThresholdPolicy::count()),
            Just(ThresholdPolicy::ReplicaMatch),
        ]
    }

    fn any_value() -> impl Strategy<Value = ObservedValue> {
        prop_oneof![
            (-10.0f64..200.0).prop_map(ObservedValue::Number),
            "[a-zA-Z0-9%]{0,8}".prop_map(ObservedValue::Text),
            "[a-zA-Z]{0,8}".prop_map(ObservedValue::State),
            (0u64..5000, proptest::option::of(100u16..600))
                .prop_map(|(millis, status)| ObservedValue::Latency { millis, status }),
            (0u32..10, 0u32..10).prop_map(|(ready, desired)| ObservedValue::Replicas { ready, desired }),
            Just(ObservedValue::Absent),
        ]
    }

    fn any_failure() -> impl Strategy<Value = ChannelFailure> {
        prop_oneof![
            Just(FailureKind::Connection),
            Just(FailureKind::Timeout),
            Just(FailureKind::Parse),
        ]
        .prop_map(|kind| ChannelFailure::new(kind, "failed"))
    }

    proptest! {
        #[test]
        fn prop_failure_is_always_unknown(policy in any_policy(), failure in any_failure()) {
            let check = check(policy);
            prop_assert_eq!(classify(&RawObservation::Failure(failure), &check), Severity::Unknown);
        }

        #[test]
        fn prop_classify_is_deterministic(policy in any_policy(), value in any_value()) {
            let check = check(policy);
            let observation = RawObservation::Value(value);
            prop_assert_eq!(classify(&observation, &check), classify(&observation, &check));
        }

        #[test]
        fn prop_upper_bound_is_monotonic(a in 0.0f64..200.0, b in 0.0f64..200.0) {
            let check = disk();
            let (lo, hi) = (a.min(b), a.max(b));
            prop_assert!(
                classify(&RawObservation::number(lo), &check)
                    <= classify(&RawObservation::number(hi), &check)
            );
        }
    }
}
