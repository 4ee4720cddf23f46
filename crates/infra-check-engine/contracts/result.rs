//! Observations and results

use super::catalog::{CheckCategory, Priority};
use super::inventory::{Environment, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Severity of one check result
///
/// Ordered by rank: CRITICAL > WARNING > UNKNOWN > OK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::Warning,
        Severity::Unknown,
        Severity::Ok,
    ];

    pub fn rank(&self) -> u8 {
        match self {
            Severity::Ok => 0,
            Severity::Unknown => 1,
            Severity::Warning => 2,
            Severity::Critical => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
            Severity::Unknown => "UNKNOWN",
        }
    }

    /// WARNING or CRITICAL
    pub fn needs_action(&self) -> bool {
        matches!(self, Severity::Warning | Severity::Critical)
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure taxonomy of a channel invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    #[serde(rename = "ConnectionError")]
    Connection,
    #[serde(rename = "TimeoutError")]
    Timeout,
    #[serde(rename = "ParseError")]
    Parse,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Connection => "ConnectionError",
            FailureKind::Timeout => "TimeoutError",
            FailureKind::Parse => "ParseError",
        })
    }
}

/// Failure marker carried by an observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelFailure {
    pub kind: FailureKind,
    pub detail: String,

    /// Raw output captured for diagnostics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl ChannelFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            raw: None,
        }
    }

    pub fn connection(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Connection, detail)
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, detail)
    }

    pub fn parse(detail: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Parse,
            detail: detail.into(),
            raw: Some(raw.into()),
        }
    }
}

impl fmt::Display for ChannelFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// A value returned by a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ObservedValue {
    Number(f64),
    Text(String),
    State(String),
    Latency {
        millis: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
    },
    Replicas {
        ready: u32,
        desired: u32,
    },
    /// Query returned nothing
    Absent,
}

impl fmt::Display for ObservedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservedValue::Number(n) => f.write_str(&super::catalog::trim_float(*n)),
            ObservedValue::Text(s) | ObservedValue::State(s) => f.write_str(s),
            ObservedValue::Latency {
                millis,
                status: Some(code),
            } => write!(f, "HTTP {} ({}ms)", code, millis),
            ObservedValue::Latency {
                millis,
                status: None,
            } => write!(f, "open ({}ms)", millis),
            ObservedValue::Replicas { ready, desired } => write!(f, "{}/{}", ready, desired),
            ObservedValue::Absent => f.write_str("none"),
        }
    }
}

/// Unprocessed return of one channel invocation
#[derive(Debug, Clone, PartialEq)]
pub enum RawObservation {
    Value(ObservedValue),
    Failure(ChannelFailure),
}

impl RawObservation {
    pub fn number(n: f64) -> Self {
        RawObservation::Value(ObservedValue::Number(n))
    }

    pub fn state(s: impl Into<String>) -> Self {
        RawObservation::Value(ObservedValue::State(s.into()))
    }

    pub fn text(s: impl Into<String>) -> Self {
        RawObservation::Value(ObservedValue::Text(s.into()))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RawObservation::Failure(_))
    }
}

impl From<ChannelFailure> for RawObservation {
    fn from(failure: ChannelFailure) -> Self {
        RawObservation::Failure(failure)
    }
}

/// What a result is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSubject {
    pub environment: Environment,

    /// Hostname, or cluster name for cluster-scoped checks
    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// Node, pod, volume or service name when fanned out
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl ResultSubject {
    pub fn new(environment: Environment, host: impl Into<String>) -> Self {
        Self {
            environment,
            host: host.into(),
            role: None,
            resource: None,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// `host` or `host/resource`
    pub fn display_name(&self) -> String {
        match &self.resource {
            Some(resource) => format!("{}/{}", self.host, resource),
            None => self.host.clone(),
        }
    }
}

/// One classified check result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_id: String,
    pub check_name: String,
    pub category: CheckCategory,
    pub subject: ResultSubject,
    pub severity: Severity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<ObservedValue>,

    /// Threshold description
    pub threshold: String,

    #[serde(default)]
    pub unit: String,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ChannelFailure>,

    /// Channel invocations spent on this result
    pub attempts: u32,

    #[serde(default)]
    pub priority: Priority,

    pub checked_at: DateTime<Utc>,
}

impl CheckResult {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        check_id: impl Into<String>,
        check_name: impl Into<String>,
        category: CheckCategory,
        subject: ResultSubject,
        severity: Severity,
        observed: Option<ObservedValue>,
        threshold: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            check_id: check_id.into(),
            check_name: check_name.into(),
            category,
            subject,
            severity,
            observed,
            threshold: threshold.into(),
            unit: String::new(),
            message: message.into(),
            error: None,
            attempts: 1,
            priority: Priority::Medium,
            checked_at: Utc::now(),
        }
    }

    pub fn with_error(mut self, error: ChannelFailure) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Observed value with its unit, "-" when nothing was observed
    pub fn observed_display(&self) -> String {
        match &self.observed {
            Some(ObservedValue::Number(n)) if !self.unit.is_empty() => {
                format!("{}{}", super::catalog::trim_float(*n), self.unit)
            }
            Some(value) => value.to_string(),
            None => "-".to_string(),
        }
    }
}
