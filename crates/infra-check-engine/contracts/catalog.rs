//! Check catalog contracts
//!
//! A `CheckDefinition` declares what to run, through which channel, and how the
//! returned value is classified.

use super::inventory::Role;
use super::result::Severity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution channel a check runs through
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Command over a remote shell session on the target
    RemoteShell,
    /// Query against a cluster control plane
    ClusterQuery,
    /// TCP connect or HTTP request to a service port
    NetworkProbe,
    /// Read-only status query against a database endpoint
    DatabaseProbe,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 4] = [
        ChannelKind::RemoteShell,
        ChannelKind::ClusterQuery,
        ChannelKind::NetworkProbe,
        ChannelKind::DatabaseProbe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::RemoteShell => "remote_shell",
            ChannelKind::ClusterQuery => "cluster_query",
            ChannelKind::NetworkProbe => "network_probe",
            ChannelKind::DatabaseProbe => "database_probe",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog group a check belongs to
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    #[default]
    Os,
    Cluster,
    Service,
    Cicd,
    Database,
}

impl CheckCategory {
    pub const ALL: [CheckCategory; 5] = [
        CheckCategory::Os,
        CheckCategory::Cluster,
        CheckCategory::Service,
        CheckCategory::Cicd,
        CheckCategory::Database,
    ];

    /// Label used in reports
    pub fn label(&self) -> &'static str {
        match self {
            CheckCategory::Os => "OS",
            CheckCategory::Cluster => "Kubernetes",
            CheckCategory::Service => "Services",
            CheckCategory::Cicd => "CI/CD",
            CheckCategory::Database => "Database",
        }
    }

    /// Roles a check of this category applies to when it declares none
    pub fn default_roles(&self) -> &'static [Role] {
        match self {
            CheckCategory::Os => &[Role::Master, Role::Worker],
            CheckCategory::Cluster | CheckCategory::Service => &[Role::Master],
            CheckCategory::Cicd => &[Role::CicdService],
            CheckCategory::Database => &[Role::Database],
        }
    }
}

impl fmt::Display for CheckCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a cluster query result maps onto results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanOut {
    /// One result for the whole cluster
    #[default]
    Aggregate,
    /// One result per returned resource (node, pod, volume)
    PerResource,
}

/// Parser applied to channel stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueParser {
    /// A single number, optional trailing '%'
    Number,
    /// Free text kept verbatim
    Text,
    /// A state token (Ready, Bound, active, ...)
    State,
    /// `ready/desired`
    Replicas,
}

/// Business importance carried through to the report
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

/// Count threshold and the severity it escalates to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountBand {
    pub at_least: u64,
    pub severity: Severity,
}

fn default_count_bands() -> Vec<CountBand> {
    vec![
        CountBand {
            at_least: 1,
            severity: Severity::Warning,
        },
        CountBand {
            at_least: 4,
            severity: Severity::Critical,
        },
    ]
}

fn default_on_mismatch() -> Severity {
    Severity::Warning
}

/// Rule mapping an observed value to a severity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdPolicy {
    /// Captured for the record, always OK
    Informational,

    /// CRITICAL at or above `critical`, WARNING at or above `warning`
    UpperBound { warning: f64, critical: f64 },

    /// OK iff the observed state is accepted
    AcceptedStates {
        accepted: Vec<String>,
        #[serde(default = "default_on_mismatch")]
        on_mismatch: Severity,
    },

    /// OK iff zero, escalating with the count
    CountBands {
        #[serde(default = "default_count_bands")]
        bands: Vec<CountBand>,
    },

    /// ready replicas against desired replicas
    ReplicaMatch,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        ThresholdPolicy::Informational
    }
}

impl ThresholdPolicy {
    /// Count policy with the default bands
    pub fn count() -> Self {
        ThresholdPolicy::CountBands {
            bands: default_count_bands(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ThresholdPolicy::Informational => "informational",
            ThresholdPolicy::UpperBound { .. } => "upper_bound",
            ThresholdPolicy::AcceptedStates { .. } => "accepted_states",
            ThresholdPolicy::CountBands { .. } => "count_bands",
            ThresholdPolicy::ReplicaMatch => "replica_match",
        }
    }

    /// Human readable threshold, as shown in the report
    pub fn describe(&self) -> String {
        match self {
            ThresholdPolicy::Informational => "-".to_string(),
            ThresholdPolicy::UpperBound { warning, critical } => {
                format!("warn >= {}, crit >= {}", trim_float(*warning), trim_float(*critical))
            }
            ThresholdPolicy::AcceptedStates { accepted, .. } => accepted.join("|"),
            ThresholdPolicy::CountBands { .. } => "0".to_string(),
            ThresholdPolicy::ReplicaMatch => "ready = desired".to_string(),
        }
    }

    fn default_parser(&self) -> ValueParser {
        match self {
            ThresholdPolicy::Informational => ValueParser::Text,
            ThresholdPolicy::UpperBound { .. } | ThresholdPolicy::CountBands { .. } => {
                ValueParser::Number
            }
            ThresholdPolicy::AcceptedStates { .. } => ValueParser::State,
            ThresholdPolicy::ReplicaMatch => ValueParser::Replicas,
        }
    }
}

pub(crate) fn trim_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// A declared audit rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckDefinition {
    /// Stable identifier (e.g. "OS-001")
    pub id: String,

    /// Human label
    pub name: String,

    /// Longer description
    #[serde(default)]
    pub description: String,

    /// Catalog group, stamped from the group the check is declared in
    #[serde(default)]
    pub category: CheckCategory,

    /// Execution channel
    pub channel: ChannelKind,

    /// Command or query template
    pub command: String,

    /// Threshold policy
    #[serde(default)]
    pub policy: ThresholdPolicy,

    /// Unit of the observed value
    #[serde(default)]
    pub unit: String,

    /// Output parser override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parser: Option<ValueParser>,

    /// Cluster query fan-out
    #[serde(default)]
    pub fan_out: FanOut,

    /// Roles the check applies to (category defaults when empty)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<Role>,

    /// Business priority
    #[serde(default)]
    pub priority: Priority,
}

impl CheckDefinition {
    /// Minimal definition, mostly useful for tests and programmatic catalogs
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: CheckCategory,
        channel: ChannelKind,
        command: impl Into<String>,
        policy: ThresholdPolicy,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category,
            channel,
            command: command.into(),
            policy,
            unit: String::new(),
            parser: None,
            fan_out: FanOut::Aggregate,
            roles: Vec::new(),
            priority: Priority::Medium,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_fan_out(mut self, fan_out: FanOut) -> Self {
        self.fan_out = fan_out;
        self
    }

    pub fn with_roles(mut self, roles: Vec<Role>) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_parser(mut self, parser: ValueParser) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Parser for the channel's raw output
    pub fn value_parser(&self) -> ValueParser {
        self.parser.unwrap_or_else(|| self.policy.default_parser())
    }

    /// Roles this check runs against
    pub fn applicable_roles(&self) -> &[Role] {
        if self.roles.is_empty() {
            self.category.default_roles()
        } else {
            &self.roles
        }
    }

    pub fn is_per_resource(&self) -> bool {
        self.fan_out == FanOut::PerResource
    }
}
