//! Run summary and exit status

use super::catalog::CheckCategory;
use super::inventory::Environment;
use super::result::{CheckResult, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Reporting cadence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    #[default]
    Weekly,
    Monthly,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Weekly => "weekly",
            ReportType::Monthly => "monthly",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "weekly" => Ok(ReportType::Weekly),
            "monthly" => Ok(ReportType::Monthly),
            _ => Err(format!("Unknown report type: {}", s)),
        }
    }
}

/// Per-severity tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub ok: u32,
    pub warning: u32,
    pub critical: u32,
    pub unknown: u32,
}

impl SeverityCounts {
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Ok => self.ok += 1,
            Severity::Warning => self.warning += 1,
            Severity::Critical => self.critical += 1,
            Severity::Unknown => self.unknown += 1,
        }
    }

    pub fn get(&self, severity: Severity) -> u32 {
        match severity {
            Severity::Ok => self.ok,
            Severity::Warning => self.warning,
            Severity::Critical => self.critical,
            Severity::Unknown => self.unknown,
        }
    }

    pub fn total(&self) -> u32 {
        self.ok + self.warning + self.critical + self.unknown
    }

    /// Worst severity present, `None` when empty
    pub fn worst(&self) -> Option<Severity> {
        Severity::ALL.into_iter().find(|s| self.get(*s) > 0)
    }
}

/// Process-level outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    /// Everything OK
    Success,
    /// Worst result is WARNING or UNKNOWN
    Warning,
    /// At least one CRITICAL
    Critical,
}

impl ExitStatus {
    /// Pure function of the final tallies
    pub fn from_counts(counts: &SeverityCounts) -> Self {
        if counts.critical > 0 {
            ExitStatus::Critical
        } else if counts.warning > 0 || counts.unknown > 0 {
            ExitStatus::Warning
        } else {
            ExitStatus::Success
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Warning => 1,
            ExitStatus::Critical => 2,
        }
    }
}

/// Consolidated outcome of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub report_type: ReportType,
    pub demo_mode: bool,

    /// SHA-256 over target identities and check IDs
    pub inputs_hash: String,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,

    /// Results in completion order
    pub results: Vec<CheckResult>,

    pub counts: SeverityCounts,
    pub by_environment: BTreeMap<Environment, SeverityCounts>,
    pub by_category: BTreeMap<CheckCategory, SeverityCounts>,
    pub exit_status: ExitStatus,
}

impl RunSummary {
    pub fn total(&self) -> u32 {
        self.counts.total()
    }

    /// Results in presentation order: environment, severity descending,
    /// check id, host, resource
    pub fn sorted_results(&self) -> Vec<&CheckResult> {
        let mut sorted: Vec<&CheckResult> = self.results.iter().collect();
        sorted.sort_by(|a, b| {
            a.subject
                .environment
                .cmp(&b.subject.environment)
                .then_with(|| b.severity.cmp(&a.severity))
                .then_with(|| a.check_id.cmp(&b.check_id))
                .then_with(|| a.subject.host.cmp(&b.subject.host))
                .then_with(|| a.subject.resource.cmp(&b.subject.resource))
        });
        sorted
    }

    /// WARNING and CRITICAL results in presentation order
    pub fn issues(&self) -> Vec<&CheckResult> {
        self.sorted_results()
            .into_iter()
            .filter(|r| r.severity.needs_action())
            .collect()
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_status.code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_mapping() {
        let mut counts = SeverityCounts::default();
        assert_eq!(ExitStatus::from_counts(&counts), ExitStatus::Success);

        counts.record(Severity::Ok);
        counts.record(Severity::Unknown);
        assert_eq!(ExitStatus::from_counts(&counts).code(), 1);

        counts.record(Severity::Critical);
        assert_eq!(ExitStatus::from_counts(&counts).code(), 2);
    }

    #[test]
    fn test_worst() {
        let mut counts = SeverityCounts::default();
        assert_eq!(counts.worst(), None);
        counts.record(Severity::Unknown);
        assert_eq!(counts.worst(), Some(Severity::Unknown));
        counts.record(Severity::Warning);
        assert_eq!(counts.worst(), Some(Severity::Warning));
        assert_eq!(counts.total(), 2);
    }

    #[test]
    fn test_report_type_parse() {
        assert_eq!("Monthly".parse::<ReportType>().unwrap(), ReportType::Monthly);
        assert!("daily".parse::<ReportType>().is_err());
    }
}
