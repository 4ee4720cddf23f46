//! Result aggregation
//!
//! Single-writer fold of finalized results into a `RunSummary`.

use crate::contracts::*;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Aggregator {
    run_id: Uuid,
    report_type: ReportType,
    demo_mode: bool,
    inputs_hash: String,
    started_at: DateTime<Utc>,
    results: Vec<CheckResult>,
    counts: SeverityCounts,
    by_environment: BTreeMap<Environment, SeverityCounts>,
    by_category: BTreeMap<CheckCategory, SeverityCounts>,
}

impl Aggregator {
    pub fn new(report_type: ReportType) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            report_type,
            demo_mode: false,
            inputs_hash: String::new(),
            started_at: Utc::now(),
            results: Vec::new(),
            counts: SeverityCounts::default(),
            by_environment: BTreeMap::new(),
            by_category: BTreeMap::new(),
        }
    }

    pub fn with_demo_mode(mut self, demo_mode: bool) -> Self {
        self.demo_mode = demo_mode;
        self
    }

    pub fn with_inputs_hash(mut self, hash: impl Into<String>) -> Self {
        self.inputs_hash = hash.into();
        self
    }

    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// Fold one finalized result
    pub fn fold(&mut self, result: CheckResult) {
        self.counts.record(result.severity);
        self.by_environment
            .entry(result.subject.environment)
            .or_default()
            .record(result.severity);
        self.by_category
            .entry(result.category)
            .or_default()
            .record(result.severity);
        self.results.push(result);
    }

    pub fn counts(&self) -> &SeverityCounts {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Seal the summary; the exit status depends only on the tallies
    pub fn finish(self) -> RunSummary {
        let completed_at = Utc::now();
        let duration_ms = (completed_at - self.started_at).num_milliseconds().max(0) as u64;

        RunSummary {
            run_id: self.run_id,
            report_type: self.report_type,
            demo_mode: self.demo_mode,
            inputs_hash: self.inputs_hash,
            started_at: self.started_at,
            completed_at,
            duration_ms,
            exit_status: ExitStatus::from_counts(&self.counts),
            results: self.results,
            counts: self.counts,
            by_environment: self.by_environment,
            by_category: self.by_category,
        }
    }
}

impl Extend<CheckResult> for Aggregator {
    fn extend<I: IntoIterator<Item = CheckResult>>(&mut self, iter: I) {
        for result in iter {
            self.fold(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn result(env: Environment, category: CheckCategory, severity: Severity) -> CheckResult {
        CheckResult::new(
            "X-001",
            "test",
            category,
            ResultSubject::new(env, "host"),
            severity,
            None,
            "-",
            "",
        )
    }

    #[test]
    fn test_fold_tallies() {
        let mut agg = Aggregator::new(ReportType::Monthly).with_demo_mode(true);
        agg.extend(vec![
            result(Environment::Dev, CheckCategory::Os, Severity::Ok),
            result(Environment::Dev, CheckCategory::Os, Severity::Warning),
            result(Environment::Prd, CheckCategory::Cluster, Severity::Critical),
            result(Environment::Shared, CheckCategory::Cicd, Severity::Unknown),
        ]);
        let summary = agg.finish();

        assert_eq!(summary.total(), 4);
        assert_eq!(summary.counts.critical, 1);
        assert_eq!(summary.by_environment[&Environment::Dev].warning, 1);
        assert_eq!(summary.by_environment[&Environment::Dev].ok, 1);
        assert_eq!(summary.by_category[&CheckCategory::Cicd].unknown, 1);
        assert_eq!(summary.exit_status, ExitStatus::Critical);
        assert_eq!(summary.report_type, ReportType::Monthly);
        assert!(summary.demo_mode);
    }

    #[test]
    fn test_empty_run_is_success() {
        let summary = Aggregator::new(ReportType::Weekly).finish();
        assert_eq!(summary.exit_code(), 0);
        assert!(summary.issues().is_empty());
    }

    #[test]
    fn test_sorted_results_presentation_order() {
        let mut agg = Aggregator::new(ReportType::Weekly);
        agg.fold(result(Environment::Prd, CheckCategory::Os, Severity::Ok));
        agg.fold(result(Environment::Dev, CheckCategory::Os, Severity::Ok));
        agg.fold(result(Environment::Dev, CheckCategory::Os, Severity::Critical));
        agg.fold(result(Environment::Dev, CheckCategory::Os, Severity::Unknown));
        let summary = agg.finish();

        let order: Vec<_> = summary
            .sorted_results()
            .iter()
            .map(|r| (r.subject.environment, r.severity))
            .collect();
        assert_eq!(
            order,
            vec![
                (Environment::Dev, Severity::Critical),
                (Environment::Dev, Severity::Unknown),
                (Environment::Dev, Severity::Ok),
                (Environment::Prd, Severity::Ok),
            ]
        );
        assert_eq!(summary.issues().len(), 1);
    }

    fn any_severity() -> impl Strategy<Value = Severity> {
        prop_oneof![
            Just(Severity::Ok),
            Just(Severity::Warning),
            Just(Severity::Critical),
            Just(Severity::Unknown),
        ]
    }

    proptest! {
        #[test]
        fn prop_exit_status_is_order_independent(
            (original, shuffled) in prop::collection::vec(any_severity(), 0..40)
                .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
        ) {
            let fold = |severities: &[Severity]| {
                let mut agg = Aggregator::new(ReportType::Weekly);
                agg.extend(severities.iter().map(|s| result(Environment::Dev, CheckCategory::Os, *s)));
                agg.finish()
            };
            let a = fold(&original);
            let b = fold(&shuffled);
            prop_assert_eq!(a.counts, b.counts);
            prop_assert_eq!(a.exit_status, b.exit_status);
        }

        #[test]
        fn prop_exit_status_matches_tallies(severities in prop::collection::vec(any_severity(), 0..40)) {
            let mut agg = Aggregator::new(ReportType::Weekly);
            agg.extend(severities.iter().map(|s| result(Environment::Stg, CheckCategory::Os, *s)));
            let summary = agg.finish();

            let critical = severities.iter().any(|s| *s == Severity::Critical);
            let degraded = severities.iter().any(|s| matches!(s, Severity::Warning | Severity::Unknown));
            let expected = if critical { 2 } else if degraded { 1 } else { 0 };
            prop_assert_eq!(summary.exit_code(), expected);
            prop_assert_eq!(summary.total() as usize, severities.len());
        }
    }
}
