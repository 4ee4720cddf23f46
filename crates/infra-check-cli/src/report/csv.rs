//! CSV report
//!
//! UTF-8 with a byte-order mark so spreadsheet tools pick the right encoding,
//! `#` comment lines with the report header, then one row per result.

use super::ReportMeta;
use infra_check_engine::{CheckResult, RunSummary};

const BOM: &str = "\u{feff}";

/// Line ending for every line, header block included
const EOL: &str = "\r\n";

pub const COLUMNS: [&str; 14] = [
    "check_id",
    "check_name",
    "category",
    "environment",
    "target",
    "severity",
    "observed",
    "threshold",
    "message",
    "error",
    "attempts",
    "priority",
    "role",
    "checked_at",
];

/// Quote a field when it contains a delimiter, quote or line break
pub fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn row(result: &CheckResult) -> Vec<String> {
    vec![
        result.check_id.clone(),
        result.check_name.clone(),
        result.category.label().to_string(),
        result.subject.environment.to_string(),
        result.subject.display_name(),
        result.severity.to_string(),
        result.observed_display(),
        result.threshold.clone(),
        result.message.clone(),
        result
            .error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_default(),
        result.attempts.to_string(),
        result.priority.as_str().to_string(),
        result
            .subject
            .role
            .map(|r| r.to_string())
            .unwrap_or_default(),
        result.checked_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    ]
}

fn line<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = fields
        .into_iter()
        .map(|f| escape(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(EOL);
    out
}

/// Render the full CSV document
pub fn render(summary: &RunSummary, meta: &ReportMeta) -> String {
    let counts = &summary.counts;
    let mut out = String::from(BOM);

    let mut header = |text: String| {
        out.push_str(&text);
        out.push_str(EOL);
    };
    header(format!("# {}", meta.title));
    header(format!(
        "# Generated: {}",
        meta.generated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    header(format!("# Company: {}", meta.company_name));
    header(format!("# Team: {}", meta.team_name));
    if summary.demo_mode {
        header("# Mode: demo (simulated data)".to_string());
    }
    header(format!("# Total checks: {}", summary.total()));
    header(format!(
        "# OK: {} / WARNING: {} / CRITICAL: {} / UNKNOWN: {}",
        counts.ok, counts.warning, counts.critical, counts.unknown
    ));
    header(String::new());

    out.push_str(&line(COLUMNS));
    for result in summary.sorted_results() {
        out.push_str(&line(row(result)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportMeta;
    use infra_check_engine::{
        Aggregator, CheckCategory, ChannelFailure, Environment, ObservedValue, ReportType,
        ResultSubject, Role, Severity,
    };

    fn summary() -> RunSummary {
        let mut agg = Aggregator::new(ReportType::Weekly);
        agg.fold(
            CheckResult::new(
                "OS-001",
                "Disk usage",
                CheckCategory::Os,
                ResultSubject::new(Environment::Dev, "dev-w1").with_role(Role::Worker),
                Severity::Warning,
                Some(ObservedValue::Number(85.0)),
                "warn >= 80, crit >= 90",
                "Approaching threshold (>= 80)",
            )
            .with_unit("%"),
        );
        agg.fold(
            CheckResult::new(
                "CICD-001",
                "Jenkins \"main\"",
                CheckCategory::Cicd,
                ResultSubject::new(Environment::Shared, "ci-1"),
                Severity::Unknown,
                None,
                "2xx|3xx",
                "Check failed",
            )
            .with_error(ChannelFailure::timeout("no response, 10s"))
            .with_attempts(2),
        );
        agg.finish()
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_render_layout() {
        let meta = ReportMeta::new(ReportType::Weekly, "Example Corp", "Platform");
        let csv = render(&summary(), &meta);

        assert!(csv.starts_with('\u{feff}'));
        let body = csv.trim_start_matches('\u{feff}');
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines[0], format!("# {}", meta.title));
        assert!(lines[1].starts_with("# Generated: "));
        assert_eq!(lines[2], "# Company: Example Corp");
        assert_eq!(lines[3], "# Team: Platform");
        assert_eq!(lines[4], "# Total checks: 2");
        assert_eq!(lines[5], "# OK: 0 / WARNING: 1 / CRITICAL: 0 / UNKNOWN: 1");
        assert_eq!(lines[6], "");
        assert!(lines[7].starts_with("check_id,check_name,category"));

        // DEV sorts before SHARED
        assert!(lines[8].starts_with("OS-001,Disk usage,OS,DEV,dev-w1,WARNING,85%,"));
        assert!(lines[8].contains("\"warn >= 80, crit >= 90\""));
        assert!(lines[9].starts_with("CICD-001,\"Jenkins \"\"main\"\"\",CI/CD,SHARED,ci-1,UNKNOWN,-,"));
        assert!(lines[9].contains("\"TimeoutError: no response, 10s\""));
        assert_eq!(lines.len(), 10);
        assert_eq!(body.matches("\r\n").count(), 10);
        assert_eq!(body.matches('\n').count(), 10);
    }
}
