//! End-to-end tests of the audit CLI against the fixture inventory and catalog

use clap::Parser;
use infra_check::cli::{self, commands, EnvScope, InputArgs};
use infra_check::config::{load_catalog, load_inventory, substitute_vars};
use infra_check::report::{ReportMeta, ReportWriter};
use infra_check::{AuditCli, CliError, ExitCode};
use infra_check_engine::{
    AuditEngine, AuditOptions, ChannelSet, Environment, ReportType, Role, Severity,
    SimulatedChannel,
};
use std::path::PathBuf;
use tokio_test::assert_ok;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn fixture_str(name: &str) -> String {
    fixture(name).to_string_lossy().into_owned()
}

fn parse(args: &[&str]) -> AuditCli {
    let inventory = fixture_str("inventory.yaml");
    let checks = fixture_str("check_items.yaml");
    let mut argv = vec!["infra-check", "-q"];
    argv.extend_from_slice(args);
    argv.extend_from_slice(&["-i", inventory.as_str(), "-c", checks.as_str()]);
    AuditCli::try_parse_from(argv).unwrap()
}

#[test]
fn test_fixture_inventory_loads() {
    let loaded = load_inventory(&fixture("inventory.yaml")).unwrap();
    let inventory = &loaded.inventory;

    assert_eq!(inventory.targets.len(), 7);
    assert_eq!(inventory.clusters.len(), 2);
    assert_eq!(
        inventory.environments(),
        vec![Environment::Dev, Environment::Prd, Environment::Shared]
    );
    assert_eq!(
        inventory.targets_with_roles(&[Role::Database]).count(),
        1
    );
    assert_eq!(loaded.report.company_name, "Fixture Corp");
}

#[test]
fn test_toml_inventory_loads() {
    let loaded = load_inventory(&fixture("inventory.toml")).unwrap();
    assert_eq!(loaded.inventory.targets.len(), 2);
    assert_eq!(loaded.inventory.clusters[0].environment, Environment::Stg);
    assert_eq!(loaded.report.report_type, Some(ReportType::Monthly));
    assert_eq!(loaded.ssh.default_user.as_deref(), Some("audit"));
}

#[test]
fn test_unset_variable_stays_verbatim() {
    let content = std::fs::read_to_string(fixture("inventory.yaml")).unwrap();
    let substituted = substitute_vars(&content, |_| None).unwrap();
    assert!(substituted.contains("default_user: ${INFRA_CHECK_FIXTURE_USER}"));

    let substituted = substitute_vars(&content, |name| {
        (name == "INFRA_CHECK_FIXTURE_USER").then(|| "auditor".to_string())
    })
    .unwrap();
    assert!(substituted.contains("default_user: auditor"));
}

#[test]
fn test_validate_counts_work_items() {
    let inputs = InputArgs {
        inventory: fixture("inventory.yaml"),
        checks: fixture("check_items.yaml"),
    };
    let loaded = load_inventory(&inputs.inventory).unwrap();
    let registry = load_catalog(&inputs.checks).unwrap();

    let output = commands::validation_output(&inputs, &loaded.inventory, &registry);
    assert_eq!(output.targets, 7);
    assert_eq!(output.clusters, 2);
    assert_eq!(output.checks, 6);
    // 5 hosts x 2 OS checks, 2 clusters x 2 cluster checks, 1 CI/CD and 1 DB service
    assert_eq!(output.work_items, 16);
    assert_eq!(output.inputs_hash.len(), 64);
}

#[test]
fn test_invalid_catalog_is_input_error() {
    let err = load_catalog(&fixture("invalid_catalog.yaml")).unwrap_err();
    assert!(matches!(err, CliError::Engine(_)));
    assert_eq!(ExitCode::from_error(&err), ExitCode::InvalidInput);
}

#[tokio::test]
async fn test_demo_run_without_anomalies_succeeds() {
    let cli = parse(&["run", "--demo", "--anomaly-rate", "0", "--no-report"]);
    let code = assert_ok!(cli::run(cli).await);
    assert_eq!(code, ExitCode::Success);
}

#[tokio::test]
async fn test_demo_run_with_anomalies_is_critical() {
    let cli = parse(&["run", "--demo", "--seed", "3", "--anomaly-rate", "1", "--no-report"]);
    let code = cli::run(cli).await.unwrap();
    assert_eq!(code, ExitCode::Critical);
}

#[tokio::test]
async fn test_run_writes_reports_and_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("reports");
    let metrics = dir.path().join("infra_check.prom");
    let out_str = out.to_string_lossy().into_owned();
    let metrics_str = metrics.to_string_lossy().into_owned();

    let cli = parse(&[
        "run",
        "--demo",
        "--anomaly-rate",
        "0",
        "--type",
        "monthly",
        "-o",
        out_str.as_str(),
        "--metrics-file",
        metrics_str.as_str(),
    ]);
    assert_eq!(assert_ok!(cli::run(cli).await), ExitCode::Success);

    let mut names: Vec<String> = std::fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names.len(), 2);
    assert!(names[0].starts_with("infra_check_") && names[0].ends_with(".csv"));
    assert!(names[1].ends_with(".json"));

    let csv = std::fs::read_to_string(out.join(&names[0])).unwrap();
    assert!(csv.starts_with('\u{feff}'));
    assert!(csv.contains("# Company: Fixture Corp"));
    assert!(csv.contains("# Mode: demo (simulated data)"));

    let prom = std::fs::read_to_string(&metrics).unwrap();
    assert!(prom.contains("infra_check_runs_total{exit=\"0\"} 1"));
}

#[tokio::test]
async fn test_env_filter_limits_targets() {
    let loaded = load_inventory(&fixture("inventory.yaml")).unwrap();
    let registry = load_catalog(&fixture("check_items.yaml")).unwrap();
    let inventory = loaded
        .inventory
        .retain_environments(&EnvScope::resolve(&[EnvScope::Shared]));

    let engine = AuditEngine::new(
        ChannelSet::simulated(SimulatedChannel::new(1).with_anomaly_rate(0.0)),
        AuditOptions::default(),
    );
    let summary = engine.run(&inventory, &registry).await.unwrap();

    assert_eq!(summary.total(), 1);
    assert_eq!(summary.results[0].check_id, "CICD-001");
    assert_eq!(summary.results[0].subject.environment, Environment::Shared);
}

#[tokio::test]
async fn test_report_rows_follow_presentation_order() {
    let loaded = load_inventory(&fixture("inventory.yaml")).unwrap();
    let registry = load_catalog(&fixture("check_items.yaml")).unwrap();
    let simulator = SimulatedChannel::new(5)
        .with_anomaly_rate(0.0)
        .with_script("OS-001", "prd-w2", infra_check_engine::RawObservation::number(97.0));

    let engine = AuditEngine::new(ChannelSet::simulated(simulator), AuditOptions::default());
    let summary = engine.run(&loaded.inventory, &registry).await.unwrap();
    assert_eq!(summary.counts.critical, 1);

    let dir = tempfile::tempdir().unwrap();
    let meta = ReportMeta::new(ReportType::Weekly, "Fixture Corp", "Audit Team");
    let files = ReportWriter::new(dir.path(), meta).write(&summary).unwrap();

    let csv = std::fs::read_to_string(files.csv.unwrap()).unwrap();
    let rows: Vec<&str> = csv
        .lines()
        .skip_while(|l| !l.starts_with("check_id,"))
        .skip(1)
        .collect();
    assert_eq!(rows.len(), summary.results.len());

    // DEV rows precede PRD rows; the critical result leads the PRD block
    let first_prd = rows.iter().position(|r| r.contains(",PRD,")).unwrap();
    assert!(rows[..first_prd].iter().all(|r| r.contains(",DEV,")));
    assert!(rows[first_prd].starts_with("OS-001,") && rows[first_prd].contains(",CRITICAL,"));

    let issues = summary.issues();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, Severity::Critical);
    assert_eq!(issues[0].subject.host, "prd-w2");
}

#[tokio::test]
async fn test_missing_inventory_maps_to_file_error() {
    let cli = AuditCli::try_parse_from([
        "infra-check",
        "-q",
        "run",
        "--demo",
        "-i",
        "/nonexistent/inventory.yaml",
    ])
    .unwrap();
    let err = cli::run(cli).await.unwrap_err();
    assert_eq!(ExitCode::from_error(&err), ExitCode::FileError);
}

#[tokio::test]
async fn test_unknown_check_selection_is_input_error() {
    let cli = parse(&["run", "--demo", "--check", "NOPE-1", "--no-report"]);
    let err = cli::run(cli).await.unwrap_err();
    assert_eq!(ExitCode::from_error(&err), ExitCode::InvalidInput);
}
