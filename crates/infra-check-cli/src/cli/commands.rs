//! CLI command definitions for the audit tool
//!
//! `run` executes the catalog against the inventory and writes reports,
//! `list-checks` prints the catalog, `validate` loads both files and reports
//! what a run would do.

use clap::{Args, Parser, Subcommand, ValueEnum};
use infra_check_engine::channel::{ProbeConfig, ShellConfig};
use infra_check_engine::{
    compute_inputs_hash, plan, AuditEngine, AuditMetrics, AuditOptions, ChannelSet,
    CheckRegistry, Environment, Inventory, ReportType, SimulatedChannel,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::output::{CatalogOutput, OutputFormat, RunOutput, ValidationOutput};
use super::ExitCode;
use crate::config::{load_catalog, load_inventory, LoadedInventory};
use crate::error::{CliError, Result};
use crate::report::{write_atomic, GeneratedReports, ReportMeta, ReportWriter};

/// Server and Kubernetes cluster audit
///
/// Runs a declarative check catalog against a fleet inventory and produces
/// weekly or monthly CSV/JSON reports.
#[derive(Parser, Debug)]
#[command(name = "infra-check")]
#[command(about = "Periodic infrastructure audit with severity-ranked reports", long_about = None)]
#[command(version)]
pub struct AuditCli {
    /// Output verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: AuditCommands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum AuditCommands {
    /// Run the audit and generate reports
    Run(RunArgs),

    /// Print the check catalog
    ListChecks {
        /// Check catalog file
        #[arg(short, long, env = "INFRA_CHECK_CATALOG", default_value = DEFAULT_CATALOG)]
        checks: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Load and validate the inventory and catalog without running checks
    Validate {
        #[command(flatten)]
        inputs: InputArgs,

        /// Environments to include (repeatable)
        #[arg(short, long = "env", value_enum, default_value = "all")]
        env: Vec<EnvScope>,

        /// Output format
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

pub const DEFAULT_INVENTORY: &str = "config/inventory.yaml";
pub const DEFAULT_CATALOG: &str = "config/check_items.yaml";

/// Inventory and catalog locations
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Inventory file (yaml, json or toml)
    #[arg(short, long, env = "INFRA_CHECK_INVENTORY", default_value = DEFAULT_INVENTORY)]
    pub inventory: PathBuf,

    /// Check catalog file (yaml, json or toml)
    #[arg(short = 'c', long, env = "INFRA_CHECK_CATALOG", default_value = DEFAULT_CATALOG)]
    pub checks: PathBuf,
}

/// Options of `run`
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub inputs: InputArgs,

    /// Report type, overrides the inventory setting
    #[arg(short = 't', long = "type", value_enum)]
    pub report_type: Option<ReportKind>,

    /// Environments to audit (repeatable)
    #[arg(short, long = "env", value_enum, default_value = "all")]
    pub env: Vec<EnvScope>,

    /// Only run these check ids (repeatable)
    #[arg(long = "check", value_name = "ID")]
    pub check: Vec<String>,

    /// Use simulated data instead of live connections
    #[arg(long)]
    pub demo: bool,

    /// Seed for simulated data
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Share of simulated observations that are anomalies
    #[arg(long, default_value_t = 0.1)]
    pub anomaly_rate: f64,

    /// Maximum concurrent channel invocations
    #[arg(long, default_value_t = 10)]
    pub concurrency: usize,

    /// Per-check timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,

    /// Retries for connection and timeout failures
    #[arg(long, default_value_t = 1)]
    pub retries: u32,

    /// Deadline for the whole run in seconds
    #[arg(long)]
    pub run_timeout: Option<u64>,

    /// Report directory, overrides the inventory setting
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Skip writing report files
    #[arg(long)]
    pub no_report: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Write Prometheus metrics in text format to this file
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,

    /// SSH login user
    #[arg(long, env = "SSH_USER")]
    pub ssh_user: Option<String>,

    /// SSH private key
    #[arg(long, env = "SSH_PRIVATE_KEY_PATH")]
    pub ssh_key: Option<String>,
}

/// Report cadence
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum ReportKind {
    Weekly,
    Monthly,
}

impl From<ReportKind> for ReportType {
    fn from(kind: ReportKind) -> Self {
        match kind {
            ReportKind::Weekly => ReportType::Weekly,
            ReportKind::Monthly => ReportType::Monthly,
        }
    }
}

/// Environment selector
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum EnvScope {
    Dev,
    Stg,
    Prd,
    Shared,
    All,
}

impl EnvScope {
    /// Environments selected by a list of scopes
    pub fn resolve(scopes: &[EnvScope]) -> Vec<Environment> {
        if scopes.is_empty() || scopes.contains(&EnvScope::All) {
            return Environment::ALL.to_vec();
        }
        let mut envs: Vec<Environment> = scopes
            .iter()
            .filter_map(|scope| match scope {
                EnvScope::Dev => Some(Environment::Dev),
                EnvScope::Stg => Some(Environment::Stg),
                EnvScope::Prd => Some(Environment::Prd),
                EnvScope::Shared => Some(Environment::Shared),
                EnvScope::All => None,
            })
            .collect();
        envs.sort();
        envs.dedup();
        envs
    }
}

impl RunArgs {
    /// Engine options from the command line
    pub fn audit_options(&self, report_type: ReportType) -> Result<AuditOptions> {
        if self.concurrency == 0 {
            return Err(CliError::invalid_input("--concurrency must be at least 1"));
        }
        if self.timeout == 0 {
            return Err(CliError::invalid_input("--timeout must be at least 1 second"));
        }
        if !(0.0..=1.0).contains(&self.anomaly_rate) {
            return Err(CliError::invalid_input(format!(
                "--anomaly-rate must be between 0 and 1, got {}",
                self.anomaly_rate
            )));
        }

        Ok(AuditOptions {
            check_timeout_ms: self.timeout.saturating_mul(1000),
            max_retries: self.retries,
            concurrency: self.concurrency,
            run_timeout_ms: self.run_timeout.map(|s| s.saturating_mul(1000)),
            report_type,
            ..AuditOptions::default()
        })
    }
}

/// Inventory and registry narrowed to the requested scope
fn scoped_inputs(
    inputs: &InputArgs,
    envs: &[EnvScope],
    checks: &[String],
) -> Result<(LoadedInventory, CheckRegistry)> {
    let mut loaded = load_inventory(&inputs.inventory)?;
    let registry = load_catalog(&inputs.checks)?;
    let registry = if checks.is_empty() {
        registry
    } else {
        registry.select(checks)?
    };

    let environments = EnvScope::resolve(envs);
    loaded.inventory = std::mem::take(&mut loaded.inventory).retain_environments(&environments);
    if loaded.inventory.is_empty() {
        return Err(CliError::config_error(format!(
            "no targets in the selected environments ({})",
            environments
                .iter()
                .map(|e| e.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )));
    }

    Ok((loaded, registry))
}

/// Probe timeouts from the per-check bound and the SSH connect timeout
pub fn probe_config(options: &AuditOptions, shell: &ShellConfig) -> ProbeConfig {
    let request_timeout = options.check_timeout();
    ProbeConfig {
        connect_timeout: shell.connect_timeout.min(request_timeout),
        request_timeout,
        ..ProbeConfig::default()
    }
}

/// Execute the run command
pub async fn execute_run(args: RunArgs, quiet: bool) -> Result<ExitCode> {
    let (loaded, registry) = scoped_inputs(&args.inputs, &args.env, &args.check)?;

    let report_type = args
        .report_type
        .map(ReportType::from)
        .or(loaded.report.report_type)
        .unwrap_or_default();
    let options = args.audit_options(report_type)?;

    let channels = if args.demo {
        ChannelSet::simulated(
            SimulatedChannel::new(args.seed).with_anomaly_rate(args.anomaly_rate),
        )
    } else {
        let shell = loaded
            .ssh
            .resolve(args.ssh_user.clone(), args.ssh_key.clone());
        let probe = probe_config(&options, &shell);
        ChannelSet::live(shell, probe)?
    };

    let metrics = Arc::new(AuditMetrics::new()?);
    let engine = AuditEngine::new(channels, options).with_metrics(Arc::clone(&metrics));
    let summary = engine.run(&loaded.inventory, &registry).await?;

    let meta = ReportMeta::new(
        report_type,
        loaded.report.company_name.clone(),
        loaded.report.team_name.clone(),
    );

    let files = if args.no_report {
        GeneratedReports::default()
    } else {
        let dir = args
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(&loaded.report.output_dir));
        ReportWriter::new(dir, meta.clone()).write(&summary)?
    };

    if let Some(path) = &args.metrics_file {
        write_metrics(path, &metrics)?;
    }

    let exit_code = ExitCode::from(summary.exit_status);
    let output = RunOutput {
        report: meta,
        summary,
        files,
    };
    if !quiet || args.format != OutputFormat::Table {
        output.render(args.format)?;
    }

    Ok(exit_code)
}

fn write_metrics(path: &Path, metrics: &AuditMetrics) -> Result<()> {
    let body = metrics.render()?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CliError::invalid_input(format!("bad metrics path '{}'", path.display())))?;
    write_atomic(dir, name, body.as_bytes())?;
    Ok(())
}

/// Execute the list-checks command
pub fn execute_list_checks(checks: PathBuf, format: OutputFormat) -> Result<ExitCode> {
    let registry = load_catalog(&checks)?;
    CatalogOutput::from_registry(&registry).render(format)?;
    Ok(ExitCode::Success)
}

/// Execute the validate command
pub fn execute_validate(
    inputs: InputArgs,
    env: Vec<EnvScope>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let (loaded, registry) = scoped_inputs(&inputs, &env, &[])?;
    let output = validation_output(&inputs, &loaded.inventory, &registry);
    output.render(format)?;
    Ok(ExitCode::Success)
}

pub fn validation_output(
    inputs: &InputArgs,
    inventory: &Inventory,
    registry: &CheckRegistry,
) -> ValidationOutput {
    ValidationOutput {
        inventory: inputs.inventory.clone(),
        catalog: inputs.checks.clone(),
        environments: inventory.environments(),
        targets: inventory.targets.len(),
        clusters: inventory.clusters.len(),
        checks: registry.len(),
        work_items: plan(inventory, registry).len(),
        inputs_hash: compute_inputs_hash(inventory, registry),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        AuditCli::command().debug_assert();
    }

    #[test]
    fn test_env_scope_resolution() {
        assert_eq!(EnvScope::resolve(&[EnvScope::All]), Environment::ALL.to_vec());
        assert_eq!(EnvScope::resolve(&[]), Environment::ALL.to_vec());
        assert_eq!(
            EnvScope::resolve(&[EnvScope::Prd, EnvScope::Dev, EnvScope::Prd]),
            vec![Environment::Dev, Environment::Prd]
        );
    }

    #[test]
    fn test_run_args_parse() {
        let cli = AuditCli::try_parse_from([
            "infra-check",
            "-vv",
            "run",
            "--demo",
            "--seed",
            "7",
            "-e",
            "dev",
            "-e",
            "shared",
            "--check",
            "OS-001",
            "--type",
            "monthly",
            "--run-timeout",
            "60",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        let AuditCommands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.demo);
        assert_eq!(args.seed, 7);
        assert_eq!(args.env, vec![EnvScope::Dev, EnvScope::Shared]);
        assert_eq!(args.check, vec!["OS-001"]);
        assert_eq!(args.report_type, Some(ReportKind::Monthly));
        assert_eq!(args.format, OutputFormat::Json);

        let options = args.audit_options(ReportType::Monthly).unwrap();
        assert_eq!(options.run_timeout_ms, Some(60_000));
        assert_eq!(options.check_timeout_ms, 10_000);
        assert_eq!(options.max_retries, 1);
    }

    #[test]
    fn test_invalid_run_options() {
        let cli = AuditCli::try_parse_from(["infra-check", "run", "--concurrency", "0"]).unwrap();
        let AuditCommands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(matches!(
            args.audit_options(ReportType::Weekly),
            Err(CliError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_probe_timeouts_follow_options() {
        let cli = AuditCli::try_parse_from(["infra-check", "run", "--timeout", "3"]).unwrap();
        let AuditCommands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let options = args.audit_options(ReportType::Weekly).unwrap();

        let shell = ShellConfig {
            connect_timeout: std::time::Duration::from_secs(2),
            ..ShellConfig::default()
        };
        let probe = probe_config(&options, &shell);
        assert_eq!(probe.request_timeout, std::time::Duration::from_secs(3));
        assert_eq!(probe.connect_timeout, std::time::Duration::from_secs(2));

        let slow_connect = ShellConfig {
            connect_timeout: std::time::Duration::from_secs(10),
            ..ShellConfig::default()
        };
        assert_eq!(
            probe_config(&options, &slow_connect).connect_timeout,
            std::time::Duration::from_secs(3)
        );
    }

    #[test]
    fn test_unknown_env_rejected() {
        assert!(AuditCli::try_parse_from(["infra-check", "run", "-e", "qa"]).is_err());
    }
}
