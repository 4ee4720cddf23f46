//! Infrastructure audit CLI
//!
//! # Usage
//!
//! ```bash
//! # Weekly audit against the default inventory and catalog
//! infra-check run
//!
//! # Simulated monthly run, reproducible with a fixed seed
//! infra-check run --demo --seed 42 --type monthly
//!
//! # Only staging, two checks, metrics for the textfile collector
//! infra-check run -e stg --check OS-001 --check K8S-009 --metrics-file /var/lib/node_exporter/infra_check.prom
//!
//! # Show the catalog
//! infra-check list-checks --format yaml
//! ```
//!
//! # Exit Codes
//!
//! - 0: All checks OK
//! - 1: At least one WARNING or UNKNOWN, no CRITICAL
//! - 2: At least one CRITICAL
//! - 3: Invalid input, inventory or catalog
//! - 4: File not found or inaccessible
//! - 10: Internal error

use anyhow::Context;
use clap::Parser;
use infra_check::{logging, run_cli, AuditCli};

fn main() -> anyhow::Result<()> {
    let cli = AuditCli::parse();
    logging::init(cli.verbose, cli.quiet, cli.log_json);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let exit_code = runtime.block_on(run_cli(cli));
    std::process::exit(exit_code.into());
}
