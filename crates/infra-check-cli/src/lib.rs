//! Infrastructure audit CLI
//!
//! Loads the fleet inventory and check catalog, drives the
//! `infra-check-engine` run and writes CSV/JSON reports.
//!
//! ## Architecture
//!
//! 1. **Config** (`config/`): inventory and catalog files with `${VAR}`
//!    substitution, converted into engine types.
//! 2. **CLI** (`cli/`): clap commands and table/JSON/YAML output.
//! 3. **Report** (`report/`): period-named CSV and JSON files, written atomically.
//! 4. **Logging** (`logging`): tracing subscriber on stderr.
//!
//! ## Usage
//!
//! ```bash
//! # Weekly audit of every environment
//! infra-check run
//!
//! # Monthly demo run for production only, JSON on stdout
//! infra-check run --demo --type monthly --env prd --format json
//!
//! # Validate inventory and catalog
//! infra-check validate -i config/inventory.yaml -c config/check_items.yaml
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod report;

pub use cli::{AuditCli, ExitCode, OutputFormat};
pub use error::{CliError, Result};

/// Run the CLI and map errors onto exit codes
pub async fn run_cli(cli: AuditCli) -> ExitCode {
    match cli::run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {}", err);
            tracing::error!(error = %err, user_error = err.is_user_error(), "command failed");
            ExitCode::from_error(&err)
        }
    }
}
