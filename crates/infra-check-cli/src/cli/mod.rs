//! CLI module for the audit tool
//!
//! Exit codes follow the audit outcome for `run`; everything that stops a
//! run before it starts maps onto the codes from 3 upwards.

pub mod commands;
pub mod output;

pub use commands::{AuditCli, AuditCommands, EnvScope, InputArgs, ReportKind, RunArgs};
pub use output::OutputFormat;

use crate::error::{CliError, Result};
use infra_check_engine::ExitStatus;

/// Process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// All results OK
    Success = 0,
    /// Worst result is WARNING or UNKNOWN
    Warning = 1,
    /// At least one CRITICAL result
    Critical = 2,
    /// Invalid arguments, inventory or catalog
    InvalidInput = 3,
    /// Input file missing or unreadable
    FileError = 4,
    /// Internal error
    InternalError = 10,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        match status {
            ExitStatus::Success => ExitCode::Success,
            ExitStatus::Warning => ExitCode::Warning,
            ExitStatus::Critical => ExitCode::Critical,
        }
    }
}

impl ExitCode {
    /// Exit code for an error that stopped the command
    pub fn from_error(err: &CliError) -> Self {
        match err {
            CliError::FileError(_) => ExitCode::FileError,
            err if err.is_user_error() => ExitCode::InvalidInput,
            _ => ExitCode::InternalError,
        }
    }
}

/// Run the CLI with the given arguments and return the exit code
pub async fn run(cli: AuditCli) -> Result<ExitCode> {
    match cli.command {
        AuditCommands::Run(args) => commands::execute_run(args, cli.quiet).await,
        AuditCommands::ListChecks { checks, format } => {
            commands::execute_list_checks(checks, format)
        }
        AuditCommands::Validate { inputs, env, format } => {
            commands::execute_validate(inputs, env, format)
        }
    }
}
