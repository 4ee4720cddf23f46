//! Output formatting for the audit CLI
//!
//! JSON, YAML and a colored human-readable table. Renderers write to any
//! `io::Write` so tests can capture them.

use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use infra_check_engine::{
    CheckRegistry, Environment, RunSummary, Severity, SeverityCounts,
};
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::error::{CliError, Result};
use crate::report::{GeneratedReports, ReportMeta};

/// Output format options for CLI results
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum OutputFormat {
    /// Human-readable table format with colors
    #[default]
    Table,
    /// JSON format for machine processing
    Json,
    /// YAML format
    Yaml,
}

fn icon(severity: Severity) -> ColoredString {
    match severity {
        Severity::Ok => "+".green(),
        Severity::Warning => "!".yellow(),
        Severity::Critical => "x".red(),
        Severity::Unknown => "?".magenta(),
    }
}

fn colored_label(severity: Severity) -> ColoredString {
    match severity {
        Severity::Ok => severity.as_str().green(),
        Severity::Warning => severity.as_str().yellow().bold(),
        Severity::Critical => severity.as_str().red().bold(),
        Severity::Unknown => severity.as_str().magenta(),
    }
}

fn tally(counts: &SeverityCounts) -> String {
    format!(
        "{} {:<4} {} {:<4} {} {:<4} {} {:<4}",
        icon(Severity::Ok),
        counts.ok,
        icon(Severity::Warning),
        counts.warning,
        icon(Severity::Critical),
        counts.critical,
        icon(Severity::Unknown),
        counts.unknown
    )
}

fn emit<T: Serialize>(value: &T, format: OutputFormat, out: &mut dyn Write) -> Result<bool> {
    let text = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)
            .map_err(|e| CliError::Internal(format!("JSON serialization failed: {}", e)))?,
        OutputFormat::Yaml => serde_yaml::to_string(value)
            .map_err(|e| CliError::Internal(format!("YAML serialization failed: {}", e)))?,
        OutputFormat::Table => return Ok(false),
    };
    writeln!(out, "{}", text)?;
    Ok(true)
}

/// Result of `run`
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub report: ReportMeta,
    pub summary: RunSummary,
    pub files: GeneratedReports,
}

impl RunOutput {
    pub fn render(&self, format: OutputFormat) -> Result<()> {
        self.render_to(format, &mut io::stdout().lock())
    }

    pub fn render_to(&self, format: OutputFormat, out: &mut dyn Write) -> Result<()> {
        if !emit(self, format, out)? {
            self.render_table(out)?;
        }
        Ok(())
    }

    fn render_table(&self, out: &mut dyn Write) -> io::Result<()> {
        let summary = &self.summary;
        let counts = &summary.counts;

        writeln!(out)?;
        writeln!(out, "{}", self.report.title.cyan().bold())?;
        writeln!(out, "{}", "=".repeat(70))?;
        writeln!(
            out,
            "  Company: {}   Team: {}",
            self.report.company_name, self.report.team_name
        )?;
        writeln!(
            out,
            "  Run: {}   Duration: {}ms",
            summary.run_id, summary.duration_ms
        )?;
        if summary.demo_mode {
            writeln!(out, "  {}", "Demo mode: simulated data".yellow())?;
        }
        writeln!(out)?;

        writeln!(out, "{}", "Summary:".cyan().bold())?;
        writeln!(out, "  Total checks: {}", summary.total())?;
        for severity in [Severity::Ok, Severity::Warning, Severity::Critical, Severity::Unknown] {
            writeln!(
                out,
                "  {} {:<9} {}",
                icon(severity),
                severity.as_str(),
                counts.get(severity)
            )?;
        }
        writeln!(out)?;

        if !summary.by_environment.is_empty() {
            writeln!(out, "{}", "By environment:".cyan().bold())?;
            for (env, env_counts) in &summary.by_environment {
                writeln!(out, "  {:<12} {}", env.as_str(), tally(env_counts))?;
            }
            writeln!(out)?;
        }

        if !summary.by_category.is_empty() {
            writeln!(out, "{}", "By category:".cyan().bold())?;
            for (category, cat_counts) in &summary.by_category {
                writeln!(out, "  {:<12} {}", category.label(), tally(cat_counts))?;
            }
            writeln!(out)?;
        }

        let issues = summary.issues();
        if !issues.is_empty() {
            writeln!(out, "{}", "Action required:".red().bold())?;
            writeln!(out, "{}", "-".repeat(70))?;
            for result in issues {
                writeln!(
                    out,
                    "{} [{}] {}  {}",
                    icon(result.severity),
                    result.check_id,
                    result.check_name,
                    colored_label(result.severity)
                )?;
                writeln!(out, "    Environment: {}", result.subject.environment)?;
                writeln!(out, "    Target:      {}", result.subject.display_name())?;
                writeln!(
                    out,
                    "    Observed:    {} (threshold {})",
                    result.observed_display(),
                    result.threshold
                )?;
                writeln!(out, "    Message:     {}", result.message)?;
            }
            writeln!(out)?;
        }

        let files = self.files.paths();
        if !files.is_empty() {
            writeln!(out, "{}", "Reports:".cyan().bold())?;
            for (kind, path) in files {
                writeln!(out, "  - {}: {}", kind, path.display())?;
            }
            writeln!(out)?;
        }

        let status = match summary.exit_status.code() {
            0 => "All checks passed".green().bold(),
            1 => "Completed with warnings".yellow().bold(),
            _ => "Completed with critical findings".red().bold(),
        };
        writeln!(out, "{}", status)?;
        Ok(())
    }
}

/// One catalog row for `list-checks`
#[derive(Debug, Clone, Serialize)]
pub struct CheckRow {
    pub id: String,
    pub name: String,
    pub category: String,
    pub channel: String,
    pub policy: String,
    pub threshold: String,
    pub unit: String,
    pub priority: String,
    pub roles: Vec<String>,
}

/// Result of `list-checks`
#[derive(Debug, Clone, Serialize)]
pub struct CatalogOutput {
    pub total: usize,
    pub checks: Vec<CheckRow>,
}

impl CatalogOutput {
    pub fn from_registry(registry: &CheckRegistry) -> Self {
        let checks: Vec<CheckRow> = registry
            .iter()
            .map(|check| CheckRow {
                id: check.id.clone(),
                name: check.name.clone(),
                category: check.category.label().to_string(),
                channel: check.channel.as_str().to_string(),
                policy: check.policy.kind().to_string(),
                threshold: check.policy.describe(),
                unit: check.unit.clone(),
                priority: check.priority.as_str().to_string(),
                roles: check
                    .applicable_roles()
                    .iter()
                    .map(|r| r.as_str().to_string())
                    .collect(),
            })
            .collect();

        Self {
            total: checks.len(),
            checks,
        }
    }

    pub fn render(&self, format: OutputFormat) -> Result<()> {
        self.render_to(format, &mut io::stdout().lock())
    }

    pub fn render_to(&self, format: OutputFormat, out: &mut dyn Write) -> Result<()> {
        if emit(self, format, out)? {
            return Ok(());
        }

        writeln!(out)?;
        writeln!(out, "{}", "Check Catalog".cyan().bold())?;
        writeln!(out, "{}", "=".repeat(90))?;
        writeln!(
            out,
            "{:<10} {:<12} {:<15} {:<24} {}",
            "ID".bold(),
            "CATEGORY".bold(),
            "CHANNEL".bold(),
            "THRESHOLD".bold(),
            "NAME".bold()
        )?;
        for row in &self.checks {
            writeln!(
                out,
                "{:<10} {:<12} {:<15} {:<24} {}",
                row.id, row.category, row.channel, row.threshold, row.name
            )?;
        }
        writeln!(out)?;
        writeln!(out, "{} checks", self.total)?;
        Ok(())
    }
}

/// Result of `validate`
#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutput {
    pub inventory: PathBuf,
    pub catalog: PathBuf,
    pub environments: Vec<Environment>,
    pub targets: usize,
    pub clusters: usize,
    pub checks: usize,
    pub work_items: usize,
    pub inputs_hash: String,
}

impl ValidationOutput {
    pub fn render(&self, format: OutputFormat) -> Result<()> {
        self.render_to(format, &mut io::stdout().lock())
    }

    pub fn render_to(&self, format: OutputFormat, out: &mut dyn Write) -> Result<()> {
        if emit(self, format, out)? {
            return Ok(());
        }

        let envs: Vec<&str> = self.environments.iter().map(|e| e.as_str()).collect();
        writeln!(out)?;
        writeln!(out, "{} Configuration is valid", "+".green())?;
        writeln!(out, "  Inventory:    {}", self.inventory.display())?;
        writeln!(out, "  Catalog:      {}", self.catalog.display())?;
        writeln!(out, "  Environments: {}", envs.join(", "))?;
        writeln!(out, "  Targets:      {}", self.targets)?;
        writeln!(out, "  Clusters:     {}", self.clusters)?;
        writeln!(out, "  Checks:       {}", self.checks)?;
        writeln!(out, "  Work items:   {}", self.work_items)?;
        writeln!(out, "  Inputs hash:  {}", self.inputs_hash)?;
        Ok(())
    }
}
