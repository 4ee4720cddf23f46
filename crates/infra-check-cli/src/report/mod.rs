//! Report files
//!
//! Weekly reports are named after the ISO week (`infra_check_2026_W07`),
//! monthly reports after the month (`infra_check_2026_02`). Every file is
//! written to a temporary sibling and renamed into place.

pub mod csv;

use crate::error::{CliError, Result};
use chrono::{DateTime, Datelike, Local, NaiveDate};
use infra_check_engine::{ReportType, RunSummary};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

const FILE_STEM: &str = "infra_check";

/// Header data shared by all report formats
#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta {
    pub title: String,
    pub file_prefix: String,
    pub report_type: ReportType,
    pub company_name: String,
    pub team_name: String,
    pub generated_at: DateTime<Local>,
}

impl ReportMeta {
    /// Metadata for a report generated now
    pub fn new(
        report_type: ReportType,
        company_name: impl Into<String>,
        team_name: impl Into<String>,
    ) -> Self {
        Self::at(report_type, company_name, team_name, Local::now())
    }

    pub fn at(
        report_type: ReportType,
        company_name: impl Into<String>,
        team_name: impl Into<String>,
        generated_at: DateTime<Local>,
    ) -> Self {
        let date = generated_at.date_naive();
        Self {
            title: report_title(report_type, date),
            file_prefix: file_prefix(report_type, date),
            report_type,
            company_name: company_name.into(),
            team_name: team_name.into(),
            generated_at,
        }
    }
}

/// File name prefix for the reporting period containing `date`
pub fn file_prefix(report_type: ReportType, date: NaiveDate) -> String {
    match report_type {
        ReportType::Weekly => {
            let week = date.iso_week();
            format!("{}_{}_W{:02}", FILE_STEM, week.year(), week.week())
        }
        ReportType::Monthly => format!("{}_{}_{:02}", FILE_STEM, date.year(), date.month()),
    }
}

/// Human title for the reporting period containing `date`
pub fn report_title(report_type: ReportType, date: NaiveDate) -> String {
    match report_type {
        ReportType::Weekly => {
            let week = date.iso_week();
            format!(
                "{} Week {:02} Infrastructure Audit Report",
                week.year(),
                week.week()
            )
        }
        ReportType::Monthly => format!(
            "{}-{:02} Infrastructure Audit Report",
            date.year(),
            date.month()
        ),
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    report: &'a ReportMeta,
    summary: &'a RunSummary,
}

/// Render the JSON report
pub fn render_json(summary: &RunSummary, meta: &ReportMeta) -> Result<String> {
    serde_json::to_string_pretty(&JsonReport {
        report: meta,
        summary,
    })
    .map_err(|e| CliError::report_error(format!("failed to serialize report: {}", e)))
}

/// Write `contents` to `dir/name` through a temporary file and a rename
pub fn write_atomic(dir: &Path, name: &str, contents: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| {
        CliError::report_error(format!("cannot create '{}': {}", dir.display(), e))
    })?;

    let target = dir.join(name);
    let temp = dir.join(format!(".{}.{}.tmp", name, std::process::id()));

    let written = std::fs::File::create(&temp).and_then(|mut file| {
        file.write_all(contents)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|_| std::fs::rename(&temp, &target)) {
        let _ = std::fs::remove_file(&temp);
        return Err(CliError::report_error(format!(
            "failed to write '{}': {}",
            target.display(),
            e
        )));
    }

    tracing::debug!(path = %target.display(), bytes = contents.len(), "report written");
    Ok(target)
}

/// Paths of the generated files
#[derive(Debug, Clone, Default, Serialize)]
pub struct GeneratedReports {
    pub csv: Option<PathBuf>,
    pub json: Option<PathBuf>,
}

impl GeneratedReports {
    pub fn paths(&self) -> Vec<(&'static str, &Path)> {
        let mut paths = Vec::new();
        if let Some(p) = &self.csv {
            paths.push(("CSV", p.as_path()));
        }
        if let Some(p) = &self.json {
            paths.push(("JSON", p.as_path()));
        }
        paths
    }
}

/// Writes CSV and JSON reports into one directory
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
    meta: ReportMeta,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>, meta: ReportMeta) -> Self {
        Self {
            output_dir: output_dir.into(),
            meta,
        }
    }

    pub fn meta(&self) -> &ReportMeta {
        &self.meta
    }

    pub fn write(&self, summary: &RunSummary) -> Result<GeneratedReports> {
        let prefix = &self.meta.file_prefix;

        let csv_body = csv::render(summary, &self.meta);
        let csv_path = write_atomic(
            &self.output_dir,
            &format!("{}.csv", prefix),
            csv_body.as_bytes(),
        )?;

        let json_body = render_json(summary, &self.meta)?;
        let json_path = write_atomic(
            &self.output_dir,
            &format!("{}.json", prefix),
            json_body.as_bytes(),
        )?;

        Ok(GeneratedReports {
            csv: Some(csv_path),
            json: Some(json_path),
        })
    }
}
