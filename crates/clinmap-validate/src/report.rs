//! Validation report aggregation and JSON payload writing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;

use clinmap_model::{Finding, Severity};

const REPORT_SCHEMA: &str = "clinmap.validation-report";
const REPORT_SCHEMA_VERSION: u32 = 1;

/// Findings of one validation pass over the full table set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn new(findings: Vec<Finding>) -> Self {
        Self { findings }
    }

    pub fn error_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|finding| finding.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|finding| finding.severity == Severity::Warning)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Findings grouped by table name.
    pub fn by_table(&self) -> BTreeMap<String, Vec<&Finding>> {
        let mut grouped: BTreeMap<String, Vec<&Finding>> = BTreeMap::new();
        for finding in &self.findings {
            grouped
                .entry(finding.table.clone())
                .or_default()
                .push(finding);
        }
        grouped
    }
}

#[derive(Debug, Serialize)]
pub struct ValidationReportPayload {
    pub schema: &'static str,
    pub schema_version: u32,
    pub generated_at: String,
    pub study_id: String,
    pub tables: Vec<TableSummary>,
}

#[derive(Debug, Serialize)]
pub struct TableSummary {
    pub table: String,
    pub error_count: usize,
    pub warning_count: usize,
    pub findings: Vec<Finding>,
}

/// Build the JSON payload for a report.
pub fn report_payload(study_id: &str, report: &ValidationReport) -> ValidationReportPayload {
    let tables = report
        .by_table()
        .into_iter()
        .map(|(table, findings)| TableSummary {
            table,
            error_count: findings
                .iter()
                .filter(|f| f.severity == Severity::Error)
                .count(),
            warning_count: findings
                .iter()
                .filter(|f| f.severity == Severity::Warning)
                .count(),
            findings: findings.into_iter().cloned().collect(),
        })
        .collect();
    ValidationReportPayload {
        schema: REPORT_SCHEMA,
        schema_version: REPORT_SCHEMA_VERSION,
        generated_at: Utc::now().to_rfc3339(),
        study_id: study_id.to_string(),
        tables,
    }
}

/// Write the report payload as pretty JSON into `output_dir`.
pub fn write_validation_report_json(
    output_dir: &Path,
    study_id: &str,
    report: &ValidationReport,
) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let output_path = output_dir.join("validation_report.json");
    let payload = report_payload(study_id, report);
    let json = serde_json::to_string_pretty(&payload)?;
    std::fs::write(&output_path, format!("{json}\n"))?;
    Ok(output_path)
}
