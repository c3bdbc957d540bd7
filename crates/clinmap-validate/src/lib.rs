mod checks;
mod cross_table;
pub mod report;
pub mod rules;

pub use cross_table::{CrossTableInput, validate_cross_table};
pub use report::{
    TableSummary, ValidationReport, ValidationReportPayload, report_payload,
    write_validation_report_json,
};

use std::collections::BTreeMap;

use clinmap_core::frame::OutputTable;
use clinmap_model::spec::MappingSpec;
use clinmap_model::{Finding, StudyConfig, VocabRegistry};

/// Shared inputs for one validation pass.
#[derive(Clone, Copy)]
pub struct ValidationContext<'a> {
    pub config: &'a StudyConfig,
    pub vocab: Option<&'a VocabRegistry>,
}

impl<'a> ValidationContext<'a> {
    pub fn new(config: &'a StudyConfig) -> Self {
        Self {
            config,
            vocab: None,
        }
    }

    pub fn with_vocab(mut self, vocab: &'a VocabRegistry) -> Self {
        self.vocab = Some(vocab);
        self
    }
}

/// Per-table rules: format checks, vocabulary membership, length limits.
pub fn validate_table(
    table: &OutputTable,
    spec: &MappingSpec,
    ctx: &ValidationContext<'_>,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    findings.extend(checks::format::check_date_formats(table));
    if let Some(registry) = ctx.vocab {
        findings.extend(checks::vocabulary::check_vocabularies(table, spec, registry));
    }
    findings.extend(checks::limits::check_length_limits(table, spec));
    findings
}

/// One full validation pass: per-table rules for every table, then the
/// cross-table consistency checks over the whole snapshot.
pub fn run_validation(
    tables: &BTreeMap<String, OutputTable>,
    specs: &BTreeMap<String, MappingSpec>,
    ctx: &ValidationContext<'_>,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (name, table) in tables {
        if let Some(spec) = specs.get(name) {
            findings.extend(validate_table(table, spec, ctx));
        }
    }
    findings.extend(validate_cross_table(&CrossTableInput {
        tables,
        specs,
        config: ctx.config,
    }));
    findings
}
