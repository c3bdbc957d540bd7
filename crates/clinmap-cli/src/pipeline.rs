//! Study-folder orchestration: load specs, execute tables, run the fix
//! loop, write outputs.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use polars::prelude::{CsvWriter, SerWriter};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use clinmap_core::executor::{Executor, reference_starts_from};
use clinmap_core::frame::{CrossTableContext, OutputTable, RawTable, VisitInfo};
use clinmap_core::patterns::HandlerRegistry;
use clinmap_fix::FixLoopController;
use clinmap_model::spec::MappingSpec;
use clinmap_model::{StudyConfig, VocabRegistry};
use clinmap_validate::{
    ValidationContext, ValidationReport, run_validation, write_validation_report_json,
};

/// Per-table line of the run summary.
pub struct TableRunSummary {
    pub table: String,
    pub rows: usize,
    pub errors: usize,
    pub warnings: usize,
}

/// Outcome of one `run` or `check` invocation.
pub struct StudyRunResult {
    pub study_id: String,
    pub tables: Vec<TableRunSummary>,
    pub iterations_run: u32,
    pub converged: bool,
    pub total_fixed: u64,
    pub needs_human: usize,
    pub has_errors: bool,
    pub report_path: Option<PathBuf>,
}

/// Load every `*.json` mapping spec in a directory, sorted by file name.
///
/// A `vocabulary.json` file, when present, is read as the vocabulary
/// registry rather than a table spec; `visits.json` holds the visit
/// schedule and is read by [`load_visits`].
pub fn load_specs(dir: &Path) -> Result<(Vec<MappingSpec>, Option<VocabRegistry>)> {
    let mut specs = Vec::new();
    let mut vocab = None;
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read specs directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    entries.sort();

    for path in entries {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if path.file_name().is_some_and(|name| name == "vocabulary.json") {
            vocab = Some(
                serde_json::from_str(&text)
                    .with_context(|| format!("invalid vocabulary file {}", path.display()))?,
            );
            continue;
        }
        if path.file_name().is_some_and(|name| name == "visits.json") {
            continue;
        }
        let spec: MappingSpec = serde_json::from_str(&text)
            .with_context(|| format!("invalid mapping spec {}", path.display()))?;
        specs.push(spec);
    }
    if specs.is_empty() {
        bail!("no mapping specs found in {}", dir.display());
    }
    Ok((specs, vocab))
}

/// One entry of the optional `visits.json` visit schedule.
#[derive(Deserialize)]
struct VisitEntry {
    /// Raw visit label as it appears in the source data.
    label: String,
    #[serde(default)]
    number: Option<f64>,
    name: String,
}

/// Load the raw-label -> visit lookup from `visits.json`, if present.
pub fn load_visits(dir: &Path) -> Result<Option<BTreeMap<String, VisitInfo>>> {
    let path = dir.join("visits.json");
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let entries: Vec<VisitEntry> = serde_json::from_str(&text)
        .with_context(|| format!("invalid visit schedule {}", path.display()))?;
    Ok(Some(
        entries
            .into_iter()
            .map(|entry| {
                (
                    entry.label.trim().to_ascii_uppercase(),
                    VisitInfo {
                        number: entry.number,
                        name: entry.name,
                    },
                )
            })
            .collect(),
    ))
}

/// Raw inputs for one spec; missing files are logged and skipped.
fn load_inputs(study_folder: &Path, spec: &MappingSpec) -> Result<Vec<RawTable>> {
    let mut inputs = Vec::new();
    for name in spec.input_tables() {
        let path = study_folder.join(format!("{name}.csv"));
        if !path.exists() {
            warn!(table = %spec.table, source = %name, "raw input file not found");
            continue;
        }
        inputs.push(crate::ingest::read_raw_table(&path, &name)?);
    }
    Ok(inputs)
}

/// Execute every spec, subject table first so the cross-table context can be
/// built from it.
pub fn execute_study(
    study_folder: &Path,
    specs: &[MappingSpec],
    config: &StudyConfig,
    vocab: Option<&VocabRegistry>,
    visits: Option<BTreeMap<String, VisitInfo>>,
) -> Result<BTreeMap<String, OutputTable>> {
    let registry = HandlerRegistry::standard();
    let mut executor = Executor::new(&registry, config);
    if let Some(vocab) = vocab {
        executor = executor.with_vocab(vocab);
    }

    let mut tables: BTreeMap<String, OutputTable> = BTreeMap::new();
    let mut context = CrossTableContext::new();
    if let Some(visits) = visits {
        context = context.with_visits(visits);
    }

    let subject_first = specs
        .iter()
        .filter(|spec| spec.table == config.subject_table)
        .chain(specs.iter().filter(|spec| spec.table != config.subject_table));

    for spec in subject_first {
        let inputs = load_inputs(study_folder, spec)?;
        if inputs.is_empty() {
            warn!(table = %spec.table, "no raw inputs found; table skipped");
            continue;
        }
        match executor.execute(spec, &inputs, Some(&context)) {
            Ok(output) => {
                info!(table = %spec.table, rows = output.record_count(), "table executed");
                if spec.table == config.subject_table {
                    context =
                        context.with_reference_starts(reference_starts_from(&output, config));
                }
                tables.insert(spec.table.clone(), output);
            }
            Err(err) => {
                // A critical-target failure stays inside its table; the
                // rest of the study still executes.
                error!(table = %spec.table, error = %err, "table execution failed");
            }
        }
    }
    Ok(tables)
}

/// Full `run` pipeline: execute, fix loop, write outputs.
pub fn run_study(
    study_folder: &Path,
    specs_dir: &Path,
    output_dir: &Path,
    study_id: &str,
    max_iterations: u32,
    dry_run: bool,
) -> Result<StudyRunResult> {
    let (specs, vocab) = load_specs(specs_dir)?;
    let visits = load_visits(specs_dir)?;
    let config = StudyConfig::new(study_id);

    let tables = execute_study(study_folder, &specs, &config, vocab.as_ref(), visits)?;
    let spec_map: BTreeMap<String, MappingSpec> = specs
        .into_iter()
        .map(|spec| (spec.table.clone(), spec))
        .collect();

    let mut controller = FixLoopController::new(&config).with_max_iterations(max_iterations);
    if let Some(vocab) = &vocab {
        controller = controller.with_vocab(vocab);
    }
    let outcome = controller.run(tables, &spec_map)?;
    info!(
        iterations = outcome.iterations_run,
        converged = outcome.converged,
        fixed = outcome.total_fixed,
        "fix loop finished"
    );
    for finding in &outcome.remaining_findings {
        // Messages may embed row-level values; the log gate redacts them.
        debug!(
            table = %finding.table,
            rule = %finding.rule_id,
            count = finding.count,
            message = %crate::logging::redact_value(&finding.message),
            "finding"
        );
    }

    let mut report_path = None;
    if !dry_run {
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("failed to create {}", output_dir.display()))?;
        for table in outcome.tables.values() {
            write_table_csv(output_dir, table)?;
        }
        report_path = Some(write_validation_report_json(
            output_dir,
            study_id,
            &outcome.final_report,
        )?);
    }

    Ok(build_result(
        study_id,
        &outcome.tables,
        &outcome.final_report,
        outcome.iterations_run,
        outcome.converged,
        outcome.total_fixed,
        outcome.needs_human.len(),
        report_path,
    ))
}

/// `check` pipeline: one validation pass over standardized tables.
pub fn check_study(tables_folder: &Path, specs_dir: &Path, study_id: &str) -> Result<StudyRunResult> {
    let (specs, vocab) = load_specs(specs_dir)?;
    let config = StudyConfig::new(study_id);

    let mut tables: BTreeMap<String, OutputTable> = BTreeMap::new();
    for spec in &specs {
        let path = tables_folder.join(format!("{}.csv", spec.table));
        if !path.exists() {
            warn!(table = %spec.table, "standardized table file not found");
            continue;
        }
        let raw = crate::ingest::read_raw_table(&path, &spec.table)?;
        tables.insert(spec.table.clone(), OutputTable::new(spec.table.clone(), raw.data));
    }

    let spec_map: BTreeMap<String, MappingSpec> = specs
        .into_iter()
        .map(|spec| (spec.table.clone(), spec))
        .collect();
    let ctx = match &vocab {
        Some(vocab) => ValidationContext::new(&config).with_vocab(vocab),
        None => ValidationContext::new(&config),
    };
    let report = ValidationReport::new(run_validation(&tables, &spec_map, &ctx));

    Ok(build_result(study_id, &tables, &report, 0, false, 0, 0, None))
}

#[allow(clippy::too_many_arguments)]
fn build_result(
    study_id: &str,
    tables: &BTreeMap<String, OutputTable>,
    report: &ValidationReport,
    iterations_run: u32,
    converged: bool,
    total_fixed: u64,
    needs_human: usize,
    report_path: Option<PathBuf>,
) -> StudyRunResult {
    let by_table = report.by_table();
    let summaries = tables
        .iter()
        .map(|(name, table)| {
            let findings = by_table.get(name);
            TableRunSummary {
                table: name.clone(),
                rows: table.record_count(),
                errors: findings
                    .map(|fs| fs.iter().filter(|f| f.is_error()).count())
                    .unwrap_or(0),
                warnings: findings
                    .map(|fs| fs.iter().filter(|f| f.is_warning()).count())
                    .unwrap_or(0),
            }
        })
        .collect();
    StudyRunResult {
        study_id: study_id.to_string(),
        tables: summaries,
        iterations_run,
        converged,
        total_fixed,
        needs_human,
        has_errors: report.has_errors(),
        report_path,
    }
}

fn write_table_csv(output_dir: &Path, table: &OutputTable) -> Result<()> {
    let path = output_dir.join(format!("{}.csv", table.table));
    let file = File::create(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut data = table.data.clone();
    CsvWriter::new(file)
        .finish(&mut data)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
