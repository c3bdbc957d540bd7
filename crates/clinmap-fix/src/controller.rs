//! Bounded validate -> classify -> fix -> revalidate loop.
//!
//! The loop drives the table set to convergence (zero auto-fixable
//! findings) or stops after `max_iterations` repair rounds and reports the
//! remaining findings as an advisory result. A final validation pass always
//! runs after loop exit so the returned report reflects true current state.
//!
//! The table set is an ordered name -> table map owned by the loop for its
//! duration; one table's entry is replaced only after its fix application
//! succeeds, so validation never sees a partially-fixed table.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use clinmap_core::frame::OutputTable;
use clinmap_model::spec::MappingSpec;
use clinmap_model::{Finding, FixAction, FixClassification, SpecError, StudyConfig, VocabRegistry};
use clinmap_validate::{ValidationContext, ValidationReport, run_validation};

use crate::apply::{StandardFixer, TableFixer};
use crate::classify::classify_all;

/// Default repair-round bound.
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// Result of one fix-loop run.
#[derive(Debug)]
pub struct FixLoopOutcome {
    /// Repair rounds that applied fixes.
    pub iterations_run: u32,
    /// Whether a validation pass produced zero auto-fixable findings.
    pub converged: bool,
    /// Findings repaired across all rounds.
    pub total_fixed: u64,
    /// All findings of the final validation pass.
    pub remaining_findings: Vec<Finding>,
    /// Final findings classified as needing human review.
    pub needs_human: Vec<Finding>,
    /// Ordered audit trail of every applied repair.
    pub fix_actions: Vec<FixAction>,
    /// The final validation report.
    pub final_report: ValidationReport,
    /// Final table state, fixes applied.
    pub tables: BTreeMap<String, OutputTable>,
}

/// Drives the bounded repair loop.
pub struct FixLoopController<'a> {
    config: &'a StudyConfig,
    vocab: Option<&'a VocabRegistry>,
    fixer: Option<&'a dyn TableFixer>,
    max_iterations: u32,
}

impl<'a> FixLoopController<'a> {
    pub fn new(config: &'a StudyConfig) -> Self {
        Self {
            config,
            vocab: None,
            fixer: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_vocab(mut self, vocab: &'a VocabRegistry) -> Self {
        self.vocab = Some(vocab);
        self
    }

    /// Substitute the fix strategy (used by tests).
    pub fn with_fixer(mut self, fixer: &'a dyn TableFixer) -> Self {
        self.fixer = Some(fixer);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Run the loop over the table set.
    ///
    /// Returns `Err` only for caller-supplied structural problems - a table
    /// declared without a spec - checked before the first validation pass.
    /// Everything else is reported through the outcome.
    pub fn run(
        &self,
        mut tables: BTreeMap<String, OutputTable>,
        specs: &BTreeMap<String, MappingSpec>,
    ) -> Result<FixLoopOutcome, SpecError> {
        for name in tables.keys() {
            if !specs.contains_key(name) {
                return Err(SpecError::MissingSpec {
                    table: name.clone(),
                });
            }
        }

        let ctx = match self.vocab {
            Some(vocab) => ValidationContext::new(self.config).with_vocab(vocab),
            None => ValidationContext::new(self.config),
        };
        let standard = StandardFixer { vocab: self.vocab };
        let fixer: &dyn TableFixer = self.fixer.unwrap_or(&standard);

        let mut iterations_run = 0u32;
        let mut converged = false;
        let mut fix_actions: Vec<FixAction> = Vec::new();

        loop {
            let findings = run_validation(&tables, specs, &ctx);
            let classifications = classify_all(&findings);
            let auto: Vec<&FixClassification> = classifications
                .iter()
                .filter(|c| c.is_auto_fixable())
                .collect();
            debug!(
                iteration = iterations_run,
                findings = findings.len(),
                auto_fixable = auto.len(),
                "validation pass"
            );
            if auto.is_empty() {
                converged = true;
                break;
            }
            if iterations_run >= self.max_iterations {
                break;
            }
            iterations_run += 1;

            // Group auto-fixable findings per owning table.
            let mut per_table: BTreeMap<String, Vec<FixClassification>> = BTreeMap::new();
            for classification in &auto {
                per_table
                    .entry(classification.finding.table.clone())
                    .or_default()
                    .push((*classification).clone());
            }

            for (name, table_findings) in per_table {
                let Some(table) = tables.get(&name) else {
                    continue;
                };
                let spec = specs.get(&name).expect("spec checked at entry");
                match fixer.apply(table, spec, &table_findings, iterations_run) {
                    Ok(outcome) => {
                        // Replace the entry only on success; a failed table
                        // keeps its previous state for this iteration.
                        fix_actions.extend(outcome.actions);
                        tables.insert(name, outcome.table);
                    }
                    Err(error) => {
                        warn!(
                            table = %name,
                            iteration = iterations_run,
                            error = %error,
                            "fix application failed; table left unchanged"
                        );
                    }
                }
            }
        }

        // Final validation pass reflects true current state.
        let final_findings = run_validation(&tables, specs, &ctx);
        let needs_human: Vec<Finding> = classify_all(&final_findings)
            .into_iter()
            .filter(|c| !c.is_auto_fixable())
            .map(|c| c.finding)
            .collect();
        let total_fixed = fix_actions.len() as u64;

        Ok(FixLoopOutcome {
            iterations_run,
            converged,
            total_fixed,
            remaining_findings: final_findings.clone(),
            needs_human,
            fix_actions,
            final_report: ValidationReport::new(final_findings),
            tables,
        })
    }
}
