//! Per-table fix application.
//!
//! Fixes rewrite string columns in place on a copy of the table and emit one
//! audit record per repaired finding. No re-validation happens here; the
//! loop controller revalidates afterwards.

use anyhow::{Result, anyhow};
use polars::prelude::DataFrame;

use clinmap_common::{opt_string_column, set_opt_string_column};
use clinmap_core::frame::OutputTable;
use clinmap_core::{is_iso8601, normalize_date};
use clinmap_model::spec::MappingSpec;
use clinmap_model::{FixAction, FixClassification, VocabRegistry};
use clinmap_validate::rules;

/// Result of one table's fix application.
pub struct FixOutcome {
    pub table: OutputTable,
    pub spec: MappingSpec,
    pub actions: Vec<FixAction>,
}

/// A per-table fix strategy.
///
/// The standard implementation repairs every auto-fixable finding it is
/// handed; tests substitute bounded or failing strategies.
pub trait TableFixer {
    fn apply(
        &self,
        table: &OutputTable,
        spec: &MappingSpec,
        findings: &[FixClassification],
        iteration: u32,
    ) -> Result<FixOutcome>;
}

/// Standard fixer: applies every auto-fixable finding for the table.
pub struct StandardFixer<'a> {
    pub vocab: Option<&'a VocabRegistry>,
}

impl TableFixer for StandardFixer<'_> {
    fn apply(
        &self,
        table: &OutputTable,
        spec: &MappingSpec,
        findings: &[FixClassification],
        iteration: u32,
    ) -> Result<FixOutcome> {
        let mut data = table.data.clone();
        let mut actions = Vec::new();
        for classification in findings {
            if !classification.is_auto_fixable() {
                continue;
            }
            if let Some(action) = apply_one(
                &mut data,
                &table.table,
                spec,
                classification,
                iteration,
                self.vocab,
            )? {
                actions.push(action);
            }
        }
        Ok(FixOutcome {
            table: OutputTable::new(table.table.clone(), data),
            spec: spec.clone(),
            actions,
        })
    }
}

/// Apply a single auto-fixable finding to the frame.
///
/// Returns `None` when the repair changed nothing (the finding will simply
/// be re-reported by the next validation pass).
pub fn apply_one(
    data: &mut DataFrame,
    table_name: &str,
    spec: &MappingSpec,
    classification: &FixClassification,
    iteration: u32,
    vocab: Option<&VocabRegistry>,
) -> Result<Option<FixAction>> {
    let finding = &classification.finding;
    let Some(variable) = finding.variable.as_deref() else {
        return Ok(None);
    };

    let changed = match finding.rule_id.as_str() {
        rules::FMT_ISO8601 => normalize_date_column(data, variable)?,
        rules::VOCAB_MEMBER => {
            let vocabulary = vocab
                .and_then(|registry| registry.resolve(variable))
                .ok_or_else(|| anyhow!("no vocabulary registered for {variable}"))?;
            rewrite_column(data, variable, |value| {
                if vocabulary.contains(value) {
                    None
                } else {
                    vocabulary.normalize(value)
                }
            })?
        }
        rules::LEN_LIMIT => {
            let limit = spec
                .rule_for(variable)
                .and_then(|rule| rule.max_length)
                .ok_or_else(|| anyhow!("no length limit declared for {variable}"))?;
            rewrite_column(data, variable, |value| {
                if value.chars().count() > limit as usize {
                    Some(value.chars().take(limit as usize).collect())
                } else {
                    None
                }
            })?
        }
        rules::TBL_TYPE => rewrite_column(data, variable, |value| {
            if value.eq_ignore_ascii_case(table_name) {
                None
            } else {
                Some(table_name.to_string())
            }
        })?,
        _ => 0,
    };

    if changed == 0 {
        return Ok(None);
    }
    Ok(Some(FixAction {
        iteration,
        table: table_name.to_string(),
        variable: Some(variable.to_string()),
        rule_id: finding.rule_id.clone(),
        description: classification
            .suggestion
            .clone()
            .unwrap_or_else(|| format!("repaired {} values", finding.rule_id)),
        rows_affected: changed,
    }))
}

/// Normalize every repairable non-ISO value of a date column.
fn normalize_date_column(data: &mut DataFrame, variable: &str) -> Result<u64> {
    rewrite_column(data, variable, |value| {
        if is_iso8601(value) {
            None
        } else {
            normalize_date(value)
        }
    })
}

/// Rewrite non-null cells of a column through `map`; `None` keeps the cell.
fn rewrite_column<F>(data: &mut DataFrame, variable: &str, map: F) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let mut values = opt_string_column(data, variable)?;
    let mut changed = 0u64;
    for value in &mut values {
        let Some(current) = value.as_deref() else {
            continue;
        };
        if let Some(replacement) = map(current) {
            if replacement != current {
                *value = Some(replacement);
                changed += 1;
            }
        }
    }
    if changed > 0 {
        set_opt_string_column(data, variable, values)?;
    }
    Ok(changed)
}
