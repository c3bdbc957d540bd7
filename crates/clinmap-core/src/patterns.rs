//! Pattern handler registry.
//!
//! Each transformation category maps to one handler producing exactly one
//! output column aligned to the working row index. The registry is an
//! explicit table built at startup and passed into the executor by
//! reference, so tests can substitute handlers and no global mutable state
//! exists.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Result, anyhow};
use polars::prelude::{AnyValue, DataFrame};
use tracing::warn;

use clinmap_common::{any_to_string_non_empty, format_numeric};
use clinmap_model::spec::{DerivationOp, PatternTag, VariableRule};
use clinmap_model::{SpecError, StudyConfig, VocabRegistry};

use crate::derive::{self, ColumnResolver};

/// Values of one materialized column.
#[derive(Debug, Clone)]
pub enum ColumnValues {
    Text(Vec<Option<String>>),
    Int(Vec<Option<i64>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Text(values) => values.len(),
            ColumnValues::Int(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// String projection used for column references and sorting.
    pub fn as_strings(&self) -> Vec<Option<String>> {
        match self {
            ColumnValues::Text(values) => values.clone(),
            ColumnValues::Int(values) => values
                .iter()
                .map(|value| value.map(|v| v.to_string()))
                .collect(),
        }
    }

    /// Reorder rows by a permutation of indices.
    pub fn permuted(&self, order: &[usize]) -> ColumnValues {
        match self {
            ColumnValues::Text(values) => {
                ColumnValues::Text(order.iter().map(|&idx| values[idx].clone()).collect())
            }
            ColumnValues::Int(values) => {
                ColumnValues::Int(order.iter().map(|&idx| values[idx]).collect())
            }
        }
    }
}

/// Ordered set of materialized output columns.
#[derive(Debug, Default)]
pub struct BuiltColumns {
    height: usize,
    columns: Vec<(String, ColumnValues)>,
    index: HashMap<String, usize>,
}

impl BuiltColumns {
    pub fn new(height: usize) -> Self {
        Self {
            height,
            columns: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Insert or replace a column; insertion order is preserved.
    pub fn insert(&mut self, target: impl Into<String>, values: ColumnValues) {
        let target = target.into();
        let key = target.to_ascii_uppercase();
        match self.index.get(&key) {
            Some(&idx) => self.columns[idx] = (target, values),
            None => {
                self.index.insert(key, self.columns.len());
                self.columns.push((target, values));
            }
        }
    }

    pub fn get(&self, target: &str) -> Option<&ColumnValues> {
        self.index
            .get(&target.to_ascii_uppercase())
            .map(|&idx| &self.columns[idx].1)
    }

    pub fn contains(&self, target: &str) -> bool {
        self.index.contains_key(&target.to_ascii_uppercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnValues)> {
        self.columns
            .iter()
            .map(|(name, values)| (name.as_str(), values))
    }
}

/// Everything a handler may read while materializing one column.
pub struct HandlerInput<'a> {
    pub table: &'a str,
    pub merged: &'a DataFrame,
    pub built: &'a BuiltColumns,
    pub config: &'a StudyConfig,
    pub vocab: Option<&'a VocabRegistry>,
}

impl HandlerInput<'_> {
    pub fn height(&self) -> usize {
        self.built.height()
    }

    /// Resolve a column reference: produced targets shadow raw sources.
    pub fn resolve(&self, name: &str) -> Option<Vec<Option<String>>> {
        if let Some(values) = self.built.get(name) {
            return Some(values.as_strings());
        }
        merged_column(self.merged, name)
    }
}

/// Case-insensitive read of a merged raw column as optional strings.
pub fn merged_column(merged: &DataFrame, name: &str) -> Option<Vec<Option<String>>> {
    let actual = merged
        .get_column_names()
        .iter()
        .find(|col| col.as_str().eq_ignore_ascii_case(name))
        .map(|col| col.as_str().to_string())?;
    let series = merged.column(&actual).ok()?;
    Some(
        (0..merged.height())
            .map(|idx| any_to_string_non_empty(series.get(idx).unwrap_or(AnyValue::Null)))
            .collect(),
    )
}

struct InputResolver<'a> {
    input: &'a HandlerInput<'a>,
}

impl ColumnResolver for InputResolver<'_> {
    fn column(&self, name: &str) -> Option<Vec<Option<String>>> {
        self.input.resolve(name)
    }

    fn height(&self) -> usize {
        self.input.height()
    }

    fn study_id(&self) -> &str {
        &self.input.config.study_id
    }

    fn subjects(&self) -> Option<Vec<Option<String>>> {
        self.input.resolve(&self.input.config.subject_column)
    }
}

/// One transformation-category handler.
pub trait PatternHandler: Send + Sync {
    /// Produce the output column for one rule.
    fn materialize(&self, rule: &VariableRule, input: &HandlerInput<'_>)
    -> Result<Vec<Option<String>>>;

    /// Handler name for logging.
    fn name(&self) -> &str;
}

/// Registry mapping a pattern tag to its handler.
pub struct HandlerRegistry {
    handlers: BTreeMap<PatternTag, Box<dyn PatternHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Registry with the standard handlers for groups 1-5.
    ///
    /// TRANSPOSE is restructuring and handled by the executor itself.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(PatternTag::Assign, Box::new(AssignHandler));
        registry.register(PatternTag::Direct, Box::new(DirectHandler));
        registry.register(PatternTag::Reformat, Box::new(ReformatHandler));
        registry.register(PatternTag::LookupRecode, Box::new(LookupRecodeHandler));
        registry.register(PatternTag::Derivation, Box::new(DerivationHandler));
        registry
    }

    pub fn register(&mut self, tag: PatternTag, handler: Box<dyn PatternHandler>) {
        self.handlers.insert(tag, handler);
    }

    pub fn get(&self, tag: PatternTag) -> Option<&dyn PatternHandler> {
        self.handlers.get(&tag).map(Box::as_ref)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// ASSIGN: broadcast the rule's constant into every row.
struct AssignHandler;

impl PatternHandler for AssignHandler {
    fn materialize(
        &self,
        rule: &VariableRule,
        input: &HandlerInput<'_>,
    ) -> Result<Vec<Option<String>>> {
        let constant = rule
            .constant
            .as_ref()
            .ok_or_else(|| anyhow!("assign rule {} has no constant", rule.target))?;
        Ok(vec![Some(constant.clone()); input.height()])
    }

    fn name(&self) -> &str {
        "assign"
    }
}

/// DIRECT: passthrough of one source column.
struct DirectHandler;

impl PatternHandler for DirectHandler {
    fn materialize(
        &self,
        rule: &VariableRule,
        input: &HandlerInput<'_>,
    ) -> Result<Vec<Option<String>>> {
        let source = rule
            .primary_source()
            .ok_or_else(|| anyhow!("direct rule {} has no source", rule.target))?;
        input
            .resolve(source)
            .ok_or_else(|| anyhow!("source column {source} not found"))
    }

    fn name(&self) -> &str {
        "direct"
    }
}

/// REFORMAT: single-source date normalization to ISO 8601.
struct ReformatHandler;

impl PatternHandler for ReformatHandler {
    fn materialize(
        &self,
        rule: &VariableRule,
        input: &HandlerInput<'_>,
    ) -> Result<Vec<Option<String>>> {
        let source = rule
            .primary_source()
            .ok_or_else(|| anyhow!("reformat rule {} has no source", rule.target))?;
        let values = input
            .resolve(source)
            .ok_or_else(|| anyhow!("source column {source} not found"))?;
        Ok(values
            .into_iter()
            .map(|value| value.as_deref().and_then(crate::datetime::normalize_date))
            .collect())
    }

    fn name(&self) -> &str {
        "reformat"
    }
}

/// LOOKUP_RECODE: map values through a controlled vocabulary.
///
/// Unmapped inputs become null with a warning; this is never a hard failure.
struct LookupRecodeHandler;

impl PatternHandler for LookupRecodeHandler {
    fn materialize(
        &self,
        rule: &VariableRule,
        input: &HandlerInput<'_>,
    ) -> Result<Vec<Option<String>>> {
        let source = rule
            .primary_source()
            .ok_or_else(|| anyhow!("lookup rule {} has no source", rule.target))?;
        let vocabulary = input
            .vocab
            .and_then(|registry| registry.resolve(&rule.target))
            .ok_or_else(|| anyhow!("no vocabulary registered for {}", rule.target))?;
        let values = input
            .resolve(source)
            .ok_or_else(|| anyhow!("source column {source} not found"))?;

        let mut unmapped = 0u64;
        let out: Vec<Option<String>> = values
            .into_iter()
            .map(|value| {
                value.and_then(|raw| {
                    let mapped = vocabulary.normalize(&raw);
                    if mapped.is_none() {
                        unmapped += 1;
                    }
                    mapped
                })
            })
            .collect();
        if unmapped > 0 {
            warn!(
                table = %input.table,
                variable = %rule.target,
                count = unmapped,
                "values without vocabulary mapping set to null"
            );
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "lookup_recode"
    }
}

/// DERIVATION: dispatch on the resolved operation union.
struct DerivationHandler;

impl PatternHandler for DerivationHandler {
    fn materialize(
        &self,
        rule: &VariableRule,
        input: &HandlerInput<'_>,
    ) -> Result<Vec<Option<String>>> {
        let op: Option<DerivationOp> = match rule.derivation_op() {
            Ok(op) => op,
            Err(SpecError::UnknownDerivation { keyword }) => {
                warn!(
                    table = %input.table,
                    variable = %rule.target,
                    keyword = %keyword,
                    "unknown derivation keyword; column set to null"
                );
                return Ok(vec![None; input.height()]);
            }
            Err(error) => return Err(error.into()),
        };
        let Some(op) = op else {
            // No derivation text: the column is filled by a later stage
            // (study day, epoch, visit, sequence) or stays null.
            return Ok(vec![None; input.height()]);
        };
        let resolver = InputResolver { input };
        derive::evaluate(&op, &resolver)
    }

    fn name(&self) -> &str {
        "derivation"
    }
}

/// Format a visit number the way numeric text columns are carried.
pub fn format_visit_number(number: f64) -> String {
    format_numeric(number)
}
