//! Mapping executor: turns (spec, raw tables) into one ordered output table.
//!
//! Single-pass state machine over in-memory frames:
//!
//! 1. **MERGE** - row-concatenate the raw inputs with column union
//! 2. **MATERIALIZE_COLUMNS** - pattern groups in priority order
//! 3. **DERIVE_STUDY_DAY** - day offsets against the reference-date lookup
//! 4. **DERIVE_EPOCH** - epoch window resolution per subject
//! 5. **DERIVE_VISIT** - visit number/name from the raw label lookup
//! 6. **GENERATE_SEQUENCE** - per-subject 1-based sequence numbers
//! 7. **ENFORCE_COLUMN_ORDER** - rule targets only, in rule order
//! 8. **SORT_ROWS** - declared keys, fallback study/subject, nulls last
//!
//! Inputs are never mutated; the only side effects are the returned
//! [`OutputTable`] and diagnostic logging. A failing handler nulls its column
//! unless the target is critical, in which case the whole table aborts with
//! [`ExecutionError`].

use std::cmp::Ordering;
use std::collections::BTreeMap;

use polars::prelude::{Column, DataFrame, NamedFrom, Series};
use tracing::{debug, warn};

use clinmap_model::spec::{MappingSpec, PatternTag, VariableRule};
use clinmap_model::{CaseInsensitiveSet, ExecutionError, StudyConfig, VocabRegistry};

use crate::datetime::{calculate_study_day, parse_date};
use crate::frame::{CrossTableContext, EpochWindow, OutputTable, RawTable};
use crate::patterns::{
    BuiltColumns, ColumnValues, HandlerInput, HandlerRegistry, format_visit_number, merged_column,
};
use crate::transpose::transpose_wide;

/// Executes mapping specs against raw tables.
pub struct Executor<'a> {
    registry: &'a HandlerRegistry,
    config: &'a StudyConfig,
    vocab: Option<&'a VocabRegistry>,
}

impl<'a> Executor<'a> {
    pub fn new(registry: &'a HandlerRegistry, config: &'a StudyConfig) -> Self {
        Self {
            registry,
            config,
            vocab: None,
        }
    }

    pub fn with_vocab(mut self, vocab: &'a VocabRegistry) -> Self {
        self.vocab = Some(vocab);
        self
    }

    /// Execute one spec against its merged raw inputs.
    ///
    /// Returns `Err` only when a critical target fails to materialize or the
    /// output frame cannot be assembled.
    pub fn execute(
        &self,
        spec: &MappingSpec,
        inputs: &[RawTable],
        context: Option<&CrossTableContext>,
    ) -> Result<OutputTable, ExecutionError> {
        let mut merged = merge_inputs(&spec.table, inputs)?;
        debug!(
            table = %spec.table,
            inputs = inputs.len(),
            rows = merged.height(),
            "merged raw inputs"
        );

        let mut built = BuiltColumns::new(merged.height());
        for group in PatternTag::groups() {
            if group == PatternTag::Transpose {
                self.apply_transpose(spec, &mut merged, &mut built)?;
            } else {
                self.materialize_group(spec, group, &merged, &mut built)?;
            }
        }

        self.derive_study_day(spec, &merged, &mut built, context);
        self.derive_epoch(spec, &merged, &mut built, context);
        self.derive_visit(spec, &merged, &mut built, context);
        self.generate_sequence(spec, &merged, &mut built);

        let ordered = enforce_column_order(spec, &built);
        let sorted = sort_rows(spec, self.config, ordered);
        build_frame(&spec.table, sorted)
    }

    fn materialize_group(
        &self,
        spec: &MappingSpec,
        group: PatternTag,
        merged: &DataFrame,
        built: &mut BuiltColumns,
    ) -> Result<(), ExecutionError> {
        for rule in spec.ordered_rules() {
            if rule.pattern != group {
                continue;
            }
            let handler = self.registry.get(group);
            let result = match handler {
                Some(handler) => {
                    let input = HandlerInput {
                        table: &spec.table,
                        merged,
                        built,
                        config: self.config,
                        vocab: self.vocab,
                    };
                    handler.materialize(rule, &input)
                }
                None => Err(anyhow::anyhow!(
                    "no handler registered for {}",
                    group.as_str()
                )),
            };
            match result {
                Ok(values) => built.insert(&rule.target, ColumnValues::Text(values)),
                Err(error) => {
                    if rule.critical {
                        return Err(ExecutionError::critical(
                            &spec.table,
                            &rule.target,
                            error.to_string(),
                        ));
                    }
                    warn!(
                        table = %spec.table,
                        variable = %rule.target,
                        handler = handler.map_or("none", crate::patterns::PatternHandler::name),
                        error = %error,
                        "handler failed; column set to null"
                    );
                    built.insert(
                        &rule.target,
                        ColumnValues::Text(vec![None; built.height()]),
                    );
                }
            }
        }
        Ok(())
    }

    /// SPLIT/TRANSPOSE: restructure the working frame, carrying already
    /// materialized targets as identifier columns.
    fn apply_transpose(
        &self,
        spec: &MappingSpec,
        merged: &mut DataFrame,
        built: &mut BuiltColumns,
    ) -> Result<(), ExecutionError> {
        let transpose_rules: Vec<&VariableRule> = spec
            .ordered_rules()
            .into_iter()
            .filter(|rule| rule.pattern == PatternTag::Transpose)
            .collect();
        if transpose_rules.is_empty() {
            return Ok(());
        }
        let Some(tspec) = &spec.transpose else {
            warn!(
                table = %spec.table,
                "transpose rules declared without a transpose spec; columns not materialized"
            );
            return Ok(());
        };

        // Working frame for the pivot: produced targets first (they shadow
        // raw columns), then any raw columns the pivot still needs.
        let mut columns: Vec<Column> = Vec::new();
        let mut present: Vec<String> = Vec::new();
        for (target, values) in built.iter() {
            columns.push(Series::new(target.into(), values.as_strings()).into());
            present.push(target.to_ascii_uppercase());
        }
        let mut add_raw = |name: &str, columns: &mut Vec<Column>, present: &mut Vec<String>| {
            let key = name.to_ascii_uppercase();
            if present.contains(&key) {
                return;
            }
            if let Some(values) = merged_column(merged, name) {
                columns.push(Series::new(name.into(), values).into());
                present.push(key);
            }
        };
        for name in &tspec.id_columns {
            add_raw(name, &mut columns, &mut present);
        }
        for measure in &tspec.measures {
            add_raw(&measure.column, &mut columns, &mut present);
        }
        let combined = DataFrame::new(columns)
            .map_err(|error| ExecutionError::assembly(&spec.table, error.to_string()))?;

        let tall = match transpose_wide(&combined, tspec) {
            Ok(tall) => tall,
            Err(error) => {
                if let Some(rule) = transpose_rules.iter().find(|rule| rule.critical) {
                    return Err(ExecutionError::critical(
                        &spec.table,
                        &rule.target,
                        error.to_string(),
                    ));
                }
                warn!(
                    table = %spec.table,
                    error = %error,
                    "transpose failed; columns set to null"
                );
                for rule in &transpose_rules {
                    built.insert(
                        &rule.target,
                        ColumnValues::Text(vec![None; built.height()]),
                    );
                }
                return Ok(());
            }
        };

        debug!(
            table = %spec.table,
            wide_rows = merged.height(),
            tall_rows = tall.height(),
            "transposed wide input"
        );

        // Re-seat the working state on the tall frame.
        let mut rebuilt = BuiltColumns::new(tall.height());
        for (target, _) in built.iter().map(|(t, v)| (t.to_string(), v)) {
            if let Some(values) = merged_column(&tall, &target) {
                rebuilt.insert(target, ColumnValues::Text(values));
            }
        }
        for rule in &transpose_rules {
            match merged_column(&tall, &rule.target) {
                Some(values) => rebuilt.insert(&rule.target, ColumnValues::Text(values)),
                None => warn!(
                    table = %spec.table,
                    variable = %rule.target,
                    "transpose produced no column for target"
                ),
            }
        }
        *built = rebuilt;
        *merged = tall;
        Ok(())
    }

    /// Day offsets for `…DY` targets with a `…DTC` companion.
    fn derive_study_day(
        &self,
        spec: &MappingSpec,
        merged: &DataFrame,
        built: &mut BuiltColumns,
        context: Option<&CrossTableContext>,
    ) {
        let Some(starts) = context.and_then(|ctx| ctx.reference_starts.as_ref()) else {
            return;
        };
        let Some(subjects) = resolve_column(built, merged, &self.config.subject_column) else {
            return;
        };

        for rule in &spec.rules {
            let upper = rule.target.to_ascii_uppercase();
            let Some(stem) = upper.strip_suffix("DY") else {
                continue;
            };
            if !built.contains(&rule.target) {
                continue;
            }
            let companion = format!("{stem}DTC");
            let Some(dates) = resolve_column(built, merged, &companion) else {
                continue;
            };

            let values: Vec<Option<i64>> = subjects
                .iter()
                .zip(dates.iter())
                .map(|(subject, date)| {
                    let subject = subject.as_deref()?;
                    let date = date.as_deref()?;
                    let reference = starts.get(subject)?;
                    calculate_study_day(date, reference)
                })
                .collect();
            built.insert(&rule.target, ColumnValues::Int(values));
        }
    }

    /// Epoch resolution; fills only rows still null.
    fn derive_epoch(
        &self,
        spec: &MappingSpec,
        merged: &DataFrame,
        built: &mut BuiltColumns,
        context: Option<&CrossTableContext>,
    ) {
        let Some(epoch_target) = spec.epoch_target() else {
            return;
        };
        let Some(epochs) = context.and_then(|ctx| ctx.epochs.as_ref()) else {
            return;
        };
        if !built.contains(epoch_target) {
            return;
        }
        let Some(subjects) = resolve_column(built, merged, &self.config.subject_column) else {
            return;
        };
        let Some(dates) = primary_date_column(built) else {
            return;
        };

        let current = built
            .get(epoch_target)
            .map(ColumnValues::as_strings)
            .unwrap_or_default();
        let values: Vec<Option<String>> = current
            .into_iter()
            .enumerate()
            .map(|(idx, existing)| {
                if existing.is_some() {
                    return existing;
                }
                let subject = subjects.get(idx).and_then(Option::as_deref)?;
                let date = dates.get(idx).and_then(Option::as_deref)?;
                let windows = epochs.get(subject)?;
                resolve_epoch(windows, date)
            })
            .collect();
        built.insert(epoch_target, ColumnValues::Text(values));
    }

    /// Visit number/name from the raw label lookup; fills only nulls.
    fn derive_visit(
        &self,
        spec: &MappingSpec,
        merged: &DataFrame,
        built: &mut BuiltColumns,
        context: Option<&CrossTableContext>,
    ) {
        let Some(ctx) = context else {
            return;
        };
        if ctx.visits.is_none() {
            return;
        }
        let label_source = spec
            .rule_for("VISIT")
            .and_then(VariableRule::primary_source)
            .unwrap_or("VISIT");
        let Some(labels) = merged_column(merged, label_source) else {
            return;
        };

        for target in ["VISITNUM", "VISIT"] {
            if !spec.declares_target(target) || !built.contains(target) {
                continue;
            }
            let current = built
                .get(target)
                .map(ColumnValues::as_strings)
                .unwrap_or_default();
            let values: Vec<Option<String>> = current
                .into_iter()
                .enumerate()
                .map(|(idx, existing)| {
                    if existing.is_some() {
                        return existing;
                    }
                    let label = labels.get(idx).and_then(Option::as_deref)?;
                    let info = ctx.visit(label)?;
                    if target == "VISITNUM" {
                        info.number.map(format_visit_number)
                    } else {
                        Some(info.name.clone())
                    }
                })
                .collect();
            built.insert(target, ColumnValues::Text(values));
        }
    }

    /// Per-subject 1-based sequence, strictly increasing in sort order.
    fn generate_sequence(&self, spec: &MappingSpec, merged: &DataFrame, built: &mut BuiltColumns) {
        if spec.one_row_per_subject {
            return;
        }
        let Some(seq_target) = spec.sequence_target() else {
            return;
        };
        if !built.contains(seq_target) {
            return;
        }
        let Some(subjects) = resolve_column(built, merged, &self.config.subject_column) else {
            warn!(
                table = %spec.table,
                "sequence target declared but no subject identifier column is available"
            );
            return;
        };

        let keys = self.sequence_keys(spec, built, seq_target);
        let order = stable_order(built.height(), &keys);

        let mut counters: BTreeMap<String, i64> = BTreeMap::new();
        let mut values: Vec<Option<i64>> = vec![None; built.height()];
        for &idx in &order {
            let Some(subject) = subjects[idx].as_ref() else {
                continue;
            };
            let counter = counters.entry(subject.clone()).or_insert(0);
            *counter += 1;
            values[idx] = Some(*counter);
        }
        built.insert(seq_target, ColumnValues::Int(values));
    }

    /// Tie-break key columns for sequence assignment.
    fn sequence_keys(
        &self,
        spec: &MappingSpec,
        built: &BuiltColumns,
        seq_target: &str,
    ) -> Vec<Vec<Option<String>>> {
        let excluded = [
            self.config.study_column.as_str(),
            self.config.subject_column.as_str(),
            self.config.table_column.as_str(),
            seq_target,
        ];
        let declared: Vec<Vec<Option<String>>> = spec
            .key_columns
            .iter()
            .filter(|name| {
                !excluded
                    .iter()
                    .any(|skip| skip.eq_ignore_ascii_case(name))
            })
            .filter_map(|name| built.get(name).map(ColumnValues::as_strings))
            .collect();
        if !declared.is_empty() {
            return declared;
        }
        // Fallback: every date-like column present, in output order.
        built
            .iter()
            .filter(|(name, _)| name.to_ascii_uppercase().ends_with("DTC"))
            .map(|(_, values)| values.as_strings())
            .collect()
    }
}

/// Row-concatenate raw inputs with column union; absent columns become null.
///
/// Always builds a fresh string-typed frame, so caller inputs are never
/// aliased or mutated.
fn merge_inputs(table: &str, inputs: &[RawTable]) -> Result<DataFrame, ExecutionError> {
    // Union of column names in first-appearance order, case-insensitive.
    let mut names: Vec<String> = Vec::new();
    let mut seen = CaseInsensitiveSet::default();
    for input in inputs {
        for name in input.data.get_column_names() {
            if seen.insert(name.as_str()) {
                names.push(name.to_string());
            }
        }
    }

    let mut columns: Vec<(String, Vec<Option<String>>)> = names
        .into_iter()
        .map(|name| (name, Vec::new()))
        .collect();
    for input in inputs {
        let height = input.data.height();
        for (name, values) in &mut columns {
            match merged_column(&input.data, name) {
                Some(mut table_values) => values.append(&mut table_values),
                None => values.extend(std::iter::repeat_n(None, height)),
            }
        }
    }

    clinmap_common::frame_from_opt_strings(columns)
        .map_err(|error| ExecutionError::assembly(table, error.to_string()))
}

/// Resolve a column, produced targets first, then the merged raw frame.
fn resolve_column(
    built: &BuiltColumns,
    merged: &DataFrame,
    name: &str,
) -> Option<Vec<Option<String>>> {
    if let Some(values) = built.get(name) {
        return Some(values.as_strings());
    }
    merged_column(merged, name)
}

/// First produced date column, preferring start dates.
fn primary_date_column(built: &BuiltColumns) -> Option<Vec<Option<String>>> {
    let mut fallback: Option<Vec<Option<String>>> = None;
    for (name, values) in built.iter() {
        let upper = name.to_ascii_uppercase();
        if upper.ends_with("STDTC") {
            return Some(values.as_strings());
        }
        if upper.ends_with("DTC") && fallback.is_none() {
            fallback = Some(values.as_strings());
        }
    }
    fallback
}

/// First epoch window containing the date; open ends match everything.
fn resolve_epoch(windows: &[EpochWindow], date: &str) -> Option<String> {
    let parsed = parse_date(date)?;
    for window in windows {
        let after_start = match window.start.as_deref().and_then(parse_date) {
            Some(start) => parsed >= start,
            None => true,
        };
        let before_end = match window.end.as_deref().and_then(parse_date) {
            Some(end) => parsed <= end,
            None => true,
        };
        if after_start && before_end {
            return Some(window.name.clone());
        }
    }
    None
}

/// Retain only rule targets, ordered by each rule's order index.
fn enforce_column_order(
    spec: &MappingSpec,
    built: &BuiltColumns,
) -> Vec<(String, ColumnValues)> {
    spec.ordered_rules()
        .into_iter()
        .filter_map(|rule| {
            built
                .get(&rule.target)
                .map(|values| (rule.target.clone(), values.clone()))
        })
        .collect()
}

/// Stable row sort by declared keys, fallback study/subject, nulls last.
fn sort_rows(
    spec: &MappingSpec,
    config: &StudyConfig,
    columns: Vec<(String, ColumnValues)>,
) -> Vec<(String, ColumnValues)> {
    let height = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
    if height == 0 {
        return columns;
    }
    let find = |name: &str| -> Option<Vec<Option<String>>> {
        columns
            .iter()
            .find(|(col, _)| col.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_strings())
    };

    let mut keys: Vec<Vec<Option<String>>> = spec
        .key_columns
        .iter()
        .filter_map(|name| find(name))
        .collect();
    if keys.is_empty() {
        keys = [&config.study_column, &config.subject_column]
            .iter()
            .filter_map(|name| find(name))
            .collect();
    }
    if keys.is_empty() {
        return columns;
    }

    let order = stable_order(height, &keys);
    columns
        .into_iter()
        .map(|(name, values)| {
            let permuted = values.permuted(&order);
            (name, permuted)
        })
        .collect()
}

/// Stable ascending permutation over key columns, nulls last.
fn stable_order(height: usize, keys: &[Vec<Option<String>>]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..height).collect();
    if keys.is_empty() {
        return order;
    }
    order.sort_by(|&a, &b| {
        for key in keys {
            let ordering = cmp_nulls_last(key[a].as_deref(), key[b].as_deref());
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    order
}

fn cmp_nulls_last(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => x.cmp(y),
    }
}

/// Assemble the final frame from ordered, sorted columns.
fn build_frame(
    table: &str,
    columns: Vec<(String, ColumnValues)>,
) -> Result<OutputTable, ExecutionError> {
    let cols: Vec<Column> = columns
        .into_iter()
        .map(|(name, values)| match values {
            ColumnValues::Text(values) => Series::new(name.into(), values).into(),
            ColumnValues::Int(values) => Series::new(name.into(), values).into(),
        })
        .collect();
    let data = DataFrame::new(cols)
        .map_err(|error| ExecutionError::assembly(table, error.to_string()))?;
    Ok(OutputTable::new(table, data))
}

/// Build a per-subject reference-start lookup from a subject-level table.
///
/// Convenience for callers assembling a [`CrossTableContext`] after the
/// subject table has been executed.
pub fn reference_starts_from(
    table: &OutputTable,
    config: &StudyConfig,
) -> BTreeMap<String, String> {
    let mut starts = BTreeMap::new();
    let Some(subjects) = merged_column(&table.data, &config.subject_column) else {
        return starts;
    };
    let Some(dates) = merged_column(&table.data, &config.reference_start_column) else {
        return starts;
    };
    for (subject, date) in subjects.into_iter().zip(dates) {
        if let (Some(subject), Some(date)) = (subject, date) {
            starts.entry(subject).or_insert(date);
        }
    }
    starts
}

/// Read one column of an output table as optional strings.
///
/// Shared by the validators and the fix loop; `None` when the column is
/// absent.
pub fn table_column(data: &DataFrame, name: &str) -> Option<Vec<Option<String>>> {
    merged_column(data, name)
}
