//! Cross-table consistency checks.
//!
//! These rules need the full set of executed tables and their specs at once:
//!
//! - **Referential integrity**: every subject identifier in a dependent
//!   table must exist in the canonical subject table.
//! - **Global key uniqueness**: exactly one distinct study identifier exists
//!   across all tables combined.
//! - **Table-type self-consistency**: a table's own type column carries only
//!   its own code.
//! - **Temporal plausibility**: the reference start date agrees with the
//!   earliest treatment start date.
//! - **Sign consistency**: derived day offsets agree in sign with their
//!   companion date relative to the subject's reference date.
//!
//! Every check is total: a missing prerequisite table yields "cannot
//! evaluate" (an error only when the canonical subject table itself is
//! wholly absent) or no findings, never a crash. The table set is a
//! read-only snapshot; nothing here mutates it.

use std::collections::{BTreeMap, BTreeSet};

use clinmap_core::frame::OutputTable;
use clinmap_core::{calculate_study_day, parse_date, table_column};
use clinmap_model::spec::MappingSpec;
use clinmap_model::{Finding, Severity, StudyConfig};

use crate::rules::{
    KEY_STUDYID, REF_NO_SUBJECT_TABLE, REF_SUBJECT, SIGN_DAYOFFSET, TBL_TYPE, TEMPORAL_REFSTART,
};

/// Input snapshot for one cross-table validation pass.
pub struct CrossTableInput<'a> {
    /// All executed tables, keyed by table name.
    pub tables: &'a BTreeMap<String, OutputTable>,
    /// Mapping specs, keyed by table name.
    pub specs: &'a BTreeMap<String, MappingSpec>,
    pub config: &'a StudyConfig,
}

/// Run every cross-table check.
pub fn validate_cross_table(input: &CrossTableInput<'_>) -> Vec<Finding> {
    let mut findings = Vec::new();
    findings.extend(check_referential_integrity(input));
    findings.extend(check_study_id_uniqueness(input));
    findings.extend(check_table_type_consistency(input));
    findings.extend(check_temporal_plausibility(input));
    findings.extend(check_day_offset_signs(input));
    findings
}

// ============================================================================
// Referential integrity
// ============================================================================

fn check_referential_integrity(input: &CrossTableInput<'_>) -> Vec<Finding> {
    let config = input.config;
    let Some(subject_table) = input.tables.get(&config.subject_table) else {
        return vec![Finding {
            rule_id: REF_NO_SUBJECT_TABLE.to_string(),
            severity: Severity::Error,
            table: config.subject_table.clone(),
            variable: Some(config.subject_column.clone()),
            message: format!(
                "canonical subject table {} is absent; referential integrity cannot be evaluated",
                config.subject_table
            ),
            count: 0,
            suggestion: None,
            category: Some("Referential Integrity".to_string()),
        }];
    };

    let known: BTreeSet<String> = table_column(&subject_table.data, &config.subject_column)
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .collect();

    let mut findings = Vec::new();
    for (name, table) in input.tables {
        if name == &config.subject_table {
            continue;
        }
        let Some(subjects) = table_column(&table.data, &config.subject_column) else {
            continue;
        };
        let mut orphan_rows = 0u64;
        let mut orphans: BTreeSet<String> = BTreeSet::new();
        for subject in subjects.into_iter().flatten() {
            if known.contains(&subject) {
                continue;
            }
            orphan_rows += 1;
            if orphans.len() < 5 {
                orphans.insert(subject);
            }
        }
        if orphan_rows == 0 {
            continue;
        }
        let samples: Vec<String> = orphans.into_iter().collect();
        findings.push(Finding {
            rule_id: REF_SUBJECT.to_string(),
            severity: Severity::Error,
            table: name.clone(),
            variable: Some(config.subject_column.clone()),
            message: format!(
                "{} contains {} row(s) with subject identifiers not present in {}. values: {}",
                name,
                orphan_rows,
                config.subject_table,
                samples.join(", ")
            ),
            count: orphan_rows,
            suggestion: None,
            category: Some("Referential Integrity".to_string()),
        });
    }
    findings
}

// ============================================================================
// Global study-identifier uniqueness
// ============================================================================

fn check_study_id_uniqueness(input: &CrossTableInput<'_>) -> Vec<Finding> {
    let config = input.config;
    let mut distinct: BTreeSet<String> = BTreeSet::new();
    for table in input.tables.values() {
        if let Some(values) = table_column(&table.data, &config.study_column) {
            distinct.extend(values.into_iter().flatten());
        }
    }
    if distinct.len() == 1 {
        return Vec::new();
    }
    let message = if distinct.is_empty() {
        format!(
            "no {} values found in any table; expected exactly one distinct value",
            config.study_column
        )
    } else {
        let samples: Vec<String> = distinct.iter().take(5).cloned().collect();
        format!(
            "{} has {} distinct values across tables; expected exactly one. values: {}",
            config.study_column,
            distinct.len(),
            samples.join(", ")
        )
    };
    vec![Finding {
        rule_id: KEY_STUDYID.to_string(),
        severity: Severity::Error,
        table: config.subject_table.clone(),
        variable: Some(config.study_column.clone()),
        message,
        count: distinct.len() as u64,
        suggestion: None,
        category: Some("Identifier".to_string()),
    }]
}

// ============================================================================
// Table-type self-consistency
// ============================================================================

fn check_table_type_consistency(input: &CrossTableInput<'_>) -> Vec<Finding> {
    let config = input.config;
    let mut findings = Vec::new();
    for (name, table) in input.tables {
        let Some(values) = table_column(&table.data, &config.table_column) else {
            continue;
        };
        let mut foreign = 0u64;
        let mut samples: BTreeSet<String> = BTreeSet::new();
        for value in values.into_iter().flatten() {
            if value.eq_ignore_ascii_case(name) {
                continue;
            }
            foreign += 1;
            if samples.len() < 5 {
                samples.insert(value);
            }
        }
        if foreign == 0 {
            continue;
        }
        let sample_list: Vec<String> = samples.into_iter().collect();
        findings.push(Finding {
            rule_id: TBL_TYPE.to_string(),
            severity: Severity::Error,
            table: name.clone(),
            variable: Some(config.table_column.clone()),
            message: format!(
                "{} column of {} contains {} row(s) with a foreign code. values: {}",
                config.table_column,
                name,
                foreign,
                sample_list.join(", ")
            ),
            count: foreign,
            suggestion: Some(format!("set {} to {}", config.table_column, name)),
            category: Some("Consistency".to_string()),
        });
    }
    findings
}

// ============================================================================
// Temporal plausibility
// ============================================================================

fn check_temporal_plausibility(input: &CrossTableInput<'_>) -> Vec<Finding> {
    let config = input.config;
    let Some(subject_table) = input.tables.get(&config.subject_table) else {
        return Vec::new();
    };
    let Some(treatment) = input.tables.get(&config.treatment_table) else {
        return Vec::new();
    };
    let Some(reference_dates) = subject_reference_dates(subject_table, config) else {
        return Vec::new();
    };
    let Some(start_column) = treatment
        .column_names()
        .into_iter()
        .find(|name| name.to_ascii_uppercase().ends_with("STDTC"))
    else {
        return Vec::new();
    };
    let Some(subjects) = table_column(&treatment.data, &config.subject_column) else {
        return Vec::new();
    };
    let Some(starts) = table_column(&treatment.data, &start_column) else {
        return Vec::new();
    };

    // Earliest treatment start per subject.
    let mut earliest: BTreeMap<String, String> = BTreeMap::new();
    for (subject, start) in subjects.into_iter().zip(starts) {
        let (Some(subject), Some(start)) = (subject, start) else {
            continue;
        };
        if parse_date(&start).is_none() {
            continue;
        }
        earliest
            .entry(subject)
            .and_modify(|current| {
                if parse_date(&start) < parse_date(current) {
                    *current = start.clone();
                }
            })
            .or_insert(start);
    }

    let mut mismatched = 0u64;
    let mut samples: Vec<String> = Vec::new();
    for (subject, reference) in &reference_dates {
        let Some(first_start) = earliest.get(subject) else {
            continue;
        };
        if parse_date(reference).is_none() {
            continue;
        }
        if reference != first_start {
            mismatched += 1;
            if samples.len() < 5 {
                samples.push(format!("{subject}: {reference} vs {first_start}"));
            }
        }
    }
    if mismatched == 0 {
        return Vec::new();
    }
    // Legitimate exceptions exist, so this stays a warning.
    vec![Finding {
        rule_id: TEMPORAL_REFSTART.to_string(),
        severity: Severity::Warning,
        table: config.subject_table.clone(),
        variable: Some(config.reference_start_column.clone()),
        message: format!(
            "{} disagrees with the earliest {} start date for {} subject(s). samples: {}",
            config.reference_start_column,
            config.treatment_table,
            mismatched,
            samples.join("; ")
        ),
        count: mismatched,
        suggestion: None,
        category: Some("Temporal".to_string()),
    }]
}

fn subject_reference_dates(
    subject_table: &OutputTable,
    config: &StudyConfig,
) -> Option<BTreeMap<String, String>> {
    let subjects = table_column(&subject_table.data, &config.subject_column)?;
    let dates = table_column(&subject_table.data, &config.reference_start_column)?;
    let mut map = BTreeMap::new();
    for (subject, date) in subjects.into_iter().zip(dates) {
        if let (Some(subject), Some(date)) = (subject, date) {
            map.entry(subject).or_insert(date);
        }
    }
    Some(map)
}

// ============================================================================
// Day-offset sign consistency
// ============================================================================

fn check_day_offset_signs(input: &CrossTableInput<'_>) -> Vec<Finding> {
    let config = input.config;
    let Some(subject_table) = input.tables.get(&config.subject_table) else {
        return Vec::new();
    };
    let Some(reference_dates) = subject_reference_dates(subject_table, config) else {
        return Vec::new();
    };

    let mut findings = Vec::new();
    for (name, table) in input.tables {
        let columns = table.column_names();
        for offset_column in &columns {
            let upper = offset_column.to_ascii_uppercase();
            let Some(stem) = upper.strip_suffix("DY") else {
                continue;
            };
            let companion = format!("{stem}DTC");
            let Some(date_column) = columns
                .iter()
                .find(|col| col.eq_ignore_ascii_case(&companion))
            else {
                continue;
            };
            let Some(offsets) = table_column(&table.data, offset_column) else {
                continue;
            };
            let Some(dates) = table_column(&table.data, date_column) else {
                continue;
            };
            let Some(subjects) = table_column(&table.data, &config.subject_column) else {
                continue;
            };

            let mut mismatched = 0u64;
            for idx in 0..offsets.len() {
                let Some(actual) = offsets[idx]
                    .as_deref()
                    .and_then(|value| value.trim().parse::<i64>().ok())
                else {
                    continue;
                };
                let (Some(subject), Some(date)) = (&subjects[idx], &dates[idx]) else {
                    continue;
                };
                let Some(reference) = reference_dates.get(subject) else {
                    continue;
                };
                let Some(expected) = calculate_study_day(date, reference) else {
                    continue;
                };
                if (expected > 0) != (actual > 0) {
                    mismatched += 1;
                }
            }
            if mismatched == 0 {
                continue;
            }
            // One aggregated finding per (table, offset column), not one per
            // row.
            findings.push(Finding {
                rule_id: SIGN_DAYOFFSET.to_string(),
                severity: Severity::Warning,
                table: name.clone(),
                variable: Some(offset_column.clone()),
                message: format!(
                    "{offset_column} sign disagrees with {companion} relative to {} in {mismatched} row(s)",
                    config.reference_start_column
                ),
                count: mismatched,
                suggestion: None,
                category: Some("Temporal".to_string()),
            });
        }
    }
    findings
}
