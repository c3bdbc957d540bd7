//! Controlled vocabulary membership checks.

use std::collections::BTreeSet;

use clinmap_core::frame::OutputTable;
use clinmap_core::table_column;
use clinmap_model::spec::MappingSpec;
use clinmap_model::{Finding, Severity, VocabRegistry};

use crate::rules::VOCAB_MEMBER;

/// Check every rule target governed by a vocabulary.
///
/// A closed vocabulary reports errors, an extensible one warnings. Values
/// repairable through the synonym map are counted into the fix suggestion.
pub fn check_vocabularies(
    table: &OutputTable,
    spec: &MappingSpec,
    registry: &VocabRegistry,
) -> Vec<Finding> {
    let mut findings = Vec::new();
    for rule in &spec.rules {
        let Some(vocabulary) = registry.resolve(&rule.target) else {
            continue;
        };
        let Some(values) = table_column(&table.data, &rule.target) else {
            continue;
        };

        let mut invalid = 0u64;
        let mut mappable = 0u64;
        let mut samples: BTreeSet<String> = BTreeSet::new();
        for value in values.iter().flatten() {
            if vocabulary.contains(value) {
                continue;
            }
            invalid += 1;
            if vocabulary.normalize(value).is_some() {
                mappable += 1;
            }
            if samples.len() < 5 {
                samples.insert(value.clone());
            }
        }
        if invalid == 0 {
            continue;
        }

        let severity = if vocabulary.extensible {
            Severity::Warning
        } else {
            Severity::Error
        };
        let sample_list: Vec<String> = samples.into_iter().collect();
        let mut message = format!(
            "{} contains {} value(s) not found in {} ({})",
            rule.target, invalid, vocabulary.name, vocabulary.code
        );
        if !sample_list.is_empty() {
            message.push_str(&format!(". values: {}", sample_list.join(", ")));
        }
        findings.push(Finding {
            rule_id: VOCAB_MEMBER.to_string(),
            severity,
            table: table.table.clone(),
            variable: Some(rule.target.clone()),
            message,
            count: invalid,
            suggestion: (mappable > 0)
                .then(|| format!("map {mappable} value(s) through the synonym table")),
            category: Some(vocabulary.code.clone()),
        });
    }
    findings
}
