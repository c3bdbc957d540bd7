//! Character length limit checks.

use clinmap_core::frame::OutputTable;
use clinmap_core::table_column;
use clinmap_model::spec::MappingSpec;
use clinmap_model::{Finding, Severity};

use crate::rules::LEN_LIMIT;

/// Check every rule with a declared maximum length.
pub fn check_length_limits(table: &OutputTable, spec: &MappingSpec) -> Vec<Finding> {
    let mut findings = Vec::new();
    for rule in &spec.rules {
        let Some(limit) = rule.max_length else {
            continue;
        };
        let Some(values) = table_column(&table.data, &rule.target) else {
            continue;
        };

        let over = values
            .iter()
            .flatten()
            .filter(|value| value.chars().count() > limit as usize)
            .count() as u64;
        if over == 0 {
            continue;
        }
        findings.push(Finding {
            rule_id: LEN_LIMIT.to_string(),
            severity: Severity::Error,
            table: table.table.clone(),
            variable: Some(rule.target.clone()),
            message: format!(
                "{} exceeds the declared length {} in {} value(s)",
                rule.target, limit, over
            ),
            count: over,
            suggestion: Some(format!("truncate {over} value(s) to {limit} characters")),
            category: Some("Length".to_string()),
        });
    }
    findings
}
