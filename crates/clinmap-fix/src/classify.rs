//! Finding classification.
//!
//! `classify` is pure and deterministic: the same finding always yields the
//! same classification, so the loop can safely re-run it every iteration.

use clinmap_model::{Finding, FixClassification, FixKind};
use clinmap_validate::rules;

/// Classify one finding as auto-fixable or needing human review.
///
/// A repair is automatic only when it is mechanical and value-preserving in
/// intent: date normalization and synonym mapping (when the validator found
/// repairable values), length truncation, and overwriting the table-type
/// column with the table's own code. Structural problems - orphan subjects,
/// study-id multiplicity, temporal and sign disagreements - always go to a
/// human.
pub fn classify(finding: &Finding) -> FixClassification {
    let kind = match finding.rule_id.as_str() {
        rules::FMT_ISO8601 | rules::VOCAB_MEMBER => {
            if finding.suggestion.is_some() {
                FixKind::AutoFixable
            } else {
                FixKind::NeedsHuman
            }
        }
        rules::LEN_LIMIT | rules::TBL_TYPE => FixKind::AutoFixable,
        _ => FixKind::NeedsHuman,
    };
    FixClassification {
        suggestion: finding.suggestion.clone(),
        finding: finding.clone(),
        kind,
    }
}

/// Classify a whole finding list, preserving order.
pub fn classify_all(findings: &[Finding]) -> Vec<FixClassification> {
    findings.iter().map(classify).collect()
}
