use serde::{Deserialize, Serialize};

use crate::finding::Finding;

/// Whether a finding can be repaired automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixKind {
    AutoFixable,
    NeedsHuman,
}

/// A finding tagged with its repair classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixClassification {
    pub finding: Finding,
    pub kind: FixKind,
    /// Suggested fix, present for auto-fixable findings.
    pub suggestion: Option<String>,
}

impl FixClassification {
    pub fn is_auto_fixable(&self) -> bool {
        self.kind == FixKind::AutoFixable
    }
}

/// Audit record of one applied repair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixAction {
    /// 1-based repair iteration that applied this fix.
    pub iteration: u32,
    /// Table the fix was applied to.
    pub table: String,
    /// Variable the fix touched, when column-scoped.
    pub variable: Option<String>,
    /// Rule the fix addresses.
    pub rule_id: String,
    /// What was done.
    pub description: String,
    /// Number of rows (or values) changed.
    pub rows_affected: u64,
}
