use serde::{Deserialize, Serialize};

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Notice,
}

/// One validation result.
///
/// Findings are immutable once produced; a re-validation supersedes the
/// previous list rather than mutating individual entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Stable rule identifier (e.g., "REF_SUBJECT").
    pub rule_id: String,
    /// Severity level.
    pub severity: Severity,
    /// Table the finding belongs to.
    pub table: String,
    /// Variable name, when the finding is column-scoped.
    pub variable: Option<String>,
    /// Human-readable message describing the issue.
    pub message: String,
    /// Number of affected rows (or values).
    pub count: u64,
    /// Suggested repair, when one is known.
    pub suggestion: Option<String>,
    /// Check category (e.g., "Format", "Referential Integrity").
    pub category: Option<String>,
}

impl Finding {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}
