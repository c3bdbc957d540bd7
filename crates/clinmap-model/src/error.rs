use thiserror::Error;

/// Fatal execution failure.
///
/// Raised only when a critical target fails to materialize (or the table is
/// structurally unusable); non-critical handler failures are logged and the
/// column nulled instead.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("critical target {target} in table {table} failed: {reason}")]
    CriticalTarget {
        table: String,
        target: String,
        reason: String,
    },
    #[error("table {table} could not be assembled: {reason}")]
    Assembly { table: String, reason: String },
}

impl ExecutionError {
    pub fn critical(
        table: impl Into<String>,
        target: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::CriticalTarget {
            table: table.into(),
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn assembly(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Assembly {
            table: table.into(),
            reason: reason.into(),
        }
    }
}

/// Structural spec problems, checked when a spec is loaded or a loop is
/// constructed.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("unknown derivation keyword: {keyword}")]
    UnknownDerivation { keyword: String },
    #[error("malformed derivation `{text}`: {reason}")]
    MalformedDerivation { text: String, reason: String },
    #[error("table {table} was declared without a mapping spec")]
    MissingSpec { table: String },
}

impl SpecError {
    pub fn malformed(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedDerivation {
            text: text.into(),
            reason: reason.into(),
        }
    }
}
