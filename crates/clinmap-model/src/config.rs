use serde::{Deserialize, Serialize};

/// Study-level metadata shared by every execution and validation pass.
///
/// Holds the study identifier and the conventional column / table names the
/// engine keys on. Passed by reference; never mutated by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    /// Study identifier expected in every output table.
    pub study_id: String,
    /// Column carrying the study identifier.
    pub study_column: String,
    /// Column carrying the unique subject identifier.
    pub subject_column: String,
    /// Column carrying the table's own type code.
    pub table_column: String,
    /// Canonical subject table; referential checks resolve against it.
    pub subject_table: String,
    /// Treatment table whose earliest start date anchors temporal checks.
    pub treatment_table: String,
    /// Reference start date column in the subject table.
    pub reference_start_column: String,
}

impl StudyConfig {
    pub fn new(study_id: impl Into<String>) -> Self {
        Self {
            study_id: study_id.into(),
            study_column: "STUDYID".to_string(),
            subject_column: "USUBJID".to_string(),
            table_column: "DOMAIN".to_string(),
            subject_table: "DM".to_string(),
            treatment_table: "EX".to_string(),
            reference_start_column: "RFSTDTC".to_string(),
        }
    }

    pub fn with_subject_column(mut self, name: impl Into<String>) -> Self {
        self.subject_column = name.into();
        self
    }

    pub fn with_subject_table(mut self, name: impl Into<String>) -> Self {
        self.subject_table = name.into();
        self
    }
}
