use std::collections::BTreeMap;

use polars::prelude::DataFrame;

/// One named raw input table.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub name: String,
    pub data: DataFrame,
}

impl RawTable {
    pub fn new(name: impl Into<String>, data: DataFrame) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Result of one mapping execution.
#[derive(Debug, Clone)]
pub struct OutputTable {
    /// Output table name (e.g., "AE").
    pub table: String,
    pub data: DataFrame,
}

impl OutputTable {
    pub fn new(table: impl Into<String>, data: DataFrame) -> Self {
        Self {
            table: table.into(),
            data,
        }
    }

    pub fn record_count(&self) -> usize {
        self.data.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.data
            .get_column_names()
            .iter()
            .map(|name| name.to_string())
            .collect()
    }
}

/// One epoch window for a subject.
#[derive(Debug, Clone)]
pub struct EpochWindow {
    pub name: String,
    /// Inclusive start date (ISO); `None` means open-ended.
    pub start: Option<String>,
    /// Inclusive end date (ISO); `None` means open-ended.
    pub end: Option<String>,
}

/// Resolved visit metadata for one raw visit label.
#[derive(Debug, Clone)]
pub struct VisitInfo {
    pub number: Option<f64>,
    pub name: String,
}

/// Read-only auxiliary data available to one execution.
///
/// Everything here is derived from already-built tables; the executor never
/// writes back into it.
#[derive(Debug, Clone, Default)]
pub struct CrossTableContext {
    /// Subject identifier -> reference start date (ISO).
    pub reference_starts: Option<BTreeMap<String, String>>,
    /// Subject identifier -> epoch windows in protocol order.
    pub epochs: Option<BTreeMap<String, Vec<EpochWindow>>>,
    /// Uppercased raw visit label -> visit metadata.
    pub visits: Option<BTreeMap<String, VisitInfo>>,
}

impl CrossTableContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reference_starts(mut self, starts: BTreeMap<String, String>) -> Self {
        self.reference_starts = Some(starts);
        self
    }

    pub fn with_epochs(mut self, epochs: BTreeMap<String, Vec<EpochWindow>>) -> Self {
        self.epochs = Some(epochs);
        self
    }

    pub fn with_visits(mut self, visits: BTreeMap<String, VisitInfo>) -> Self {
        self.visits = Some(visits);
        self
    }

    /// Visit metadata for a raw label, if known.
    pub fn visit(&self, label: &str) -> Option<&VisitInfo> {
        self.visits
            .as_ref()
            .and_then(|visits| visits.get(&label.trim().to_ascii_uppercase()))
    }
}
