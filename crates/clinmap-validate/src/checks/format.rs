//! Date format checks.
//!
//! Every date-like column (name ending `DTC`) must carry ISO 8601 extended
//! values, partial dates included. The structural shape is pre-filtered with
//! a regex; calendar validity (month ranges, leap days) is delegated to the
//! datetime parser.

use std::sync::LazyLock;

use regex::Regex;

use clinmap_core::frame::OutputTable;
use clinmap_core::{is_iso8601, normalize_date, table_column};
use clinmap_model::{Finding, Severity};

use crate::rules::FMT_ISO8601;

static ISO_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}(-\d{2}(-\d{2}(T\d{2}(:\d{2}(:\d{2})?)?)?)?)?$").expect("iso shape regex")
});

/// Check every date-like column of one table.
pub fn check_date_formats(table: &OutputTable) -> Vec<Finding> {
    let mut findings = Vec::new();
    for name in table.column_names() {
        if !name.to_ascii_uppercase().ends_with("DTC") {
            continue;
        }
        let Some(values) = table_column(&table.data, &name) else {
            continue;
        };

        let mut invalid = 0u64;
        let mut fixable = 0u64;
        let mut samples: Vec<String> = Vec::new();
        for value in values.iter().flatten() {
            if ISO_SHAPE.is_match(value) && is_iso8601(value) {
                continue;
            }
            invalid += 1;
            if normalize_date(value).is_some() {
                fixable += 1;
            }
            if samples.len() < 5 && !samples.contains(value) {
                samples.push(value.clone());
            }
        }
        if invalid == 0 {
            continue;
        }

        let mut message = format!(
            "{name} contains {invalid} value(s) not in ISO 8601 extended format"
        );
        if !samples.is_empty() {
            message.push_str(&format!(". values: {}", samples.join(", ")));
        }
        findings.push(Finding {
            rule_id: FMT_ISO8601.to_string(),
            severity: Severity::Error,
            table: table.table.clone(),
            variable: Some(name.clone()),
            message,
            count: invalid,
            suggestion: (fixable > 0)
                .then(|| format!("normalize {fixable} value(s) to ISO 8601")),
            category: Some("Format".to_string()),
        });
    }
    findings
}
