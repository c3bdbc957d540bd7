//! Evaluation of the closed derivation-operation union.
//!
//! Every operation produces exactly one column of optional strings aligned to
//! the working row index. Operations read columns through a resolver supplied
//! by the executor so produced targets shadow raw source columns.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use clinmap_common::parse_f64;
use clinmap_model::spec::{ConcatPart, DerivationOp};

use crate::datetime::{normalize_date, parse_date};

/// Column access for derivation evaluation.
pub trait ColumnResolver {
    /// Values of a produced target or raw source column, `None` if absent.
    fn column(&self, name: &str) -> Option<Vec<Option<String>>>;

    /// Number of working rows.
    fn height(&self) -> usize;

    /// Study identifier, used by identifier construction.
    fn study_id(&self) -> &str;

    /// Per-row subject identifiers, used by per-subject aggregations.
    fn subjects(&self) -> Option<Vec<Option<String>>>;
}

/// Evaluate one derivation operation into a column.
///
/// A referenced column that does not exist is an evaluation failure; the
/// executor applies its per-field failure policy to the result.
pub fn evaluate(op: &DerivationOp, resolver: &dyn ColumnResolver) -> Result<Vec<Option<String>>> {
    match op {
        DerivationOp::Concat { parts } => eval_concat(parts, resolver),
        DerivationOp::DateIso { source } => {
            let values = required_column(resolver, source)?;
            Ok(values
                .into_iter()
                .map(|value| value.as_deref().and_then(normalize_date))
                .collect())
        }
        DerivationOp::SubjectMinDate { date_column } => {
            eval_subject_extreme(resolver, date_column, Extreme::Min)
        }
        DerivationOp::SubjectMaxDate { date_column } => {
            eval_subject_extreme(resolver, date_column, Extreme::Max)
        }
        DerivationOp::CheckboxCategory {
            source,
            checked,
            unchecked,
        } => {
            let values = required_column(resolver, source)?;
            Ok(values
                .into_iter()
                .map(|value| {
                    value.map(|raw| {
                        if is_checked_token(&raw) {
                            checked.clone()
                        } else {
                            unchecked.clone()
                        }
                    })
                })
                .collect())
        }
        DerivationOp::NumericFlag { source, threshold } => {
            let values = required_column(resolver, source)?;
            Ok(values
                .into_iter()
                .map(|value| {
                    value
                        .as_deref()
                        .and_then(parse_f64)
                        .map(|number| {
                            if number > *threshold {
                                "Y".to_string()
                            } else {
                                "N".to_string()
                            }
                        })
                })
                .collect())
        }
        DerivationOp::SubjectId { source } => {
            let values = required_column(resolver, source)?;
            let study = resolver.study_id().to_string();
            Ok(values
                .into_iter()
                .map(|value| value.map(|raw| prefix_subject_id(&study, &raw)))
                .collect())
        }
    }
}

fn required_column(resolver: &dyn ColumnResolver, name: &str) -> Result<Vec<Option<String>>> {
    resolver
        .column(name)
        .ok_or_else(|| anyhow!("referenced column {name} not found"))
}

fn eval_concat(parts: &[ConcatPart], resolver: &dyn ColumnResolver) -> Result<Vec<Option<String>>> {
    let height = resolver.height();
    let mut resolved: Vec<ResolvedPart> = Vec::with_capacity(parts.len());
    for part in parts {
        match part {
            ConcatPart::Literal(text) => resolved.push(ResolvedPart::Literal(text.clone())),
            ConcatPart::Column(name) => {
                resolved.push(ResolvedPart::Column(required_column(resolver, name)?));
            }
        }
    }

    let mut out = Vec::with_capacity(height);
    for idx in 0..height {
        let mut joined = String::new();
        let mut any_value = false;
        for part in &resolved {
            match part {
                ResolvedPart::Literal(text) => joined.push_str(text),
                ResolvedPart::Column(values) => {
                    if let Some(value) = values.get(idx).and_then(Option::as_deref) {
                        joined.push_str(value);
                        any_value = true;
                    }
                }
            }
        }
        // A row with no column contribution is null, not bare separators.
        out.push(if any_value { Some(joined) } else { None });
    }
    Ok(out)
}

enum ResolvedPart {
    Literal(String),
    Column(Vec<Option<String>>),
}

#[derive(Clone, Copy)]
enum Extreme {
    Min,
    Max,
}

fn eval_subject_extreme(
    resolver: &dyn ColumnResolver,
    date_column: &str,
    extreme: Extreme,
) -> Result<Vec<Option<String>>> {
    let dates = required_column(resolver, date_column)?;
    let subjects = resolver
        .subjects()
        .ok_or_else(|| anyhow!("subject identifier column not available"))?;

    // First pass: per-subject extreme over parseable dates.
    let mut per_subject: BTreeMap<String, String> = BTreeMap::new();
    for (subject, date) in subjects.iter().zip(dates.iter()) {
        let (Some(subject), Some(raw)) = (subject, date) else {
            continue;
        };
        let Some(parsed) = parse_date(raw) else {
            continue;
        };
        per_subject
            .entry(subject.clone())
            .and_modify(|current| {
                let keep = parse_date(current).map(|existing| match extreme {
                    Extreme::Min => parsed < existing,
                    Extreme::Max => parsed > existing,
                });
                if keep == Some(true) {
                    *current = raw.clone();
                }
            })
            .or_insert_with(|| raw.clone());
    }

    Ok(subjects
        .into_iter()
        .map(|subject| subject.and_then(|s| per_subject.get(&s).cloned()))
        .collect())
}

fn is_checked_token(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_uppercase().as_str(),
        "1" | "Y" | "YES" | "TRUE" | "CHECKED" | "X"
    )
}

/// Prefix a raw identifier with the study id unless already prefixed.
pub fn prefix_subject_id(study_id: &str, raw: &str) -> String {
    let trimmed = raw.trim();
    if study_id.is_empty() || trimmed.is_empty() {
        return trimmed.to_string();
    }
    let prefix = format!("{study_id}-");
    if trimmed.starts_with(&prefix) {
        trimmed.to_string()
    } else {
        format!("{prefix}{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MapResolver {
        columns: BTreeMap<String, Vec<Option<String>>>,
        subjects: Option<Vec<Option<String>>>,
        height: usize,
    }

    impl ColumnResolver for MapResolver {
        fn column(&self, name: &str) -> Option<Vec<Option<String>>> {
            self.columns.get(name).cloned()
        }
        fn height(&self) -> usize {
            self.height
        }
        fn study_id(&self) -> &str {
            "S1"
        }
        fn subjects(&self) -> Option<Vec<Option<String>>> {
            self.subjects.clone()
        }
    }

    fn strings(values: &[&str]) -> Vec<Option<String>> {
        values
            .iter()
            .map(|v| {
                if v.is_empty() {
                    None
                } else {
                    Some((*v).to_string())
                }
            })
            .collect()
    }

    fn resolver(columns: Vec<(&str, Vec<Option<String>>)>) -> MapResolver {
        let height = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        MapResolver {
            columns: columns
                .into_iter()
                .map(|(name, values)| (name.to_string(), values))
                .collect(),
            subjects: None,
            height,
        }
    }

    #[test]
    fn concat_joins_columns_and_literals() {
        let r = resolver(vec![
            ("A", strings(&["x", "", "z"])),
            ("B", strings(&["1", "2", ""])),
        ]);
        let op = DerivationOp::Concat {
            parts: vec![
                ConcatPart::Column("A".to_string()),
                ConcatPart::Literal("-".to_string()),
                ConcatPart::Column("B".to_string()),
            ],
        };
        let out = evaluate(&op, &r).unwrap();
        assert_eq!(out, strings(&["x-1", "-2", "z-"]));
    }

    #[test]
    fn concat_with_all_null_columns_is_null() {
        let r = resolver(vec![("A", strings(&["", ""]))]);
        let op = DerivationOp::Concat {
            parts: vec![
                ConcatPart::Column("A".to_string()),
                ConcatPart::Literal("!".to_string()),
            ],
        };
        assert_eq!(evaluate(&op, &r).unwrap(), vec![None, None]);
    }

    #[test]
    fn missing_column_is_an_error() {
        let r = resolver(vec![]);
        let op = DerivationOp::DateIso {
            source: "NOPE".to_string(),
        };
        assert!(evaluate(&op, &r).is_err());
    }

    #[test]
    fn subject_min_date_broadcasts_per_subject() {
        let mut r = resolver(vec![(
            "DT",
            strings(&["2024-01-05", "2024-01-02", "2024-02-01"]),
        )]);
        r.subjects = Some(strings(&["A", "A", "B"]));
        let op = DerivationOp::SubjectMinDate {
            date_column: "DT".to_string(),
        };
        let out = evaluate(&op, &r).unwrap();
        assert_eq!(out, strings(&["2024-01-02", "2024-01-02", "2024-02-01"]));
    }

    #[test]
    fn numeric_flag_compares_to_threshold() {
        let r = resolver(vec![("V", strings(&["3", "0", "abc", ""]))]);
        let op = DerivationOp::NumericFlag {
            source: "V".to_string(),
            threshold: 0.0,
        };
        let out = evaluate(&op, &r).unwrap();
        assert_eq!(
            out,
            vec![Some("Y".to_string()), Some("N".to_string()), None, None]
        );
    }

    #[test]
    fn subject_id_prefixes_once() {
        assert_eq!(prefix_subject_id("S1", "001"), "S1-001");
        assert_eq!(prefix_subject_id("S1", "S1-001"), "S1-001");
        assert_eq!(prefix_subject_id("S1", "  "), "");
    }
}
