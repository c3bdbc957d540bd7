//! Per-table validation rule tests.

use polars::prelude::{Column, DataFrame, NamedFrom, Series};

use clinmap_core::frame::OutputTable;
use clinmap_model::spec::{MappingSpec, VariableRule};
use clinmap_model::{Severity, StudyConfig, VocabRegistry, Vocabulary};
use clinmap_validate::{ValidationContext, rules, validate_table};

fn make_table(name: &str, columns: Vec<(&str, Vec<&str>)>) -> OutputTable {
    let cols: Vec<Column> = columns
        .into_iter()
        .map(|(col, values)| {
            Series::new(
                col.into(),
                values
                    .into_iter()
                    .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
                    .collect::<Vec<_>>(),
            )
            .into()
        })
        .collect();
    OutputTable::new(name, DataFrame::new(cols).unwrap())
}

fn make_spec(table: &str, rules: Vec<VariableRule>) -> MappingSpec {
    MappingSpec {
        table: table.to_string(),
        label: None,
        source_tables: Vec::new(),
        key_columns: Vec::new(),
        one_row_per_subject: false,
        transpose: None,
        rules,
    }
}

#[test]
fn date_format_check_flags_non_iso_values() {
    let table = make_table(
        "AE",
        vec![
            ("USUBJID", vec!["001", "002", "003"]),
            ("AESTDTC", vec!["2024-01-05", "05JAN2024", ""]),
        ],
    );
    let spec = make_spec("AE", vec![VariableRule::direct("USUBJID", "SUBJ", 1)]);
    let config = StudyConfig::new("S1");
    let ctx = ValidationContext::new(&config);

    let findings = validate_table(&table, &spec, &ctx);
    assert_eq!(findings.len(), 1);
    let finding = &findings[0];
    assert_eq!(finding.rule_id, rules::FMT_ISO8601);
    assert_eq!(finding.severity, Severity::Error);
    assert_eq!(finding.variable.as_deref(), Some("AESTDTC"));
    assert_eq!(finding.count, 1);
    // The legacy value is normalizable, so a fix is suggested.
    assert!(finding.suggestion.is_some());
}

#[test]
fn clean_dates_produce_no_findings() {
    let table = make_table(
        "AE",
        vec![("AESTDTC", vec!["2024-01-05", "2024-02", "2024"])],
    );
    let spec = make_spec("AE", vec![]);
    let config = StudyConfig::new("S1");
    let findings = validate_table(&table, &spec, &ValidationContext::new(&config));
    assert!(findings.is_empty());
}

#[test]
fn closed_vocabulary_violation_is_error() {
    let table = make_table("DM", vec![("SEX", vec!["F", "FEMALE", "X"])]);
    let spec = make_spec("DM", vec![VariableRule::direct("SEX", "GENDER", 1)]);
    let vocab = VocabRegistry::new().with(
        "SEX",
        Vocabulary::new("C66731", "Sex", false)
            .with_values(["F", "M", "U"])
            .with_synonym("FEMALE", "F"),
    );
    let config = StudyConfig::new("S1");
    let ctx = ValidationContext::new(&config).with_vocab(&vocab);

    let findings = validate_table(&table, &spec, &ctx);
    assert_eq!(findings.len(), 1);
    let finding = &findings[0];
    assert_eq!(finding.rule_id, rules::VOCAB_MEMBER);
    assert_eq!(finding.severity, Severity::Error);
    assert_eq!(finding.count, 2);
    // FEMALE is synonym-mappable; X is not.
    assert_eq!(
        finding.suggestion.as_deref(),
        Some("map 1 value(s) through the synonym table")
    );
}

#[test]
fn extensible_vocabulary_violation_is_warning() {
    let table = make_table("LB", vec![("LBORRESU", vec!["mmol/L", "bananas"])]);
    let spec = make_spec("LB", vec![VariableRule::direct("LBORRESU", "UNIT", 1)]);
    let vocab = VocabRegistry::new().with(
        "LBORRESU",
        Vocabulary::new("C71620", "Unit", true).with_values(["mmol/L", "g/dL"]),
    );
    let config = StudyConfig::new("S1");
    let ctx = ValidationContext::new(&config).with_vocab(&vocab);

    let findings = validate_table(&table, &spec, &ctx);
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].severity, Severity::Warning);
}

#[test]
fn length_limit_counts_overlong_values() {
    let mut term = VariableRule::direct("AETERM", "TERM", 1);
    term.max_length = Some(5);
    let table = make_table("AE", vec![("AETERM", vec!["RASH", "ANAPHYLAXIS", ""])]);
    let spec = make_spec("AE", vec![term]);
    let config = StudyConfig::new("S1");

    let findings = validate_table(&table, &spec, &ValidationContext::new(&config));
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].rule_id, rules::LEN_LIMIT);
    assert_eq!(findings[0].count, 1);
}
