//! Cross-table consistency check tests.

use std::collections::BTreeMap;

use polars::prelude::{Column, DataFrame, NamedFrom, Series};

use clinmap_core::frame::OutputTable;
use clinmap_model::spec::MappingSpec;
use clinmap_model::{Severity, StudyConfig};
use clinmap_validate::{CrossTableInput, rules, validate_cross_table};

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

fn empty_specs() -> BTreeMap<String, MappingSpec> {
    BTreeMap::new()
}

fn run(tables: BTreeMap<String, OutputTable>, config: &StudyConfig) -> Vec<clinmap_model::Finding> {
    let specs = empty_specs();
    validate_cross_table(&CrossTableInput {
        tables: &tables,
        specs: &specs,
        config,
    })
}

#[test]
fn orphan_subjects_produce_one_error_with_sample() {
    // Canonical subjects {A, B}; dependent table references {A, C}.
    let mut tables = BTreeMap::new();
    tables.insert(
        "DM".to_string(),
        make_table(
            "DM",
            vec![("STUDYID", vec!["S1", "S1"]), ("USUBJID", vec!["A", "B"])],
        ),
    );
    tables.insert(
        "AE".to_string(),
        make_table(
            "AE",
            vec![("STUDYID", vec!["S1", "S1"]), ("USUBJID", vec!["A", "C"])],
        ),
    );
    let config = StudyConfig::new("S1");

    let findings = run(tables, &config);
    let orphans: Vec<_> = findings
        .iter()
        .filter(|f| f.rule_id == rules::REF_SUBJECT)
        .collect();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].table, "AE");
    assert_eq!(orphans[0].count, 1);
    assert!(orphans[0].message.contains('C'));
    assert_eq!(orphans[0].severity, Severity::Error);
}

#[test]
fn missing_subject_table_downgrades_to_cannot_evaluate() {
    let mut tables = BTreeMap::new();
    tables.insert(
        "AE".to_string(),
        make_table(
            "AE",
            vec![("STUDYID", vec!["S1"]), ("USUBJID", vec!["A"])],
        ),
    );
    let config = StudyConfig::new("S1");

    let findings = run(tables, &config);
    let missing: Vec<_> = findings
        .iter()
        .filter(|f| f.rule_id == rules::REF_NO_SUBJECT_TABLE)
        .collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].severity, Severity::Error);
    // No per-table orphan findings are produced without the canonical table.
    assert!(findings.iter().all(|f| f.rule_id != rules::REF_SUBJECT));
}

#[test]
fn multiple_study_ids_are_an_error() {
    let mut tables = BTreeMap::new();
    tables.insert(
        "DM".to_string(),
        make_table(
            "DM",
            vec![("STUDYID", vec!["S1"]), ("USUBJID", vec!["A"])],
        ),
    );
    tables.insert(
        "AE".to_string(),
        make_table(
            "AE",
            vec![("STUDYID", vec!["S2"]), ("USUBJID", vec!["A"])],
        ),
    );
    let config = StudyConfig::new("S1");

    let findings = run(tables, &config);
    let keys: Vec<_> = findings
        .iter()
        .filter(|f| f.rule_id == rules::KEY_STUDYID)
        .collect();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].count, 2);
}

#[test]
fn single_study_id_produces_no_key_finding() {
    let mut tables = BTreeMap::new();
    tables.insert(
        "DM".to_string(),
        make_table(
            "DM",
            vec![("STUDYID", vec!["S1"]), ("USUBJID", vec!["A"])],
        ),
    );
    let config = StudyConfig::new("S1");
    let findings = run(tables, &config);
    assert!(findings.iter().all(|f| f.rule_id != rules::KEY_STUDYID));
}

#[test]
fn foreign_table_type_codes_are_flagged_with_count() {
    let mut tables = BTreeMap::new();
    tables.insert(
        "DM".to_string(),
        make_table(
            "DM",
            vec![("STUDYID", vec!["S1"]), ("USUBJID", vec!["A"])],
        ),
    );
    tables.insert(
        "AE".to_string(),
        make_table(
            "AE",
            vec![
                ("STUDYID", vec!["S1", "S1", "S1"]),
                ("USUBJID", vec!["A", "A", "A"]),
                ("DOMAIN", vec!["AE", "CM", "CM"]),
            ],
        ),
    );
    let config = StudyConfig::new("S1");

    let findings = run(tables, &config);
    let consistency: Vec<_> = findings
        .iter()
        .filter(|f| f.rule_id == rules::TBL_TYPE)
        .collect();
    assert_eq!(consistency.len(), 1);
    assert_eq!(consistency[0].table, "AE");
    assert_eq!(consistency[0].count, 2);
    assert!(consistency[0].suggestion.is_some());
}

#[test]
fn reference_start_mismatch_is_a_warning() {
    let mut tables = BTreeMap::new();
    tables.insert(
        "DM".to_string(),
        make_table(
            "DM",
            vec![
                ("STUDYID", vec!["S1", "S1"]),
                ("USUBJID", vec!["A", "B"]),
                ("RFSTDTC", vec!["2024-01-10", "2024-02-01"]),
            ],
        ),
    );
    tables.insert(
        "EX".to_string(),
        make_table(
            "EX",
            vec![
                ("STUDYID", vec!["S1", "S1", "S1"]),
                ("USUBJID", vec!["A", "A", "B"]),
                ("EXSTDTC", vec!["2024-01-12", "2024-01-20", "2024-02-01"]),
            ],
        ),
    );
    let config = StudyConfig::new("S1");

    let findings = run(tables, &config);
    let temporal: Vec<_> = findings
        .iter()
        .filter(|f| f.rule_id == rules::TEMPORAL_REFSTART)
        .collect();
    // Subject A: RFSTDTC 2024-01-10 vs earliest EXSTDTC 2024-01-12.
    assert_eq!(temporal.len(), 1);
    assert_eq!(temporal[0].severity, Severity::Warning);
    assert_eq!(temporal[0].count, 1);
}

#[test]
fn day_offset_sign_mismatch_aggregates_per_column() {
    let mut tables = BTreeMap::new();
    tables.insert(
        "DM".to_string(),
        make_table(
            "DM",
            vec![
                ("STUDYID", vec!["S1"]),
                ("USUBJID", vec!["A"]),
                ("RFSTDTC", vec!["2024-01-10"]),
            ],
        ),
    );
    tables.insert(
        "AE".to_string(),
        make_table(
            "AE",
            vec![
                ("STUDYID", vec!["S1", "S1", "S1"]),
                ("USUBJID", vec!["A", "A", "A"]),
                ("AESTDTC", vec!["2024-01-05", "2024-01-06", "2024-01-15"]),
                // Dates before the reference must carry negative offsets.
                ("AESTDY", vec!["3", "2", "6"]),
            ],
        ),
    );
    let config = StudyConfig::new("S1");

    let findings = run(tables, &config);
    let signs: Vec<_> = findings
        .iter()
        .filter(|f| f.rule_id == rules::SIGN_DAYOFFSET)
        .collect();
    assert_eq!(signs.len(), 1, "one aggregated finding per column");
    assert_eq!(signs[0].severity, Severity::Warning);
    assert_eq!(signs[0].count, 2);
    assert_eq!(signs[0].variable.as_deref(), Some("AESTDY"));
}

#[test]
fn checks_tolerate_missing_prerequisites() {
    // Only a treatment table, no subject table: temporal and sign checks
    // yield nothing, referential downgrades to cannot-evaluate.
    let mut tables = BTreeMap::new();
    tables.insert(
        "EX".to_string(),
        make_table(
            "EX",
            vec![("STUDYID", vec!["S1"]), ("EXSTDTC", vec!["2024-01-12"])],
        ),
    );
    let config = StudyConfig::new("S1");

    let findings = run(tables, &config);
    assert!(findings.iter().any(|f| f.rule_id == rules::REF_NO_SUBJECT_TABLE));
    assert!(findings.iter().all(|f| f.rule_id != rules::TEMPORAL_REFSTART));
    assert!(findings.iter().all(|f| f.rule_id != rules::SIGN_DAYOFFSET));
}
