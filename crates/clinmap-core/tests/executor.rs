//! End-to-end tests for the mapping executor.

use std::collections::BTreeMap;

use polars::prelude::{Column, DataFrame, NamedFrom, Series};

use clinmap_common::{opt_string_column, string_column};
use clinmap_core::executor::Executor;
use clinmap_core::frame::{CrossTableContext, EpochWindow, RawTable, VisitInfo};
use clinmap_core::patterns::HandlerRegistry;
use clinmap_model::spec::{
    MappingSpec, MeasureColumn, PatternTag, TransposeSpec, VariableRule,
};
use clinmap_model::StudyConfig;

fn make_frame(columns: Vec<(&str, Vec<&str>)>) -> DataFrame {
    let cols: Vec<Column> = columns
        .into_iter()
        .map(|(name, values)| {
            Series::new(
                name.into(),
                values
                    .into_iter()
                    .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
                    .collect::<Vec<_>>(),
            )
            .into()
        })
        .collect();
    DataFrame::new(cols).unwrap()
}

fn rule(target: &str, pattern: PatternTag, order: u32) -> VariableRule {
    VariableRule {
        target: target.to_string(),
        pattern,
        sources: Vec::new(),
        derivation: None,
        constant: None,
        order,
        critical: false,
        max_length: None,
    }
}

fn spec(table: &str, rules: Vec<VariableRule>) -> MappingSpec {
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

fn execute(
    spec: &MappingSpec,
    inputs: &[RawTable],
    context: Option<&CrossTableContext>,
) -> clinmap_core::frame::OutputTable {
    let registry = HandlerRegistry::standard();
    let config = StudyConfig::new("S1");
    Executor::new(&registry, &config)
        .execute(spec, inputs, context)
        .expect("execute")
}

// ============================================================================
// Column materialization and ordering
// ============================================================================

#[test]
fn assign_direct_columns_in_rule_order() {
    // STUDYID(ASSIGN "S1"), DOMAIN(ASSIGN "DM"), USUBJID(DIRECT SUBJ)
    let dm_spec = spec(
        "DM",
        vec![
            VariableRule::assign("STUDYID", "S1", 1),
            VariableRule::assign("DOMAIN", "DM", 2),
            VariableRule::direct("USUBJID", "SUBJ", 3),
        ],
    );
    let raw = RawTable::new("demog", make_frame(vec![("SUBJ", vec!["001", "002"])]));

    let output = execute(&dm_spec, &[raw], None);
    assert_eq!(output.record_count(), 2);
    assert_eq!(output.column_names(), vec!["STUDYID", "DOMAIN", "USUBJID"]);
    assert_eq!(
        string_column(&output.data, "STUDYID").unwrap(),
        vec!["S1", "S1"]
    );
    assert_eq!(
        string_column(&output.data, "DOMAIN").unwrap(),
        vec!["DM", "DM"]
    );
    assert_eq!(
        string_column(&output.data, "USUBJID").unwrap(),
        vec!["001", "002"]
    );
}

#[test]
fn source_only_columns_never_reach_output() {
    let ae_spec = spec(
        "AE",
        vec![
            VariableRule::assign("STUDYID", "S1", 1),
            VariableRule::direct("USUBJID", "SUBJ", 2),
        ],
    );
    let raw = RawTable::new(
        "ae",
        make_frame(vec![
            ("SUBJ", vec!["001"]),
            ("INTERNAL_NOTE", vec!["do not ship"]),
        ]),
    );
    let output = execute(&ae_spec, &[raw], None);
    assert_eq!(output.column_names(), vec!["STUDYID", "USUBJID"]);
}

#[test]
fn column_order_follows_rule_order_not_input_order() {
    let mut rules = vec![
        VariableRule::direct("USUBJID", "SUBJ", 3),
        VariableRule::assign("DOMAIN", "VS", 2),
        VariableRule::assign("STUDYID", "S1", 1),
    ];
    rules.rotate_left(1);
    let vs_spec = spec("VS", rules);
    let raw = RawTable::new("vs", make_frame(vec![("SUBJ", vec!["001"])]));
    let output = execute(&vs_spec, &[raw], None);
    assert_eq!(output.column_names(), vec!["STUDYID", "DOMAIN", "USUBJID"]);
}

#[test]
fn execution_is_idempotent() {
    let dm_spec = spec(
        "DM",
        vec![
            VariableRule::assign("STUDYID", "S1", 1),
            VariableRule::direct("USUBJID", "SUBJ", 2),
        ],
    );
    let raw = RawTable::new(
        "demog",
        make_frame(vec![("SUBJ", vec!["002", "001", "003"])]),
    );
    let first = execute(&dm_spec, std::slice::from_ref(&raw), None);
    let second = execute(&dm_spec, std::slice::from_ref(&raw), None);
    assert!(first.data.equals_missing(&second.data));
}

// ============================================================================
// Merge behavior
// ============================================================================

#[test]
fn merge_unions_columns_and_fills_nulls() {
    let ae_spec = spec(
        "AE",
        vec![
            VariableRule::direct("USUBJID", "SUBJ", 1),
            VariableRule::direct("AETERM", "TERM", 2),
            VariableRule::direct("AESEV", "SEVERITY", 3),
        ],
    );
    let first = RawTable::new(
        "ae_site1",
        make_frame(vec![("SUBJ", vec!["001"]), ("TERM", vec!["HEADACHE"])]),
    );
    let second = RawTable::new(
        "ae_site2",
        make_frame(vec![("SUBJ", vec!["002"]), ("SEVERITY", vec!["MILD"])]),
    );
    let output = execute(&ae_spec, &[first, second], None);
    assert_eq!(output.record_count(), 2);
    let terms = opt_string_column(&output.data, "AETERM").unwrap();
    assert_eq!(terms, vec![Some("HEADACHE".to_string()), None]);
    let severities = opt_string_column(&output.data, "AESEV").unwrap();
    assert_eq!(severities, vec![None, Some("MILD".to_string())]);
}

// ============================================================================
// Failure policy
// ============================================================================

#[test]
fn critical_target_failure_aborts_table() {
    let registry = HandlerRegistry::standard();
    let config = StudyConfig::new("S1");
    let dm_spec = spec(
        "DM",
        vec![VariableRule::direct("USUBJID", "MISSING_COL", 1).with_critical(true)],
    );
    let raw = RawTable::new("demog", make_frame(vec![("SUBJ", vec!["001"])]));
    let result = Executor::new(&registry, &config).execute(&dm_spec, &[raw], None);
    assert!(result.is_err());
}

#[test]
fn non_critical_failure_nulls_column_and_continues() {
    let dm_spec = spec(
        "DM",
        vec![
            VariableRule::direct("USUBJID", "SUBJ", 1),
            VariableRule::direct("SITEID", "MISSING_COL", 2),
        ],
    );
    let raw = RawTable::new("demog", make_frame(vec![("SUBJ", vec!["001"])]));
    let output = execute(&dm_spec, &[raw], None);
    assert_eq!(output.column_names(), vec!["USUBJID", "SITEID"]);
    assert_eq!(
        opt_string_column(&output.data, "SITEID").unwrap(),
        vec![None]
    );
}

#[test]
fn unknown_derivation_keyword_yields_null_column() {
    let mut bad = rule("DMXFN", PatternTag::Derivation, 2);
    bad.derivation = Some("FROBNICATE(SUBJ)".to_string());
    bad.critical = true;
    let dm_spec = spec(
        "DM",
        vec![VariableRule::direct("USUBJID", "SUBJ", 1), bad],
    );
    let raw = RawTable::new("demog", make_frame(vec![("SUBJ", vec!["001", "002"])]));
    let output = execute(&dm_spec, &[raw], None);
    assert_eq!(
        opt_string_column(&output.data, "DMXFN").unwrap(),
        vec![None, None]
    );
}

// ============================================================================
// Derivations through the executor
// ============================================================================

#[test]
fn concat_derivation_reads_earlier_outputs() {
    let mut usubjid = rule("USUBJID", PatternTag::Derivation, 3);
    usubjid.derivation = Some("CONCAT(STUDYID, \"-\", SUBJ)".to_string());
    let dm_spec = spec(
        "DM",
        vec![
            VariableRule::assign("STUDYID", "S1", 1),
            VariableRule::assign("DOMAIN", "DM", 2),
            usubjid,
        ],
    );
    let raw = RawTable::new("demog", make_frame(vec![("SUBJ", vec!["001", "002"])]));
    let output = execute(&dm_spec, &[raw], None);
    assert_eq!(
        string_column(&output.data, "USUBJID").unwrap(),
        vec!["S1-001", "S1-002"]
    );
}

#[test]
fn reformat_normalizes_raw_dates() {
    let mut dtc = rule("AESTDTC", PatternTag::Reformat, 2);
    dtc.sources = vec!["ONSET".to_string()];
    let ae_spec = spec(
        "AE",
        vec![VariableRule::direct("USUBJID", "SUBJ", 1), dtc],
    );
    let raw = RawTable::new(
        "ae",
        make_frame(vec![
            ("SUBJ", vec!["001", "001", "001"]),
            ("ONSET", vec!["05JAN2024", "2024-02-01", "junk"]),
        ]),
    );
    let output = execute(&ae_spec, &[raw], None);
    assert_eq!(
        opt_string_column(&output.data, "AESTDTC").unwrap(),
        vec![
            Some("2024-01-05".to_string()),
            Some("2024-02-01".to_string()),
            None
        ]
    );
}

// ============================================================================
// Cross-table derivations
// ============================================================================

fn reference_context() -> CrossTableContext {
    let mut starts = BTreeMap::new();
    starts.insert("001".to_string(), "2024-01-10".to_string());
    starts.insert("002".to_string(), "2024-01-20".to_string());
    CrossTableContext::new().with_reference_starts(starts)
}

#[test]
fn study_day_uses_reference_lookup() {
    let mut dtc = rule("AESTDTC", PatternTag::Direct, 2);
    dtc.sources = vec!["ONSET".to_string()];
    let ae_spec = spec(
        "AE",
        vec![
            VariableRule::direct("USUBJID", "SUBJ", 1),
            dtc,
            rule("AESTDY", PatternTag::Derivation, 3),
        ],
    );
    let raw = RawTable::new(
        "ae",
        make_frame(vec![
            ("SUBJ", vec!["001", "001", "002", "003"]),
            ("ONSET", vec!["2024-01-10", "2024-01-08", "2024-01-25", "2024-01-01"]),
        ]),
    );
    let context = reference_context();
    let output = execute(&ae_spec, &[raw], Some(&context));
    let days = clinmap_common::opt_i64_column(&output.data, "AESTDY").unwrap();
    // Day 1 on the reference date, negative before, no day 0; unknown
    // subject 003 stays null.
    assert_eq!(days, vec![Some(1), Some(-2), Some(6), None]);
}

#[test]
fn epoch_resolves_per_subject_window() {
    let mut dtc = rule("VSDTC", PatternTag::Direct, 2);
    dtc.sources = vec!["DATE".to_string()];
    let vs_spec = spec(
        "VS",
        vec![
            VariableRule::direct("USUBJID", "SUBJ", 1),
            dtc,
            rule("EPOCH", PatternTag::Derivation, 3),
        ],
    );
    let raw = RawTable::new(
        "vs",
        make_frame(vec![
            ("SUBJ", vec!["001", "001", "002"]),
            ("DATE", vec!["2024-01-05", "2024-01-15", "2024-01-15"]),
        ]),
    );
    let mut epochs = BTreeMap::new();
    epochs.insert(
        "001".to_string(),
        vec![
            EpochWindow {
                name: "SCREENING".to_string(),
                start: None,
                end: Some("2024-01-09".to_string()),
            },
            EpochWindow {
                name: "TREATMENT".to_string(),
                start: Some("2024-01-10".to_string()),
                end: None,
            },
        ],
    );
    let context = CrossTableContext::new().with_epochs(epochs);
    let output = execute(&vs_spec, &[raw], Some(&context));
    assert_eq!(
        opt_string_column(&output.data, "EPOCH").unwrap(),
        vec![
            Some("SCREENING".to_string()),
            Some("TREATMENT".to_string()),
            None
        ]
    );
}

#[test]
fn visit_lookup_fills_unfilled_fields() {
    let mut visit = rule("VISIT", PatternTag::Derivation, 2);
    visit.sources = vec!["VISIT_LABEL".to_string()];
    let vs_spec = spec(
        "VS",
        vec![
            VariableRule::direct("USUBJID", "SUBJ", 1),
            visit,
            rule("VISITNUM", PatternTag::Derivation, 3),
        ],
    );
    let raw = RawTable::new(
        "vs",
        make_frame(vec![
            ("SUBJ", vec!["001", "001"]),
            ("VISIT_LABEL", vec!["wk 1", "unscheduled"]),
        ]),
    );
    let mut visits = BTreeMap::new();
    visits.insert(
        "WK 1".to_string(),
        VisitInfo {
            number: Some(1.0),
            name: "WEEK 1".to_string(),
        },
    );
    let context = CrossTableContext::new().with_visits(visits);
    let output = execute(&vs_spec, &[raw], Some(&context));
    assert_eq!(
        opt_string_column(&output.data, "VISIT").unwrap(),
        vec![Some("WEEK 1".to_string()), None]
    );
    assert_eq!(
        opt_string_column(&output.data, "VISITNUM").unwrap(),
        vec![Some("1".to_string()), None]
    );
}

// ============================================================================
// Sequence generation
// ============================================================================

#[test]
fn sequence_counts_per_subject_in_input_order() {
    let ae_spec = spec(
        "AE",
        vec![
            VariableRule::direct("USUBJID", "SUBJ", 1),
            rule("AESEQ", PatternTag::Derivation, 2),
        ],
    );
    let raw = RawTable::new(
        "ae",
        make_frame(vec![("SUBJ", vec!["001", "001", "001", "002"])]),
    );
    let output = execute(&ae_spec, &[raw], None);
    let seq = clinmap_common::opt_i64_column(&output.data, "AESEQ").unwrap();
    assert_eq!(seq, vec![Some(1), Some(2), Some(3), Some(1)]);
}

#[test]
fn sequence_skipped_for_one_row_per_subject_tables() {
    let mut dm_spec = spec(
        "DM",
        vec![
            VariableRule::direct("USUBJID", "SUBJ", 1),
            rule("DMSEQ", PatternTag::Derivation, 2),
        ],
    );
    dm_spec.one_row_per_subject = true;
    let raw = RawTable::new("demog", make_frame(vec![("SUBJ", vec!["001", "002"])]));
    let output = execute(&dm_spec, &[raw], None);
    assert_eq!(
        opt_string_column(&output.data, "DMSEQ").unwrap(),
        vec![None, None]
    );
}

#[test]
fn sequence_orders_by_date_when_no_keys_declared() {
    let mut dtc = rule("AESTDTC", PatternTag::Direct, 2);
    dtc.sources = vec!["ONSET".to_string()];
    let ae_spec = spec(
        "AE",
        vec![
            VariableRule::direct("USUBJID", "SUBJ", 1),
            dtc,
            rule("AESEQ", PatternTag::Derivation, 3),
        ],
    );
    let raw = RawTable::new(
        "ae",
        make_frame(vec![
            ("SUBJ", vec!["001", "001"]),
            ("ONSET", vec!["2024-02-01", "2024-01-01"]),
        ]),
    );
    let output = execute(&ae_spec, &[raw], None);
    // Output rows are sorted by study/subject fallback (stable), so input
    // order is retained, but the sequence follows date order.
    let seq = clinmap_common::opt_i64_column(&output.data, "AESEQ").unwrap();
    assert_eq!(seq, vec![Some(2), Some(1)]);
}

// ============================================================================
// Row sorting
// ============================================================================

#[test]
fn rows_sort_by_declared_keys_nulls_last() {
    let mut ae_spec = spec(
        "AE",
        vec![
            VariableRule::direct("USUBJID", "SUBJ", 1),
            VariableRule::direct("AETERM", "TERM", 2),
        ],
    );
    ae_spec.key_columns = vec!["USUBJID".to_string(), "AETERM".to_string()];
    let raw = RawTable::new(
        "ae",
        make_frame(vec![
            ("SUBJ", vec!["002", "001", "001", ""]),
            ("TERM", vec!["NAUSEA", "RASH", "HEADACHE", "FEVER"]),
        ]),
    );
    let output = execute(&ae_spec, &[raw], None);
    let subjects = opt_string_column(&output.data, "USUBJID").unwrap();
    assert_eq!(
        subjects,
        vec![
            Some("001".to_string()),
            Some("001".to_string()),
            Some("002".to_string()),
            None
        ]
    );
    let terms = string_column(&output.data, "AETERM").unwrap();
    assert_eq!(terms, vec!["HEADACHE", "RASH", "NAUSEA", "FEVER"]);
}

// ============================================================================
// Transpose through the executor
// ============================================================================

#[test]
fn transpose_expands_rows_and_sequences_tall_output() {
    let mut result = rule("VSORRES", PatternTag::Transpose, 4);
    result.critical = false;
    let vs_spec = MappingSpec {
        table: "VS".to_string(),
        label: None,
        source_tables: Vec::new(),
        key_columns: vec!["USUBJID".to_string(), "VSTESTCD".to_string()],
        one_row_per_subject: false,
        transpose: Some(TransposeSpec {
            id_columns: vec!["STUDYID".to_string(), "USUBJID".to_string()],
            measures: vec![
                MeasureColumn {
                    column: "SYSBP".to_string(),
                    code: "SYSBP".to_string(),
                    name: "Systolic Blood Pressure".to_string(),
                    unit: Some("mmHg".to_string()),
                },
                MeasureColumn {
                    column: "PULSE".to_string(),
                    code: "PULSE".to_string(),
                    name: "Pulse Rate".to_string(),
                    unit: Some("beats/min".to_string()),
                },
            ],
            result_target: "VSORRES".to_string(),
            code_target: "VSTESTCD".to_string(),
            name_target: "VSTEST".to_string(),
            unit_target: Some("VSORRESU".to_string()),
        }),
        rules: vec![
            VariableRule::assign("STUDYID", "S1", 1),
            VariableRule::direct("USUBJID", "SUBJ", 2),
            rule("VSTESTCD", PatternTag::Transpose, 3),
            result,
            rule("VSTEST", PatternTag::Transpose, 5),
            rule("VSORRESU", PatternTag::Transpose, 6),
            rule("VSSEQ", PatternTag::Derivation, 7),
        ],
    };
    let raw = RawTable::new(
        "vitals",
        make_frame(vec![
            ("SUBJ", vec!["001", "002"]),
            ("SYSBP", vec!["120", "130"]),
            ("PULSE", vec!["60", ""]),
        ]),
    );
    let output = execute(&vs_spec, &[raw], None);
    // 2 rows x 2 measures minus one null PULSE cell.
    assert_eq!(output.record_count(), 3);
    assert_eq!(
        output.column_names(),
        vec![
            "STUDYID", "USUBJID", "VSTESTCD", "VSORRES", "VSTEST", "VSORRESU", "VSSEQ"
        ]
    );
    let seq = clinmap_common::opt_i64_column(&output.data, "VSSEQ").unwrap();
    assert_eq!(seq, vec![Some(1), Some(2), Some(1)]);
}
