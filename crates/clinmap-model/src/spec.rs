//! Declarative per-table mapping specifications.
//!
//! A [`MappingSpec`] describes how one standardized output table is produced
//! from raw input: an ordered list of [`VariableRule`]s, each materializing a
//! single output column, plus optional restructuring via [`TransposeSpec`].
//!
//! Derivation rules carry a small textual grammar
//! (`NAME(arg, "literal", ...)`) that is resolved once, at spec load, into
//! the closed [`DerivationOp`] union. Handlers never re-parse per row.

use serde::{Deserialize, Serialize};

use crate::error::SpecError;

/// Transformation category of a rule.
///
/// The executor applies categories in priority order; every rule of one
/// category is materialized before the next category starts, so later
/// categories may reference earlier outputs (sequence numbering needs the
/// subject identifier, epoch resolution needs already-placed dates).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternTag {
    /// Constant broadcast into every row.
    Assign,
    /// Passthrough (rename) of one source column.
    Direct,
    /// Single-source value transform, typically date normalization.
    Reformat,
    /// Value mapped through a controlled vocabulary.
    LookupRecode,
    /// Symbolic derivation over one or more columns.
    Derivation,
    /// Wide-to-tall restructuring of repeated measurements.
    Transpose,
}

impl PatternTag {
    /// Execution priority; lower runs first.
    pub fn priority(self) -> u8 {
        match self {
            PatternTag::Assign => 1,
            PatternTag::Direct => 2,
            PatternTag::Reformat => 3,
            PatternTag::LookupRecode => 4,
            PatternTag::Derivation => 5,
            PatternTag::Transpose => 6,
        }
    }

    /// All categories in execution order.
    pub fn groups() -> [PatternTag; 6] {
        [
            PatternTag::Assign,
            PatternTag::Direct,
            PatternTag::Reformat,
            PatternTag::LookupRecode,
            PatternTag::Derivation,
            PatternTag::Transpose,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PatternTag::Assign => "ASSIGN",
            PatternTag::Direct => "DIRECT",
            PatternTag::Reformat => "REFORMAT",
            PatternTag::LookupRecode => "LOOKUP_RECODE",
            PatternTag::Derivation => "DERIVATION",
            PatternTag::Transpose => "TRANSPOSE",
        }
    }
}

/// One entry of a [`MappingSpec`]: how to produce one output column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableRule {
    /// Output column name (e.g., "USUBJID").
    pub target: String,
    /// Transformation category.
    pub pattern: PatternTag,
    /// Source column reference(s) in the merged raw input.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Derivation text for `Derivation` rules, e.g. `CONCAT(STUDYID, "-", SUBJ)`.
    #[serde(default)]
    pub derivation: Option<String>,
    /// Constant value for `Assign` rules.
    #[serde(default)]
    pub constant: Option<String>,
    /// Column order index within the output table.
    pub order: u32,
    /// A failing handler on a critical target aborts the whole table.
    #[serde(default)]
    pub critical: bool,
    /// Maximum character length for validation (optional).
    #[serde(default)]
    pub max_length: Option<u32>,
}

impl VariableRule {
    /// Convenience constructor for a constant-broadcast rule.
    pub fn assign(target: impl Into<String>, value: impl Into<String>, order: u32) -> Self {
        Self {
            target: target.into(),
            pattern: PatternTag::Assign,
            sources: Vec::new(),
            derivation: None,
            constant: Some(value.into()),
            order,
            critical: false,
            max_length: None,
        }
    }

    /// Convenience constructor for a single-source passthrough rule.
    pub fn direct(target: impl Into<String>, source: impl Into<String>, order: u32) -> Self {
        Self {
            target: target.into(),
            pattern: PatternTag::Direct,
            sources: vec![source.into()],
            derivation: None,
            constant: None,
            order,
            critical: false,
            max_length: None,
        }
    }

    pub fn with_critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// First declared source column, if any.
    pub fn primary_source(&self) -> Option<&str> {
        self.sources.first().map(String::as_str)
    }

    /// Resolve the derivation text into a [`DerivationOp`], if present.
    pub fn derivation_op(&self) -> Result<Option<DerivationOp>, SpecError> {
        match self.derivation.as_deref() {
            Some(text) => DerivationOp::parse(text).map(Some),
            None => Ok(None),
        }
    }
}

/// One pivoted measurement column of a [`TransposeSpec`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureColumn {
    /// Source column holding the measurement values.
    pub column: String,
    /// Short code identifying the measurement (e.g., "SYSBP").
    pub code: String,
    /// Long name of the measurement (e.g., "Systolic Blood Pressure").
    pub name: String,
    /// Measurement unit; a missing unit yields a null unit column.
    #[serde(default)]
    pub unit: Option<String>,
}

/// Wide-to-tall restructuring declaration.
///
/// Identifier columns are retained on every tall row; each measure column
/// becomes one block of rows carrying its code/name/unit as constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransposeSpec {
    /// Columns retained on every output row; absent columns are dropped.
    pub id_columns: Vec<String>,
    /// Value columns to pivot, with their code/name/unit metadata.
    pub measures: Vec<MeasureColumn>,
    /// Target receiving the measurement value.
    pub result_target: String,
    /// Target receiving the measurement short code.
    pub code_target: String,
    /// Target receiving the measurement long name.
    pub name_target: String,
    /// Target receiving the measurement unit (optional).
    #[serde(default)]
    pub unit_target: Option<String>,
}

/// Declarative mapping for one output table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingSpec {
    /// Output table name (e.g., "AE").
    pub table: String,
    /// Human-readable table label.
    #[serde(default)]
    pub label: Option<String>,
    /// Raw input table names merged for this execution.
    /// Defaults to the output table name when empty.
    #[serde(default)]
    pub source_tables: Vec<String>,
    /// Natural-key columns used for row ordering and sequence tie-breaks.
    #[serde(default)]
    pub key_columns: Vec<String>,
    /// Tables declared one-row-per-subject never receive a sequence.
    #[serde(default)]
    pub one_row_per_subject: bool,
    /// Optional wide-to-tall restructuring applied by the TRANSPOSE group.
    #[serde(default)]
    pub transpose: Option<TransposeSpec>,
    /// Ordered column rules.
    pub rules: Vec<VariableRule>,
}

impl MappingSpec {
    /// Rules sorted by their declared order index (stable for ties).
    pub fn ordered_rules(&self) -> Vec<&VariableRule> {
        let mut ordered: Vec<&VariableRule> = self.rules.iter().collect();
        ordered.sort_by_key(|rule| rule.order);
        ordered
    }

    /// Find the rule producing `target` (case-insensitive).
    pub fn rule_for(&self, target: &str) -> Option<&VariableRule> {
        self.rules
            .iter()
            .find(|rule| rule.target.eq_ignore_ascii_case(target))
    }

    /// Whether any rule declares `target` as its output column.
    pub fn declares_target(&self, target: &str) -> bool {
        self.rule_for(target).is_some()
    }

    /// The sequence target, if declared: a non-transpose rule whose name
    /// ends with "SEQ".
    pub fn sequence_target(&self) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| {
                rule.pattern != PatternTag::Transpose
                    && rule.target.to_ascii_uppercase().ends_with("SEQ")
            })
            .map(|rule| rule.target.as_str())
    }

    /// The epoch target, if declared.
    pub fn epoch_target(&self) -> Option<&str> {
        self.rule_for("EPOCH").map(|rule| rule.target.as_str())
    }

    /// Raw table names to merge; falls back to the output table name.
    pub fn input_tables(&self) -> Vec<String> {
        if self.source_tables.is_empty() {
            vec![self.table.clone()]
        } else {
            self.source_tables.clone()
        }
    }
}

/// One part of a concatenation derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcatPart {
    /// Quoted literal text.
    Literal(String),
    /// Reference to a produced target or raw source column.
    Column(String),
}

/// Closed union of derivation operations.
///
/// Each variant carries its full parameter structure; the textual grammar is
/// parsed exactly once per rule, never per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DerivationOp {
    /// Join literals and column values per row.
    Concat { parts: Vec<ConcatPart> },
    /// Normalize a raw date column to ISO 8601.
    DateIso { source: String },
    /// Per-subject minimum of a date column, broadcast to the subject's rows.
    SubjectMinDate { date_column: String },
    /// Per-subject maximum of a date column, broadcast to the subject's rows.
    SubjectMaxDate { date_column: String },
    /// Checkbox/boolean input mapped to category text.
    CheckboxCategory {
        source: String,
        checked: String,
        unchecked: String,
    },
    /// Numeric comparison to a Y/N flag; values above the threshold flag "Y".
    NumericFlag { source: String, threshold: f64 },
    /// Study-prefixed subject identifier construction.
    SubjectId { source: String },
}

impl DerivationOp {
    /// Parse derivation text of the form `NAME(arg, "literal", ...)`.
    ///
    /// Quoted arguments are literals, bare arguments are column references.
    /// An unrecognized function name is reported as
    /// [`SpecError::UnknownDerivation`]; the executor nulls the column
    /// rather than failing the table.
    pub fn parse(text: &str) -> Result<Self, SpecError> {
        let trimmed = text.trim();
        let open = trimmed
            .find('(')
            .ok_or_else(|| SpecError::malformed(trimmed, "missing '('"))?;
        if !trimmed.ends_with(')') {
            return Err(SpecError::malformed(trimmed, "missing closing ')'"));
        }
        let name = trimmed[..open].trim().to_ascii_uppercase();
        let body = &trimmed[open + 1..trimmed.len() - 1];
        let args = split_args(body);

        match name.as_str() {
            "CONCAT" => {
                if args.is_empty() {
                    return Err(SpecError::malformed(trimmed, "CONCAT requires arguments"));
                }
                let parts = args
                    .iter()
                    .map(|arg| match arg {
                        Arg::Literal(text) => ConcatPart::Literal(text.clone()),
                        Arg::Column(name) => ConcatPart::Column(name.clone()),
                    })
                    .collect();
                Ok(DerivationOp::Concat { parts })
            }
            "ISODATE" => Ok(DerivationOp::DateIso {
                source: single_column(&name, &args, trimmed)?,
            }),
            "MINDATE" => Ok(DerivationOp::SubjectMinDate {
                date_column: single_column(&name, &args, trimmed)?,
            }),
            "MAXDATE" => Ok(DerivationOp::SubjectMaxDate {
                date_column: single_column(&name, &args, trimmed)?,
            }),
            "CHECKBOX" => {
                let source = column_at(&args, 0, &name, trimmed)?;
                let checked = literal_at(&args, 1, &name, trimmed)?;
                let unchecked = literal_at(&args, 2, &name, trimmed)?;
                Ok(DerivationOp::CheckboxCategory {
                    source,
                    checked,
                    unchecked,
                })
            }
            "FLAG" => {
                let source = column_at(&args, 0, &name, trimmed)?;
                let threshold = match args.get(1) {
                    Some(Arg::Literal(text)) => text.trim().parse::<f64>().map_err(|_| {
                        SpecError::malformed(trimmed, "FLAG threshold must be numeric")
                    })?,
                    Some(Arg::Column(_)) => {
                        return Err(SpecError::malformed(
                            trimmed,
                            "FLAG threshold must be a quoted literal",
                        ));
                    }
                    None => 0.0,
                };
                Ok(DerivationOp::NumericFlag { source, threshold })
            }
            "SUBJID" => Ok(DerivationOp::SubjectId {
                source: single_column(&name, &args, trimmed)?,
            }),
            _ => Err(SpecError::UnknownDerivation { keyword: name }),
        }
    }

    /// Column references this operation reads.
    pub fn referenced_columns(&self) -> Vec<&str> {
        match self {
            DerivationOp::Concat { parts } => parts
                .iter()
                .filter_map(|part| match part {
                    ConcatPart::Column(name) => Some(name.as_str()),
                    ConcatPart::Literal(_) => None,
                })
                .collect(),
            DerivationOp::DateIso { source }
            | DerivationOp::CheckboxCategory { source, .. }
            | DerivationOp::NumericFlag { source, .. }
            | DerivationOp::SubjectId { source } => vec![source.as_str()],
            DerivationOp::SubjectMinDate { date_column }
            | DerivationOp::SubjectMaxDate { date_column } => vec![date_column.as_str()],
        }
    }
}

enum Arg {
    Literal(String),
    Column(String),
}

/// Split a comma-separated argument list, honoring double quotes.
fn split_args(body: &str) -> Vec<Arg> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for ch in body.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => {
                push_arg(&mut args, &current);
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    push_arg(&mut args, &current);
    args
}

fn push_arg(args: &mut Vec<Arg>, raw: &str) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        args.push(Arg::Literal(trimmed[1..trimmed.len() - 1].to_string()));
    } else {
        args.push(Arg::Column(trimmed.to_string()));
    }
}

fn single_column(name: &str, args: &[Arg], text: &str) -> Result<String, SpecError> {
    if args.len() != 1 {
        return Err(SpecError::malformed(
            text,
            format!("{name} takes exactly one column argument"),
        ));
    }
    column_at(args, 0, name, text)
}

fn column_at(args: &[Arg], index: usize, name: &str, text: &str) -> Result<String, SpecError> {
    match args.get(index) {
        Some(Arg::Column(column)) => Ok(column.clone()),
        Some(Arg::Literal(_)) => Err(SpecError::malformed(
            text,
            format!("{name} argument {index} must be a column reference"),
        )),
        None => Err(SpecError::malformed(
            text,
            format!("{name} is missing argument {index}"),
        )),
    }
}

fn literal_at(args: &[Arg], index: usize, name: &str, text: &str) -> Result<String, SpecError> {
    match args.get(index) {
        Some(Arg::Literal(value)) => Ok(value.clone()),
        Some(Arg::Column(_)) => Err(SpecError::malformed(
            text,
            format!("{name} argument {index} must be a quoted literal"),
        )),
        None => Err(SpecError::malformed(
            text,
            format!("{name} is missing argument {index}"),
        )),
    }
}
