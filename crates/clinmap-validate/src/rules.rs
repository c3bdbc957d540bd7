//! Stable rule identifiers.
//!
//! The fix loop classifies findings by these ids; changing one is a breaking
//! change for persisted reports.

/// Date-like column contains non-ISO 8601 values.
pub const FMT_ISO8601: &str = "FMT_ISO8601";
/// Value outside its controlled vocabulary.
pub const VOCAB_MEMBER: &str = "VOCAB_MEMBER";
/// Value exceeds the declared maximum length.
pub const LEN_LIMIT: &str = "LEN_LIMIT";
/// Subject identifier missing from the canonical subject table.
pub const REF_SUBJECT: &str = "REF_SUBJECT";
/// Canonical subject table absent; referential checks cannot evaluate.
pub const REF_NO_SUBJECT_TABLE: &str = "REF_NO_SUBJECT_TABLE";
/// Study identifier is not globally unique across tables.
pub const KEY_STUDYID: &str = "KEY_STUDYID";
/// Table-type column carries a foreign code.
pub const TBL_TYPE: &str = "TBL_TYPE";
/// Reference start date disagrees with the earliest treatment start.
pub const TEMPORAL_REFSTART: &str = "TEMPORAL_REFSTART";
/// Day-offset sign disagrees with its companion date.
pub const SIGN_DAYOFFSET: &str = "SIGN_DAYOFFSET";
