use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// One controlled vocabulary: a value list plus synonym mappings.
///
/// Membership tests are case-insensitive. Closed vocabularies reject values
/// outside the list; extensible vocabularies tolerate them at warning level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vocabulary {
    /// Vocabulary code (e.g., "C66731").
    pub code: String,
    /// Vocabulary name (e.g., "Sex").
    pub name: String,
    /// Whether sponsor extensions are allowed.
    pub extensible: bool,
    /// Accepted submission values.
    pub values: BTreeSet<String>,
    /// Uppercased raw value -> accepted submission value.
    #[serde(default)]
    pub synonyms: BTreeMap<String, String>,
}

impl Vocabulary {
    pub fn new(code: impl Into<String>, name: impl Into<String>, extensible: bool) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            extensible,
            values: BTreeSet::new(),
            synonyms: BTreeMap::new(),
        }
    }

    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn with_synonym(mut self, raw: impl Into<String>, accepted: impl Into<String>) -> Self {
        self.synonyms
            .insert(raw.into().to_ascii_uppercase(), accepted.into());
        self
    }

    /// Case-insensitive membership test.
    pub fn contains(&self, value: &str) -> bool {
        let key = value.trim().to_ascii_uppercase();
        self.values
            .iter()
            .any(|accepted| accepted.to_ascii_uppercase() == key)
    }

    /// Map a raw value to its accepted form via the synonym table or
    /// case-insensitive match. Returns `None` when the value has no mapping.
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let key = trimmed.to_ascii_uppercase();
        if let Some(accepted) = self.synonyms.get(&key) {
            return Some(accepted.clone());
        }
        self.values
            .iter()
            .find(|accepted| accepted.to_ascii_uppercase() == key)
            .cloned()
    }
}

/// Vocabulary registry keyed by output variable name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VocabRegistry {
    by_variable: BTreeMap<String, Vocabulary>,
}

impl VocabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, variable: impl Into<String>, vocabulary: Vocabulary) {
        self.by_variable
            .insert(variable.into().to_ascii_uppercase(), vocabulary);
    }

    pub fn with(mut self, variable: impl Into<String>, vocabulary: Vocabulary) -> Self {
        self.register(variable, vocabulary);
        self
    }

    /// Resolve the vocabulary governing a variable, if any.
    pub fn resolve(&self, variable: &str) -> Option<&Vocabulary> {
        self.by_variable.get(&variable.to_ascii_uppercase())
    }
}
