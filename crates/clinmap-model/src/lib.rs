pub mod config;
pub mod error;
pub mod finding;
pub mod fix;
pub mod lookup;
pub mod spec;
pub mod vocabulary;

pub use config::StudyConfig;
pub use error::{ExecutionError, SpecError};
pub use finding::{Finding, Severity};
pub use fix::{FixAction, FixClassification, FixKind};
pub use lookup::CaseInsensitiveSet;
pub use spec::{
    ConcatPart, DerivationOp, MappingSpec, MeasureColumn, PatternTag, TransposeSpec, VariableRule,
};
pub use vocabulary::{VocabRegistry, Vocabulary};
