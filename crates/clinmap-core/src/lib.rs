pub mod datetime;
pub mod derive;
pub mod executor;
pub mod frame;
pub mod patterns;
pub mod transpose;

pub use datetime::{
    PartialDate, calculate_study_day, is_iso8601, normalize_date, parse_date, parse_partial_date,
};
pub use derive::{ColumnResolver, evaluate, prefix_subject_id};
pub use executor::{Executor, reference_starts_from, table_column};
pub use frame::{CrossTableContext, EpochWindow, OutputTable, RawTable, VisitInfo};
pub use patterns::{
    BuiltColumns, ColumnValues, HandlerInput, HandlerRegistry, PatternHandler, merged_column,
};
pub use transpose::transpose_wide;
