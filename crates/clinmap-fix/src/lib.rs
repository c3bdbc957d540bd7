pub mod apply;
pub mod classify;
pub mod controller;

pub use apply::{FixOutcome, StandardFixer, TableFixer, apply_one};
pub use classify::{classify, classify_all};
pub use controller::{DEFAULT_MAX_ITERATIONS, FixLoopController, FixLoopOutcome};
