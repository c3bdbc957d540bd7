//! Human-readable run summary.

use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Cell, Table};

use crate::pipeline::StudyRunResult;

/// Print the per-table summary and the fix-loop footer.
pub fn print_summary(result: &StudyRunResult) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Table", "Rows", "Errors", "Warnings"]);
    for entry in &result.tables {
        table.add_row(vec![
            Cell::new(&entry.table),
            Cell::new(entry.rows),
            Cell::new(entry.errors),
            Cell::new(entry.warnings),
        ]);
    }
    println!("{table}");

    println!(
        "study {}: {} table(s), fix loop {} after {} iteration(s), {} finding(s) fixed, {} for human review",
        result.study_id,
        result.tables.len(),
        if result.converged {
            "converged"
        } else {
            "stopped"
        },
        result.iterations_run,
        result.total_fixed,
        result.needs_human,
    );
    if let Some(path) = &result.report_path {
        println!("validation report: {}", path.display());
    }
}
