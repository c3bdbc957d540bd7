//! Subcommand entry points: argument defaulting and delegation into the
//! pipeline.

use anyhow::Result;

use crate::cli::{CheckArgs, RunArgs};
use crate::pipeline::{StudyRunResult, check_study, run_study};

fn default_study_id(folder: &std::path::Path) -> String {
    folder
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "STUDY".to_string())
}

pub fn run(args: &RunArgs) -> Result<StudyRunResult> {
    let specs_dir = args
        .specs_dir
        .clone()
        .unwrap_or_else(|| args.study_folder.join("specs"));
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| args.study_folder.join("output"));
    let study_id = args
        .study_id
        .clone()
        .unwrap_or_else(|| default_study_id(&args.study_folder));
    run_study(
        &args.study_folder,
        &specs_dir,
        &output_dir,
        &study_id,
        args.max_iterations,
        args.dry_run,
    )
}

pub fn check(args: &CheckArgs) -> Result<StudyRunResult> {
    let specs_dir = args
        .specs_dir
        .clone()
        .unwrap_or_else(|| args.tables_folder.join("specs"));
    let study_id = args
        .study_id
        .clone()
        .unwrap_or_else(|| default_study_id(&args.tables_folder));
    check_study(&args.tables_folder, &specs_dir, &study_id)
}
