//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "clinmap",
    version,
    about = "Map raw clinical tables to standardized outputs and auto-repair findings",
    long_about = "Convert raw tabular clinical datasets into standardized output tables\n\
                  driven by declarative per-table mapping specs, then validate and\n\
                  repair the outputs through a bounded fix loop."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for debug, -vv for trace, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Allow row-level data values in logs (off by default for PHI safety).
    #[arg(long = "log-data", global = true)]
    pub log_data: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Execute the mapping specs, run the fix loop, and write outputs.
    Run(RunArgs),

    /// Validate already-standardized tables without fixing or writing.
    Check(CheckArgs),
}

#[derive(Parser)]
pub struct RunArgs {
    /// Folder containing the raw CSV tables.
    #[arg(value_name = "STUDY_FOLDER")]
    pub study_folder: PathBuf,

    /// Folder containing per-table mapping specs (default: <STUDY_FOLDER>/specs).
    #[arg(long = "specs", value_name = "DIR")]
    pub specs_dir: Option<PathBuf>,

    /// Output directory for generated files (default: <STUDY_FOLDER>/output).
    #[arg(long = "output-dir", value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Study identifier (default: the study folder name).
    #[arg(long = "study-id", value_name = "ID")]
    pub study_id: Option<String>,

    /// Repair-round bound for the fix loop.
    #[arg(long = "max-iterations", default_value_t = 3)]
    pub max_iterations: u32,

    /// Validate and report without writing output files.
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

#[derive(Parser)]
pub struct CheckArgs {
    /// Folder containing standardized CSV tables.
    #[arg(value_name = "TABLES_FOLDER")]
    pub tables_folder: PathBuf,

    /// Folder containing per-table mapping specs (default: <TABLES_FOLDER>/specs).
    #[arg(long = "specs", value_name = "DIR")]
    pub specs_dir: Option<PathBuf>,

    /// Study identifier (default: the tables folder name).
    #[arg(long = "study-id", value_name = "ID")]
    pub study_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
