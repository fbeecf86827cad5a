//! CLI argument definitions for the `nccs` core file builder.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "nccs",
    version,
    about = "NCCS core file builder - turn IRS extracts into validated release files",
    long_about = "Build the NCCS core files (CO, PC, PF) from the IRS Statistics of Income extracts.\n\n\
                  Cleans, enriches, backfills and deduplicates every form, then validates the\n\
                  accounting identities. Failing rows are exported for review and the release\n\
                  is only written once validation allows it."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

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
}

#[derive(Subcommand)]
pub enum Command {
    /// Build the release files for one year.
    Build(BuildArgs),

    /// List exported rows that still need a reviewer.
    Review(ReviewArgs),
}

/// Options shared by every subcommand that reads the build workspace.
#[derive(Args, Clone)]
pub struct WorkspaceArgs {
    /// Build workspace holding `settings/`, `downloads/`, `validation/` and `final output/`.
    #[arg(long = "root", value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// TOML run configuration. Flags below override its fields.
    #[arg(long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Release year (the IRS file year minus one).
    #[arg(long = "year", value_name = "YEAR")]
    pub release_year: Option<i32>,
}

#[derive(Args, Clone)]
pub struct BuildArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    /// Source forms to ingest (EZ, Full, PF). Repeat or separate with commas.
    #[arg(long = "form", value_name = "FORM", value_delimiter = ',')]
    pub forms: Vec<String>,

    /// Number of prior releases to backfill missing organizations from (0-3).
    #[arg(long = "backfill-depth", value_name = "N")]
    pub backfill_depth: Option<u8>,

    /// Absolute slack before an identity residual counts as a failure.
    #[arg(long = "tolerance", value_name = "AMOUNT")]
    pub tolerance: Option<f64>,

    /// Seed for RANDNUM and the final deduplication tie-break.
    #[arg(long = "seed", value_name = "SEED")]
    pub seed: Option<u64>,

    /// Block the release on any remaining failure, even after fixes were integrated.
    #[arg(long = "no-partial-validation")]
    pub no_partial_validation: bool,

    /// Skip the 990-only CO/PC subsets.
    #[arg(long = "no-full-forms")]
    pub no_full_forms: bool,

    /// Release forms to leave unvalidated (CO, PC, PF).
    #[arg(long = "skip-validation", value_name = "FORM", value_delimiter = ',')]
    pub skip_validation: Vec<String>,
}

#[derive(Args, Clone)]
pub struct ReviewArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    /// Release form whose failure export to read (CO, PC, PF).
    #[arg(value_name = "FORM")]
    pub form: String,

    /// Residual magnitude at which a row always needs review.
    #[arg(long = "threshold", value_name = "AMOUNT", default_value_t = 1000.0)]
    pub threshold: f64,

    /// Review categories to include (L, C, F). Defaults to all.
    #[arg(long = "category", value_name = "LETTER", value_delimiter = ',')]
    pub categories: Vec<String>,

    /// Maximum number of rows to print.
    #[arg(long = "limit", value_name = "N", default_value_t = 50)]
    pub limit: usize,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
