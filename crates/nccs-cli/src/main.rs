//! NCCS core file builder CLI.

use clap::{ColorChoice, Parser};
use nccs_cli::logging::{LogConfig, LogFormat, init_logging};
use nccs_cli::summary::{print_review, print_summary};
use std::io::{self, IsTerminal};
use tracing::level_filters::LevelFilter;

mod cli;
mod commands;

use crate::cli::{Cli, Command, LogFormatArg, LogLevelArg};

/// Release files written, or nothing to write.
const EXIT_OK: i32 = 0;
const EXIT_ERROR: i32 = 1;
/// Validation halted the release; failure exports await review.
const EXIT_HALTED: i32 = 2;

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(EXIT_ERROR);
    }
    let outcome = match &cli.command {
        Command::Build(args) => commands::run(args).map(|result| {
            print_summary(&result);
            if result.written() { EXIT_OK } else { EXIT_HALTED }
        }),
        Command::Review(args) => commands::review(args).map(|result| {
            print_review(&result);
            EXIT_OK
        }),
    };
    let exit_code = outcome.unwrap_or_else(|error| {
        tracing::error!("{error:#}");
        eprintln!("error: {error:#}");
        EXIT_ERROR
    });
    std::process::exit(exit_code);
}

/// Logging for one run: `--log-level` pins the level, otherwise `-v`/`-q`
/// set it and `RUST_LOG` may replace it.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let mut config = LogConfig::new(cli.verbosity.tracing_level_filter());
    if cli.verbosity.is_present() {
        config.use_env_filter = false;
    }
    if let Some(level) = cli.log_level {
        config = config.with_explicit_level(match level {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        });
    }
    let format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    let ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    config
        .with_format(format)
        .with_ansi(ansi)
        .with_log_file(cli.log_file.clone())
}
