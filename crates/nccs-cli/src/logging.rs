//! Subscriber setup for the `nccs` binary.
//!
//! Library crates only emit `tracing` events; this module decides where they
//! go. Stage spans (`build`, `stage`) carry `release_year` and the stage name,
//! so every event of a run can be traced back to the stage that produced it.
//!
//! # Log Levels
//!
//! - `error`: fatal build errors
//! - `warn`: uncrosswalked columns, identity failures, blocked releases
//! - `info`: stage progress, drop and merge counts, stage durations
//! - `debug`: per-file detail
//! - `trace`: rule-by-rule detail
//!
//! `RUST_LOG` replaces the default directives unless a level was given on the
//! command line.

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Crates whose events the default filter lets through at the chosen level.
const NCCS_CRATES: [&str; 6] = [
    "nccs",
    "nccs_cli",
    "nccs_core",
    "nccs_ingest",
    "nccs_model",
    "nccs_validate",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-field human output.
    #[default]
    Pretty,
    /// One line per event.
    Compact,
    /// Newline-delimited JSON, one object per event.
    Json,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level_filter: LevelFilter,
    /// Let `RUST_LOG` replace the default directives when present.
    pub use_env_filter: bool,
    pub with_timestamps: bool,
    pub with_target: bool,
    /// Report each stage span when it closes, with its busy time.
    pub with_spans: bool,
    pub with_ansi: bool,
    pub format: LogFormat,
    /// Append to this file instead of writing to stderr.
    pub log_file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new(LevelFilter::WARN)
    }
}

impl LogConfig {
    pub fn new(level_filter: LevelFilter) -> Self {
        Self {
            level_filter,
            use_env_filter: true,
            with_timestamps: false,
            with_target: false,
            with_spans: false,
            with_ansi: true,
            format: LogFormat::default(),
            log_file: None,
        }
    }

    /// Pins the level: `RUST_LOG` is ignored from here on.
    #[must_use]
    pub fn with_explicit_level(mut self, level: LevelFilter) -> Self {
        self.level_filter = level;
        self.use_env_filter = false;
        self
    }

    /// JSON output keeps timestamps and stage span timings, for run archives.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        if format == LogFormat::Json {
            self.with_timestamps = true;
            self.with_spans = true;
        }
        self
    }

    #[must_use]
    pub fn with_ansi(mut self, enable: bool) -> Self {
        self.with_ansi = enable;
        self
    }

    #[must_use]
    pub fn with_log_file(mut self, path: Option<PathBuf>) -> Self {
        self.log_file = path;
        self
    }

    fn span_events(&self) -> FmtSpan {
        if self.with_spans {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Installs the global subscriber. Call once, before the first build stage.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened.
pub fn init_logging(config: &LogConfig) -> io::Result<()> {
    match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let ansi_off = LogConfig {
                with_ansi: false,
                ..config.clone()
            };
            install(&ansi_off, Mutex::new(file));
        }
        None => install(config, io::stderr),
    }
    Ok(())
}

fn install<W>(config: &LogConfig, writer: W)
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(format_layer(config, writer))
        .with(build_env_filter(config))
        .init();
}

fn format_layer<W>(config: &LogConfig, writer: W) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let base = fmt::layer()
        .with_writer(writer)
        .with_target(config.with_target)
        .with_span_events(config.span_events());
    match (config.format, config.with_timestamps) {
        (LogFormat::Json, _) => base.json().boxed(),
        (LogFormat::Compact, true) => base.compact().with_ansi(config.with_ansi).boxed(),
        (LogFormat::Compact, false) => base
            .compact()
            .without_time()
            .with_ansi(config.with_ansi)
            .boxed(),
        (LogFormat::Pretty, true) => base.with_ansi(config.with_ansi).boxed(),
        (LogFormat::Pretty, false) => base.without_time().with_ansi(config.with_ansi).boxed(),
    }
}

/// Default directives: the build crates at `level`, dependencies no louder than warn.
pub fn default_directives(level: LevelFilter) -> String {
    let base = level.min(LevelFilter::WARN).to_string().to_lowercase();
    let level = level.to_string().to_lowercase();
    let mut directives = vec![base];
    directives.extend(NCCS_CRATES.iter().map(|name| format!("{name}={level}")));
    directives.join(",")
}

fn build_env_filter(config: &LogConfig) -> EnvFilter {
    let fallback = || EnvFilter::new(default_directives(config.level_filter));
    if config.use_env_filter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback())
    } else {
        fallback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_cover_every_build_crate() {
        insta::assert_snapshot!(
            default_directives(LevelFilter::INFO),
            @"warn,nccs=info,nccs_cli=info,nccs_core=info,nccs_ingest=info,nccs_model=info,nccs_validate=info"
        );
    }

    #[test]
    fn quiet_levels_apply_to_dependencies_too() {
        assert!(default_directives(LevelFilter::OFF).starts_with("off,"));
        assert!(default_directives(LevelFilter::ERROR).starts_with("error,"));
    }

    #[test]
    fn json_runs_keep_timings_and_explicit_levels_ignore_env() {
        let config = LogConfig::default()
            .with_format(LogFormat::Json)
            .with_explicit_level(LevelFilter::DEBUG);
        assert!(config.with_timestamps);
        assert_eq!(config.span_events(), FmtSpan::CLOSE);
        assert!(!config.use_env_filter);
        assert_eq!(LogConfig::default().span_events(), FmtSpan::NONE);
    }
}
