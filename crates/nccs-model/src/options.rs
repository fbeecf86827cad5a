//! Run configuration for a core file build.
//!
//! Every struct here is `#[serde(default)]`, so a partial TOML file only needs
//! to name the settings it changes.

use serde::{Deserialize, Serialize};

use crate::error::{NccsError, Result};
use crate::form::{ReleaseForm, SourceForm};

/// Deepest prior release the backfill stage may reach into.
pub const MAX_BACKFILL_DEPTH: u8 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Current release vintage (the IRS file year minus one).
    pub release_year: i32,
    /// Source forms to ingest. EZ requires Full.
    pub forms: Vec<SourceForm>,
    /// How many prior releases to backfill missing EINs from (0..=3).
    pub backfill_depth: u8,
    /// Per release form validation switch.
    pub validate: ValidationToggles,
    /// Let a form with residual failures pass once fixes were integrated for it.
    pub partial_validation: bool,
    /// Absolute slack before an identity residual counts as a failure.
    pub tolerance: f64,
    /// Also publish the 990-only CO/PC subsets.
    pub output_full: bool,
    /// Seed for the RANDNUM column and the final dedup tie-break.
    pub random_seed: Option<u64>,
    pub extract: ExtractOptions,
    pub sources: SourceFiles,
    pub reference: ReferenceTables,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            release_year: 2015,
            forms: SourceForm::ALL.to_vec(),
            backfill_depth: MAX_BACKFILL_DEPTH,
            validate: ValidationToggles::default(),
            partial_validation: true,
            tolerance: 1000.0,
            output_full: true,
            random_seed: None,
            extract: ExtractOptions::default(),
            sources: SourceFiles::default(),
            reference: ReferenceTables::default(),
        }
    }
}

impl PipelineOptions {
    pub fn new(release_year: i32) -> Self {
        Self {
            release_year,
            ..Self::default()
        }
    }

    pub fn with_forms(mut self, forms: &[SourceForm]) -> Self {
        self.forms = forms.to_vec();
        self
    }

    pub fn with_backfill_depth(mut self, depth: u8) -> Self {
        self.backfill_depth = depth;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn includes(&self, form: SourceForm) -> bool {
        self.forms.contains(&form)
    }

    /// Prior release years in backfill order (`release_year - 1` first).
    pub fn backfill_years(&self) -> Vec<i32> {
        (1..=i32::from(self.backfill_depth))
            .map(|k| self.release_year - k)
            .collect()
    }

    /// Rejects combinations the build cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.forms.is_empty() {
            return Err(NccsError::Config("no source forms selected".to_string()));
        }
        if self.backfill_depth > MAX_BACKFILL_DEPTH {
            return Err(NccsError::Config(format!(
                "backfill depth {} exceeds the supported maximum of {MAX_BACKFILL_DEPTH}",
                self.backfill_depth
            )));
        }
        if self.includes(SourceForm::Ez) && !self.includes(SourceForm::Full) {
            return Err(NccsError::Config(
                "including IRS form 990EZ without form 990 cannot produce either the CO or PC file"
                    .to_string(),
            ));
        }
        if self.tolerance.is_nan() || self.tolerance < 0.0 {
            return Err(NccsError::Config(format!(
                "tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        if !(0.0..=1.0).contains(&self.extract.quantile) {
            return Err(NccsError::Config(format!(
                "extract quantile must lie in [0, 1], got {}",
                self.extract.quantile
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationToggles {
    pub co: bool,
    pub pc: bool,
    pub pf: bool,
}

impl Default for ValidationToggles {
    fn default() -> Self {
        Self {
            co: true,
            pc: true,
            pf: true,
        }
    }
}

impl ValidationToggles {
    pub fn enabled(&self, form: ReleaseForm) -> bool {
        match form {
            ReleaseForm::Co => self.co,
            ReleaseForm::Pc => self.pc,
            ReleaseForm::Pf => self.pf,
            ReleaseForm::CoFull | ReleaseForm::PcFull => false,
        }
    }

    pub fn any(&self) -> bool {
        self.co || self.pc || self.pf
    }
}

/// Thresholds of the large-firm / large-change review extract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    pub quantile: f64,
    pub change_fraction: f64,
    pub revenue_floor: f64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            quantile: 0.999,
            change_fraction: 0.5,
            revenue_floor: 10_000_000.0,
        }
    }
}

/// Pre-downloaded raw extract names under `downloads/IRS`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceFiles {
    pub ez: Option<String>,
    pub full: Option<String>,
    pub pf: Option<String>,
    /// Field separator of the IRS extracts.
    pub delimiter: Option<char>,
    /// Pipe-delimited e-Postcard (990-N) file; skipped when absent.
    pub epostcard: Option<String>,
    /// Comma-delimited BMF files; skipped when empty.
    pub bmf: Vec<String>,
}

impl SourceFiles {
    /// Configured file name, or the IRS naming convention for the release year.
    pub fn file_for(&self, form: SourceForm, release_year: i32) -> String {
        let configured = match form {
            SourceForm::Ez => self.ez.as_ref(),
            SourceForm::Full => self.full.as_ref(),
            SourceForm::Pf => self.pf.as_ref(),
        };
        if let Some(name) = configured {
            return name.clone();
        }
        let irs_year = (release_year + 1).rem_euclid(100);
        let suffix = match form {
            SourceForm::Ez => "EZ",
            SourceForm::Full => "990",
            SourceForm::Pf => "990PF",
        };
        format!("{irs_year:02}eofinextract{suffix}.dat")
    }

    pub fn separator(&self) -> u8 {
        self.delimiter
            .and_then(|c| u8::try_from(c).ok())
            .unwrap_or(b' ')
    }
}

/// Names of the NCCS reference tables merged into every source form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceTables {
    pub ntee: Option<String>,
    pub fipsmsa: Option<String>,
}

impl Default for ReferenceTables {
    fn default() -> Self {
        Self {
            ntee: Some("nteedocAllEins".to_string()),
            fipsmsa: Some("lu_fipsmsa".to_string()),
        }
    }
}
