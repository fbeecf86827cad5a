//! Form tags for the two axes of the build.
//!
//! Raw IRS extracts arrive per [`SourceForm`] (990-EZ, 990, 990-PF). Releases are
//! published per [`ReleaseForm`] (CO, PC, PF and the optional 990-only subsets).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::NccsError;

/// IRS source form of a raw extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceForm {
    #[serde(rename = "EZ")]
    Ez,
    #[serde(rename = "Full")]
    Full,
    #[serde(rename = "PF")]
    Pf,
}

impl SourceForm {
    pub const ALL: [SourceForm; 3] = [SourceForm::Ez, SourceForm::Full, SourceForm::Pf];

    pub fn code(self) -> &'static str {
        match self {
            SourceForm::Ez => "EZ",
            SourceForm::Full => "Full",
            SourceForm::Pf => "PF",
        }
    }

    /// Lower-case stem used for settings files (`settings/crosswalk/ez.txt`).
    pub fn settings_stem(self) -> &'static str {
        match self {
            SourceForm::Ez => "ez",
            SourceForm::Full => "full",
            SourceForm::Pf => "pf",
        }
    }

    /// Whether a `SOURCE` file name belongs to this form's sub-population.
    ///
    /// The stem is the text before the first `.`; EZ extracts end in `EZ`/`ez`,
    /// full 990 extracts end in `990`. PF tables are not split.
    pub fn matches_source(self, source: &str) -> bool {
        let stem = source.split('.').next().unwrap_or_default();
        match self {
            SourceForm::Ez => stem.ends_with("EZ") || stem.ends_with("ez"),
            SourceForm::Full => stem.ends_with("990"),
            SourceForm::Pf => true,
        }
    }
}

impl fmt::Display for SourceForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for SourceForm {
    type Err = NccsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "EZ" => Ok(SourceForm::Ez),
            "FULL" | "990" => Ok(SourceForm::Full),
            "PF" => Ok(SourceForm::Pf),
            other => Err(NccsError::Config(format!("unknown source form '{other}'"))),
        }
    }
}

/// Release form of a published core file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReleaseForm {
    #[serde(rename = "CO")]
    Co,
    #[serde(rename = "PC")]
    Pc,
    #[serde(rename = "PF")]
    Pf,
    #[serde(rename = "CO_full")]
    CoFull,
    #[serde(rename = "PC_full")]
    PcFull,
}

impl ReleaseForm {
    /// Forms that are validated and deduplicated directly.
    pub const PRIMARY: [ReleaseForm; 3] = [ReleaseForm::Co, ReleaseForm::Pc, ReleaseForm::Pf];

    pub fn code(self) -> &'static str {
        match self {
            ReleaseForm::Co => "CO",
            ReleaseForm::Pc => "PC",
            ReleaseForm::Pf => "PF",
            ReleaseForm::CoFull => "CO_full",
            ReleaseForm::PcFull => "PC_full",
        }
    }

    /// Lower-case stem for settings lists and validation files (`co`, `co_full`).
    pub fn stem(self) -> String {
        self.code().to_lowercase()
    }

    /// Name of the published release file for `year`, without extension.
    pub fn release_name(self, year: i32) -> String {
        match self {
            ReleaseForm::CoFull | ReleaseForm::PcFull => format!("core{year}{}990", self.stem()),
            _ => format!("core{year}{}", self.stem()),
        }
    }

    /// The primary form a 990-only subset is cut from.
    pub fn base(self) -> ReleaseForm {
        match self {
            ReleaseForm::CoFull => ReleaseForm::Co,
            ReleaseForm::PcFull => ReleaseForm::Pc,
            other => other,
        }
    }

    /// Prior releases of CO live in their own database.
    pub fn database(self) -> &'static str {
        match self.base() {
            ReleaseForm::Co => "coreco",
            _ => "nccs",
        }
    }

    /// Charity forms carry prior-year columns and the fiscal-year adjacency rule.
    pub fn is_charity(self) -> bool {
        !matches!(self, ReleaseForm::Pf)
    }
}

impl fmt::Display for ReleaseForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ReleaseForm {
    type Err = NccsError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "CO" => Ok(ReleaseForm::Co),
            "PC" => Ok(ReleaseForm::Pc),
            "PF" => Ok(ReleaseForm::Pf),
            "CO_FULL" => Ok(ReleaseForm::CoFull),
            "PC_FULL" => Ok(ReleaseForm::PcFull),
            other => Err(NccsError::Config(format!("unknown release form '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_names_follow_published_convention() {
        assert_eq!(ReleaseForm::Co.release_name(2015), "core2015co");
        assert_eq!(ReleaseForm::PcFull.release_name(2015), "core2015pc_full990");
        assert_eq!(ReleaseForm::CoFull.stem(), "co_full");
    }

    #[test]
    fn source_stems_select_sub_populations() {
        assert!(SourceForm::Ez.matches_source("15eofinextractEZ.dat"));
        assert!(SourceForm::Ez.matches_source("16eofinextractez.dat"));
        assert!(!SourceForm::Ez.matches_source("15eofinextract990.dat"));
        assert!(SourceForm::Full.matches_source("15eofinextract990.dat"));
        assert!(!SourceForm::Full.matches_source("core2014pc"));
    }

    #[test]
    fn parses_codes_case_insensitively() {
        assert_eq!("full".parse::<SourceForm>().unwrap(), SourceForm::Full);
        assert_eq!("co_full".parse::<ReleaseForm>().unwrap(), ReleaseForm::CoFull);
        assert!("XX".parse::<ReleaseForm>().is_err());
    }
}
