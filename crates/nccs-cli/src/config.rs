//! Run configuration: a TOML file, then command-line overrides.
//!
//! The file maps directly onto [`PipelineOptions`]; every table is optional.
//!
//! ```toml
//! release_year = 2016
//! forms = ["EZ", "Full"]
//! backfill_depth = 2
//!
//! [validate]
//! pf = false
//!
//! [sources]
//! bmf = ["eo1.csv", "eo2.csv"]
//!
//! [reference]
//! fipsmsa = ""
//! ```
//!
//! An empty reference table name switches that merge off.

use std::path::Path;

use anyhow::{Context, Result, bail};
use nccs_model::{PipelineOptions, ReleaseForm, ReviewCategory, SourceForm};

/// Field overrides collected from the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOverrides {
    pub release_year: Option<i32>,
    pub forms: Vec<String>,
    pub backfill_depth: Option<u8>,
    pub tolerance: Option<f64>,
    pub seed: Option<u64>,
    pub no_partial_validation: bool,
    pub no_full_forms: bool,
    pub skip_validation: Vec<String>,
}

/// Reads a run configuration file.
pub fn load_options(path: &Path) -> Result<PipelineOptions> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    parse_options(&text).with_context(|| format!("parse config {}", path.display()))
}

pub fn parse_options(text: &str) -> Result<PipelineOptions> {
    Ok(toml::from_str(text)?)
}

/// Applies `overrides` on top of `options` and checks the result.
pub fn resolve_options(
    mut options: PipelineOptions,
    overrides: &RunOverrides,
) -> Result<PipelineOptions> {
    if let Some(year) = overrides.release_year {
        options.release_year = year;
    }
    if !overrides.forms.is_empty() {
        options.forms = overrides
            .forms
            .iter()
            .map(|form| form.parse::<SourceForm>())
            .collect::<nccs_model::Result<_>>()?;
    }
    if let Some(depth) = overrides.backfill_depth {
        options.backfill_depth = depth;
    }
    if let Some(tolerance) = overrides.tolerance {
        options.tolerance = tolerance;
    }
    if let Some(seed) = overrides.seed {
        options.random_seed = Some(seed);
    }
    if overrides.no_partial_validation {
        options.partial_validation = false;
    }
    if overrides.no_full_forms {
        options.output_full = false;
    }
    for form in &overrides.skip_validation {
        match form.parse::<ReleaseForm>()? {
            ReleaseForm::Co => options.validate.co = false,
            ReleaseForm::Pc => options.validate.pc = false,
            ReleaseForm::Pf => options.validate.pf = false,
            other => bail!("{other} is never validated on its own"),
        }
    }
    for name in [&mut options.reference.ntee, &mut options.reference.fipsmsa] {
        if name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            *name = None;
        }
    }
    options.validate()?;
    Ok(options)
}

/// Loads the configured file (or defaults) and applies the overrides.
pub fn build_options(config: Option<&Path>, overrides: &RunOverrides) -> Result<PipelineOptions> {
    let base = match config {
        Some(path) => load_options(path)?,
        None => PipelineOptions::default(),
    };
    resolve_options(base, overrides).context("resolve run configuration")
}

/// Parses review category letters (`L`, `C`, `F`), case-insensitive.
pub fn parse_categories(letters: &[String]) -> Result<Vec<ReviewCategory>> {
    if letters.is_empty() {
        return Ok(ReviewCategory::ORDER.to_vec());
    }
    let mut categories = Vec::new();
    for letter in letters {
        let found = ReviewCategory::ORDER
            .into_iter()
            .find(|category| letter.trim().eq_ignore_ascii_case(&category.letter().to_string()));
        match found {
            Some(category) if !categories.contains(&category) => categories.push(category),
            Some(_) => {}
            None => bail!("unknown review category '{letter}' (expected L, C or F)"),
        }
    }
    Ok(categories)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_keep_defaults() {
        let options = parse_options("release_year = 2017\n[validate]\npf = false\n").unwrap();
        assert_eq!(options.release_year, 2017);
        assert!(!options.validate.pf);
        assert!(options.validate.co);
        assert_eq!(options.backfill_depth, 3);
        assert_eq!(options.tolerance, 1000.0);
    }

    #[test]
    fn categories_default_to_all() {
        assert_eq!(parse_categories(&[]).unwrap(), ReviewCategory::ORDER.to_vec());
        assert_eq!(
            parse_categories(&["f".to_string(), "F".to_string()]).unwrap(),
            vec![ReviewCategory::Failed]
        );
        assert!(parse_categories(&["X".to_string()]).is_err());
    }
}
