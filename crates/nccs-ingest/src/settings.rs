//! Plain-text settings lists under `settings/`.
//!
//! - `crosswalk/<form>.txt`: a header line, then `nccs,irs` pairs
//! - `drop if missing/<form>.txt`: an instruction line, then one column per line
//! - `final variable lists/<form>.txt`: one column per line, in output order

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{IngestError, Result};

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).map_err(|e| IngestError::file_access(path, e))?;
    Ok(text
        .lines()
        .map(|line| line.strip_prefix('\u{feff}').unwrap_or(line).to_string())
        .collect())
}

/// One `nccs,irs` line of a crosswalk file.
#[derive(Debug, Deserialize)]
struct CrosswalkRow {
    nccs: String,
    irs: String,
}

/// Mapping from upper-cased IRS column names to NCCS column names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Crosswalk {
    entries: BTreeMap<String, String>,
    path: Option<PathBuf>,
}

impl Crosswalk {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: AsRef<str>,
    {
        let mut crosswalk = Self::default();
        for (irs, nccs) in pairs {
            crosswalk.insert(irs.as_ref(), nccs.as_ref());
        }
        crosswalk
    }

    fn insert(&mut self, irs: &str, nccs: &str) {
        let irs = irs.trim().to_uppercase();
        // EIN is the record key and is never renamed.
        if irs == "EIN" {
            return;
        }
        self.entries.insert(irs, nccs.trim().to_string());
    }

    /// Loads a crosswalk file. The first line is a header and is skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| IngestError::file_access(path, e))?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);
        let mut crosswalk = Self {
            entries: BTreeMap::new(),
            path: Some(path.to_path_buf()),
        };
        for record in reader.records() {
            let record = record.map_err(|e| IngestError::CsvParse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            let row: CrosswalkRow = record.deserialize(None).map_err(|_| IngestError::SettingsFormat {
                path: path.to_path_buf(),
                line: record.position().map_or(0, |pos| pos.line() as usize),
                content: record.iter().collect::<Vec<_>>().join(","),
            })?;
            crosswalk.insert(&row.irs, &row.nccs);
        }
        tracing::debug!(path = %path.display(), entries = crosswalk.len(), "loaded crosswalk");
        Ok(crosswalk)
    }

    pub fn get(&self, irs: &str) -> Option<&str> {
        self.entries.get(&irs.to_uppercase()).map(String::as_str)
    }

    /// Maps a listed column through the crosswalk, or upper-cases it as-is.
    pub fn translate(&self, name: &str) -> String {
        let upper = name.trim().to_uppercase();
        self.entries.get(&upper).cloned().unwrap_or(upper)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(irs, nccs)| (irs.as_str(), nccs.as_str()))
    }

    /// NCCS names the crosswalk produces.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Reads a drop-if-missing list, translating every entry through `crosswalk`.
pub fn read_drop_list(path: &Path, crosswalk: &Crosswalk) -> Result<Vec<String>> {
    let lines = read_lines(path)?;
    Ok(lines
        .iter()
        .skip(1)
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .map(|line| crosswalk.translate(line))
        .collect())
}

/// Reads a final variable list in file order.
pub fn read_allowlist(path: &Path) -> Result<Vec<String>> {
    let lines = read_lines(path)?;
    Ok(lines
        .into_iter()
        .map(|line| line.trim_end_matches(['\r', '\n']).to_string())
        .filter(|line| !line.trim().is_empty())
        .collect())
}
