//! CSV files in the validation and output folders.
//!
//! Failure exports, fix batches and release files are all plain `.csv` files
//! in a single folder; nothing is nested.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{IngestError, Result};

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

/// CSV files directly inside `dir`, sorted by file name.
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(IngestError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }
    let read_error = |source| IngestError::DirectoryRead {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = fs::read_dir(dir)
        .map_err(read_error)?
        .map(|entry| entry.map(|entry| entry.path()).map_err(read_error))
        .filter(|path| path.as_ref().map_or(true, |path| path.is_file() && is_csv(path)))
        .collect::<Result<Vec<_>>>()?;
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Removes last run's CSV files from `dir` and returns how many went.
///
/// A folder that does not exist yet has nothing to clear.
pub fn clear_csv_files(dir: &Path) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let files = list_csv_files(dir)?;
    for file in &files {
        fs::remove_file(file).map_err(|e| IngestError::file_access(file, e))?;
    }
    if !files.is_empty() {
        info!(dir = %dir.display(), removed = files.len(), "cleared previous CSV files");
    }
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn failures_folder() -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in ["pf_2015_validate.csv", "co_2015_validate.CSV", "notes.txt"] {
            fs::write(dir.path().join(name), "EIN\n1\n").unwrap();
        }
        fs::create_dir(dir.path().join("archive.csv")).unwrap();
        dir
    }

    #[test]
    fn lists_only_csv_files_by_name() {
        let dir = failures_folder();
        let names: Vec<String> = list_csv_files(dir.path())
            .unwrap()
            .iter()
            .filter_map(|path| path.file_name()?.to_str().map(str::to_string))
            .collect();
        assert_eq!(names, ["co_2015_validate.CSV", "pf_2015_validate.csv"]);
    }

    #[test]
    fn a_file_is_not_a_folder() {
        let dir = TempDir::new().unwrap();
        let file_path = dir.path().join("core2015pf.csv");
        fs::write(&file_path, "EIN").unwrap();
        assert!(list_csv_files(&file_path).is_err());
    }

    #[test]
    fn clearing_keeps_other_files() {
        let dir = failures_folder();
        assert_eq!(clear_csv_files(dir.path()).unwrap(), 2);
        assert!(dir.path().join("notes.txt").exists());
        assert_eq!(clear_csv_files(&dir.path().join("missing")).unwrap(), 0);
    }
}
