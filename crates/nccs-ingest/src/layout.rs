//! On-disk layout of a build workspace.

use std::path::{Path, PathBuf};

use nccs_model::{ReleaseForm, SourceForm};

use crate::error::{IngestError, Result};

/// Every path of a build, derived from one root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings_dir(&self) -> PathBuf {
        self.root.join("settings")
    }

    pub fn crosswalk(&self, form: SourceForm) -> PathBuf {
        self.settings_dir()
            .join("crosswalk")
            .join(format!("{}.txt", form.settings_stem()))
    }

    pub fn drop_list(&self, form: SourceForm) -> PathBuf {
        self.settings_dir()
            .join("drop if missing")
            .join(format!("{}.txt", form.settings_stem()))
    }

    pub fn allowlist(&self, form: ReleaseForm) -> PathBuf {
        self.settings_dir()
            .join("final variable lists")
            .join(format!("{}.txt", form.stem()))
    }

    pub fn irs_downloads(&self) -> PathBuf {
        self.root.join("downloads").join("IRS")
    }

    pub fn nccs_downloads(&self) -> PathBuf {
        self.root.join("downloads").join("NCCS")
    }

    pub fn validation_dir(&self) -> PathBuf {
        self.root.join("validation")
    }

    pub fn failures_dir(&self) -> PathBuf {
        self.validation_dir().join("failures")
    }

    pub fn fixes_dir(&self) -> PathBuf {
        self.validation_dir().join("fixes")
    }

    /// `validation/failures/<form>_<year>_validate.csv`
    pub fn failure_file(&self, form: ReleaseForm, year: i32) -> PathBuf {
        self.failures_dir()
            .join(validation_file_name(form, year))
    }

    /// `validation/fixes/<form>_<year>_validate.csv`
    pub fn fix_file(&self, form: ReleaseForm, year: i32) -> PathBuf {
        self.fixes_dir().join(validation_file_name(form, year))
    }

    pub fn run_report(&self) -> PathBuf {
        self.validation_dir().join("run_report.json")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("final output")
    }

    pub fn release_file(&self, form: ReleaseForm, year: i32) -> PathBuf {
        self.output_dir()
            .join(format!("{}.csv", form.release_name(year)))
    }

    /// Creates the download, validation and output folders.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [
            self.irs_downloads(),
            self.nccs_downloads(),
            self.failures_dir(),
            self.fixes_dir(),
            self.output_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| IngestError::FileAccess {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(())
    }
}

fn validation_file_name(form: ReleaseForm, year: i32) -> String {
    format!("{}_{year}_validate.csv", form.stem())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_workspace_convention() {
        let layout = WorkspaceLayout::new("/data/nccs");
        assert_eq!(
            layout.drop_list(SourceForm::Full),
            PathBuf::from("/data/nccs/settings/drop if missing/full.txt")
        );
        assert_eq!(
            layout.fix_file(ReleaseForm::Co, 2015),
            PathBuf::from("/data/nccs/validation/fixes/co_2015_validate.csv")
        );
        assert_eq!(
            layout.release_file(ReleaseForm::PcFull, 2015),
            PathBuf::from("/data/nccs/final output/core2015pc_full990.csv")
        );
    }
}
