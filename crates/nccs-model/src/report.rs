use serde::{Deserialize, Serialize};

use crate::form::{ReleaseForm, SourceForm};

/// Per-form verdict of the validation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    /// No identity has a row beyond tolerance.
    Passed,
    /// Failures remain but partial validation and integrated fixes let them through.
    SoftPassed,
    /// Failures block the release and were exported for review.
    HardFailed,
    /// Validation is switched off for this form.
    Skipped,
}

impl ValidationOutcome {
    pub fn blocks_output(self) -> bool {
        matches!(self, ValidationOutcome::HardFailed)
    }

    pub fn label(self) -> &'static str {
        match self {
            ValidationOutcome::Passed => "passed",
            ValidationOutcome::SoftPassed => "soft-passed",
            ValidationOutcome::HardFailed => "FAILED",
            ValidationOutcome::Skipped => "skipped",
        }
    }
}

/// Result of one arithmetic identity over one release form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityResult {
    /// Residual column name, e.g. `validate_ez_totrev`.
    pub column: String,
    /// Equation as shown to reviewers.
    pub display: String,
    pub sub_form: SourceForm,
    /// Rows beyond tolerance, excluding ignored rows.
    pub failures: usize,
    /// Rows considered, excluding ignored rows.
    pub checked: usize,
}

impl IdentityResult {
    pub fn failed(&self) -> bool {
        self.failures > 0
    }

    /// Share of checked rows that fail, in percent, rounded to one decimal.
    pub fn failure_percent(&self) -> f64 {
        if self.checked == 0 {
            return 0.0;
        }
        let pct = 100.0 * self.failures as f64 / self.checked as f64;
        (pct * 10.0).round() / 10.0
    }
}

/// Validation summary for one release form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormValidationReport {
    pub form: ReleaseForm,
    pub outcome: ValidationOutcome,
    pub identities: Vec<IdentityResult>,
    /// Reintegrated fix rows with a nonzero validation state.
    pub fixes_applied: usize,
    /// Rows exported because an identity failed.
    pub failed_rows: usize,
    /// Rows exported by the largest-organization extract.
    pub largest_rows: usize,
    /// Rows exported by the large-change extract.
    pub changed_rows: usize,
}

impl FormValidationReport {
    pub fn new(form: ReleaseForm, outcome: ValidationOutcome) -> Self {
        Self {
            form,
            outcome,
            identities: Vec::new(),
            fixes_applied: 0,
            failed_rows: 0,
            largest_rows: 0,
            changed_rows: 0,
        }
    }

    pub fn failing_identities(&self) -> impl Iterator<Item = &IdentityResult> {
        self.identities.iter().filter(|identity| identity.failed())
    }

    pub fn extracted_rows(&self) -> usize {
        self.largest_rows + self.changed_rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_percent_rounds_to_one_decimal() {
        let identity = IdentityResult {
            column: "validate_ez_totrev".to_string(),
            display: "TOTREV - (CONT)".to_string(),
            sub_form: SourceForm::Ez,
            failures: 1,
            checked: 3,
        };
        assert_eq!(identity.failure_percent(), 33.3);
        assert!(identity.failed());
    }

    #[test]
    fn only_hard_failures_block_output() {
        assert!(ValidationOutcome::HardFailed.blocks_output());
        assert!(!ValidationOutcome::SoftPassed.blocks_output());
        assert!(!ValidationOutcome::Skipped.blocks_output());
    }
}
