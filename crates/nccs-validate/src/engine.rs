//! Validation engine: residual columns, failure counts and the per-form verdict.

use nccs_core::RecordTable;
use nccs_model::validation::{VALIDATE_PREFIX, VALIDATION_STATE};
use nccs_model::{
    FormValidationReport, IdentityResult, PipelineOptions, ReleaseForm, Result, ValidationOutcome,
    ValidationState,
};
use tracing::{debug, info, warn};

use crate::identities::identity_sets;

/// Tolerance and partial-validation policy for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationEngine {
    /// Residuals with a larger magnitude fail.
    pub tolerance: f64,
    pub partial: bool,
}

/// Verdict on one form plus the rows that caused a hard failure.
#[derive(Debug, Clone, PartialEq)]
pub struct FormValidation {
    pub report: FormValidationReport,
    /// Rows to export as failures. All false unless the form hard-failed.
    pub failed_rows: Vec<bool>,
}

impl ValidationEngine {
    pub fn new(tolerance: f64, partial: bool) -> Self {
        Self { tolerance, partial }
    }

    pub fn from_options(options: &PipelineOptions) -> Self {
        Self::new(options.tolerance, options.partial_validation)
    }

    fn exceeds(&self, residual: Option<f64>) -> bool {
        residual.is_some_and(|value| value.abs() > self.tolerance)
    }

    /// Writes one `validate_*` column per identity and counts failures.
    ///
    /// Ignored rows carry residuals but never count as failures.
    pub fn compute_residuals(
        &self,
        form: ReleaseForm,
        table: &mut RecordTable,
    ) -> Result<Vec<IdentityResult>> {
        let states = row_states(table)?;
        let checked = states
            .iter()
            .filter(|state| **state != ValidationState::Ignored)
            .count();

        let mut results = Vec::new();
        for set in identity_sets(form) {
            let applies = set.applies_to(table)?;
            for identity in set.identities {
                let column = set.column(identity);
                let Some(residuals) = identity.residuals(table, &applies)? else {
                    warn!(
                        form = %form,
                        identity = %column,
                        "skipping identity {}: an operand column is absent",
                        identity.display()
                    );
                    continue;
                };
                let failures = residuals
                    .iter()
                    .zip(&states)
                    .filter(|(residual, state)| {
                        **state != ValidationState::Ignored && self.exceeds(**residual)
                    })
                    .count();
                table.set_numbers(&column, residuals)?;

                let result = IdentityResult {
                    column,
                    display: identity.display(),
                    sub_form: set.sub_form,
                    failures,
                    checked,
                };
                if result.failed() {
                    warn!(
                        form = %form,
                        identity = %result.column,
                        failures,
                        "Column {} in form {} (subform {}) has {} validation failures ({}% of observations)",
                        identity.name.to_uppercase(),
                        form,
                        set.sub_form,
                        failures,
                        result.failure_percent()
                    );
                } else {
                    debug!(form = %form, identity = %result.column, "identity holds");
                }
                results.push(result);
            }
        }
        Ok(results)
    }

    /// Runs every identity of `form` and decides the outcome.
    ///
    /// `fixes_applied` is the number of reintegrated fix rows with a nonzero
    /// state; with partial validation on, any such fix turns a failing form
    /// into a soft pass.
    pub fn validate(
        &self,
        form: ReleaseForm,
        table: &mut RecordTable,
        fixes_applied: usize,
    ) -> Result<FormValidation> {
        let identities = self.compute_residuals(form, table)?;
        let any_failed = identities.iter().any(IdentityResult::failed);

        let outcome = match (any_failed, self.partial && fixes_applied > 0) {
            (false, _) => ValidationOutcome::Passed,
            (true, true) => ValidationOutcome::SoftPassed,
            (true, false) => ValidationOutcome::HardFailed,
        };
        let failed_rows = if outcome == ValidationOutcome::HardFailed {
            self.failing_rows(table)?
        } else {
            vec![false; table.record_count()]
        };

        match outcome {
            ValidationOutcome::HardFailed => warn!(form = %form, "{} failed validation", form),
            ValidationOutcome::SoftPassed => info!(
                form = %form,
                fixes_applied,
                "{} partially validated with {} fixes applied",
                form,
                fixes_applied
            ),
            _ => info!(form = %form, "{} passed validation", form),
        }

        let mut report = FormValidationReport::new(form, outcome);
        report.identities = identities;
        report.fixes_applied = fixes_applied;
        report.failed_rows = failed_rows.iter().filter(|row| **row).count();
        Ok(FormValidation {
            report,
            failed_rows,
        })
    }

    /// Rows with any residual beyond tolerance that are not ignored.
    pub fn failing_rows(&self, table: &RecordTable) -> Result<Vec<bool>> {
        let states = row_states(table)?;
        let mut failing = vec![false; table.record_count()];
        for column in residual_columns(table) {
            for (row, residual) in table.numbers(&column)?.into_iter().enumerate() {
                if self.exceeds(residual) && states[row] != ValidationState::Ignored {
                    failing[row] = true;
                }
            }
        }
        Ok(failing)
    }
}

/// Names of the `validate_*` residual columns on `table`.
pub fn residual_columns(table: &RecordTable) -> Vec<String> {
    table
        .column_names()
        .into_iter()
        .filter(|name| name.starts_with(VALIDATE_PREFIX))
        .collect()
}

/// Drops the residual columns. Returns how many were removed.
pub fn drop_residual_columns(table: &mut RecordTable) -> usize {
    residual_columns(table)
        .iter()
        .filter(|name| table.drop_column(name))
        .count()
}

/// Review state per row; a missing column means every row is unchanged.
pub fn row_states(table: &RecordTable) -> Result<Vec<ValidationState>> {
    Ok(table
        .numbers_or_null(VALIDATION_STATE)?
        .into_iter()
        .map(ValidationState::from_value)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn foundation(total: f64, state: f64) -> RecordTable {
        RecordTable::new(
            "PF",
            df!(
                "EIN" => &["1", "2"],
                "P1EXCREV" => &[total, 0.0],
                "P1TOTREV" => &[0.0, 0.0],
                "P1TOTEXP" => &[0.0, 0.0],
                VALIDATION_STATE => &[state, 0.0],
            )
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn ignored_rows_never_fail() {
        let engine = ValidationEngine::new(1000.0, false);
        let mut table = foundation(5000.0, 2.0);
        let result = engine.validate(ReleaseForm::Pf, &mut table, 0).unwrap();
        assert_eq!(result.report.outcome, ValidationOutcome::Passed);
        assert_eq!(
            table.numbers("validate_pf_p1excrev").unwrap(),
            vec![Some(5000.0), Some(0.0)]
        );
    }

    #[test]
    fn fixes_soften_failures_only_in_partial_mode() {
        let strict = ValidationEngine::new(1000.0, false);
        let partial = ValidationEngine::new(1000.0, true);

        let mut table = foundation(5000.0, 0.0);
        let hard = strict.validate(ReleaseForm::Pf, &mut table, 3).unwrap();
        assert_eq!(hard.report.outcome, ValidationOutcome::HardFailed);
        assert_eq!(hard.failed_rows, vec![true, false]);

        let soft = partial.validate(ReleaseForm::Pf, &mut table, 3).unwrap();
        assert_eq!(soft.report.outcome, ValidationOutcome::SoftPassed);
        assert_eq!(soft.report.failed_rows, 0);

        let none = partial.validate(ReleaseForm::Pf, &mut table, 0).unwrap();
        assert_eq!(none.report.outcome, ValidationOutcome::HardFailed);
    }

    #[test]
    fn identities_with_absent_operands_are_skipped() {
        let engine = ValidationEngine::new(0.0, false);
        let mut table = foundation(0.0, 0.0);
        let results = engine.compute_residuals(ReleaseForm::Pf, &mut table).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(residual_columns(&table), vec!["validate_pf_p1excrev"]);
        assert_eq!(drop_residual_columns(&mut table), 1);
    }
}
