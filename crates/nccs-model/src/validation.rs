use serde::{Deserialize, Serialize};

/// Identifier column of every record table.
pub const EIN: &str = "EIN";
/// Provenance column: originating file name or prior release name.
pub const SOURCE: &str = "SOURCE";
pub const VALIDATION_STATE: &str = "VALIDATION_STATE";
pub const MANUALLY_FIXED: &str = "MANUALLY_FIXED";
pub const VALIDATION_REASON: &str = "VALIDATION_REASON";
/// Prefix of the ephemeral residual columns.
pub const VALIDATE_PREFIX: &str = "validate_";

/// Review lifecycle of a release-form row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationState {
    #[default]
    Unchanged,
    Fixed,
    Ignored,
    Checked,
}

impl ValidationState {
    pub fn code(self) -> i64 {
        match self {
            ValidationState::Unchanged => 0,
            ValidationState::Fixed => 1,
            ValidationState::Ignored => 2,
            ValidationState::Checked => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(ValidationState::Unchanged),
            1 => Some(ValidationState::Fixed),
            2 => Some(ValidationState::Ignored),
            3 => Some(ValidationState::Checked),
            _ => None,
        }
    }

    /// Reads the numeric cell value; missing or unknown codes count as unchanged.
    pub fn from_value(value: Option<f64>) -> Self {
        value
            .filter(|v| v.fract() == 0.0)
            .and_then(|v| Self::from_code(v as i64))
            .unwrap_or_default()
    }

    /// Rows a reviewer has resolved are left out of the outlier extracts.
    pub fn is_resolved(self) -> bool {
        matches!(self, ValidationState::Ignored | ValidationState::Checked)
    }
}

/// Extract categories that put a row into the failure export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReviewCategory {
    /// Top quantile of revenue, expenses or assets.
    Largest,
    /// Large year-over-year change on a large organization.
    Changed,
    /// Arithmetic identity beyond tolerance.
    Failed,
}

impl ReviewCategory {
    /// Export order: L, C, F.
    pub const ORDER: [ReviewCategory; 3] = [
        ReviewCategory::Largest,
        ReviewCategory::Changed,
        ReviewCategory::Failed,
    ];

    pub fn letter(self) -> char {
        match self {
            ReviewCategory::Largest => 'L',
            ReviewCategory::Changed => 'C',
            ReviewCategory::Failed => 'F',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_codes_round_trip() {
        for state in [
            ValidationState::Unchanged,
            ValidationState::Fixed,
            ValidationState::Ignored,
            ValidationState::Checked,
        ] {
            assert_eq!(ValidationState::from_code(state.code()), Some(state));
        }
        assert_eq!(ValidationState::from_value(None), ValidationState::Unchanged);
        assert_eq!(ValidationState::from_value(Some(2.0)), ValidationState::Ignored);
    }
}
