//! Large-organization and large-change extracts for mandatory review.
//!
//! Both run regardless of whether the identities balance. Rows a reviewer has
//! already ignored or checked are never extracted again.

use nccs_core::RecordTable;
use nccs_model::{ExtractOptions, ReleaseForm, Result};

use crate::engine::row_states;

/// Revenue, expenses and assets columns of a form, current and prior year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractColumns {
    pub current: [&'static str; 3],
    /// Prior-year counterparts; foundations have none.
    pub prior: Option<[&'static str; 3]>,
}

impl ExtractColumns {
    pub fn for_form(form: ReleaseForm) -> Self {
        match form.base() {
            ReleaseForm::Pf => Self {
                current: ["P1TOTREV", "P1TOTEXP", "P2TOTAST"],
                prior: None,
            },
            _ => Self {
                current: ["TOTREV2", "EXPS", "ASS_EOY"],
                prior: Some(["TOTREVP", "EXPSP", "ASS_BOY"]),
            },
        }
    }
}

/// Row masks of the two extracts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracts {
    pub largest: Vec<bool>,
    pub changed: Vec<bool>,
}

impl Extracts {
    pub fn largest_count(&self) -> usize {
        self.largest.iter().filter(|row| **row).count()
    }

    pub fn changed_count(&self) -> usize {
        self.changed.iter().filter(|row| **row).count()
    }

    pub fn is_empty(&self) -> bool {
        self.largest_count() + self.changed_count() == 0
    }
}

/// Quantile of the non-missing `values` with linear interpolation between
/// order statistics.
pub fn quantile(values: &[Option<f64>], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values
        .iter()
        .flatten()
        .copied()
        .filter(|v| !v.is_nan())
        .collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Rows at or above the `q` quantile of any current column.
pub fn largest_rows(table: &RecordTable, columns: &[&str], q: f64) -> Result<Vec<bool>> {
    let mut mask = vec![false; table.record_count()];
    for column in columns {
        if !table.has_column(column) {
            continue;
        }
        let values = table.numbers(column)?;
        let Some(cutoff) = quantile(&values, q) else {
            continue;
        };
        for (row, value) in values.iter().enumerate() {
            if value.is_some_and(|value| value >= cutoff) {
                mask[row] = true;
            }
        }
    }
    Ok(mask)
}

/// Rows whose revenue, expenses or assets moved by at least `fraction` of the
/// prior-year value while current or prior revenue reaches `revenue_floor`.
///
/// Any movement away from a zero prior value counts as changed.
pub fn changed_rows(
    table: &RecordTable,
    current: &[&str; 3],
    prior: &[&str; 3],
    fraction: f64,
    revenue_floor: f64,
) -> Result<Vec<bool>> {
    let rows = table.record_count();
    let mut moved = vec![false; rows];
    for (current, prior) in current.iter().zip(prior) {
        let now = table.numbers_or_null(current)?;
        let before = table.numbers_or_null(prior)?;
        for row in 0..rows {
            if let (Some(now), Some(before)) = (now[row], before[row])
                && (now - before).abs() / before >= fraction
            {
                moved[row] = true;
            }
        }
    }

    let revenue = table.numbers_or_null(current[0])?;
    let prior_revenue = table.numbers_or_null(prior[0])?;
    Ok((0..rows)
        .map(|row| {
            let large = revenue[row].is_some_and(|v| v >= revenue_floor)
                || prior_revenue[row].is_some_and(|v| v >= revenue_floor);
            moved[row] && large
        })
        .collect())
}

/// Runs both extracts on `form`, leaving out resolved rows.
///
/// The change extract needs the prior-year columns; without them it is empty.
pub fn extract(table: &RecordTable, form: ReleaseForm, options: &ExtractOptions) -> Result<Extracts> {
    let columns = ExtractColumns::for_form(form);
    let open: Vec<bool> = row_states(table)?
        .into_iter()
        .map(|state| !state.is_resolved())
        .collect();

    let largest = largest_rows(table, &columns.current, options.quantile)?;
    let changed = match columns.prior {
        Some(prior) if prior.iter().any(|column| table.has_column(column)) => changed_rows(
            table,
            &columns.current,
            &prior,
            options.change_fraction,
            options.revenue_floor,
        )?,
        _ => vec![false; table.record_count()],
    };

    let keep_open = |mask: Vec<bool>| -> Vec<bool> {
        mask.into_iter().zip(&open).map(|(row, open)| row && *open).collect()
    };
    Ok(Extracts {
        largest: keep_open(largest),
        changed: keep_open(changed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nccs_model::validation::VALIDATION_STATE;
    use polars::prelude::*;

    #[test]
    fn quantile_interpolates_between_neighbours() {
        let values = [Some(1.0), None, Some(3.0), Some(2.0), Some(4.0)];
        assert_eq!(super::quantile(&values, 0.5), Some(2.5));
        assert_eq!(super::quantile(&values, 1.0), Some(4.0));
        assert_eq!(super::quantile(&values, 0.0), Some(1.0));
        assert_eq!(super::quantile(&[None], 0.5), None);
    }

    #[test]
    fn changes_need_a_large_organization() {
        let table = RecordTable::new(
            "CO",
            df!(
                "EIN" => &["1", "2", "3", "4"],
                "TOTREV2" => &[20e6, 1e6, 20e6, 5e6],
                "TOTREVP" => &[10e6, 0.5e6, 19e6, 20e6],
                "EXPS" => &[1.0, 1.0, 1.0, 1.0],
                "EXPSP" => &[1.0, 1.0, 1.0, 1.0],
                "ASS_EOY" => &[1.0, 1.0, 1.0, 1.0],
                "ASS_BOY" => &[1.0, 1.0, 1.0, 1.0],
            )
            .unwrap(),
        )
        .unwrap();
        let columns = ExtractColumns::for_form(ReleaseForm::Co);
        let changed =
            changed_rows(&table, &columns.current, &columns.prior.unwrap(), 0.5, 10e6).unwrap();
        // Row 4 shrank by 75% and was large last year.
        assert_eq!(changed, vec![true, false, false, true]);
    }

    #[test]
    fn growth_from_zero_prior_counts_as_changed() {
        let table = RecordTable::new(
            "CO",
            df!(
                "EIN" => &["1", "2"],
                "TOTREV2" => &[20e6, 20e6],
                "TOTREVP" => &[0.0, 20e6],
                "EXPS" => &[1.0, 0.0],
                "EXPSP" => &[1.0, 0.0],
                "ASS_EOY" => &[1.0, 1.0],
                "ASS_BOY" => &[1.0, 1.0],
            )
            .unwrap(),
        )
        .unwrap();
        let columns = ExtractColumns::for_form(ReleaseForm::Co);
        let changed =
            changed_rows(&table, &columns.current, &columns.prior.unwrap(), 0.5, 10e6).unwrap();
        // 20e6 / 0 is infinite; 0 / 0 is NaN and never reaches the fraction.
        assert_eq!(changed, vec![true, false]);
    }

    #[test]
    fn resolved_rows_are_not_extracted() {
        let table = RecordTable::new(
            "PF",
            df!(
                "EIN" => &["1", "2", "3"],
                "P1TOTREV" => &[100.0, 5.0, 100.0],
                VALIDATION_STATE => &[3.0, 0.0, 0.0],
            )
            .unwrap(),
        )
        .unwrap();
        let options = ExtractOptions {
            quantile: 0.9,
            ..ExtractOptions::default()
        };
        let extracts = extract(&table, ReleaseForm::Pf, &options).unwrap();
        assert_eq!(extracts.largest, vec![false, false, true]);
        assert!(extracts.changed.iter().all(|row| !row));
    }
}
