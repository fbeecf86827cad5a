//! One row per EIN.
//!
//! Rows more than two fiscal years behind the release are discarded first.
//! EINs that still repeat go through an ordered cascade of criteria: at each
//! step only the rows attaining the group maximum survive, and ties pass on to
//! the next step. The cascade ends in a uniform random draw.
//!
//! Charity forms carry one exception on `FISYR`. When exactly two rows of a
//! group are a current-year filing already linked to last year's release
//! (`FISYR == year`, `FISYRP == year - 1`) and a next-year filing with no
//! prior link (`FISYR == year + 1`, `FISYRP` null), the group's maximum is
//! lowered by one so the linked current-year filing is kept.

use std::collections::HashMap;

use nccs_model::{ReleaseForm, Result};
use tracing::info;

use crate::frame::RecordTable;
use crate::pipeline_context::PipelineContext;

/// How the size of a filing is measured for the `val` criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeMeasure {
    /// `|TOTREV| + |ASS_EOY| + |EXPS|`
    Charity,
    /// `|P1TOTREV| + |P1TOTEXP| + max(|P2TASFMV|, |P2TOTAST|)`
    Foundation,
}

impl SizeMeasure {
    fn values(self, table: &RecordTable) -> Result<Vec<Option<f64>>> {
        // An absent operand contributes zero.
        let abs = |name: &str| -> Result<Vec<Option<f64>>> {
            if !table.has_column(name) {
                return Ok(vec![Some(0.0); table.record_count()]);
            }
            Ok(table
                .numbers(name)?
                .into_iter()
                .map(|v| v.map(f64::abs))
                .collect())
        };
        let sum = |columns: Vec<Vec<Option<f64>>>| -> Vec<Option<f64>> {
            let rows = table.record_count();
            (0..rows)
                .map(|idx| {
                    columns
                        .iter()
                        .try_fold(0.0, |acc, column| column[idx].map(|v| acc + v))
                })
                .collect()
        };
        match self {
            SizeMeasure::Charity => Ok(sum(vec![abs("TOTREV")?, abs("ASS_EOY")?, abs("EXPS")?])),
            SizeMeasure::Foundation => {
                let fmv = abs("P2TASFMV")?;
                let total = abs("P2TOTAST")?;
                let assets = fmv
                    .iter()
                    .zip(&total)
                    .map(|(a, b)| match (a, b) {
                        (Some(a), Some(b)) => Some(a.max(*b)),
                        (Some(v), None) | (None, Some(v)) => Some(*v),
                        (None, None) => None,
                    })
                    .collect();
                Ok(sum(vec![abs("P1TOTREV")?, abs("P1TOTEXP")?, assets]))
            }
        }
    }
}

/// One step of the tie-break cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    FiscalYear,
    Size(SizeMeasure),
    StartYear,
    Random,
}

impl Criterion {
    pub fn name(self) -> &'static str {
        match self {
            Criterion::FiscalYear => "FISYR",
            Criterion::Size(_) => "val",
            Criterion::StartYear => "STYEAR",
            Criterion::Random => "rnd",
        }
    }
}

/// Ordered criteria for one release form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupCriteria {
    pub criteria: Vec<Criterion>,
    /// Apply the fiscal-year adjacency exception.
    pub adjacency: bool,
}

impl DedupCriteria {
    pub fn charity() -> Self {
        Self {
            criteria: vec![
                Criterion::FiscalYear,
                Criterion::Size(SizeMeasure::Charity),
                Criterion::StartYear,
                Criterion::Random,
            ],
            adjacency: true,
        }
    }

    pub fn foundation() -> Self {
        Self {
            criteria: vec![
                Criterion::FiscalYear,
                Criterion::Size(SizeMeasure::Foundation),
                Criterion::StartYear,
                Criterion::Random,
            ],
            adjacency: false,
        }
    }

    pub fn for_form(form: ReleaseForm) -> Self {
        if form.is_charity() {
            Self::charity()
        } else {
            Self::foundation()
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.criteria.iter().map(|c| c.name()).collect()
    }
}

/// What deduplication did to one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupOutcome {
    /// Rows discarded for a fiscal year more than two years old.
    pub stale_dropped: usize,
    /// Rows whose EIN repeated after the stale filter.
    pub duplicate_rows: usize,
    /// Rows dropped at each criterion, in cascade order.
    pub dropped_by: Vec<(String, usize)>,
}

impl DedupOutcome {
    pub fn total_dropped(&self) -> usize {
        self.dropped_by.iter().map(|(_, n)| n).sum()
    }
}

/// Whether a row is one half of the adjacency configuration.
fn adjacency_member(fisyr: Option<f64>, fisyrp: Option<f64>, year: f64) -> bool {
    match (fisyr, fisyrp) {
        (Some(f), Some(p)) => f == year && p == year - 1.0,
        (Some(f), None) => f == year + 1.0,
        _ => false,
    }
}

/// Keeps, within each group, rows attaining the group maximum of `values`.
///
/// Nulls rank below every number; a group of nulls ties. `lowered` groups
/// have their maximum reduced by one. Returns the number of rows dropped.
fn keep_group_max(
    groups: &HashMap<&str, Vec<usize>>,
    alive: &mut [bool],
    values: &[Option<f64>],
    lowered: &HashMap<&str, bool>,
) -> usize {
    let mut dropped = 0;
    for (ein, rows) in groups {
        let survivors: Vec<usize> = rows.iter().copied().filter(|&idx| alive[idx]).collect();
        let max = survivors
            .iter()
            .filter_map(|&idx| values[idx])
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));
        let Some(mut max) = max else {
            continue;
        };
        if lowered.get(ein).copied().unwrap_or(false) {
            max -= 1.0;
        }
        for idx in survivors {
            if values[idx] != Some(max) {
                alive[idx] = false;
                dropped += 1;
            }
        }
    }
    dropped
}

/// Removes stale rows and resolves repeated EINs. `draws(n)` supplies the
/// random tie-break values for the `n` duplicate rows.
///
/// Criteria without [`Criterion::Random`] can leave a tie standing, for
/// instance when every value of a group is null. The call then fails with
/// [`NccsError::DuplicateIdentifier`](nccs_model::NccsError::DuplicateIdentifier).
pub fn deduplicate_with(
    table: &mut RecordTable,
    criteria: &DedupCriteria,
    release_year: i32,
    mut draws: impl FnMut(usize) -> Vec<f64>,
) -> Result<DedupOutcome> {
    let year = f64::from(release_year);
    let mut outcome = DedupOutcome::default();

    let fisyr = table.numbers_or_null("FISYR")?;
    let current: Vec<bool> = fisyr
        .iter()
        .map(|v| v.is_some_and(|v| v >= year - 2.0))
        .collect();
    outcome.stale_dropped = table.retain(&current)?;

    let eins = table.eins()?;
    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, ein) in eins.iter().enumerate() {
        groups.entry(ein.as_str()).or_default().push(idx);
    }
    groups.retain(|_, rows| rows.len() > 1);
    outcome.duplicate_rows = groups.values().map(Vec::len).sum();

    info!(form = %table.form, duplicates = outcome.duplicate_rows, "removing duplicate EINs");

    let mut alive = vec![true; table.record_count()];
    let no_lowering = HashMap::new();
    for criterion in &criteria.criteria {
        let mut lowered = HashMap::new();
        let values = match criterion {
            Criterion::FiscalYear => {
                let fisyr = table.numbers_or_null("FISYR")?;
                if criteria.adjacency {
                    let fisyrp = table.numbers_or_null("FISYRP")?;
                    for (ein, rows) in &groups {
                        let members: Vec<usize> = rows
                            .iter()
                            .copied()
                            .filter(|&idx| adjacency_member(fisyr[idx], fisyrp[idx], year))
                            .collect();
                        let linked = members.iter().any(|&idx| fisyr[idx] == Some(year));
                        let next = members.iter().any(|&idx| fisyr[idx] == Some(year + 1.0));
                        lowered.insert(*ein, members.len() == 2 && linked && next);
                    }
                }
                fisyr
            }
            Criterion::Size(measure) => measure.values(table)?,
            Criterion::StartYear => table.numbers_or_null("STYEAR")?,
            Criterion::Random => {
                let mut values = vec![None; table.record_count()];
                let rows: Vec<usize> = groups.values().flatten().copied().collect();
                for (idx, draw) in rows.iter().zip(draws(rows.len())) {
                    values[*idx] = Some(draw);
                }
                values
            }
        };
        let lowered = if lowered.is_empty() { &no_lowering } else { &lowered };
        let dropped = keep_group_max(&groups, &mut alive, &values, lowered);
        info!(
            form = %table.form,
            criterion = criterion.name(),
            dropped,
            "{dropped} EINs dropped based on {} from {}",
            criterion.name(),
            table.form
        );
        outcome.dropped_by.push((criterion.name().to_string(), dropped));
    }

    table.retain(&alive)?;
    table.ensure_unique()?;
    info!(
        form = %table.form,
        dropped = outcome.total_dropped(),
        "{} complete, {} total observations dropped",
        table.form,
        outcome.total_dropped()
    );
    Ok(outcome)
}

/// Deduplicates a release form with its criteria and records the outcome.
pub fn deduplicate(
    ctx: &mut PipelineContext,
    form: ReleaseForm,
    table: &mut RecordTable,
) -> Result<DedupOutcome> {
    let criteria = DedupCriteria::for_form(form);
    let release_year = ctx.release_year();
    let outcome = deduplicate_with(table, &criteria, release_year, |n| ctx.random_values(n))?;
    ctx.audit.dedup.insert(form, outcome.clone());
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn charity(rows: DataFrame) -> RecordTable {
        RecordTable::new("CO", rows).unwrap()
    }

    fn counting(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 / (n as f64 + 1.0)).collect()
    }

    #[test]
    fn stale_rows_are_discarded() {
        let mut table = charity(
            df!("EIN" => &["1", "2"], "FISYR" => &[Some(2012.0), Some(2013.0)]).unwrap(),
        );
        let outcome =
            deduplicate_with(&mut table, &DedupCriteria::charity(), 2015, counting).unwrap();
        assert_eq!(outcome.stale_dropped, 1);
        assert_eq!(table.eins().unwrap(), vec!["2"]);
    }

    #[test]
    fn adjacency_keeps_the_linked_current_year_filing() {
        let mut table = charity(
            df!(
                "EIN" => &["1", "1"],
                "FISYR" => &[2015.0, 2016.0],
                "FISYRP" => &[Some(2014.0), None],
                "TOTREV" => &[1.0, 900.0],
            )
            .unwrap(),
        );
        deduplicate_with(&mut table, &DedupCriteria::charity(), 2015, counting).unwrap();
        assert_eq!(table.numbers("FISYR").unwrap(), vec![Some(2015.0)]);
    }

    #[test]
    fn foundations_ignore_adjacency() {
        let mut table = RecordTable::new(
            "PF",
            df!(
                "EIN" => &["1", "1"],
                "FISYR" => &[2015.0, 2016.0],
                "FISYRP" => &[Some(2014.0), None],
            )
            .unwrap(),
        )
        .unwrap();
        deduplicate_with(&mut table, &DedupCriteria::foundation(), 2015, counting).unwrap();
        assert_eq!(table.numbers("FISYR").unwrap(), vec![Some(2016.0)]);
    }

    #[test]
    fn foundation_size_takes_larger_asset_measure() {
        let mut table = RecordTable::new(
            "PF",
            df!(
                "EIN" => &["1", "1"],
                "FISYR" => &[2015.0, 2015.0],
                "P1TOTREV" => &[10.0, 10.0],
                "P1TOTEXP" => &[0.0, 0.0],
                "P2TASFMV" => &[-50.0, 5.0],
                "P2TOTAST" => &[1.0, 40.0],
                "MARK" => &["a", "b"],
            )
            .unwrap(),
        )
        .unwrap();
        deduplicate_with(&mut table, &DedupCriteria::foundation(), 2015, counting).unwrap();
        assert_eq!(table.strings("MARK").unwrap()[0].as_deref(), Some("a"));
    }

    #[test]
    fn random_draw_settles_full_ties() {
        let mut table = charity(
            df!("EIN" => &["1", "1", "2"], "FISYR" => &[2015.0, 2015.0, 2015.0]).unwrap(),
        );
        let outcome = deduplicate_with(&mut table, &DedupCriteria::charity(), 2015, |n| {
            (0..n).map(|i| i as f64).collect()
        })
        .unwrap();
        assert_eq!(table.record_count(), 2);
        assert_eq!(outcome.dropped_by.last(), Some(&("rnd".to_string(), 1)));
        assert_eq!(outcome.total_dropped(), 1);
    }
}
