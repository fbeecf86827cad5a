//! Financial columns defined as signed sums of other columns.
//!
//! A [`LinearCombination`] writes `target = Σ sign·operand`, optionally
//! clamped from below. Operands marked as preconditions must already be
//! numeric columns; any other missing operand counts as zero. A null cell in a
//! present operand makes the result null for that row.

use nccs_model::{NccsError, Result};

use super::rule_table::{ColumnRule, RuleMetadata};
use crate::frame::RecordTable;
use crate::pipeline_context::PipelineContext;

#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub column: &'static str,
    pub sign: f64,
    /// Operand must be present and numeric before the rule runs.
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct LinearCombination {
    metadata: RuleMetadata,
    pub target: &'static str,
    pub terms: Vec<Term>,
    pub floor: Option<f64>,
}

impl LinearCombination {
    pub fn new(target: &'static str, description: &str) -> Self {
        Self {
            metadata: RuleMetadata::new(target.to_lowercase(), description)
                .with_targets(&[target]),
            target,
            terms: Vec::new(),
            floor: None,
        }
    }

    pub fn plus(mut self, column: &'static str) -> Self {
        self.terms.push(Term {
            column,
            sign: 1.0,
            required: false,
        });
        self
    }

    pub fn minus(mut self, column: &'static str) -> Self {
        self.terms.push(Term {
            column,
            sign: -1.0,
            required: false,
        });
        self
    }

    /// Adds operands that are declared preconditions.
    pub fn plus_checked(mut self, columns: &[&'static str]) -> Self {
        for &column in columns {
            self.terms.push(Term {
                column,
                sign: 1.0,
                required: true,
            });
        }
        self
    }

    /// Clamps results below `floor` up to it.
    pub fn at_least(mut self, floor: f64) -> Self {
        self.floor = Some(floor);
        self
    }

    pub fn operands(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.terms.iter().map(|term| term.column)
    }

    fn check_preconditions(&self, table: &RecordTable) -> Result<()> {
        for term in self.terms.iter().filter(|term| term.required) {
            if !table.has_column(term.column) || !table.is_numeric(term.column) {
                return Err(NccsError::Precondition {
                    rule: self.target.to_string(),
                    column: term.column.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Evaluates the combination without writing it.
    pub fn evaluate(&self, table: &RecordTable) -> Result<Vec<Option<f64>>> {
        self.check_preconditions(table)?;
        let mut totals = vec![Some(0.0); table.record_count()];
        for term in &self.terms {
            if !table.has_column(term.column) {
                continue;
            }
            let values = table.numbers(term.column)?;
            for (total, value) in totals.iter_mut().zip(values) {
                *total = match (*total, value) {
                    (Some(total), Some(value)) => Some(total + term.sign * value),
                    _ => None,
                };
            }
        }
        if let Some(floor) = self.floor {
            for total in totals.iter_mut().flatten() {
                *total = total.max(floor);
            }
        }
        Ok(totals)
    }
}

impl ColumnRule for LinearCombination {
    fn metadata(&self) -> &RuleMetadata {
        &self.metadata
    }

    fn apply(&self, _ctx: &mut PipelineContext, table: &mut RecordTable) -> Result<()> {
        let values = self.evaluate(table)?;
        table.set_numbers(self.target, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn table() -> RecordTable {
        let mut table = RecordTable::new(
            "PF",
            df!(
                "EIN" => &["1", "2"],
                "A" => &["10", "3"],
                "B" => &[Some("4"), None],
                "C" => &["x", "y"],
            )
            .unwrap(),
        )
        .unwrap();
        table.coerce_numeric(&["A", "B"], None).unwrap();
        table
    }

    #[test]
    fn missing_optional_operands_count_as_zero() {
        let rule = LinearCombination::new("T", "test").plus("A").minus("ABSENT");
        assert_eq!(rule.evaluate(&table()).unwrap(), vec![Some(10.0), Some(3.0)]);
    }

    #[test]
    fn null_cells_propagate() {
        let rule = LinearCombination::new("T", "test").plus("A").minus("B");
        assert_eq!(rule.evaluate(&table()).unwrap(), vec![Some(6.0), None]);
    }

    #[test]
    fn floor_clamps_negative_results() {
        let rule = LinearCombination::new("T", "test").minus("A").at_least(0.0);
        assert_eq!(rule.evaluate(&table()).unwrap(), vec![Some(0.0), Some(0.0)]);
    }

    #[test]
    fn text_precondition_operand_is_fatal() {
        let rule = LinearCombination::new("T", "test").plus_checked(&["A", "C"]);
        match rule.evaluate(&table()) {
            Err(NccsError::Precondition { rule, column }) => {
                assert_eq!(rule, "T");
                assert_eq!(column, "C");
            }
            other => panic!("unexpected {other:?}"),
        }
        let absent = LinearCombination::new("T", "test").plus_checked(&["ABSENT"]);
        assert!(absent.evaluate(&table()).is_err());
    }
}
