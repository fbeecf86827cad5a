//! Per-source-form behaviour: computed columns and one-off record fixes.
//!
//! Each source form gets a [`FormStrategy`]. The pipeline asks the strategy
//! for its rules and fixes and never branches on the form itself.

use std::sync::Arc;

use nccs_model::{Result, SourceForm};
use tracing::{info, warn};

use crate::frame::RecordTable;
use crate::pipeline_context::PipelineContext;
use crate::transform::{
    ColumnRule, LinearCombination, RuleExecutor, charity_rules, common_rules, filename_rule,
};

/// A single-record correction for a known defect in the IRS extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualFix {
    /// Remove the EIN when every `(column, value)` condition holds.
    DropEin {
        ein: &'static str,
        when: &'static [(&'static str, &'static str)],
        /// Log a warning when the EIN is not in the table.
        warn_if_absent: bool,
    },
    /// Replace a mistyped EIN when every condition holds.
    RekeyEin {
        from: &'static str,
        to: &'static str,
        when: &'static [(&'static str, &'static str)],
    },
}

impl ManualFix {
    fn matching_rows(
        table: &RecordTable,
        ein: &str,
        when: &[(&str, &str)],
    ) -> Result<(bool, Vec<bool>)> {
        let eins = table.eins()?;
        let mut matches: Vec<bool> = eins.iter().map(|value| value == ein).collect();
        let present = matches.iter().any(|m| *m);
        for (column, expected) in when {
            let values = if table.has_column(column) {
                table.strings(column)?
            } else {
                vec![None; table.record_count()]
            };
            for (m, value) in matches.iter_mut().zip(values) {
                *m &= value.as_deref() == Some(*expected);
            }
        }
        Ok((present, matches))
    }

    /// Applies the fix. Returns the number of rows it touched.
    pub fn apply(&self, table: &mut RecordTable) -> Result<usize> {
        match self {
            ManualFix::DropEin {
                ein,
                when,
                warn_if_absent,
            } => {
                let (present, matches) = Self::matching_rows(table, ein, when)?;
                if !present && *warn_if_absent {
                    warn!(form = %table.form, ein, "EIN scheduled for removal is not present");
                }
                let keep: Vec<bool> = matches.iter().map(|m| !m).collect();
                let dropped = table.retain(&keep)?;
                if dropped > 0 {
                    info!(form = %table.form, ein, dropped, "manual fix removed EIN");
                }
                Ok(dropped)
            }
            ManualFix::RekeyEin { from, to, when } => {
                let (_, matches) = Self::matching_rows(table, from, when)?;
                let mut changed = 0;
                let eins = table
                    .eins()?
                    .into_iter()
                    .zip(&matches)
                    .map(|(ein, m)| {
                        if *m {
                            changed += 1;
                            Some(to.to_string())
                        } else {
                            Some(ein)
                        }
                    })
                    .collect();
                if changed > 0 {
                    table.set_strings(nccs_model::validation::EIN, eins)?;
                    info!(form = %table.form, from, to, "manual fix corrected EIN");
                }
                Ok(changed)
            }
        }
    }
}

/// What the pipeline needs to know about one source form.
pub trait FormStrategy: Send + Sync {
    fn form(&self) -> SourceForm;

    /// Financial columns specific to this form, in evaluation order.
    fn financial_rules(&self) -> Vec<LinearCombination>;

    /// Rules that follow the financial columns.
    fn trailing_rules(&self) -> RuleExecutor;

    fn manual_fixes(&self) -> &'static [ManualFix];

    /// Every computed-column rule: common rules first, then the form's own.
    fn column_rules(&self) -> RuleExecutor {
        let mut executor = common_rules();
        for rule in self.financial_rules() {
            executor.add_rule(Arc::new(rule) as Arc<dyn ColumnRule>);
        }
        executor.extend(self.trailing_rules());
        executor
    }

    /// Runs every computed-column rule over the table. Returns the columns
    /// written, in rule order.
    fn calculate_columns(
        &self,
        ctx: &mut PipelineContext,
        table: &mut RecordTable,
    ) -> Result<Vec<String>> {
        let written = self.column_rules().execute(ctx, table)?;
        info!(form = %self.form(), columns = written.len(), "calculated columns");
        Ok(written)
    }

    /// Applies every manual fix. Returns the number of rows touched.
    fn apply_manual_fixes(&self, table: &mut RecordTable) -> Result<usize> {
        let mut touched = 0;
        for fix in self.manual_fixes() {
            touched += fix.apply(table)?;
        }
        Ok(touched)
    }
}

pub struct EzStrategy;

impl FormStrategy for EzStrategy {
    fn form(&self) -> SourceForm {
        SourceForm::Ez
    }

    fn financial_rules(&self) -> Vec<LinearCombination> {
        vec![
            LinearCombination::new("TOTREV", "total revenue from expenses and net income")
                .plus_checked(&["EXPS", "NETINC"]),
            LinearCombination::new("GRREC", "gross receipts")
                .plus_checked(&["TOTREV", "SALEOTHG", "DIREXP", "GOODS"]),
            LinearCombination::new("PROGREV", "program service revenue")
                .plus_checked(&["DUESASSESMNTS", "PRGMSERVREV"]),
            LinearCombination::new("SPEVTG", "gross special events income")
                .plus_checked(&["GRSINCFNDRSNG", "GRSINCGAMING"]),
            LinearCombination::new("NETGNLS", "net gain or loss on asset sales")
                .plus_checked(&["SALEOTHN"]),
        ]
    }

    fn trailing_rules(&self) -> RuleExecutor {
        let mut executor = charity_rules();
        executor.extend(filename_rule("990EZ"));
        executor
    }

    fn manual_fixes(&self) -> &'static [ManualFix] {
        &[ManualFix::DropEin {
            ein: "580623603",
            when: &[
                ("SOURCE", "16eofinextractez.dat"),
                ("NAME", "UNITED WAY OF THE COASTAL EMPIRE INC"),
            ],
            warn_if_absent: false,
        }]
    }
}

pub struct FullStrategy;

impl FormStrategy for FullStrategy {
    fn form(&self) -> SourceForm {
        SourceForm::Full
    }

    fn financial_rules(&self) -> Vec<LinearCombination> {
        vec![
            LinearCombination::new("RENTINC", "gross rents")
                .plus_checked(&["GRSRNTSREAL", "GRSRNTSPRSNL"]),
            LinearCombination::new("RENTEXP", "rental expenses")
                .plus_checked(&["RNTLEXPNSREAL", "RNTLEXPNSPRSNL"]),
            LinearCombination::new("SPEVTG", "gross special events income")
                .plus_checked(&["GRSINCFNDRSNG", "GRSINCGAMING"]),
            LinearCombination::new("DIREXP", "special events direct expenses")
                .plus_checked(&["LESSDIRFNDRSNG", "LESSDIRGAMING"]),
            LinearCombination::new("FUNDINC", "net special events income")
                .plus_checked(&["NETINCFNDRSNG", "NETINCGAMING"]),
            LinearCombination::new("NETINC", "revenue less expenses")
                .plus("TOTREV2")
                .minus("EXPS"),
            LinearCombination::new("TOTREV", "total revenue from expenses and net income")
                .plus("EXPS")
                .plus("NETINC"),
            LinearCombination::new("GRREC", "gross receipts").plus_checked(&[
                "TOTREV",
                "RNTLEXPNSREAL",
                "RNTLEXPNSPRSNL",
                "SALESEXP",
                "SALEOTHE",
                "LESSDIRFNDRSNG",
                "LESSDIRGAMING",
                "GOODS",
            ]),
        ]
    }

    fn trailing_rules(&self) -> RuleExecutor {
        let mut executor = charity_rules();
        executor.extend(filename_rule("990O"));
        executor
    }

    fn manual_fixes(&self) -> &'static [ManualFix] {
        &[ManualFix::RekeyEin {
            from: "453208450",
            to: "453208250",
            when: &[("NAME", "FLYING CROWN LAND GROUP")],
        }]
    }
}

pub struct PfStrategy;

impl FormStrategy for PfStrategy {
    fn form(&self) -> SourceForm {
        SourceForm::Pf
    }

    fn financial_rules(&self) -> Vec<LinearCombination> {
        vec![
            LinearCombination::new("P6TXRFD", "tax refund, never negative")
                .plus("P6ESTTX")
                .plus("P6TXWTH")
                .plus("P6TXINV")
                .plus("P6TXWERR")
                .minus("P6TEXCTX")
                .plus("P6TXPNLT")
                .at_least(0.0),
            LinearCombination::new("P1NGASTS", "net gain on sale of assets")
                .plus_checked(&["TOTEXCAPLS", "TOTEXCAPGN"]),
            LinearCombination::new("TFLD", "tax due less overpayment")
                .plus("TAXDUE")
                .minus("OVERPAY"),
        ]
    }

    fn trailing_rules(&self) -> RuleExecutor {
        filename_rule("990PF")
    }

    fn manual_fixes(&self) -> &'static [ManualFix] {
        &[ManualFix::DropEin {
            ein: "954585397",
            when: &[],
            warn_if_absent: true,
        }]
    }
}

/// The strategy for a source form.
pub fn strategy_for(form: SourceForm) -> Box<dyn FormStrategy> {
    match form {
        SourceForm::Ez => Box::new(EzStrategy),
        SourceForm::Full => Box::new(FullStrategy),
        SourceForm::Pf => Box::new(PfStrategy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn rekey_requires_matching_name() {
        let mut table = RecordTable::new(
            "Full",
            df!(
                "EIN" => &["453208450", "453208450"],
                "NAME" => &["FLYING CROWN LAND GROUP", "SOMEONE ELSE"],
            )
            .unwrap(),
        )
        .unwrap();
        let touched = FullStrategy.apply_manual_fixes(&mut table).unwrap();
        assert_eq!(touched, 1);
        assert_eq!(table.eins().unwrap(), vec!["453208250", "453208450"]);
    }

    #[test]
    fn pf_drop_is_harmless_when_absent() {
        let mut table = RecordTable::new("PF", df!("EIN" => &["1"]).unwrap()).unwrap();
        assert_eq!(PfStrategy.apply_manual_fixes(&mut table).unwrap(), 0);
        assert_eq!(table.record_count(), 1);
    }

    #[test]
    fn ez_drop_checks_source_file() {
        let mut table = RecordTable::new(
            "EZ",
            df!(
                "EIN" => &["580623603"],
                "SOURCE" => &["17eofinextractez.dat"],
                "NAME" => &["UNITED WAY OF THE COASTAL EMPIRE INC"],
            )
            .unwrap(),
        )
        .unwrap();
        assert_eq!(EzStrategy.apply_manual_fixes(&mut table).unwrap(), 0);
    }

    #[test]
    fn common_rules_run_before_form_rules() {
        let rules = format!("{:?}", PfStrategy.column_rules());
        let fisyr = rules.find("\"fisyr\"").unwrap();
        let refund = rules.find("\"p6txrfd\"").unwrap();
        assert!(fisyr < refund);
        assert!(rules.ends_with("\"filename\"]"));
    }
}
