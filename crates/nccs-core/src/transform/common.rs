//! Computed columns shared by every source form, and those shared by EZ and Full.

use std::sync::Arc;

use nccs_ingest::polars_utils::{format_numeric, parse_f64};
use nccs_model::{NccsError, Result};

use super::classify;
use super::rule_table::{FnRule, RuleExecutor, RuleMetadata};
use crate::frame::RecordTable;
use crate::pipeline_context::PipelineContext;

pub const TAXPER: &str = "TAXPER";
pub const NTEEFINAL: &str = "NTEEFINAL";

fn text_or_null(table: &RecordTable, name: &str) -> Result<Vec<Option<String>>> {
    if table.has_column(name) {
        table.strings(name)
    } else {
        Ok(vec![None; table.record_count()])
    }
}

fn require_column(table: &RecordTable, rule: &str, column: &str) -> Result<()> {
    if table.has_column(column) {
        Ok(())
    } else {
        Err(NccsError::Precondition {
            rule: rule.to_string(),
            column: column.to_string(),
        })
    }
}

fn char_slice(value: &str, start: usize, end: usize) -> String {
    value.chars().skip(start).take(end - start).collect()
}

/// Year and month of a `YYYYMM` tax period.
pub fn period_parts(taxper: &str) -> (Option<f64>, Option<f64>) {
    (
        parse_f64(&char_slice(taxper, 0, 4)),
        parse_f64(&char_slice(taxper, 4, 6)),
    )
}

/// Start year of the accounting period: the period year when it ends in
/// January or December, otherwise the year before.
pub fn start_year(taxper: &str) -> Option<f64> {
    match period_parts(taxper) {
        (Some(year), Some(month)) if month == 1.0 || month == 12.0 => Some(year),
        (Some(year), _) => Some(year - 1.0),
        (None, _) => None,
    }
}

fn fiscal_year(_: &mut PipelineContext, table: &mut RecordTable) -> Result<()> {
    require_column(table, "FISYR", TAXPER)?;
    let values = table
        .strings(TAXPER)?
        .iter()
        .map(|taxper| taxper.as_deref().and_then(|t| period_parts(t).0))
        .collect();
    table.set_numbers("FISYR", values)
}

fn accounting_period(_: &mut PipelineContext, table: &mut RecordTable) -> Result<()> {
    require_column(table, "ACCPER", TAXPER)?;
    let values = table
        .strings(TAXPER)?
        .iter()
        .map(|taxper| taxper.as_deref().map(|t| char_slice(t, 4, 6)))
        .collect();
    table.set_strings("ACCPER", values)
}

fn nccs_keys(_: &mut PipelineContext, table: &mut RecordTable) -> Result<()> {
    let eins = table.eins()?;
    let taxper = text_or_null(table, TAXPER)?;
    let fisyr = table.numbers_or_null("FISYR")?;
    let key1 = eins
        .iter()
        .zip(&taxper)
        .map(|(ein, taxper)| taxper.as_ref().map(|taxper| format!("{ein}{taxper}")))
        .collect();
    let key2 = eins
        .iter()
        .zip(&fisyr)
        .map(|(ein, year)| year.map(|year| format!("{ein}{}", format_numeric(year))))
        .collect();
    table.set_strings("NCCSKEY", key1)?;
    table.set_strings("NCCSKEY2", key2)
}

fn random_number(ctx: &mut PipelineContext, table: &mut RecordTable) -> Result<()> {
    let draws = ctx.random_values(table.record_count());
    table.set_numbers("RANDNUM", draws.into_iter().map(Some).collect())
}

fn ntee_slices(_: &mut PipelineContext, table: &mut RecordTable) -> Result<()> {
    let ntee = text_or_null(table, NTEEFINAL)?;
    let nteecc = ntee
        .iter()
        .map(|code| code.as_deref().map(|c| char_slice(c, 0, 4)))
        .collect();
    table.set_strings("NTEECC", nteecc)?;
    let first: Vec<Option<String>> = ntee
        .iter()
        .map(|code| code.as_deref().map(|c| char_slice(c, 0, 1)))
        .collect();
    for name in ["NTEE1", "NTEEFINAL1", "LEVEL4"] {
        table.set_strings(name, first.clone())?;
    }
    Ok(())
}

fn classifications(_: &mut PipelineContext, table: &mut RecordTable) -> Result<()> {
    let ntee = text_or_null(table, NTEEFINAL)?;
    let subsection = text_or_null(table, "SUBSECCD")?;
    let foundation = text_or_null(table, "FNDNCD")?;

    let level1 = subsection
        .iter()
        .zip(&foundation)
        .map(|(sub, fnd)| Some(classify::level1(sub.as_deref(), fnd.as_deref()).to_string()))
        .collect();
    let ntmaj10: Vec<&str> = ntee
        .iter()
        .map(|code| classify::ntmaj10(code.as_deref()))
        .collect();
    let majgrpb = ntee
        .iter()
        .map(|code| classify::majgrpb(code.as_deref()))
        .collect();
    let level3: Vec<&str> = ntee
        .iter()
        .map(|code| classify::level3(code.as_deref()))
        .collect();
    let level2 = (0..table.record_count())
        .map(|idx| {
            Some(
                classify::level2(
                    subsection[idx].as_deref(),
                    foundation[idx].as_deref(),
                    Some(level3[idx]),
                    ntee[idx].as_deref(),
                )
                .to_string(),
            )
        })
        .collect();
    let ntmaj12 = ntee
        .iter()
        .zip(&ntmaj10)
        .map(|(code, major)| Some(classify::ntmaj12(code.as_deref(), major)))
        .collect();
    let ntmaj5 = ntmaj10
        .iter()
        .map(|major| Some(classify::ntmaj5(major)))
        .collect();

    let owned = |values: &[&str]| -> Vec<Option<String>> {
        values.iter().map(|v| Some(v.to_string())).collect()
    };
    table.set_strings("LEVEL1", level1)?;
    table.set_strings("NTMAJ10", owned(ntmaj10.as_slice()))?;
    table.set_strings("MAJGRPB", majgrpb)?;
    table.set_strings("LEVEL3", owned(level3.as_slice()))?;
    table.set_strings("LEVEL2", level2)?;
    table.set_strings("NTMAJ12", ntmaj12)?;
    table.set_strings("NTMAJ5", ntmaj5)
}

/// Rules every source form runs first, in order.
pub fn common_rules() -> RuleExecutor {
    let mut executor = RuleExecutor::new();
    executor.add_rule(Arc::new(FnRule::new(
        RuleMetadata::new("fisyr", "fiscal year from TAXPER[0..4]")
            .with_targets(&["FISYR"]),
        fiscal_year,
    )));
    executor.add_rule(Arc::new(FnRule::new(
        RuleMetadata::new("accper", "accounting period from TAXPER[4..6]")
            .with_targets(&["ACCPER"]),
        accounting_period,
    )));
    executor.add_rule(Arc::new(FnRule::new(
        RuleMetadata::new("nccskey", "EIN+TAXPER and EIN+FISYR keys")
            .with_targets(&["NCCSKEY", "NCCSKEY2"]),
        nccs_keys,
    )));
    executor.add_rule(Arc::new(FnRule::new(
        RuleMetadata::new("randnum", "uniform draw on [0, 1)")
            .with_targets(&["RANDNUM"]),
        random_number,
    )));
    executor.add_rule(Arc::new(FnRule::new(
        RuleMetadata::new("ntee_slices", "NTEEFINAL prefixes")
            .with_targets(&["NTEECC", "NTEE1", "NTEEFINAL1", "LEVEL4"]),
        ntee_slices,
    )));
    executor.add_rule(Arc::new(FnRule::new(
        RuleMetadata::new(
            "classifications",
            "NTEE major groups and filing levels",
        )
        .with_targets(&[
            "LEVEL1", "NTMAJ10", "MAJGRPB", "LEVEL3", "LEVEL2", "NTMAJ12", "NTMAJ5",
        ]),
        classifications,
    )));
    executor
}

fn epostcard_flag(_: &mut PipelineContext, table: &mut RecordTable) -> Result<()> {
    let fisyr = table.numbers_or_null("FISYR")?;
    let filed = text_or_null(table, "EPOSTCARD")?;
    let values = fisyr
        .iter()
        .zip(&filed)
        .map(|(year, filed)| {
            let same = match (year, filed.as_deref().and_then(parse_f64)) {
                (Some(year), Some(filed)) => *year == filed,
                _ => false,
            };
            Some(if same { "1" } else { "0" }.to_string())
        })
        .collect();
    table.set_strings("EPOSTCARD", values)
}

fn start_years(_: &mut PipelineContext, table: &mut RecordTable) -> Result<()> {
    require_column(table, "STYEAR", TAXPER)?;
    let years: Vec<Option<f64>> = table
        .strings(TAXPER)?
        .iter()
        .map(|taxper| taxper.as_deref().and_then(start_year))
        .collect();
    let text = years.iter().map(|year| year.map(format_numeric)).collect();
    table.set_numbers("STYEAR", years)?;
    table.set_strings("SOIYR", text)
}

fn subsection_copy(_: &mut PipelineContext, table: &mut RecordTable) -> Result<()> {
    let values = text_or_null(table, "SUBSECCD")?;
    table.set_strings("SUBCD", values)
}

/// Rules EZ and Full run after their own financial columns.
pub fn charity_rules() -> RuleExecutor {
    let mut executor = RuleExecutor::new();
    executor.add_rule(Arc::new(FnRule::new(
        RuleMetadata::new(
            "epostcard",
            "'1' when an e-Postcard was filed for the fiscal year",
        )
        .with_targets(&["EPOSTCARD"]),
        epostcard_flag,
    )));
    executor.add_rule(Arc::new(FnRule::new(
        RuleMetadata::new("styear", "start year of the accounting period")
            .with_targets(&["STYEAR", "SOIYR"]),
        start_years,
    )));
    executor.add_rule(Arc::new(FnRule::new(
        RuleMetadata::new("subcd", "copy of SUBSECCD")
            .with_targets(&["SUBCD"]),
        subsection_copy,
    )));
    executor
}

/// `FILENAME` rule: `EIN_TAXPER_<suffix>`, the name of the filing's PDF.
pub fn filename_rule(suffix: &'static str) -> RuleExecutor {
    let mut executor = RuleExecutor::new();
    executor.add_rule(Arc::new(FnRule::new(
        RuleMetadata::new("filename", "filing PDF name")
            .with_targets(&["FILENAME"]),
        move |_: &mut PipelineContext, table: &mut RecordTable| {
            let eins = table.eins()?;
            let taxper = text_or_null(table, TAXPER)?;
            let values = eins
                .iter()
                .zip(&taxper)
                .map(|(ein, taxper)| {
                    taxper
                        .as_ref()
                        .map(|taxper| format!("{ein}_{taxper}_{suffix}"))
                })
                .collect();
            table.set_strings("FILENAME", values)
        },
    )));
    executor
}

#[cfg(test)]
mod tests {
    use super::*;
    use nccs_ingest::WorkspaceLayout;
    use polars::prelude::*;

    fn ctx() -> PipelineContext {
        PipelineContext::new(WorkspaceLayout::new("unused"))
            .with_options(nccs_model::PipelineOptions::default().with_seed(1))
    }

    #[test]
    fn start_year_depends_on_closing_month() {
        assert_eq!(start_year("201512"), Some(2015.0));
        assert_eq!(start_year("201501"), Some(2015.0));
        assert_eq!(start_year("201506"), Some(2014.0));
        assert_eq!(start_year(""), None);
    }

    #[test]
    fn common_rules_fill_keys_and_classifications() {
        let mut table = RecordTable::new(
            "EZ",
            df!(
                "EIN" => &["010000001"],
                "TAXPER" => &["201506"],
                "NTEEFINAL" => &["B43"],
                "SUBSECCD" => &["03"],
                "FNDNCD" => &["15"],
            )
            .unwrap(),
        )
        .unwrap();
        let mut ctx = ctx();
        common_rules().execute(&mut ctx, &mut table).unwrap();
        assert_eq!(table.numbers("FISYR").unwrap(), vec![Some(2015.0)]);
        assert_eq!(table.strings("ACCPER").unwrap()[0].as_deref(), Some("06"));
        assert_eq!(
            table.strings("NCCSKEY2").unwrap()[0].as_deref(),
            Some("0100000012015")
        );
        assert_eq!(table.strings("NTMAJ12").unwrap()[0].as_deref(), Some("BH"));
        assert_eq!(table.strings("LEVEL1").unwrap()[0].as_deref(), Some("PC"));
        assert_eq!(table.strings("LEVEL4").unwrap()[0].as_deref(), Some("B"));
    }

    #[test]
    fn missing_period_is_a_precondition_failure() {
        let mut table = RecordTable::new("PF", df!("EIN" => &["1"]).unwrap()).unwrap();
        let err = common_rules().execute(&mut ctx(), &mut table).unwrap_err();
        assert!(matches!(err, NccsError::Precondition { .. }));
    }

    #[test]
    fn epostcard_flag_compares_years() {
        let mut table = RecordTable::new(
            "Full",
            df!(
                "EIN" => &["1", "2", "3"],
                "TAXPER" => &["201512", "201512", "201412"],
                "EPOSTCARD" => &[Some("2015"), None, Some("2015")],
                "SUBSECCD" => &["03", "03", "04"],
            )
            .unwrap(),
        )
        .unwrap();
        let mut ctx = ctx();
        common_rules().execute(&mut ctx, &mut table).unwrap();
        charity_rules().execute(&mut ctx, &mut table).unwrap();
        assert_eq!(
            table.strings("EPOSTCARD").unwrap(),
            vec![Some("1".into()), Some("0".into()), Some("0".into())]
        );
        assert_eq!(table.strings("SOIYR").unwrap()[2].as_deref(), Some("2014"));
    }
}
