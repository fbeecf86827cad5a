//! One-year-prior merge for the charity release forms.
//!
//! Selected columns of last year's release are renamed (`TOTREV` becomes
//! `TOTREVP`, `ASS_EOY` becomes `ASS_BOY`, ...) and left-merged on `EIN`.
//! Rows whose prior fiscal year is not exactly one behind the current one
//! have every merged column nulled and `INPRIOR = '0'`.

use nccs_ingest::{DtypeTemplate, ReferenceRequest, ReferenceSource};
use nccs_model::validation::EIN;
use nccs_model::{ReleaseForm, Result, SourceForm};
use tracing::info;

use crate::frame::RecordTable;
use crate::numeric::PRIOR_NUMERIC_COLUMNS;
use crate::pipeline_context::PipelineContext;
use crate::release::ReleaseTables;

/// Columns pulled from the prior release, `EIN` first.
pub const PRIOR_COLUMNS: &[&str] = &[
    "EIN", "ASS_EOY", "BOND_EOY", "MRTG_EOY", "LIAB_EOY", "TAXPER", "FISYR", "PROGREV", "INVINC",
    "NETRENT", "SALESECN", "SALEOTHN", "FUNDINC", "GRPROF", "OTHINC", "TOTREV", "EXPS", "NETINC",
    "COMPENS", "OTHSAL", "PAYTAX", "FUNDFEES", "CONT", "RETEARN", "FUNDBAL", "SOURCE",
];

/// Name a prior-release column takes on the current table.
pub fn prior_name(column: &str) -> String {
    let suffixed = format!("{column}P");
    match suffixed.as_str() {
        "RETEARNP" => "RETE_BOY".to_string(),
        "FUNDBALP" => "NETA_BOY".to_string(),
        "SOURCEP" => "INPRIORSRC".to_string(),
        _ => suffixed.replace("EOYP", "BOY"),
    }
}

/// Merges a prior-release frame into `table` and enforces `FISYRP == FISYR - 1`.
///
/// Returns the number of rows linked to the prior year.
pub fn link_prior(table: &mut RecordTable, prior: RecordTable) -> Result<usize> {
    let mut prior = prior;
    let renames: Vec<(String, String)> = PRIOR_COLUMNS[1..]
        .iter()
        .map(|column| (column.to_string(), prior_name(column)))
        .collect();
    prior.rename(renames.iter().map(|(old, new)| (old.as_str(), new.as_str())))?;
    let added = table.left_merge(&prior.data, EIN, EIN)?;

    let fisyr = table.numbers_or_null("FISYR")?;
    let fisyrp = if table.has_column("FISYRP") {
        table.coerce_numeric(&["FISYRP"], None)?;
        table.numbers("FISYRP")?
    } else {
        vec![None; table.record_count()]
    };
    let linked: Vec<bool> = fisyr
        .iter()
        .zip(&fisyrp)
        .map(|(current, prior)| match (current, prior) {
            (Some(current), Some(prior)) => *current == prior + 1.0,
            _ => false,
        })
        .collect();

    for column in &added {
        if table.is_numeric(column) {
            let values = table
                .numbers(column)?
                .into_iter()
                .zip(&linked)
                .map(|(value, ok)| if *ok { value } else { None })
                .collect();
            table.set_numbers(column, values)?;
        } else {
            let values = table
                .strings(column)?
                .into_iter()
                .zip(&linked)
                .map(|(value, ok)| if *ok { value } else { None })
                .collect();
            table.set_strings(column, values)?;
        }
    }
    table.set_strings(
        "INPRIOR",
        linked
            .iter()
            .map(|ok| Some(if *ok { "1" } else { "0" }.to_string()))
            .collect(),
    )?;
    table.coerce_numeric(PRIOR_NUMERIC_COLUMNS, None)?;
    Ok(linked.iter().filter(|ok| **ok).count())
}

/// Loads last year's CO and PC releases and links them to this year's rows.
///
/// Runs only when EZ is among the processed forms.
pub fn merge_prior_year(ctx: &mut PipelineContext, releases: &mut ReleaseTables) -> Result<()> {
    if !ctx.options.includes(SourceForm::Ez) {
        return Ok(());
    }
    let year = ctx.release_year() - 1;
    for form in [ReleaseForm::Co, ReleaseForm::Pc] {
        let Some(table) = releases.get_mut(&form) else {
            continue;
        };
        let name = format!("core{year}{}", form.stem());
        info!(form = %form, table = %name, "loading prior release");
        let request = ReferenceRequest::new(&name, form.database())
            .with_columns(PRIOR_COLUMNS)
            .with_index(EIN)
            .with_template(DtypeTemplate::from_frame(&table.data));
        let prior = RecordTable::new(name, ctx.references.fetch(&request)?)?;
        let linked = link_prior(table, prior)?;
        info!(form = %form, linked, rows = table.record_count(), "merged prior year");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn renames_follow_balance_conventions() {
        assert_eq!(prior_name("ASS_EOY"), "ASS_BOY");
        assert_eq!(prior_name("TOTREV"), "TOTREVP");
        assert_eq!(prior_name("RETEARN"), "RETE_BOY");
        assert_eq!(prior_name("FUNDBAL"), "NETA_BOY");
        assert_eq!(prior_name("SOURCE"), "INPRIORSRC");
    }

    #[test]
    fn unlinked_rows_lose_prior_values() {
        let mut table = RecordTable::new(
            "PC",
            df!("EIN" => &["1", "2", "3"], "FISYR" => &[2015.0, 2015.0, 2015.0]).unwrap(),
        )
        .unwrap();
        let prior = RecordTable::new(
            "core2014pc",
            df!(
                "EIN" => &["1", "2"],
                "FISYR" => &["2014", "2012"],
                "TOTREV" => &["10", "20"],
                "SOURCE" => &["14eofinextract990.dat", "12eofinextract990.dat"],
            )
            .unwrap(),
        )
        .unwrap();
        let linked = link_prior(&mut table, prior).unwrap();
        assert_eq!(linked, 1);
        assert_eq!(
            table.numbers("TOTREVP").unwrap(),
            vec![Some(10.0), None, None]
        );
        assert_eq!(
            table.strings("INPRIOR").unwrap(),
            vec![Some("1".into()), Some("0".into()), Some("0".into())]
        );
        assert_eq!(
            table.strings("INPRIORSRC").unwrap()[0].as_deref(),
            Some("14eofinextract990.dat")
        );
    }
}
