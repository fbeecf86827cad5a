//! Assembly of release-form tables from source-form tables.

use std::collections::BTreeMap;

use nccs_model::validation::SOURCE;
use nccs_model::{NccsError, ReleaseForm, Result, SourceForm};
use tracing::info;

use crate::enrich::SourceTables;
use crate::frame::{RecordTable, concat_diagonal};

pub type ReleaseTables = BTreeMap<ReleaseForm, RecordTable>;

/// `SUBSECCD` of 501(c)(3) public charities.
pub const CHARITY_SUBSECTION: &str = "03";

fn split_by_subsection(table: &RecordTable) -> Result<(RecordTable, RecordTable)> {
    let charity: Vec<bool> = if table.has_column("SUBSECCD") {
        table
            .strings("SUBSECCD")?
            .iter()
            .map(|value| value.as_deref() == Some(CHARITY_SUBSECTION))
            .collect()
    } else {
        vec![false; table.record_count()]
    };
    let other: Vec<bool> = charity.iter().map(|c| !c).collect();
    Ok((table.filtered(&charity)?, table.filtered(&other)?))
}

fn combine(form: ReleaseForm, parts: &[RecordTable]) -> Result<RecordTable> {
    let frames: Vec<_> = parts.iter().map(|part| part.data.clone()).collect();
    let mut table = RecordTable::new(form.code(), concat_diagonal(&frames)?)?;
    table.fill_missing()?;
    Ok(table)
}

/// Splits and recombines source tables into `PF`, `PC` and `CO`.
///
/// `PC` takes the EZ and Full rows with `SUBSECCD == '03'`, `CO` the rest.
/// EZ without Full cannot produce either table and is rejected.
pub fn build_output(sources: SourceTables) -> Result<ReleaseTables> {
    let mut sources = sources;
    let mut releases = ReleaseTables::new();

    if let Some(pf) = sources.remove(&SourceForm::Pf) {
        info!(rows = pf.record_count(), "building PF file from PF source");
        releases.insert(
            ReleaseForm::Pf,
            RecordTable {
                form: ReleaseForm::Pf.code().to_string(),
                data: pf.data,
            },
        );
    }

    match (sources.remove(&SourceForm::Ez), sources.remove(&SourceForm::Full)) {
        (Some(ez), Some(full)) => {
            let (ez_pc, ez_co) = split_by_subsection(&ez)?;
            let (full_pc, full_co) = split_by_subsection(&full)?;
            let pc = combine(ReleaseForm::Pc, &[ez_pc, full_pc])?;
            info!(rows = pc.record_count(), "built PC file from Full and EZ sources");
            let co = combine(ReleaseForm::Co, &[ez_co, full_co])?;
            info!(rows = co.record_count(), "built CO file from Full and EZ sources");
            releases.insert(ReleaseForm::Pc, pc);
            releases.insert(ReleaseForm::Co, co);
        }
        (Some(_), None) => {
            return Err(NccsError::Config(
                "form 990EZ without form 990 cannot build the CO or PC files".to_string(),
            ));
        }
        // Full alone is carried no further: CO and PC need both sources.
        (None, _) => {}
    }

    Ok(releases)
}

/// Cuts the rows of a charity release that came from the full 990.
pub fn full_form_cut(form: ReleaseForm, table: &RecordTable) -> Result<RecordTable> {
    let sources = if table.has_column(SOURCE) {
        table.strings(SOURCE)?
    } else {
        vec![None; table.record_count()]
    };
    let mask: Vec<bool> = sources
        .iter()
        .map(|source| {
            source
                .as_deref()
                .is_some_and(|source| SourceForm::Full.matches_source(source))
        })
        .collect();
    let mut cut = table.filtered(&mask)?;
    cut.form = form.code().to_string();
    cut.ensure_unique()?;
    Ok(cut)
}

/// Adds `CO_full` and `PC_full` cut from deduplicated `CO` and `PC`.
pub fn add_full_forms(releases: &mut ReleaseTables) -> Result<()> {
    for form in [ReleaseForm::CoFull, ReleaseForm::PcFull] {
        if let Some(base) = releases.get(&form.base()) {
            let cut = full_form_cut(form, base)?;
            info!(form = %form, rows = cut.record_count(), "cut full 990 rows");
            releases.insert(form, cut);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn source(form: &str, rows: DataFrame) -> RecordTable {
        RecordTable::new(form, rows).unwrap()
    }

    #[test]
    fn charities_split_on_subsection() {
        let mut sources = SourceTables::new();
        sources.insert(
            SourceForm::Ez,
            source(
                "EZ",
                df!(
                    "EIN" => &["1", "2"],
                    "SUBSECCD" => &["03", "04"],
                    "SOURCE" => &["15eofinextractez.dat", "15eofinextractez.dat"],
                    "GOODS" => &[1.0, 2.0],
                )
                .unwrap(),
            ),
        );
        sources.insert(
            SourceForm::Full,
            source(
                "Full",
                df!(
                    "EIN" => &["3"],
                    "SUBSECCD" => &["03"],
                    "SOURCE" => &["15eofinextract990.dat"],
                )
                .unwrap(),
            ),
        );
        let releases = build_output(sources).unwrap();
        let pc = &releases[&ReleaseForm::Pc];
        assert_eq!(pc.eins().unwrap(), vec!["1", "3"]);
        assert_eq!(pc.numbers("GOODS").unwrap(), vec![Some(1.0), Some(0.0)]);
        assert_eq!(releases[&ReleaseForm::Co].eins().unwrap(), vec!["2"]);
        assert!(!releases.contains_key(&ReleaseForm::Pf));

        let mut releases = releases;
        add_full_forms(&mut releases).unwrap();
        assert_eq!(releases[&ReleaseForm::PcFull].eins().unwrap(), vec!["3"]);
        assert_eq!(releases[&ReleaseForm::CoFull].record_count(), 0);
    }

    #[test]
    fn ez_without_full_is_rejected() {
        let mut sources = SourceTables::new();
        sources.insert(SourceForm::Ez, source("EZ", df!("EIN" => &["1"]).unwrap()));
        assert!(matches!(build_output(sources), Err(NccsError::Config(_))));
    }
}
