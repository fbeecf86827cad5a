//! Reference data merged into the source forms.
//!
//! All merges are left merges: rows of the source tables are never dropped or
//! duplicated, and columns already on a table are never overwritten.

use std::collections::BTreeMap;

use nccs_ingest::polars_utils::{column_names, column_strings};
use nccs_ingest::{DelimitedOptions, ReferenceRequest, ReferenceSource, read_delimited_table};
use nccs_model::validation::EIN;
use nccs_model::{NccsError, Result, SourceForm};
use polars::prelude::*;
use tracing::info;

use crate::frame::{RecordTable, concat_diagonal};
use crate::pipeline_context::PipelineContext;

/// Columns of the NTEE master file merged into every form.
pub const NTEE_COLUMNS: &[&str] = &[
    "EIN", "OutNccs", "OutReas", "NteeFinal", "Fips", "NteeCC", "NteeSrc", "NteeConf", "FndnCd",
    "NAICS", "LONGITUDE", "LATITUDE", "zip5", "Name", "Address", "City", "State", "NteeIrs",
    "RuleDate", "ClassCd", "censusTract", "block",
];

pub const FIPSMSA_COLUMNS: &[&str] = &["FIPS", "PMSA", "MSA_NECH"];

/// BMF header renames.
pub const BMF_RENAMES: &[(&str, &str)] = &[
    ("ORGANIZATION", "ORGCD"),
    ("AFFILIATION", "AFCD"),
    ("DEDUCTIBILITY", "DEDUCTCD"),
    ("ICO", "CONTACT"),
    ("SORT_NAME", "SEC_NAME"),
    ("ASSET_CD", "ASS_CODE"),
    ("INCOME_CD", "INC_CODE"),
    ("STATUS", "EOSTATUS"),
];

/// BMF columns every form receives.
pub const BMF_SHARED: &[&str] = &[
    "ORGCD", "ZIP", "AFCD", "DEDUCTCD", "CONTACT", "SEC_NAME", "FRCD", "ACTIV1", "ACTIV2",
    "ACTIV3",
];
pub const BMF_CHARITY: &[&str] = &["EOSTATUS"];
pub const BMF_FOUNDATION: &[&str] = &["ASS_CODE", "INC_CODE"];

pub type SourceTables = BTreeMap<SourceForm, RecordTable>;

/// Upper-cases every header of a frame.
fn upper_case_headers(df: &mut DataFrame) -> Result<()> {
    for name in column_names(df) {
        let upper = name.to_uppercase();
        if upper != name && !column_names(df).contains(&upper) {
            df.rename(&name, upper.into())?;
        }
    }
    Ok(())
}

fn map_text_column(
    df: &mut DataFrame,
    name: &str,
    f: impl Fn(&str) -> String,
) -> Result<()> {
    if !column_names(df).iter().any(|column| column == name) {
        return Ok(());
    }
    let values: Vec<Option<String>> = column_strings(df, name)?
        .into_iter()
        .map(|value| value.map(|value| f(&value)))
        .collect();
    df.with_column(Series::new(name.into(), values))?;
    Ok(())
}

/// Loads the NTEE master table and merges it on `EIN`.
pub fn merge_ntee(ctx: &mut PipelineContext, tables: &mut SourceTables) -> Result<()> {
    let Some(table_name) = ctx.options.reference.ntee.clone() else {
        return Ok(());
    };
    info!(table = %table_name, "loading master NTEE data");
    let request = ReferenceRequest::new(table_name.as_str(), "nccs")
        .with_columns(NTEE_COLUMNS)
        .with_index(EIN);
    let mut ntee = ctx.references.fetch(&request)?;
    upper_case_headers(&mut ntee)?;
    map_text_column(&mut ntee, EIN, |ein| ein.replace('-', ""))?;

    for (form, table) in tables.iter_mut() {
        let added = table.left_merge(&ntee, EIN, EIN)?;
        info!(form = %form, columns = added.len(), "merged NTEE columns");
    }
    Ok(())
}

/// Merges the FIPS to metro area lookup on `FIPS`.
///
/// Runs after [`merge_ntee`], which supplies `FIPS`.
pub fn merge_fipsmsa(ctx: &mut PipelineContext, tables: &mut SourceTables) -> Result<()> {
    let Some(table_name) = ctx.options.reference.fipsmsa.clone() else {
        return Ok(());
    };
    let request = ReferenceRequest::new(table_name.as_str(), "nccs").with_columns(FIPSMSA_COLUMNS);
    let mut fipsmsa = ctx.references.fetch(&request)?;
    upper_case_headers(&mut fipsmsa)?;
    for (form, table) in tables.iter_mut() {
        let added = table.left_merge(&fipsmsa, "FIPS", "FIPS")?;
        info!(form = %form, columns = added.len(), "merged FIPSMSA columns");
    }
    Ok(())
}

/// Reads the headerless, pipe-delimited e-Postcard file as `EIN, EPOSTCARD`.
///
/// Rows without a year are dropped.
pub fn read_epostcard(path: &std::path::Path) -> Result<DataFrame> {
    let options = DelimitedOptions::default()
        .with_separator(b'|')
        .headerless(&[EIN, "EPOSTCARD"]);
    let df = read_delimited_table(path, &options)?;
    let df = df.select([EIN, "EPOSTCARD"])?;
    let keep: Vec<bool> = column_strings(&df, "EPOSTCARD")?
        .iter()
        .map(|year| year.as_deref().is_some_and(|year| !year.trim().is_empty()))
        .collect();
    Ok(df.filter(&BooleanChunked::from_slice("epostcard".into(), &keep))?)
}

/// Merges the e-Postcard filing year into EZ and Full as `EPOSTCARD`.
pub fn merge_epostcard(ctx: &mut PipelineContext, tables: &mut SourceTables) -> Result<()> {
    let Some(file_name) = ctx.options.sources.epostcard.clone() else {
        return Ok(());
    };
    if !tables.contains_key(&SourceForm::Ez) && !tables.contains_key(&SourceForm::Full) {
        return Ok(());
    }
    let path = ctx.layout.irs_downloads().join(&file_name);
    if !path.is_file() {
        return Err(NccsError::MissingSource {
            what: "e-Postcard file".to_string(),
            path,
        });
    }
    let epostcard = read_epostcard(&path)?;
    for form in [SourceForm::Full, SourceForm::Ez] {
        if let Some(table) = tables.get_mut(&form) {
            table.left_merge(&epostcard, EIN, EIN)?;
            info!(form = %form, "merged EPOSTCARD data");
        }
    }
    Ok(())
}

/// Derives the BMF columns the core files carry.
pub fn prepare_bmf(mut bmf: DataFrame) -> Result<DataFrame> {
    upper_case_headers(&mut bmf)?;
    for (old, new) in BMF_RENAMES {
        let names = column_names(&bmf);
        if names.iter().any(|name| name == old) && !names.iter().any(|name| name == new) {
            bmf.rename(old, (*new).into())?;
        }
    }
    map_text_column(&mut bmf, "CONTACT", |contact| {
        contact.trim_start_matches('%').trim_start().to_string()
    })?;

    let rows = bmf.height();
    let text = |df: &DataFrame, name: &str| -> Result<Vec<Option<String>>> {
        if column_names(df).iter().any(|column| column == name) {
            Ok(column_strings(df, name)?)
        } else {
            Ok(vec![None; rows])
        }
    };
    let filing = text(&bmf, "FILING_REQ_CD")?;
    let pf_filing = text(&bmf, "PF_FILING_REQ_CD")?;
    let frcd: Vec<Option<String>> = filing
        .into_iter()
        .zip(pf_filing)
        .map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) => Some(format!("{a}{b}")),
            _ => None,
        })
        .collect();
    bmf.with_column(Series::new("FRCD".into(), frcd))?;

    let activity = text(&bmf, "ACTIVITY")?;
    for (idx, name) in ["ACTIV1", "ACTIV2", "ACTIV3"].into_iter().enumerate() {
        let values: Vec<Option<String>> = activity
            .iter()
            .map(|value| {
                value
                    .as_deref()
                    .map(|value| value.chars().skip(idx * 3).take(3).collect())
            })
            .collect();
        bmf.with_column(Series::new(name.into(), values))?;
    }

    let mut keep = vec![EIN];
    keep.extend(BMF_SHARED);
    keep.extend(BMF_CHARITY);
    keep.extend(BMF_FOUNDATION);
    let present: Vec<&str> = keep
        .into_iter()
        .filter(|name| column_names(&bmf).iter().any(|column| column == name))
        .collect();
    Ok(bmf.select(present)?)
}

/// Reads the configured BMF files and merges their columns on `EIN`.
pub fn merge_bmf(ctx: &mut PipelineContext, tables: &mut SourceTables) -> Result<()> {
    let files = ctx.options.sources.bmf.clone();
    if files.is_empty() {
        return Ok(());
    }
    let mut frames = Vec::with_capacity(files.len());
    for file_name in &files {
        let path = ctx.layout.irs_downloads().join(file_name);
        if !path.is_file() {
            return Err(NccsError::MissingSource {
                what: "BMF file".to_string(),
                path,
            });
        }
        frames.push(read_delimited_table(&path, &DelimitedOptions::default())?);
    }
    let bmf = prepare_bmf(concat_diagonal(&frames)?)?;

    for (form, table) in tables.iter_mut() {
        let extra = if *form == SourceForm::Pf {
            BMF_FOUNDATION
        } else {
            BMF_CHARITY
        };
        let wanted: Vec<&str> = std::iter::once(EIN)
            .chain(BMF_SHARED.iter().copied())
            .chain(extra.iter().copied())
            .filter(|name| column_names(&bmf).iter().any(|column| column == name))
            .collect();
        let subset = bmf.select(wanted)?;
        table.left_merge(&subset, EIN, EIN)?;
        info!(form = %form, "merged BMF data");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bmf_columns_are_derived() {
        let bmf = df!(
            "EIN" => &["1"],
            "ICO" => &["% JANE DOE"],
            "FILING_REQ_CD" => &["01"],
            "PF_FILING_REQ_CD" => &["0"],
            "ACTIVITY" => &["001002003"],
            "STATUS" => &["01"],
            "ASSET_CD" => &["3"],
        )
        .unwrap();
        let out = prepare_bmf(bmf).unwrap();
        assert_eq!(
            column_strings(&out, "CONTACT").unwrap(),
            vec![Some("JANE DOE".to_string())]
        );
        assert_eq!(column_strings(&out, "FRCD").unwrap()[0].as_deref(), Some("010"));
        assert_eq!(column_strings(&out, "ACTIV3").unwrap()[0].as_deref(), Some("003"));
        assert!(column_names(&out).contains(&"EOSTATUS".to_string()));
        assert!(!column_names(&out).contains(&"ACTIVITY".to_string()));
    }

    #[test]
    fn headers_are_upper_cased() {
        let mut df = df!("NteeFinal" => &["A"], "EIN" => &["1"]).unwrap();
        upper_case_headers(&mut df).unwrap();
        assert_eq!(column_names(&df), vec!["NTEEFINAL", "EIN"]);
    }
}
