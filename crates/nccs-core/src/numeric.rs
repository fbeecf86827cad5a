//! Catalogue of columns that hold numbers.
//!
//! Extracts arrive as text. Every column listed here is recast to `Float64`
//! before the computed columns run, when a prior release is loaded without a
//! template, and when a fix batch is read back.

use crate::frame::RecordTable;
use nccs_model::Result;

pub const NUMERIC_COLUMNS: &[&str] = &[
    "ACCNTINGFEES", "ACCNTSPAYABLEEND", "ACCNTSRCVBLEND", "ADVRTPROMO", "ASS_EOY",
    "BENIFITSMEMBRS", "BOND_EOY", "COMPENS", "COMPNSATNANDOTHR", "CONT", "CONVERCONVENTMTNG",
    "CURRFRMRCVBLEND", "DEFEREDREVNUEND", "DEPRCATNDEPLETN", "DIREXP", "DUESASSESMNTS",
    "ESCRWACCNTLIABEND", "EXPS", "FEESFORSRVCLOBBY", "FEESFORSRVCMGMT", "FEESFORSRVCINVSTMGMT",
    "FEESFORSRVCOTHR", "FISYR", "FUNDBAL", "FUNDFEES", "GOODS", "GRNSTTOINDIV",
    "GRNTSPAYABLEEND", "GRNTSTOFRGNGOVT", "GRNTSTOGOVT", "GRPROF", "GRSINCFNDRSNG",
    "GRSINCGAMING", "GRSRNTSPRSNL", "GRSRNTSREAL", "INFOTECH", "INSURANCE",
    "INTANGIBLEASSETSEND", "INTERESTAMT", "INVENTG", "INVINC", "INVNTRIESALESEND",
    "INVSTMNTSEND", "INVSTMNTSOTHREND", "INVSTMNTSPRGMEND", "LEGALFEES", "LESSDIRFNDRSNG",
    "LESSDIRGAMING", "LIAB_EOY", "LNDBLDGSEQUIPEND", "MISCREVTOTA", "MISCREVTOT11B",
    "MISCREVTOT11C", "MISCREVTOT11D", "MRTG_EOY", "NETGNLS", "NETINC", "NETINCFNDRSNG",
    "NETINCGAMING", "NETRENT", "NONINTCASHEND", "NOTESLOANSRCVBLEND", "OCCUPANCY",
    "OFFICEXPNS", "OTHINC", "OTHRASSETSEND", "OTHREMPLYEEBENEF", "OTHREXPNSA", "OTHREXPNSB",
    "OTHREXPNSC", "OTHREXPNSD", "OTHREXPNSE", "OTHREXPNSF", "OTHRLIABEND", "OTHSAL", "OVERPAY",
    "P1TOTEXP", "P1TOTREV", "P2TASFMV", "P2TOTAST", "P6ESTTX", "P6TEXCTX", "P6TXINV",
    "P6TXPNLT", "P6TXWERR", "P6TXWTH", "PAYBLETOFFCRSEND", "PAYTAX", "PENSIONPLANCONTRB",
    "PLDGEGRNTRCVBLEND", "PREPAIDEXPNSEND", "PRGMSERVREV", "PROGREV", "PYMTOAFFILIATES",
    "RCVBLDISQUALEND", "RNTLEXPNSPRSNL", "RNTLEXPNSREAL", "RNTLINCREAL", "RNTLINCPRSNL",
    "ROYALTSEXPNS", "ROYALTSINC", "SALEOTHE", "SALEOTHG", "SALEOTHN", "SALESECN", "SALESEXP",
    "STYEAR", "SVNGSTEMPINVEND", "TAXDUE", "TOTEXCAPGN", "TOTEXCAPLS", "TOTNETLIABASTEND",
    "TOTREV", "TOTREV2", "TOTREV2ACOLA", "TOTREV2BCOLA", "TOTREV2CCOLA", "TOTREV2DCOLA",
    "TOTREV2ECOLA", "TOTREV2FCOLA", "TRAVEL", "TRAVELOFPUBLICOFFCL", "TXEXMPTBNDSPROCEEDS",
    "UNSECUREDNOTESEND", "P1TCONT", "P1INTREV", "P1DIVID", "P1GRENTS", "P1NGASTS", "P1GINVPF",
    "P1OTHINC", "P1ADMEXP", "P1CONTPD", "P1EXCREV", "P14TNADJ", "P14NADJA", "P14NADJB",
    "P14NADJC", "P14NADJD", "P14TQDIS", "P14QDISA", "P14QDISB", "P14QDISC", "P14QDISD",
    "P14TASVL", "P14ASVLA", "P14ASVLB", "P14ASVLC", "P14ASVLD", "P14T4942", "P14A4942",
    "P14B4942", "P14C4942", "P14D4942", "P14TENDW", "P14ENDWA", "P14ENDWB", "P14ENDWC",
    "P14ENDWD", "P14TTSUP", "P14TSUPA", "P14TSUPB", "P14TSUPC", "P14TSUPD", "P14TPSUP",
    "P14PSUPA", "P14PSUPB", "P14PSUPC", "P14PSUPD", "P14TGINV", "P14GINVA", "P14GINVB",
    "P14GINVC", "P14GINVD", "P2TINVSC", "P2GVTINV", "P2CRPSTK", "P2CRPBND", "TOTREVP", "EXPSP",
    "ASS_BOY",
];

/// Prior-year columns that must be numeric on charity forms.
pub const PRIOR_NUMERIC_COLUMNS: &[&str] = &["TOTREVP", "EXPSP", "ASS_BOY"];

/// Catalogue columns present on `table`, in catalogue order.
pub fn numeric_columns_in(table: &RecordTable) -> Vec<&'static str> {
    NUMERIC_COLUMNS
        .iter()
        .copied()
        .filter(|name| table.has_column(name))
        .collect()
}

/// Recasts every catalogue column on `table`. Returns how many were recast.
pub fn make_numeric(table: &mut RecordTable, fill: Option<f64>) -> Result<usize> {
    let columns = numeric_columns_in(table);
    table.coerce_numeric(&columns, fill)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    #[test]
    fn catalogue_has_no_repeats() {
        let mut names: Vec<&str> = NUMERIC_COLUMNS.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), NUMERIC_COLUMNS.len());
    }

    #[test]
    fn only_catalogued_columns_are_recast() {
        let mut table = RecordTable::new(
            "EZ",
            df!("EIN" => &["1"], "TOTREV" => &["N"], "NAME" => &["0"]).unwrap(),
        )
        .unwrap();
        assert_eq!(make_numeric(&mut table, Some(0.0)).unwrap(), 1);
        assert_eq!(table.numbers("TOTREV").unwrap(), vec![Some(0.0)]);
        assert!(!table.is_numeric("NAME"));
    }
}
