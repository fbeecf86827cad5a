//! Identity catalogue: reviewer-facing equations and the balanced-row round trip.

use std::collections::BTreeMap;

use nccs_core::RecordTable;
use nccs_model::validation::SOURCE;
use nccs_model::{ReleaseForm, ValidationOutcome};
use nccs_validate::ValidationEngine;
use nccs_validate::identities::{EZ_SET, FULL_SET, Identity, IdentitySet, PF_SET};
use polars::prelude::*;
use proptest::prelude::*;

fn displays(set: &IdentitySet) -> String {
    set.identities
        .iter()
        .map(|identity| format!("{}: {}", set.column(identity), identity.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn ez_equations() {
    insta::assert_snapshot!(displays(&EZ_SET), @r"
    validate_ez_saleothn: SALEOTHN - (SALEOTHG - SALEOTHE)
    validate_ez_netincfndrsng: NETINCFNDRSNG - (GRSINCGAMING + GRSINCFNDRSNG - DIREXP)
    validate_ez_grprof: GRPROF - (INVENTG - GOODS)
    validate_ez_totrev: TOTREV - (CONT + PRGMSERVREV + DUESASSESMNTS + INVINC + SALEOTHN + NETINCFNDRSNG + GRPROF + OTHINC)
    validate_ez_netinc: NETINC - (TOTREV - EXPS)
    validate_ez_ass_eoy: ASS_EOY - (LIAB_EOY + FUNDBAL)
    ");
}

#[test]
fn full_equations() {
    insta::assert_snapshot!(displays(&FULL_SET), @r"
    validate_fu_netrent: NETRENT - (RNTLINCREAL + RNTLINCPRSNL)
    validate_fu_netgnls: NETGNLS - (SALESECN + SALEOTHN)
    validate_fu_netincfndrsng: NETINCFNDRSNG - (GRSINCFNDRSNG - LESSDIRFNDRSNG)
    validate_fu_netincgaming: NETINCGAMING - (GRSINCGAMING - LESSDIRGAMING)
    validate_fu_grprof: GRPROF - (INVENTG - GOODS)
    validate_fu_totrev2: TOTREV2 - (CONT + PROGREV + INVINC + TXEXMPTBNDSPROCEEDS + ROYALTSINC + NETRENT + NETGNLS + NETINCFNDRSNG + NETINCGAMING + GRPROF + OTHINC)
    validate_fu_fundbal: FUNDBAL - (ASS_EOY - LIAB_EOY)
    ");
}

#[test]
fn foundation_equations() {
    insta::assert_snapshot!(displays(&PF_SET), @r"
    validate_pf_p1totrev: P1TOTREV - (P1TCONT + P1INTREV + P1DIVID + P1GRENTS + P1NGASTS + P1GINVPF + P1OTHINC)
    validate_pf_p1totexp: P1TOTEXP - (P1ADMEXP + P1CONTPD)
    validate_pf_p1excrev: P1EXCREV - (P1TOTREV - P1TOTEXP)
    validate_pf_p2tinvsc: P2TINVSC - (P2GVTINV + P2CRPSTK + P2CRPBND)
    validate_pf_p14tnadj: P14TNADJ - (P14NADJA + P14NADJB + P14NADJC + P14NADJD)
    validate_pf_p14tqdis: P14TQDIS - (P14QDISA + P14QDISB + P14QDISC + P14QDISD)
    validate_pf_p14tasvl: P14TASVL - (P14ASVLA + P14ASVLB + P14ASVLC + P14ASVLD)
    validate_pf_p14t4942: P14T4942 - (P14A4942 + P14B4942 + P14C4942 + P14D4942)
    validate_pf_p14tendw: P14TENDW - (P14ENDWA + P14ENDWB + P14ENDWC + P14ENDWD)
    validate_pf_p14ttsup: P14TTSUP - (P14TSUPA + P14TSUPB + P14TSUPC + P14TSUPD)
    validate_pf_p14tpsup: P14TPSUP - (P14PSUPA + P14PSUPB + P14PSUPC + P14PSUPD)
    validate_pf_p14tginv: P14TGINV - (P14GINVA + P14GINVB + P14GINVC + P14GINVD)
    ");
}

/// Fills every operand with `seed` values, then sets each target to its sum in
/// catalogue order, so later identities see the balanced earlier targets.
fn balanced_row(identities: &[Identity], seed: &[i32]) -> BTreeMap<&'static str, f64> {
    let mut row = BTreeMap::new();
    let mut next = seed.iter().cycle();
    for identity in identities {
        for column in identity.columns() {
            row.entry(column)
                .or_insert_with(|| f64::from(*next.next().unwrap_or(&0)));
        }
    }
    for identity in identities {
        let target = identity.target;
        let residual = identity
            .residual(|name| row.get(name).copied())
            .expect("every operand is set");
        let balanced = row[target] - residual;
        row.insert(target, balanced);
    }
    row
}

fn table(form: &str, source: &str, rows: &[BTreeMap<&'static str, f64>]) -> RecordTable {
    let mut columns = vec![
        Column::new(
            "EIN".into(),
            (0..rows.len()).map(|i| format!("{i:09}")).collect::<Vec<_>>(),
        ),
        Column::new(SOURCE.into(), vec![source; rows.len()]),
    ];
    for name in rows[0].keys() {
        columns.push(Column::new(
            (*name).into(),
            rows.iter().map(|row| row[name]).collect::<Vec<f64>>(),
        ));
    }
    RecordTable::new(form, DataFrame::new(columns).expect("frame")).expect("table")
}

fn assert_round_trip(
    form: ReleaseForm,
    source: &str,
    set: &IdentitySet,
    seeds: &[Vec<i32>],
) -> Result<(), TestCaseError> {
    let rows: Vec<_> = seeds
        .iter()
        .map(|seed| balanced_row(set.identities, seed))
        .collect();
    let mut records = table(form.code(), source, &rows);
    let result = ValidationEngine::new(0.0, false)
        .validate(form, &mut records, 0)
        .expect("validate");
    prop_assert_eq!(result.report.outcome, ValidationOutcome::Passed);
    for identity in set.identities {
        let residuals = records.numbers(&set.column(identity)).expect("residuals");
        prop_assert!(residuals.iter().all(|r| *r == Some(0.0)));
    }
    Ok(())
}

fn seeds() -> impl Strategy<Value = Vec<Vec<i32>>> {
    prop::collection::vec(prop::collection::vec(-1_000_000i32..1_000_000, 1..12), 1..8)
}

proptest! {
    #[test]
    fn balanced_ez_rows_have_zero_residuals(seeds in seeds()) {
        assert_round_trip(ReleaseForm::Co, "16eofinextractEZ.dat", &EZ_SET, &seeds)?;
    }

    #[test]
    fn balanced_full_rows_have_zero_residuals(seeds in seeds()) {
        assert_round_trip(ReleaseForm::Pc, "16eofinextract990.dat", &FULL_SET, &seeds)?;
    }

    #[test]
    fn balanced_foundation_rows_have_zero_residuals(seeds in seeds()) {
        assert_round_trip(ReleaseForm::Pf, "16eofinextract990PF.dat", &PF_SET, &seeds)?;
    }
}

#[test]
fn sub_form_identities_leave_other_rows_empty() {
    let rows = vec![balanced_row(EZ_SET.identities, &[5, 7, 11])];
    let mut records = table("CO", "16eofinextract990.dat", &rows);
    ValidationEngine::new(0.0, false)
        .compute_residuals(ReleaseForm::Co, &mut records)
        .expect("residuals");
    assert_eq!(
        records.numbers("validate_ez_netinc").expect("column"),
        vec![None]
    );
}
