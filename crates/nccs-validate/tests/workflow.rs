//! Validation runs over a temporary workspace: exports, fix batches, gating.

use std::fs;

use nccs_core::{PipelineContext, RecordTable, ReleaseTables};
use nccs_ingest::{WorkspaceLayout, write_csv_table};
use nccs_model::validation::{SOURCE, VALIDATION_REASON, VALIDATION_STATE};
use nccs_model::{PipelineOptions, ReleaseForm, SourceForm, ValidationOutcome};
use nccs_validate::review::load_export;
use nccs_validate::{
    FixBatch, GatingDecision, ReviewQuery, ValidationEngine, gate_release, review_queue,
    validate_releases, write_run_report,
};
use polars::prelude::*;
use proptest::prelude::*;
use tempfile::TempDir;

const YEAR: i32 = 2015;

fn context(dir: &TempDir) -> PipelineContext {
    let mut options = PipelineOptions::new(YEAR).with_forms(&[SourceForm::Pf]);
    options.partial_validation = false;
    PipelineContext::new(WorkspaceLayout::new(dir.path())).with_options(options)
}

/// Two full-990 charities whose total revenue is off by 999 and 1001.
fn charities() -> RecordTable {
    let zeros = [0.0, 0.0];
    RecordTable::new(
        "CO",
        df!(
            "EIN" => &["000000999", "000001001"],
            SOURCE => &["16eofinextract990.dat", "16eofinextract990.dat"],
            "TOTREV2" => &[5000.0, 2000.0],
            "CONT" => &[4001.0, 999.0],
            "PROGREV" => &zeros,
            "INVINC" => &zeros,
            "TXEXMPTBNDSPROCEEDS" => &zeros,
            "ROYALTSINC" => &zeros,
            "NETRENT" => &zeros,
            "NETGNLS" => &zeros,
            "NETINCFNDRSNG" => &zeros,
            "NETINCGAMING" => &zeros,
            "GRPROF" => &zeros,
            "OTHINC" => &zeros,
            VALIDATION_STATE => &zeros,
        )
        .expect("frame"),
    )
    .expect("table")
}

fn foundation(ein: &str, excess: f64) -> RecordTable {
    RecordTable::new(
        "PF",
        df!(
            "EIN" => &[ein, "000000002"],
            "NAME" => &["BROKEN FOUNDATION", "STEADY FOUNDATION"],
            "P1EXCREV" => &[excess, 10.0],
            "P1TOTREV" => &[100.0, 30.0],
            "P1TOTEXP" => &[50.0, 20.0],
            VALIDATION_STATE => &[0.0, 0.0],
        )
        .expect("frame"),
    )
    .expect("table")
}

#[test]
fn residual_beyond_tolerance_is_exported() {
    let dir = TempDir::new().expect("temp dir");
    let ctx = context(&dir);
    let mut releases = ReleaseTables::new();
    releases.insert(ReleaseForm::Co, charities());

    let run = validate_releases(&ctx, &mut releases).expect("validate");
    let report = &run.reports[0];
    assert_eq!(report.outcome, ValidationOutcome::HardFailed);
    let totrev = report
        .identities
        .iter()
        .find(|identity| identity.column == "validate_fu_totrev2")
        .expect("identity");
    assert_eq!(totrev.failures, 1);
    assert_eq!(totrev.failure_percent(), 50.0);
    assert_eq!(report.failed_rows, 1);

    let export = load_export(&ctx.layout.failure_file(ReleaseForm::Co, YEAR)).expect("export");
    let eins = export.eins().expect("eins");
    let reasons = export.strings(VALIDATION_REASON).expect("reasons");
    let reason_of = |ein: &str| {
        let row = eins.iter().position(|e| e == ein).expect("exported");
        reasons[row].clone().unwrap_or_default()
    };
    // The larger organization lands in the review extract, not the failures.
    assert_eq!(reason_of("000000999"), "L");
    assert_eq!(reason_of("000001001"), "F");
    assert_eq!(
        export.numbers("validate_fu_totrev2").expect("residuals"),
        vec![Some(999.0), Some(1001.0)]
    );

    let co = &releases[&ReleaseForm::Co];
    assert!(!co.has_column("validate_fu_totrev2"));

    let decision = gate_release(&run);
    assert!(decision.block_release);
    assert_eq!(decision.blocking_forms, vec![ReleaseForm::Co]);
}

#[test]
fn fix_record_overwrites_the_failing_row() {
    let dir = TempDir::new().expect("temp dir");
    let ctx = context(&dir);
    let fix = df!(
        "EIN" => &["999999999"],
        "NAME" => &["REPAIRED FOUNDATION"],
        "P1EXCREV" => &["50"],
        "P1TOTREV" => &["100"],
        "P1TOTEXP" => &["50"],
        "validate_pf_p1excrev" => &["4950"],
        VALIDATION_REASON => &["F"],
        VALIDATION_STATE => &["1"],
    )
    .expect("fix frame");
    write_csv_table(&ctx.layout.fix_file(ReleaseForm::Pf, YEAR), &fix, "EIN").expect("write fix");

    let mut releases = ReleaseTables::new();
    releases.insert(ReleaseForm::Pf, foundation("999999999", 5000.0));
    let run = validate_releases(&ctx, &mut releases).expect("validate");

    assert!(run.fixes_integrated);
    let report = &run.reports[0];
    assert_eq!(report.fixes_applied, 1);
    assert_eq!(report.outcome, ValidationOutcome::Passed);

    let pf = &releases[&ReleaseForm::Pf];
    assert_eq!(
        pf.strings("NAME").expect("names")[0].as_deref(),
        Some("REPAIRED FOUNDATION")
    );
    assert_eq!(pf.numbers(VALIDATION_STATE).expect("state")[0], Some(1.0));
    assert!(!pf.has_column(VALIDATION_REASON));
    assert_eq!(pf.record_count(), 2);
}

#[test]
fn missing_fix_batch_is_not_an_error() {
    let dir = TempDir::new().expect("temp dir");
    let ctx = context(&dir);
    let batch = FixBatch::load(&ctx.layout, ReleaseForm::Pf, YEAR).expect("load");
    assert!(batch.is_none());
}

#[test]
fn unchanged_export_dropped_back_releases_extract_holds() {
    let dir = TempDir::new().expect("temp dir");
    let ctx = context(&dir);
    let mut releases = ReleaseTables::new();
    releases.insert(ReleaseForm::Pf, foundation("000000001", 50.0));
    let first = validate_releases(&ctx, &mut releases).expect("first run");
    assert_eq!(first.reports[0].outcome, ValidationOutcome::Passed);
    assert_eq!(first.reports[0].largest_rows, 1);
    assert_eq!(gate_release(&first).blocking_forms, vec![ReleaseForm::Pf]);

    let fix_file = ctx.layout.fix_file(ReleaseForm::Pf, YEAR);
    fs::create_dir_all(ctx.layout.fixes_dir()).expect("fixes dir");
    fs::copy(ctx.layout.failure_file(ReleaseForm::Pf, YEAR), &fix_file).expect("copy export");

    let mut releases = ReleaseTables::new();
    releases.insert(ReleaseForm::Pf, foundation("000000001", 50.0));
    let second = validate_releases(&ctx, &mut releases).expect("second run");
    assert!(second.fixes_integrated);
    assert_eq!(second.reports[0].fixes_applied, 0);
    assert_eq!(second.reports[0].largest_rows, 1);
    assert_eq!(gate_release(&second), GatingDecision::default());
}

#[test]
fn run_report_lists_every_form() {
    let dir = TempDir::new().expect("temp dir");
    let mut ctx = context(&dir);
    ctx.options.validate.pf = false;
    let mut releases = ReleaseTables::new();
    releases.insert(ReleaseForm::Co, charities());
    releases.insert(ReleaseForm::Pf, foundation("000000001", 5000.0));

    let run = validate_releases(&ctx, &mut releases).expect("validate");
    let decision = gate_release(&run);
    let path = write_run_report(&ctx.layout.run_report(), YEAR, &run, &decision).expect("report");

    let text = fs::read_to_string(path).expect("read report");
    let json: serde_json::Value = serde_json::from_str(&text).expect("json");
    assert_eq!(json["schema"], "nccs-core.validation-run");
    assert_eq!(json["blocked"], true);
    assert_eq!(json["blocking_forms"], serde_json::json!(["CO"]));
    assert_eq!(json["forms"][0]["outcome"], "hard_failed");
    assert_eq!(json["forms"][1]["outcome"], "skipped");
    assert_eq!(json["exports"].as_array().map(Vec::len), Some(1));
}

#[test]
fn exported_rows_come_back_for_review() {
    let dir = TempDir::new().expect("temp dir");
    let ctx = context(&dir);
    let mut releases = ReleaseTables::new();
    releases.insert(ReleaseForm::Co, charities());
    validate_releases(&ctx, &mut releases).expect("validate");

    let export = load_export(&ctx.layout.failure_file(ReleaseForm::Co, YEAR)).expect("export");
    let queue = review_queue(&export, &ReviewQuery::default()).expect("queue");
    assert_eq!(queue.record_count(), 2);
}

fn foundations(values: &[(i32, i32, i32)]) -> RecordTable {
    RecordTable::new(
        "PF",
        df!(
            "EIN" => values.iter().enumerate().map(|(i, _)| format!("{i:09}")).collect::<Vec<_>>(),
            "P1EXCREV" => values.iter().map(|v| f64::from(v.0)).collect::<Vec<_>>(),
            "P1TOTREV" => values.iter().map(|v| f64::from(v.1)).collect::<Vec<_>>(),
            "P1TOTEXP" => values.iter().map(|v| f64::from(v.2)).collect::<Vec<_>>(),
            VALIDATION_STATE => vec![0.0; values.len()],
        )
        .expect("frame"),
    )
    .expect("table")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn unchanged_fix_batch_reproduces_the_outcome(
        values in prop::collection::vec((-3000i32..3000, -3000i32..3000, -3000i32..3000), 1..20),
        partial in any::<bool>(),
    ) {
        let engine = ValidationEngine::new(1000.0, partial);

        let mut plain = foundations(&values);
        let before = engine.validate(ReleaseForm::Pf, &mut plain, 0).expect("validate");

        let mut fixed = foundations(&values);
        let batch = FixBatch::from_frame(
            ReleaseForm::Pf,
            "pf_2015_validate.csv".into(),
            plain.data.clone(),
        )
        .expect("batch");
        prop_assert_eq!(batch.fixes_applied().expect("count"), 0);
        batch.integrate_into(&mut fixed).expect("integrate");
        let after = engine.validate(ReleaseForm::Pf, &mut fixed, 0).expect("validate");

        prop_assert_eq!(before.report.outcome, after.report.outcome);
        prop_assert_eq!(before.failed_rows, after.failed_rows);
        prop_assert_eq!(
            plain.numbers("validate_pf_p1excrev").expect("before"),
            fixed.numbers("validate_pf_p1excrev").expect("after")
        );
    }
}
