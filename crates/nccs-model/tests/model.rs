//! Integration tests for the shared model types.

use nccs_model::{
    FormValidationReport, PipelineOptions, ReleaseForm, SourceForm, ValidationOutcome,
};

#[test]
fn partial_toml_keeps_remaining_defaults() {
    let text = r#"
release_year = 2016
backfill_depth = 1

[validate]
pf = false

[extract]
revenue_floor = 5000000.0
"#;
    let options: PipelineOptions = toml::from_str(text).expect("parse options");
    assert_eq!(options.release_year, 2016);
    assert_eq!(options.backfill_years(), vec![2015]);
    assert!(options.validate.co);
    assert!(!options.validate.pf);
    assert_eq!(options.extract.quantile, 0.999);
    assert_eq!(options.extract.revenue_floor, 5_000_000.0);
    assert_eq!(options.tolerance, 1000.0);
}

#[test]
fn forms_deserialize_from_codes() {
    let text = r#"forms = ["EZ", "Full"]"#;
    let options: PipelineOptions = toml::from_str(text).expect("parse options");
    assert_eq!(options.forms, vec![SourceForm::Ez, SourceForm::Full]);
    assert!(options.validate().is_ok());
}

#[test]
fn report_serializes_form_codes() {
    let report = FormValidationReport::new(ReleaseForm::CoFull, ValidationOutcome::SoftPassed);
    let json = serde_json::to_value(&report).expect("serialize report");
    assert_eq!(json["form"], "CO_full");
    assert_eq!(json["outcome"], "soft_passed");
    let round: FormValidationReport = serde_json::from_value(json).expect("deserialize report");
    assert_eq!(round, report);
}
