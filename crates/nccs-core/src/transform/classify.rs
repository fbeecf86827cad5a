//! NTEE and filing-status classification tables.
//!
//! Every classification is an ordered rule table: the first matching rule
//! names the category, and a table-level default applies when none match.
//! Codes are read from `NTEEFINAL`, `SUBSECCD` and `FNDNCD`.

use nccs_ingest::polars_utils::parse_f64;

/// Test applied to an NTEE code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeTest {
    /// Null or empty code.
    Blank,
    /// First character is one of the given characters.
    FirstIn(&'static str),
    /// Code starts with one of the prefixes.
    Prefix(&'static [&'static str]),
    /// Characters `start..end` equal `value`, unless the code starts with `unless`.
    Slice {
        start: usize,
        end: usize,
        value: &'static str,
        unless: &'static str,
    },
}

impl CodeTest {
    pub fn matches(self, code: Option<&str>) -> bool {
        let code = code.unwrap_or_default();
        match self {
            CodeTest::Blank => code.is_empty(),
            CodeTest::FirstIn(chars) => code.chars().next().is_some_and(|c| chars.contains(c)),
            CodeTest::Prefix(prefixes) => prefixes.iter().any(|prefix| code.starts_with(prefix)),
            CodeTest::Slice {
                start,
                end,
                value,
                unless,
            } => !code.starts_with(unless) && code.get(start..end) == Some(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeRule {
    pub test: CodeTest,
    pub category: &'static str,
}

const fn rule(test: CodeTest, category: &'static str) -> CodeRule {
    CodeRule { test, category }
}

/// Category of the first matching rule.
pub fn first_match(rules: &[CodeRule], code: Option<&str>) -> Option<&'static str> {
    rules
        .iter()
        .find(|rule| rule.test.matches(code))
        .map(|rule| rule.category)
}

/// Ten major NTEE groups.
pub const NTMAJ10_RULES: &[CodeRule] = &[
    rule(CodeTest::Blank, "UN"),
    rule(CodeTest::FirstIn("Z "), "UN"),
    rule(CodeTest::FirstIn("A"), "AR"),
    rule(CodeTest::FirstIn("B"), "ED"),
    rule(CodeTest::FirstIn("CD"), "EN"),
    rule(CodeTest::FirstIn("EFGH"), "HE"),
    rule(CodeTest::FirstIn("IJKLMNOP"), "HU"),
    rule(CodeTest::FirstIn("Q"), "IN"),
    rule(CodeTest::FirstIn("RSTUVW"), "PU"),
    rule(CodeTest::FirstIn("X"), "RE"),
    rule(CodeTest::FirstIn("Y"), "MU"),
];
pub const NTMAJ10_DEFAULT: &str = "UN";

/// Hospital and higher-education splits shared by `MAJGRPB` and `NTMAJ12`.
pub const MAJOR_SPLIT_RULES: &[CodeRule] = &[
    rule(CodeTest::Prefix(&["B4", "B5"]), "BH"),
    rule(CodeTest::Prefix(&["E2"]), "EH"),
];

pub const LEVEL3_RULES: &[CodeRule] = &[
    rule(CodeTest::Blank, "-"),
    rule(
        CodeTest::Slice {
            start: 1,
            end: 3,
            value: "11",
            unless: "B8",
        },
        "ZA",
    ),
    rule(
        CodeTest::Slice {
            start: 1,
            end: 3,
            value: "12",
            unless: "B8",
        },
        "ZB",
    ),
    rule(CodeTest::Prefix(&["T2"]), "ZC"),
    rule(CodeTest::Prefix(&["T3"]), "ZD"),
    rule(CodeTest::Prefix(&["T7"]), "ZE"),
    rule(CodeTest::Prefix(&["T90", "T99"]), "ZF"),
    rule(CodeTest::Prefix(&["T6"]), "ZF"),
    rule(CodeTest::Prefix(&["Y30"]), "MR"),
    rule(CodeTest::FirstIn("Y"), "MO"),
    rule(CodeTest::FirstIn("A"), "AR"),
    rule(CodeTest::FirstIn("B"), "ED"),
    rule(CodeTest::FirstIn("CD"), "EN"),
    rule(CodeTest::FirstIn("EFGH"), "HE"),
    rule(CodeTest::FirstIn("IJKLMNOP"), "HS"),
    rule(CodeTest::FirstIn("Q"), "IN"),
    rule(CodeTest::FirstIn("RSTUVW"), "PB"),
    rule(CodeTest::FirstIn("X"), "RE"),
    rule(CodeTest::FirstIn("Z"), "UN"),
];
pub const LEVEL3_DEFAULT: &str = "-";

/// Ten-group categories folded into "other" by `NTMAJ5`.
pub const NTMAJ5_OTHER: &[&str] = &["IN", "EN", "PU", "RE", "MU", "UN"];

/// Test applied to a numeric filing code. Unparseable codes count as missing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumTest {
    Any,
    Above(f64),
    /// Value is listed; `missing` says whether a missing code matches.
    OneOf(&'static [f64], bool),
    /// Value is not listed; `missing` says whether missing is among the listed.
    NoneOf(&'static [f64], bool),
}

impl NumTest {
    pub fn matches(self, value: Option<f64>) -> bool {
        match (self, value) {
            (NumTest::Any, _) => true,
            (NumTest::Above(limit), Some(v)) => v > limit,
            (NumTest::Above(_), None) => false,
            (NumTest::OneOf(values, _), Some(v)) => values.contains(&v),
            (NumTest::OneOf(_, missing), None) => missing,
            (NumTest::NoneOf(values, _), Some(v)) => !values.contains(&v),
            (NumTest::NoneOf(_, missing), None) => !missing,
        }
    }
}

/// Rule over (`SUBSECCD`, `FNDNCD`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilingRule {
    pub subsection: NumTest,
    pub foundation: NumTest,
    pub category: &'static str,
}

const fn filing(subsection: NumTest, foundation: NumTest, category: &'static str) -> FilingRule {
    FilingRule {
        subsection,
        foundation,
        category,
    }
}

pub const LEVEL1_RULES: &[FilingRule] = &[
    filing(NumTest::Above(3.0), NumTest::Any, "O"),
    filing(NumTest::OneOf(&[1.0, 2.0], false), NumTest::Any, "O"),
    filing(
        NumTest::OneOf(&[3.0], false),
        NumTest::OneOf(&[2.0, 3.0, 4.0], false),
        "PF",
    ),
    filing(NumTest::OneOf(&[3.0], false), NumTest::Any, "PC"),
    filing(
        NumTest::NoneOf(&[0.0, 3.0], true),
        NumTest::OneOf(&[0.0], true),
        "O",
    ),
    filing(
        NumTest::OneOf(&[0.0], true),
        NumTest::NoneOf(&[0.0, 2.0, 3.0, 4.0, 9.0], true),
        "PC",
    ),
    filing(
        NumTest::OneOf(&[0.0], true),
        NumTest::OneOf(&[2.0, 3.0, 4.0], false),
        "PF",
    ),
];
pub const LEVEL1_DEFAULT: &str = "U";

/// Supporting organizations by filing status, ahead of the code-based `LEVEL2` rules.
pub const LEVEL2_FILING_RULES: &[FilingRule] = &[filing(
    NumTest::OneOf(&[3.0], false),
    NumTest::OneOf(&[4.0, 17.0], false),
    "S",
)];

fn filing_code(code: Option<&str>) -> Option<f64> {
    code.and_then(parse_f64)
}

pub fn level1(subsection: Option<&str>, foundation: Option<&str>) -> &'static str {
    let (sub, fnd) = (filing_code(subsection), filing_code(foundation));
    LEVEL1_RULES
        .iter()
        .find(|rule| rule.subsection.matches(sub) && rule.foundation.matches(fnd))
        .map(|rule| rule.category)
        .unwrap_or(LEVEL1_DEFAULT)
}

pub fn ntmaj10(ntee: Option<&str>) -> &'static str {
    first_match(NTMAJ10_RULES, ntee).unwrap_or(NTMAJ10_DEFAULT)
}

/// Major group with the hospital and university splits. Blank codes pass through.
pub fn majgrpb(ntee: Option<&str>) -> Option<String> {
    let code = ntee?;
    if code.is_empty() {
        return Some(String::new());
    }
    match first_match(MAJOR_SPLIT_RULES, Some(code)) {
        Some(category) => Some(category.to_string()),
        None => code.chars().next().map(String::from),
    }
}

pub fn level3(ntee: Option<&str>) -> &'static str {
    first_match(LEVEL3_RULES, ntee).unwrap_or(LEVEL3_DEFAULT)
}

pub fn level2(
    subsection: Option<&str>,
    foundation: Option<&str>,
    level3: Option<&str>,
    ntee: Option<&str>,
) -> &'static str {
    let (sub, fnd) = (filing_code(subsection), filing_code(foundation));
    if LEVEL2_FILING_RULES
        .iter()
        .any(|rule| rule.subsection.matches(sub) && rule.foundation.matches(fnd))
    {
        return "S";
    }
    if CodeTest::FirstIn("Z").matches(level3) {
        return "S";
    }
    if CodeTest::FirstIn("Y").matches(ntee) {
        return "M";
    }
    "O"
}

pub fn ntmaj12(ntee: Option<&str>, ntmaj10: &str) -> String {
    first_match(MAJOR_SPLIT_RULES, ntee)
        .unwrap_or(ntmaj10)
        .to_string()
}

pub fn ntmaj5(ntmaj10: &str) -> String {
    if NTMAJ5_OTHER.contains(&ntmaj10) {
        "OT".to_string()
    } else {
        ntmaj10.to_string()
    }
}
