//! Arithmetic identities each release form must satisfy.
//!
//! An [`Identity`] states that a target column equals a signed sum of other
//! columns. Its residual, `target - (sum)`, is stored in a `validate_<prefix>_<name>`
//! column; the fixer tool shows reviewers the [`Identity::display`] string next to it.
//!
//! Charity forms (CO/PC) mix 990-EZ and full 990 filers, so they carry two
//! [`IdentitySet`]s, each applied only to rows from its own source extract.

use nccs_core::RecordTable;
use nccs_model::validation::{SOURCE, VALIDATE_PREFIX};
use nccs_model::{ReleaseForm, Result, SourceForm};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Plus,
    Minus,
}

impl Sign {
    fn apply(self, value: f64) -> f64 {
        match self {
            Sign::Plus => value,
            Sign::Minus => -value,
        }
    }
}

/// `target - (terms)` should be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    /// Lower-case name used in the residual column.
    pub name: &'static str,
    pub target: &'static str,
    pub terms: &'static [(Sign, &'static str)],
}

use Sign::{Minus, Plus};

const fn identity(
    name: &'static str,
    target: &'static str,
    terms: &'static [(Sign, &'static str)],
) -> Identity {
    Identity {
        name,
        target,
        terms,
    }
}

impl Identity {
    /// Equation as reviewers see it, e.g. `NETINC - (TOTREV - EXPS)`.
    pub fn display(&self) -> String {
        let mut body = String::new();
        for (idx, (sign, column)) in self.terms.iter().enumerate() {
            match (idx, sign) {
                (0, Plus) => {}
                (0, Minus) => body.push('-'),
                (_, Plus) => body.push_str(" + "),
                (_, Minus) => body.push_str(" - "),
            }
            body.push_str(column);
        }
        format!("{} - ({body})", self.target)
    }

    /// Every column the identity reads.
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.target).chain(self.terms.iter().map(|(_, column)| *column))
    }

    /// Residual of one row given a column lookup. Any missing operand makes
    /// the residual missing.
    pub fn residual(&self, value: impl Fn(&str) -> Option<f64>) -> Option<f64> {
        let mut sum = 0.0;
        for (sign, column) in self.terms {
            sum += sign.apply(value(column)?);
        }
        Some(value(self.target)? - sum)
    }

    /// Residuals of every row where `applies` is set; other rows are null.
    ///
    /// Returns `None` when a column the identity needs is absent from the table.
    pub fn residuals(
        &self,
        table: &RecordTable,
        applies: &[bool],
    ) -> Result<Option<Vec<Option<f64>>>> {
        let mut columns = Vec::new();
        for name in self.columns() {
            if !table.has_column(name) {
                return Ok(None);
            }
            columns.push((name, table.numbers(name)?));
        }
        let residuals = applies
            .iter()
            .enumerate()
            .map(|(row, applies)| {
                if !applies {
                    return None;
                }
                self.residual(|name| {
                    columns
                        .iter()
                        .find(|(column, _)| *column == name)
                        .and_then(|(_, values)| values[row])
                })
            })
            .collect();
        Ok(Some(residuals))
    }
}

/// Identities that apply to one source sub-population of a release form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentitySet {
    pub sub_form: SourceForm,
    /// Residual column infix: `ez`, `fu` or `pf`.
    pub prefix: &'static str,
    pub identities: &'static [Identity],
}

impl IdentitySet {
    pub fn column(&self, identity: &Identity) -> String {
        format!("{VALIDATE_PREFIX}{}_{}", self.prefix, identity.name)
    }

    /// Rows of `table` this set applies to, decided by their `SOURCE` file name.
    pub fn applies_to(&self, table: &RecordTable) -> Result<Vec<bool>> {
        if self.sub_form == SourceForm::Pf {
            return Ok(vec![true; table.record_count()]);
        }
        if !table.has_column(SOURCE) {
            return Ok(vec![false; table.record_count()]);
        }
        Ok(table
            .strings(SOURCE)?
            .iter()
            .map(|source| {
                source
                    .as_deref()
                    .is_some_and(|source| self.sub_form.matches_source(source))
            })
            .collect())
    }
}

pub const EZ_IDENTITIES: &[Identity] = &[
    identity(
        "saleothn",
        "SALEOTHN",
        &[(Plus, "SALEOTHG"), (Minus, "SALEOTHE")],
    ),
    identity(
        "netincfndrsng",
        "NETINCFNDRSNG",
        &[
            (Plus, "GRSINCGAMING"),
            (Plus, "GRSINCFNDRSNG"),
            (Minus, "DIREXP"),
        ],
    ),
    identity("grprof", "GRPROF", &[(Plus, "INVENTG"), (Minus, "GOODS")]),
    identity(
        "totrev",
        "TOTREV",
        &[
            (Plus, "CONT"),
            (Plus, "PRGMSERVREV"),
            (Plus, "DUESASSESMNTS"),
            (Plus, "INVINC"),
            (Plus, "SALEOTHN"),
            (Plus, "NETINCFNDRSNG"),
            (Plus, "GRPROF"),
            (Plus, "OTHINC"),
        ],
    ),
    identity("netinc", "NETINC", &[(Plus, "TOTREV"), (Minus, "EXPS")]),
    identity(
        "ass_eoy",
        "ASS_EOY",
        &[(Plus, "LIAB_EOY"), (Plus, "FUNDBAL")],
    ),
];

pub const FULL_IDENTITIES: &[Identity] = &[
    identity(
        "netrent",
        "NETRENT",
        &[(Plus, "RNTLINCREAL"), (Plus, "RNTLINCPRSNL")],
    ),
    identity(
        "netgnls",
        "NETGNLS",
        &[(Plus, "SALESECN"), (Plus, "SALEOTHN")],
    ),
    identity(
        "netincfndrsng",
        "NETINCFNDRSNG",
        &[(Plus, "GRSINCFNDRSNG"), (Minus, "LESSDIRFNDRSNG")],
    ),
    identity(
        "netincgaming",
        "NETINCGAMING",
        &[(Plus, "GRSINCGAMING"), (Minus, "LESSDIRGAMING")],
    ),
    identity("grprof", "GRPROF", &[(Plus, "INVENTG"), (Minus, "GOODS")]),
    identity(
        "totrev2",
        "TOTREV2",
        &[
            (Plus, "CONT"),
            (Plus, "PROGREV"),
            (Plus, "INVINC"),
            (Plus, "TXEXMPTBNDSPROCEEDS"),
            (Plus, "ROYALTSINC"),
            (Plus, "NETRENT"),
            (Plus, "NETGNLS"),
            (Plus, "NETINCFNDRSNG"),
            (Plus, "NETINCGAMING"),
            (Plus, "GRPROF"),
            (Plus, "OTHINC"),
        ],
    ),
    identity(
        "fundbal",
        "FUNDBAL",
        &[(Plus, "ASS_EOY"), (Minus, "LIAB_EOY")],
    ),
];

pub const PF_IDENTITIES: &[Identity] = &[
    identity(
        "p1totrev",
        "P1TOTREV",
        &[
            (Plus, "P1TCONT"),
            (Plus, "P1INTREV"),
            (Plus, "P1DIVID"),
            (Plus, "P1GRENTS"),
            (Plus, "P1NGASTS"),
            (Plus, "P1GINVPF"),
            (Plus, "P1OTHINC"),
        ],
    ),
    identity(
        "p1totexp",
        "P1TOTEXP",
        &[(Plus, "P1ADMEXP"), (Plus, "P1CONTPD")],
    ),
    identity(
        "p1excrev",
        "P1EXCREV",
        &[(Plus, "P1TOTREV"), (Minus, "P1TOTEXP")],
    ),
    identity(
        "p2tinvsc",
        "P2TINVSC",
        &[(Plus, "P2GVTINV"), (Plus, "P2CRPSTK"), (Plus, "P2CRPBND")],
    ),
    identity(
        "p14tnadj",
        "P14TNADJ",
        &[
            (Plus, "P14NADJA"),
            (Plus, "P14NADJB"),
            (Plus, "P14NADJC"),
            (Plus, "P14NADJD"),
        ],
    ),
    identity(
        "p14tqdis",
        "P14TQDIS",
        &[
            (Plus, "P14QDISA"),
            (Plus, "P14QDISB"),
            (Plus, "P14QDISC"),
            (Plus, "P14QDISD"),
        ],
    ),
    identity(
        "p14tasvl",
        "P14TASVL",
        &[
            (Plus, "P14ASVLA"),
            (Plus, "P14ASVLB"),
            (Plus, "P14ASVLC"),
            (Plus, "P14ASVLD"),
        ],
    ),
    identity(
        "p14t4942",
        "P14T4942",
        &[
            (Plus, "P14A4942"),
            (Plus, "P14B4942"),
            (Plus, "P14C4942"),
            (Plus, "P14D4942"),
        ],
    ),
    identity(
        "p14tendw",
        "P14TENDW",
        &[
            (Plus, "P14ENDWA"),
            (Plus, "P14ENDWB"),
            (Plus, "P14ENDWC"),
            (Plus, "P14ENDWD"),
        ],
    ),
    identity(
        "p14ttsup",
        "P14TTSUP",
        &[
            (Plus, "P14TSUPA"),
            (Plus, "P14TSUPB"),
            (Plus, "P14TSUPC"),
            (Plus, "P14TSUPD"),
        ],
    ),
    identity(
        "p14tpsup",
        "P14TPSUP",
        &[
            (Plus, "P14PSUPA"),
            (Plus, "P14PSUPB"),
            (Plus, "P14PSUPC"),
            (Plus, "P14PSUPD"),
        ],
    ),
    identity(
        "p14tginv",
        "P14TGINV",
        &[
            (Plus, "P14GINVA"),
            (Plus, "P14GINVB"),
            (Plus, "P14GINVC"),
            (Plus, "P14GINVD"),
        ],
    ),
];

pub const EZ_SET: IdentitySet = IdentitySet {
    sub_form: SourceForm::Ez,
    prefix: "ez",
    identities: EZ_IDENTITIES,
};

pub const FULL_SET: IdentitySet = IdentitySet {
    sub_form: SourceForm::Full,
    prefix: "fu",
    identities: FULL_IDENTITIES,
};

pub const PF_SET: IdentitySet = IdentitySet {
    sub_form: SourceForm::Pf,
    prefix: "pf",
    identities: PF_IDENTITIES,
};

/// Identity sets checked on a release form. The 990-only cuts share their
/// base form's sets.
pub fn identity_sets(form: ReleaseForm) -> &'static [IdentitySet] {
    match form.base() {
        ReleaseForm::Pf => &[PF_SET],
        _ => &[EZ_SET, FULL_SET],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_minus_is_written_without_spaces() {
        let identity = identity("x", "X", &[(Minus, "A"), (Plus, "B")]);
        assert_eq!(identity.display(), "X - (-A + B)");
        let residual = identity.residual(|name| match name {
            "X" => Some(1.0),
            "A" => Some(2.0),
            "B" => Some(5.0),
            _ => None,
        });
        assert_eq!(residual, Some(-2.0));
    }

    #[test]
    fn missing_operand_gives_missing_residual() {
        let residual = EZ_IDENTITIES[4].residual(|name| (name != "EXPS").then_some(1.0));
        assert_eq!(residual, None);
    }

    #[test]
    fn residual_columns_use_set_prefix() {
        assert_eq!(FULL_SET.column(&FULL_IDENTITIES[5]), "validate_fu_totrev2");
        assert_eq!(identity_sets(ReleaseForm::PcFull), &[EZ_SET, FULL_SET]);
    }
}
