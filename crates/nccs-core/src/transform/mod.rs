//! Computed columns.
//!
//! - [`rule_table`]: the [`ColumnRule`] trait and its executor
//! - [`common`]: identity, period and classification columns every form gets
//! - [`classify`]: NTEE and filing-level lookup tables
//! - [`computed`]: signed sums of financial fields

pub mod classify;
pub mod common;
pub mod computed;
pub mod rule_table;

pub use common::{charity_rules, common_rules, filename_rule};
pub use computed::{LinearCombination, Term};
pub use rule_table::{ColumnRule, FnRule, RuleExecutor, RuleMetadata};
