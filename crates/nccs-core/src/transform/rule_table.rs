//! Rule table infrastructure for computed columns.
//!
//! Each source form declares an ordered list of [`ColumnRule`]s. The
//! [`RuleExecutor`] runs them in order; later rules may read columns written
//! by earlier ones.

use std::sync::Arc;

use nccs_model::Result;

use crate::frame::RecordTable;
use crate::pipeline_context::PipelineContext;

/// What a computed-column rule is called and which columns it writes.
#[derive(Debug, Clone)]
pub struct RuleMetadata {
    pub id: String,
    pub description: String,
    /// Columns this rule writes.
    pub target_columns: Vec<String>,
}

impl RuleMetadata {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            target_columns: Vec::new(),
        }
    }

    pub fn with_targets(mut self, targets: &[&str]) -> Self {
        self.target_columns = targets.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// One computed column, evaluated over a whole table.
///
/// Rules read only columns of the same row. A missing operand propagates a
/// null or zero default unless the rule declares it a precondition.
pub trait ColumnRule: Send + Sync {
    fn metadata(&self) -> &RuleMetadata;

    fn apply(&self, ctx: &mut PipelineContext, table: &mut RecordTable) -> Result<()>;
}

/// Executes a set of rules in order.
#[derive(Default)]
pub struct RuleExecutor {
    rules: Vec<Arc<dyn ColumnRule>>,
}

impl std::fmt::Debug for RuleExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|rule| rule.metadata().id.as_str()))
            .finish()
    }
}

impl RuleExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&mut self, rule: Arc<dyn ColumnRule>) {
        self.rules.push(rule);
    }

    /// Adds every rule of `other` after the current ones.
    pub fn extend(&mut self, other: RuleExecutor) {
        self.rules.extend(other.rules);
    }

    /// Runs every rule. Returns the columns written, in rule order.
    pub fn execute(
        &self,
        ctx: &mut PipelineContext,
        table: &mut RecordTable,
    ) -> Result<Vec<String>> {
        let mut written = Vec::new();
        for rule in &self.rules {
            let meta = rule.metadata();
            rule.apply(ctx, table)?;
            tracing::trace!(
                form = %table.form,
                rule = %meta.id,
                "applied column rule: {}",
                meta.description
            );
            written.extend(meta.target_columns.iter().cloned());
        }
        Ok(written)
    }
}

/// A rule built from a closure, for one-off columns.
pub struct FnRule<F> {
    metadata: RuleMetadata,
    apply: F,
}

impl<F> FnRule<F>
where
    F: Fn(&mut PipelineContext, &mut RecordTable) -> Result<()> + Send + Sync,
{
    pub fn new(metadata: RuleMetadata, apply: F) -> Self {
        Self { metadata, apply }
    }
}

impl<F> ColumnRule for FnRule<F>
where
    F: Fn(&mut PipelineContext, &mut RecordTable) -> Result<()> + Send + Sync,
{
    fn metadata(&self) -> &RuleMetadata {
        &self.metadata
    }

    fn apply(&self, ctx: &mut PipelineContext, table: &mut RecordTable) -> Result<()> {
        (self.apply)(ctx, table)
    }
}
