use std::fmt::Write as _;
use std::path::Path;

use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ColumnConstraint, ContentArrangement, Table, Width,
};

use nccs_model::{FormValidationReport, ValidationOutcome, ValidationState};

use crate::review::ReviewResult;
use crate::types::BuildResult;

pub fn print_summary(result: &BuildResult) {
    println!("Release year: {}", result.release_year);
    println!("Run report: {}", result.run_report.display());
    println!("{}", source_table(result));
    println!("{}", release_table(result));
    if let Some(table) = identity_table(&result.validation.reports) {
        println!();
        println!("Identity failures:");
        println!("{table}");
    }
    let message = outcome_message(result);
    if result.written() {
        println!("{message}");
    } else {
        eprintln!("{message}");
    }
}

/// Closing lines of a build: where the files went, or why nothing was written.
pub fn outcome_message(result: &BuildResult) -> String {
    let mut message = String::new();
    if result.written() {
        let count = result
            .releases
            .iter()
            .filter(|summary| summary.output.is_some())
            .count();
        let _ = write!(
            message,
            "Wrote {count} release files to {} in {} ms",
            result.output_dir.display(),
            result.duration_ms
        );
        return message;
    }
    let forms: Vec<&str> = result
        .gating
        .blocking_forms
        .iter()
        .map(|form| form.code())
        .collect();
    let _ = writeln!(message, "Release halted: {} need review.", forms.join(", "));
    let _ = writeln!(message, "Failure exports: {}", result.failures_dir.display());
    for export in &result.validation.exports {
        let _ = writeln!(message, "- {}", file_name(&export.path));
    }
    message.push_str("Place reviewed files in validation/fixes/ and run the build again.");
    message
}

pub fn source_table(result: &BuildResult) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Form"),
        header_cell("Extract"),
        header_cell("Loaded"),
        header_cell("Renamed"),
        header_cell("Uncrosswalked"),
        header_cell("Zero filers"),
        header_cell("Filtered"),
        header_cell("Fixes"),
        header_cell("Rows"),
    ]);
    apply_summary_table_style(&mut table);
    for index in [2, 3, 4, 5, 6, 7, 8] {
        align_column(&mut table, index, CellAlignment::Right);
    }
    let mut loaded = 0usize;
    let mut rows = 0usize;
    for summary in &result.sources {
        loaded += summary.loaded;
        rows += summary.rows;
        table.add_row(vec![
            form_cell(summary.form.code()),
            Cell::new(&summary.file),
            Cell::new(summary.loaded),
            Cell::new(summary.renamed),
            count_cell(Some(summary.not_crosswalked), Color::Yellow),
            count_cell(Some(summary.dropped_missing), Color::Yellow),
            count_cell(Some(summary.dropped_values), Color::Yellow),
            count_cell(Some(summary.manual_fixes), Color::Yellow),
            Cell::new(summary.rows),
        ]);
    }
    table.add_row(vec![
        header_cell("TOTAL"),
        header_cell("All extracts"),
        Cell::new(loaded).add_attribute(Attribute::Bold),
        dim_cell("-"),
        dim_cell("-"),
        dim_cell("-"),
        dim_cell("-"),
        dim_cell("-"),
        Cell::new(rows).add_attribute(Attribute::Bold),
    ]);
    table
}

pub fn release_table(result: &BuildResult) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Form"),
        header_cell("Rows"),
        header_cell("Backfilled"),
        header_cell("Stale"),
        header_cell("Duplicates"),
        header_cell("Validation"),
        header_cell("Failed"),
        header_cell("Largest"),
        header_cell("Changed"),
        header_cell("Output"),
    ]);
    apply_summary_table_style(&mut table);
    for index in [1, 2, 3, 4, 6, 7, 8] {
        align_column(&mut table, index, CellAlignment::Right);
    }
    align_column(&mut table, 5, CellAlignment::Center);
    for summary in &result.releases {
        let report = result
            .validation
            .reports
            .iter()
            .find(|report| report.form == summary.form);
        table.add_row(vec![
            form_cell(summary.form.code()),
            Cell::new(summary.rows),
            count_cell(Some(summary.backfilled), Color::Blue),
            count_cell(Some(summary.stale_dropped), Color::Yellow),
            count_cell(Some(summary.duplicates_dropped), Color::Yellow),
            outcome_cell(report.map(|report| report.outcome)),
            count_cell(report.map(|report| report.failed_rows), Color::Red),
            count_cell(report.map(|report| report.largest_rows), Color::Yellow),
            count_cell(report.map(|report| report.changed_rows), Color::Yellow),
            match &summary.output {
                Some(path) => Cell::new(file_name(path)).fg(Color::Green),
                None => dim_cell("-"),
            },
        ]);
    }
    table
}

/// Failing identities across every validated form, or `None` when all passed.
pub fn identity_table(reports: &[FormValidationReport]) -> Option<Table> {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Form"),
        header_cell("Identity"),
        header_cell("Equation"),
        header_cell("Failures"),
        header_cell("Checked"),
        header_cell("Share"),
    ]);
    apply_table_style(&mut table);
    for index in [3, 4, 5] {
        align_column(&mut table, index, CellAlignment::Right);
    }
    let mut any = false;
    for report in reports {
        for identity in report.failing_identities() {
            any = true;
            table.add_row(vec![
                form_cell(report.form.code()),
                Cell::new(&identity.column),
                dim_cell(&identity.display),
                count_cell(Some(identity.failures), Color::Red),
                Cell::new(identity.checked),
                Cell::new(format!("{:.1}%", identity.failure_percent())),
            ]);
        }
    }
    any.then_some(table)
}

pub fn print_review(result: &ReviewResult) {
    println!("Export: {}", result.export.display());
    println!(
        "{} of {} exported {} rows need review",
        result.pending, result.exported, result.form
    );
    if result.rows.is_empty() {
        return;
    }
    println!("{}", review_table(result));
    if result.rows.len() < result.pending {
        println!("... {} more", result.pending - result.rows.len());
    }
}

pub fn review_table(result: &ReviewResult) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("EIN"),
        header_cell("Name"),
        header_cell("Reason"),
        header_cell("State"),
        header_cell("Largest residual"),
        header_cell("Amount"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 2, CellAlignment::Center);
    align_column(&mut table, 5, CellAlignment::Right);
    for row in &result.rows {
        let (column, amount) = match &row.worst {
            Some((column, value)) => (Cell::new(column), amount_cell(*value)),
            None => (dim_cell("-"), dim_cell("-")),
        };
        table.add_row(vec![
            Cell::new(&row.ein),
            match &row.name {
                Some(name) => Cell::new(name),
                None => dim_cell("-"),
            },
            Cell::new(&row.reason).add_attribute(Attribute::Bold),
            state_cell(row.state),
            column,
            amount,
        ]);
    }
    table
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(140);
    if table.column_count() == 6 {
        table.set_constraints(vec![
            ColumnConstraint::UpperBoundary(Width::Fixed(12)),
            ColumnConstraint::UpperBoundary(Width::Percentage(30)),
            ColumnConstraint::UpperBoundary(Width::Percentage(45)),
            ColumnConstraint::LowerBoundary(Width::Fixed(8)),
            ColumnConstraint::LowerBoundary(Width::Fixed(7)),
            ColumnConstraint::LowerBoundary(Width::Fixed(7)),
        ]);
    }
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::DynamicFullWidth)
        .set_width(150);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn form_cell(code: &str) -> Cell {
    Cell::new(code)
        .fg(Color::Blue)
        .add_attribute(Attribute::Bold)
}

fn outcome_cell(outcome: Option<ValidationOutcome>) -> Cell {
    match outcome {
        Some(ValidationOutcome::Passed) => Cell::new("passed").fg(Color::Green),
        Some(ValidationOutcome::SoftPassed) => Cell::new("soft-passed").fg(Color::Yellow),
        Some(ValidationOutcome::HardFailed) => Cell::new("FAILED")
            .fg(Color::Red)
            .add_attribute(Attribute::Bold),
        Some(ValidationOutcome::Skipped) => dim_cell("skipped"),
        None => dim_cell("-"),
    }
}

fn state_cell(state: ValidationState) -> Cell {
    match state {
        ValidationState::Unchanged => Cell::new("open"),
        ValidationState::Fixed => Cell::new("fixed").fg(Color::Green),
        ValidationState::Ignored => dim_cell("ignored"),
        ValidationState::Checked => Cell::new("checked").fg(Color::Green),
    }
}

fn amount_cell(value: f64) -> Cell {
    Cell::new(format!("{value:.0}")).fg(Color::Red)
}

fn count_cell(count: Option<usize>, color: Color) -> Cell {
    match count {
        Some(value) if value > 0 => Cell::new(value).fg(color).add_attribute(Attribute::Bold),
        Some(value) => dim_cell(value),
        None => dim_cell("-"),
    }
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
