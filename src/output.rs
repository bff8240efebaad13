//! CLI output formatting.
//!
//! # Record-First Display
//!
//! Every line about a page leads with the record's identity (row number,
//! city, state) and shows the output file as secondary context after `→`.
//! Row numbers are the 1-based data row in the CSV, zero-padded to three
//! digits, so a failure can be traced straight back to the spreadsheet.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! Generating 250 pages in 3 batches of 100
//! Batch 1 (rows 1-100)
//!     001 Provo, Utah → steel-buildings-provo-utah.html
//!     002 Ogden, Utah → steel-buildings-ogden-utah.html (unchanged)
//!     003 Logan, Utah ✗ latitude is not a number: "north"
//!     99 succeeded, 1 failed
//! ...
//! Generated 249 of 250 pages (200 written, 49 unchanged)
//! Failed 1:
//!     003 Logan, Utah: latitude is not a number: "north"
//! ```
//!
//! ## Check
//!
//! ```text
//! Dataset: data/city_data_sample.csv (250 records → 249 files)
//! Templates: base.html, partials/footer.html
//! Duplicate filenames:
//!     steel-buildings-park-city-utah.html
//!         004 Park City, Utah
//!         117 park city, utah (owner)
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::generate::{CheckReport, GenerateEvent, RunSummary, WriteStatus};
use crate::slug::SlugCollision;
use crate::types::{PageFailure, RecordId};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based row number as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `001 Provo, Utah`
fn record_line(record: &RecordId) -> String {
    format!(
        "{} {}, {}",
        format_index(record.row),
        record.city,
        record.state
    )
}

fn failure_line(failure: &PageFailure) -> String {
    format!("{}: {}", record_line(&failure.record), failure.reason)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

// ============================================================================
// Build output
// ============================================================================

/// Format a single generation progress event as display lines.
pub fn format_generate_event(event: &GenerateEvent) -> Vec<String> {
    match event {
        GenerateEvent::RunStarted {
            total,
            batch_size,
            batches,
        } => vec![format!(
            "Generating {} in {} of {}",
            plural(*total, "page", "pages"),
            plural(*batches, "batch", "batches"),
            batch_size
        )],
        GenerateEvent::BatchStarted {
            index,
            first_row,
            last_row,
        } => vec![format!("Batch {index} (rows {first_row}-{last_row})")],
        GenerateEvent::PageGenerated {
            record,
            filename,
            status,
        } => {
            let suffix = match status {
                WriteStatus::Written => "",
                WriteStatus::Unchanged => " (unchanged)",
                WriteStatus::Superseded => " (superseded)",
            };
            vec![format!(
                "{}{} \u{2192} {}{}",
                indent(1),
                record_line(record),
                filename,
                suffix
            )]
        }
        GenerateEvent::PageFailed(failure) => vec![format!(
            "{}{} \u{2717} {}",
            indent(1),
            record_line(&failure.record),
            failure.reason
        )],
        GenerateEvent::BatchCompleted(result) => vec![format!(
            "{}{} succeeded, {} failed",
            indent(1),
            result.succeeded,
            result.failed()
        )],
        GenerateEvent::Cancelled { remaining } => {
            vec![format!("Cancelled: {} not attempted", plural(*remaining, "record", "records"))]
        }
    }
}

/// Format the end-of-run summary, including every failure.
pub fn format_run_summary(summary: &RunSummary) -> Vec<String> {
    let mut lines = Vec::new();

    let mut detail = vec![format!("{} written", summary.written())];
    if summary.unchanged() > 0 {
        detail.push(format!("{} unchanged", summary.unchanged()));
    }
    if summary.superseded() > 0 {
        detail.push(format!("{} superseded", summary.superseded()));
    }
    lines.push(format!(
        "Generated {} of {} pages ({})",
        summary.succeeded(),
        summary.total_records,
        detail.join(", ")
    ));

    if summary.cancelled {
        lines.push(format!(
            "Cancelled after {} of {} records",
            summary.attempted(),
            summary.total_records
        ));
    }

    if summary.failed() > 0 {
        lines.push(format!("Failed {}:", summary.failed()));
        for failure in summary.failures() {
            lines.push(format!("{}{}", indent(1), failure_line(failure)));
        }
    }

    lines
}

pub fn print_run_summary(summary: &RunSummary) {
    for line in format_run_summary(summary) {
        println!("{}", line);
    }
}

// ============================================================================
// Duplicates
// ============================================================================

/// List each contested filename with its claimants; the last one owns it.
pub fn format_collisions(collisions: &[SlugCollision]) -> Vec<String> {
    if collisions.is_empty() {
        return Vec::new();
    }
    let mut lines = vec!["Duplicate filenames:".to_string()];
    for collision in collisions {
        lines.push(format!("{}{}", indent(1), collision.filename));
        let last = collision.records.len().saturating_sub(1);
        for (i, record) in collision.records.iter().enumerate() {
            let owner = if i == last { " (owner)" } else { "" };
            lines.push(format!("{}{}{}", indent(2), record_line(record), owner));
        }
    }
    lines
}

pub fn print_collisions(collisions: &[SlugCollision]) {
    for line in format_collisions(collisions) {
        println!("{}", line);
    }
}

// ============================================================================
// Check output
// ============================================================================

/// Format the result of a dry run.
pub fn format_check_report(dataset: &Path, templates: &[&str], report: &CheckReport) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Dataset: {} ({} \u{2192} {})",
            dataset.display(),
            plural(report.records, "record", "records"),
            plural(report.unique_files, "file", "files")
        ),
        format!("Templates: {}", templates.join(", ")),
    ];
    lines.extend(format_collisions(&report.collisions));
    if !report.failures.is_empty() {
        lines.push(format!("Would fail {}:", report.failures.len()));
        for failure in &report.failures {
            lines.push(format!("{}{}", indent(1), failure_line(failure)));
        }
    }
    lines
}

pub fn print_check_report(dataset: &Path, templates: &[&str], report: &CheckReport) {
    for line in format_check_report(dataset, templates, report) {
        println!("{}", line);
    }
}
