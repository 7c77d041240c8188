//! CLI output formatting for a run.
//!
//! Output is information-first: chapters are listed by position and title,
//! with file paths as secondary context relative to the notes folder.
//!
//! ```text
//! Chapters (3 of 5 dated notes)
//! 001 Morning walk
//! 002 Reading list
//! 003 2024-02-11
//!
//! Skipped
//!     draft.md: no date
//!
//! Not relocated
//!     locked.md: Permission denied (os error 13)
//!
//! Images: 2 cached, 3 fetched (5 total)
//! Package: epub/2026-10-17.epub
//! ```
//!
//! [`format_report`] is pure and returns lines; [`print_report`] writes them
//! to stdout.

use crate::pipeline::RunReport;
use std::path::Path;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `path` relative to `root` when it lies inside it.
fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

// ============================================================================
// Run report
// ============================================================================

/// Format the summary of a completed run.
pub fn format_report(report: &RunReport, input: &Path) -> Vec<String> {
    let mut lines = Vec::new();

    lines.push(format!(
        "Chapters ({} of {} dated notes)",
        report.chapters.len(),
        report.qualifying
    ));
    for (i, title) in report.chapters.iter().enumerate() {
        lines.push(format!("{} {}", format_index(i + 1), title));
    }

    if !report.skipped.is_empty() {
        lines.push(String::new());
        lines.push("Skipped".to_string());
        for skipped in &report.skipped {
            lines.push(format!(
                "{}{}: {}",
                indent(1),
                display_path(&skipped.path, input),
                skipped.reason
            ));
        }
    }

    if !report.relocation_failures.is_empty() {
        lines.push(String::new());
        lines.push("Not relocated".to_string());
        for failure in &report.relocation_failures {
            lines.push(format!(
                "{}{}: {}",
                indent(1),
                display_path(&failure.path, input),
                failure.message
            ));
        }
    }

    if !report.leftovers.is_empty() {
        lines.push(String::new());
        lines.push("Copied but not removed".to_string());
        for path in &report.leftovers {
            lines.push(format!("{}{}", indent(1), display_path(path, input)));
        }
    }

    lines.push(String::new());
    lines.push(format!("Images: {}", report.images));
    lines.push(format!("Package: {}", display_path(&report.package, input)));
    lines
}

pub fn print_report(report: &RunReport, input: &Path) {
    for line in format_report(report, input) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
