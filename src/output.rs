//! CLI output formatting for every command.
//!
//! # Information-First Display
//!
//! Output is **result-centric, not file-centric**. Each image leads with its
//! positional index and file name, and what was found about it follows as
//! indented context lines. Full paths only appear where the user needs them
//! to find a file (report, masks).
//!
//! # Output Format
//!
//! ## Check
//!
//! ```text
//! left.jpg: retina 97.2% → accepted
//! selfie.png: retina 3.1% → rejected
//! ```
//!
//! ## Diagnose
//!
//! ```text
//! Screening 3 images
//! 001 left.jpg
//!     Moderate DR (Stage 2), confidence 61.0%
//!     Retina: 97.2%
//! 002 selfie.png
//!     Not a retinal photograph (retina 3.1%)
//! 003 broken.jpg
//!     Failed: Invalid image: failed to decode
//!
//! 3 images: 1 diagnosed, 1 rejected, 1 failed
//!     Moderate DR: 1
//! Report: screening/report.json
//! Cache: 1 cached, 2 screened (3 total)
//! ```
//!
//! ## Segment
//!
//! ```text
//! 001 left.jpg
//!     microaneurysms: 0.41%
//!     hemorrhages: 1.20%
//!     ...
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::batch::{BatchEvent, ScreeningReport};
use crate::gate::ValidityResult;
use crate::severity::DrStage;
use crate::types::ScreeningSummary;
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

fn percent(fraction: f32) -> String {
    format!("{:.1}%", fraction * 100.0)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Header line for an image: index + file name.
///
/// ```text
/// 001 left.jpg
/// ```
fn image_header(index: usize, path: &Path) -> String {
    format!("{} {}", format_index(index + 1), file_name(path))
}

// ============================================================================
// check
// ============================================================================

pub fn format_check_result(path: &Path, result: &ValidityResult) -> Vec<String> {
    let verdict = if result.is_retina() {
        "accepted"
    } else {
        "rejected"
    };
    vec![format!(
        "{}: retina {} → {}",
        file_name(path),
        percent(result.probability_retina),
        verdict
    )]
}

pub fn print_check_result(path: &Path, result: &ValidityResult) {
    for line in format_check_result(path, result) {
        println!("{}", line);
    }
}

// ============================================================================
// diagnose / segment progress
// ============================================================================

/// Lines describing one screening result, without the header.
pub fn format_summary_lines(summary: &ScreeningSummary) -> Vec<String> {
    match summary {
        ScreeningSummary::Diagnosed(d) => {
            let mut lines = vec![
                format!(
                    "{}{}, confidence {}",
                    indent(1),
                    d.stage,
                    percent(d.confidence)
                ),
                format!("{}Retina: {}", indent(1), percent(d.retina_probability)),
            ];
            if d.stage.is_urgent() {
                lines.push(format!("{}Follow-up: {}", indent(1), d.stage.follow_up()));
            }
            lines
        }
        ScreeningSummary::Rejected {
            retina_probability, ..
        } => vec![format!(
            "{}Not a retinal photograph (retina {})",
            indent(1),
            percent(*retina_probability)
        )],
        ScreeningSummary::Failed { error, .. } => {
            vec![format!("{}Failed: {}", indent(1), error)]
        }
    }
}

/// Format a single batch progress event as display lines.
pub fn format_batch_event(event: &BatchEvent) -> Vec<String> {
    match event {
        BatchEvent::Started { image_count } => {
            let noun = if *image_count == 1 { "image" } else { "images" };
            vec![format!("Screening {} {}", image_count, noun)]
        }
        BatchEvent::ImageScreened {
            index,
            path,
            summary,
            cached,
        } => {
            let mut header = image_header(*index, path);
            if *cached {
                header.push_str(" (cached)");
            }
            let mut lines = vec![header];
            lines.extend(format_summary_lines(summary));
            lines
        }
        BatchEvent::ImageSegmented {
            index,
            path,
            coverage,
        } => {
            let mut lines = vec![image_header(*index, path)];
            for (kind, fraction) in coverage {
                lines.push(format!(
                    "{}{}: {:.2}%",
                    indent(1),
                    kind,
                    fraction * 100.0
                ));
            }
            lines
        }
        BatchEvent::SegmentationFailed { index, path, error } => vec![
            image_header(*index, path),
            format!("{}Failed: {}", indent(1), error),
        ],
    }
}

// ============================================================================
// diagnose summary
// ============================================================================

/// Totals and per-stage counts for a finished report.
pub fn format_report_summary(report: &ScreeningReport, report_path: &Path) -> Vec<String> {
    let mut lines = vec![
        String::new(),
        format!(
            "{} images: {} diagnosed, {} rejected, {} failed",
            report.results.len(),
            report.diagnosed(),
            report.rejected(),
            report.failed()
        ),
    ];
    let counts = report.stage_counts();
    for stage in DrStage::ALL {
        let n = counts[stage.index() as usize];
        if n > 0 {
            lines.push(format!("{}{}: {}", indent(1), stage.label(), n));
        }
    }
    let urgent = report.urgent();
    if urgent > 0 {
        lines.push(format!("{}Urgent referrals: {}", indent(1), urgent));
    }
    lines.push(format!("Report: {}", report_path.display()));
    lines
}

pub fn print_report_summary(report: &ScreeningReport, report_path: &Path) {
    for line in format_report_summary(report, report_path) {
        println!("{}", line);
    }
}
