//! Operator-facing stdout: progress lines while running, a summary at the end.

use anyhow::{Context, Result};
use common::RotationSummary;
use vault::{RecordKind, RotationObserver};

pub fn progress_line(kind: RecordKind, processed: u64, failed: u64) -> String {
    format!("progress: {kind} processed={processed} failed={failed}")
}

/// One line per type, one per failed record, then the total.
pub fn summary_lines(summary: &RotationSummary) -> Vec<String> {
    let mut lines: Vec<String> = summary
        .kinds
        .iter()
        .map(|k| format!("summary: {} processed={} failed={}", k.kind, k.processed, k.failed))
        .collect();
    lines.extend(
        summary
            .failed_records
            .iter()
            .map(|f| format!("failed: {} id={} error={}", f.kind, f.id, f.error)),
    );
    lines.push(format!(
        "total: processed={} failed={} state={}{}",
        summary.processed_count,
        summary.failed_count,
        summary.state,
        if summary.dry_run { " dry_run=true" } else { "" }
    ));
    lines
}

/// Write the final report to stdout.
///
/// # Errors
///
/// Returns an error if the summary cannot be serialised.
pub fn print_summary(summary: &RotationSummary, json: bool) -> Result<()> {
    if json {
        let doc = serde_json::to_string_pretty(summary).context("failed to serialise rotation summary")?;
        println!("{doc}");
    } else {
        for line in summary_lines(summary) {
            println!("{line}");
        }
    }
    Ok(())
}

/// Prints progress to stdout. Silent in JSON mode so stdout stays a single
/// document.
#[derive(Debug, Clone, Copy)]
pub struct StdoutReporter {
    json: bool,
}

impl StdoutReporter {
    pub fn new(json: bool) -> Self {
        Self { json }
    }
}

impl RotationObserver for StdoutReporter {
    fn on_progress(&mut self, kind: RecordKind, processed: u64, failed: u64) {
        if !self.json {
            println!("{}", progress_line(kind, processed, failed));
        }
    }
}
