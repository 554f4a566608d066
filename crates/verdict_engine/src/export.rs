use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rust_xlsxwriter::{Workbook, XlsxError};
use serde_json::json;
use verdict_core::{format_seconds, RunReport, RunState, WorkItem};
use verdict_logging::verdict_info;

use crate::persist::{AtomicFileWriter, PersistError};

/// File format of the per-item detail table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    /// Workbook with a `Details` and a `Summary` sheet.
    #[default]
    Xlsx,
    Tsv,
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Prefix of both generated filenames.
    pub file_stem: String,
    pub format: ExportFormat,
    pub write_summary: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            file_stem: "verdict_report".to_string(),
            format: ExportFormat::default(),
            write_summary: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub item_count: usize,
    pub detail_path: PathBuf,
    pub summary_path: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("failed to encode summary: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to build workbook: {0}")]
    Workbook(#[from] XlsxError),
}

const DETAIL_HEADER: [&str; 9] = [
    "index", "row", "column", "url", "status", "verdict", "expected", "judgement", "error",
];

/// Writes the detail table as `{stem}_{timestamp}.xlsx` or `.tsv` and, unless
/// disabled, `{stem}_{timestamp}.json` with the aggregate report.
pub fn export_report(
    state: &RunState,
    dir: &Path,
    options: &ExportOptions,
    now: DateTime<Utc>,
) -> Result<ExportSummary, ExportError> {
    let stamp = now.format("%Y-%m-%d_%H-%M-%S");
    let writer = AtomicFileWriter::new(dir.to_path_buf());
    let report = RunReport::from_state(state);

    let detail_path = match options.format {
        ExportFormat::Xlsx => {
            let body = detail_workbook(state, &report)?;
            writer.write(&format!("{}_{stamp}.xlsx", options.file_stem), &body)?
        }
        ExportFormat::Tsv => {
            let body = detail_tsv(state);
            writer.write(&format!("{}_{stamp}.tsv", options.file_stem), body.as_bytes())?
        }
    };

    let summary_path = if options.write_summary {
        let summary = summary_json(&report, now);
        let body = serde_json::to_string_pretty(&summary)?;
        Some(writer.write(&format!("{}_{stamp}.json", options.file_stem), body.as_bytes())?)
    } else {
        None
    };

    verdict_info!(
        "Exported {} items to {}",
        state.items().len(),
        detail_path.display()
    );
    Ok(ExportSummary {
        item_count: state.items().len(),
        detail_path,
        summary_path,
    })
}

fn detail_fields(index: usize, item: &WorkItem) -> [String; 9] {
    let outcome = item.outcome();
    [
        index.to_string(),
        item.source_row.to_string(),
        item.source_column.clone(),
        item.url.clone(),
        item.status().to_string(),
        outcome
            .map(|outcome| outcome.result.verdict_text().into_owned())
            .unwrap_or_default(),
        item.expected_label
            .map(|label| label.to_string())
            .unwrap_or_default(),
        match item.matches_expected() {
            Some(true) => "correct".to_string(),
            Some(false) => "incorrect".to_string(),
            None => String::new(),
        },
        item.failure_reason().unwrap_or_default().to_string(),
    ]
}

fn detail_tsv(state: &RunState) -> String {
    let mut body = DETAIL_HEADER.join("\t");
    body.push('\n');
    for (index, item) in state.items().iter().enumerate() {
        let fields = detail_fields(index, item);
        let line: Vec<String> = fields.iter().map(|field| sanitize(field)).collect();
        body.push_str(&line.join("\t"));
        body.push('\n');
    }
    body
}

fn detail_workbook(state: &RunState, report: &RunReport) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();

    let details = workbook.add_worksheet();
    details.set_name("Details")?;
    for (col, title) in (0u16..).zip(DETAIL_HEADER) {
        details.write_string(0, col, title)?;
    }
    for (row, (index, item)) in (1u32..).zip(state.items().iter().enumerate()) {
        for (col, field) in (0u16..).zip(detail_fields(index, item)) {
            details.write_string(row, col, field.as_str())?;
        }
    }

    let summary = workbook.add_worksheet();
    summary.set_name("Summary")?;
    for (row, (label, value)) in (0u32..).zip(summary_rows(report)) {
        summary.write_string(row, 0, label)?;
        summary.write_string(row, 1, value.as_str())?;
    }

    workbook.save_to_buffer()
}

fn summary_rows(report: &RunReport) -> Vec<(&'static str, String)> {
    let optional = |value: Option<String>| value.unwrap_or_default();
    vec![
        ("total", report.counts.total.to_string()),
        ("succeeded", report.counts.succeeded.to_string()),
        ("failed", report.counts.failed.to_string()),
        ("pending", report.counts.pending.to_string()),
        ("in_flight", report.counts.in_flight.to_string()),
        ("labelled", report.accuracy.labelled.to_string()),
        ("correct", report.accuracy.correct.to_string()),
        ("incorrect", report.accuracy.incorrect.to_string()),
        ("accuracy", report.accuracy.display_percentage()),
        ("started_at", optional(report.timing.started_at.map(|at| at.to_rfc3339()))),
        ("ended_at", optional(report.timing.ended_at.map(|at| at.to_rfc3339()))),
        ("elapsed", optional(report.timing.elapsed.map(format_seconds))),
        (
            "average_per_success",
            optional(report.timing.average_per_success.map(format_seconds)),
        ),
    ]
}

/// Tabs and line breaks would split a cell.
fn sanitize(field: &str) -> String {
    field
        .chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect()
}

fn summary_json(report: &RunReport, now: DateTime<Utc>) -> serde_json::Value {
    json!({
        "generated_at": now.to_rfc3339(),
        "counts": {
            "total": report.counts.total,
            "succeeded": report.counts.succeeded,
            "failed": report.counts.failed,
            "pending": report.counts.pending,
            "in_flight": report.counts.in_flight,
        },
        "accuracy": {
            "labelled": report.accuracy.labelled,
            "correct": report.accuracy.correct,
            "incorrect": report.accuracy.incorrect,
            "percentage": report.accuracy.display_percentage(),
        },
        "timing": {
            "started_at": report.timing.started_at.map(|at| at.to_rfc3339()),
            "ended_at": report.timing.ended_at.map(|at| at.to_rfc3339()),
            "elapsed": report.timing.elapsed.map(format_seconds),
            "average_per_success": report.timing.average_per_success.map(format_seconds),
        },
    })
}
