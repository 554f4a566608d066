//! Extraction of work items from a tabular source.

use serde::{Deserialize, Serialize};
use verdict_logging::{verdict_info, verdict_warn};

use crate::{Label, SourceItem};

/// A sheet of text cells. The first row is the header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn header(&self) -> &[String] {
        self.rows.first().map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Header substrings (case-insensitive) that identify columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub url_column_markers: Vec<String>,
    pub answer_column_markers: Vec<String>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            url_column_markers: vec!["截图链接".to_string(), "screenshot link".to_string()],
            answer_column_markers: vec!["正确答案".to_string(), "correct answer".to_string()],
        }
    }
}

fn header_matches(header: &str, markers: &[String]) -> bool {
    let header = header.to_lowercase();
    markers
        .iter()
        .filter(|marker| !marker.is_empty())
        .any(|marker| header.contains(&marker.to_lowercase()))
}

/// Returns one item per non-blank cell of every URL column, row-major.
///
/// `source_row` is the 1-based sheet row, counting the header as row 1. An
/// empty table or one without a URL column yields no items.
pub fn extract_items(table: &Table, settings: &IngestSettings) -> Vec<SourceItem> {
    let header = table.header();
    let url_columns: Vec<usize> = header
        .iter()
        .enumerate()
        .filter(|(_, name)| header_matches(name, &settings.url_column_markers))
        .map(|(index, _)| index)
        .collect();

    if url_columns.is_empty() {
        if !table.rows.is_empty() {
            verdict_warn!("No URL column found in header {:?}", header);
        }
        return Vec::new();
    }

    let answer_column = header
        .iter()
        .position(|name| header_matches(name, &settings.answer_column_markers));

    let mut items = Vec::new();
    for (row_index, row) in table.rows.iter().enumerate().skip(1) {
        let Some(source_row) = sheet_row(row_index) else {
            verdict_warn!(
                "Table has more rows than a sheet can address, ignoring rows from {}",
                row_index
            );
            break;
        };
        let expected = answer_column
            .and_then(|column| row.get(column))
            .and_then(|cell| parse_expected(cell));
        for &column in &url_columns {
            let Some(url) = row.get(column).map(|cell| cell.trim()) else {
                continue;
            };
            if url.is_empty() {
                continue;
            }
            items.push(SourceItem {
                url: url.to_string(),
                source_row,
                source_column: header[column].clone(),
                expected_label: expected,
            });
        }
    }

    verdict_info!(
        "Extracted {} items from {} data rows ({} URL columns, answer column {:?})",
        items.len(),
        table.rows.len().saturating_sub(1),
        url_columns.len(),
        answer_column
    );
    items
}

/// 1-based sheet row of a table row index, if it fits a `u32`.
fn sheet_row(row_index: usize) -> Option<u32> {
    row_index
        .checked_add(1)
        .and_then(|row| u32::try_from(row).ok())
}

/// `1` means qualified; any other present value means unqualified.
fn parse_expected(cell: &str) -> Option<Label> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    match cell.parse::<f64>() {
        Ok(value) if value == 1.0 => Some(Label::Qualified),
        _ => Some(Label::Unqualified),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_row_counts_the_header() {
        assert_eq!(sheet_row(1), Some(2));
        assert_eq!(sheet_row(u32::MAX as usize - 1), Some(u32::MAX));
    }

    #[test]
    fn sheet_row_rejects_rows_past_u32() {
        assert_eq!(sheet_row(u32::MAX as usize), None);
        assert_eq!(sheet_row(usize::MAX), None);
    }
}
