use std::fs;
use std::path::Path;

use calamine::{open_workbook_auto, Reader};
use thiserror::Error;
use verdict_core::Table;
use verdict_logging::verdict_debug;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read workbook {path}: {source}")]
    Workbook {
        path: String,
        #[source]
        source: calamine::Error,
    },
    #[error("workbook {path} has no sheets")]
    NoSheet { path: String },
    #[error("line {line}: unterminated quoted field")]
    UnterminatedQuote { line: usize },
}

/// Field separator of a delimited sheet export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delimiter {
    #[default]
    Tab,
    Comma,
}

impl Delimiter {
    fn as_char(self) -> char {
        match self {
            Delimiter::Tab => '\t',
            Delimiter::Comma => ',',
        }
    }

    /// `.csv` files are comma separated, anything else tab separated.
    pub fn for_path(path: &Path) -> Self {
        match extension(path) {
            Some(ext) if ext == "csv" => Delimiter::Comma,
            _ => Delimiter::Tab,
        }
    }
}

const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

pub fn is_workbook(path: &Path) -> bool {
    extension(path).is_some_and(|ext| WORKBOOK_EXTENSIONS.contains(&ext.as_str()))
}

/// Reads a sheet into a [`Table`].
///
/// Workbooks (`.xlsx`, `.xls`, ...) yield their first sheet. Anything else is
/// parsed as delimited text, split on `delimiter` or, when `None`, on the
/// delimiter implied by the extension.
pub fn read_table(path: &Path, delimiter: Option<Delimiter>) -> Result<Table, TableError> {
    if is_workbook(path) {
        return read_workbook(path);
    }
    let text = fs::read_to_string(path).map_err(|source| TableError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_delimited(&text, delimiter.unwrap_or_else(|| Delimiter::for_path(path)))
}

fn read_workbook(path: &Path) -> Result<Table, TableError> {
    let workbook_error = |source| TableError::Workbook {
        path: path.display().to_string(),
        source,
    };
    let mut workbook = open_workbook_auto(path).map_err(workbook_error)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| TableError::NoSheet {
            path: path.display().to_string(),
        })?
        .map_err(workbook_error)?;

    let mut rows = Vec::new();
    for row in range.rows() {
        push_row(&mut rows, row.iter().map(|cell| cell.to_string()).collect());
    }
    verdict_debug!("Read {} rows from first sheet of {:?}", rows.len(), path);
    Ok(Table::new(rows))
}

/// Parses delimited text. Fields may be wrapped in double quotes, in which
/// case they can contain the delimiter, newlines, and `""` escapes. Blank
/// lines are skipped.
pub fn parse_delimited(text: &str, delimiter: Delimiter) -> Result<Table, TableError> {
    let separator = delimiter.as_char();
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quote_line = 0;
    let mut line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => {
                in_quotes = true;
                quote_line = line;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                line += 1;
                row.push(std::mem::take(&mut field));
                push_row(&mut rows, std::mem::take(&mut row));
            }
            c if c == separator => row.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(TableError::UnterminatedQuote { line: quote_line });
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        push_row(&mut rows, row);
    }
    Ok(Table::new(rows))
}

fn push_row(rows: &mut Vec<Vec<String>>, row: Vec<String>) {
    if row.iter().all(|cell| cell.trim().is_empty()) {
        return;
    }
    rows.push(row);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tab_separated_rows() {
        let table = parse_delimited("a\tb\n1\t2\n", Delimiter::Tab).unwrap();
        assert_eq!(table.rows, vec![vec!["a", "b"], vec!["1", "2"]]);
    }

    #[test]
    fn quoted_fields_keep_delimiters_and_escapes() {
        let text = "url,note\r\n\"https://x/?a=1,2\",\"say \"\"hi\"\"\nthere\"\r\n";
        let table = parse_delimited(text, Delimiter::Comma).unwrap();
        assert_eq!(
            table.rows,
            vec![
                vec!["url".to_string(), "note".to_string()],
                vec!["https://x/?a=1,2".to_string(), "say \"hi\"\nthere".to_string()],
            ]
        );
    }

    #[test]
    fn skips_blank_lines_and_bom() {
        let table = parse_delimited("\u{feff}h\n\n\t\nv", Delimiter::Tab).unwrap();
        assert_eq!(table.rows, vec![vec!["h"], vec!["v"]]);
    }

    #[test]
    fn trailing_empty_cells_are_kept() {
        let table = parse_delimited("a,b,c\n1,,\n", Delimiter::Comma).unwrap();
        assert_eq!(table.rows[1], vec!["1", "", ""]);
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        let err = parse_delimited("a\n\"open", Delimiter::Tab).unwrap_err();
        assert!(matches!(err, TableError::UnterminatedQuote { line: 2 }));
    }

    #[test]
    fn delimiter_follows_extension() {
        assert_eq!(Delimiter::for_path(Path::new("sheet.CSV")), Delimiter::Comma);
        assert_eq!(Delimiter::for_path(Path::new("sheet.tsv")), Delimiter::Tab);
    }

    #[test]
    fn workbook_extensions_are_recognised() {
        assert!(is_workbook(Path::new("batch.XLSX")));
        assert!(is_workbook(Path::new("batch.xls")));
        assert!(!is_workbook(Path::new("batch.csv")));
        assert!(!is_workbook(Path::new("batch")));
    }
}
