use std::fs;

use rust_xlsxwriter::Workbook;
use tempfile::TempDir;
use verdict_core::{extract_items, IngestSettings, Label};
use verdict_engine::{read_table, Delimiter, TableError};

#[test]
fn reads_sheet_export_into_work_items() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("batch.csv");
    fs::write(
        &path,
        "编号,截图链接,正确答案\r\n1,https://img/a.png,1\r\n2,\"https://img/b.png?x=1,2\",0\r\n",
    )
    .unwrap();

    let table = read_table(&path, None).unwrap();
    let items = extract_items(&table, &IngestSettings::default());

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].url, "https://img/a.png");
    assert_eq!(items[0].expected_label, Some(Label::Qualified));
    assert_eq!(items[1].url, "https://img/b.png?x=1,2");
    assert_eq!(items[1].source_row, 3);
    assert_eq!(items[1].expected_label, Some(Label::Unqualified));
}

#[test]
fn missing_file_reports_path() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("absent.tsv");
    let err = read_table(&path, Some(Delimiter::Tab)).unwrap_err();
    assert!(matches!(err, TableError::Read { .. }));
    assert!(err.to_string().contains("absent.tsv"));
}

#[test]
fn reads_first_sheet_of_a_workbook() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("batch.xlsx");
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "编号").unwrap();
    sheet.write_string(0, 1, "截图链接").unwrap();
    sheet.write_string(0, 2, "正确答案").unwrap();
    sheet.write_number(1, 0, 1).unwrap();
    sheet.write_string(1, 1, "https://img/a.png").unwrap();
    sheet.write_number(1, 2, 0).unwrap();
    sheet.write_number(3, 0, 3).unwrap();
    sheet.write_string(3, 1, "https://img/c.png").unwrap();
    workbook.add_worksheet().write_string(0, 0, "ignored").unwrap();
    workbook.save(&path).unwrap();

    // A tab delimiter is irrelevant for workbooks.
    let table = read_table(&path, Some(Delimiter::Tab)).unwrap();
    let items = extract_items(&table, &IngestSettings::default());

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].url, "https://img/a.png");
    assert_eq!(items[0].expected_label, Some(Label::Unqualified));
    assert_eq!(items[1].url, "https://img/c.png");
    assert_eq!(items[1].expected_label, None);
}

#[test]
fn unreadable_workbook_is_reported() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("broken.xlsx");
    fs::write(&path, "not a zip archive").unwrap();
    let err = read_table(&path, None).unwrap_err();
    assert!(matches!(err, TableError::Workbook { .. }));
    assert!(err.to_string().contains("broken.xlsx"));
}
