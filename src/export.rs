//! Spreadsheet export
//!
//! Writes one worksheet per table: bold header row, then the table rows.
//! Sheet names come from table titles, cut to the profile's length limit
//! with characters Excel rejects removed.

use std::collections::HashSet;
use std::path::Path;

use rust_xlsxwriter::{Format, Workbook, XlsxError};
use thiserror::Error;
use tracing::info;

use crate::profile::PROFILE;
use crate::table::Table;
use crate::validation::validate_tables;

/// Excel's hard limit on sheet name length
const EXCEL_SHEET_NAME_MAX: usize = 31;

const ILLEGAL_SHEET_CHARS: [char; 7] = [':', '\\', '/', '?', '*', '[', ']'];

/// Export error
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no tables to export")]
    Empty,
    #[error("malformed table: {0}")]
    Malformed(String),
    #[error("table '{0}' exceeds worksheet limits")]
    TooLarge(String),
    #[error("workbook error: {0}")]
    Xlsx(#[from] XlsxError),
}

/// Sheet name for a title: first N characters, illegal characters removed.
pub fn sheet_name(title: &str) -> String {
    title
        .chars()
        .take(PROFILE.export.sheet_name_max_chars)
        .filter(|c| !ILLEGAL_SHEET_CHARS.contains(c))
        .collect()
}

/// Sheet names for every table, unique ignoring case and never blank.
///
/// Excel also rejects a leading or trailing apostrophe, so those are trimmed.
/// Repeated names get a ` (2)`, ` (3)`… suffix.
pub fn unique_sheet_names(tables: &[Table]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(tables.len());
    for (i, table) in tables.iter().enumerate() {
        let mut base = sheet_name(&table.title)
            .trim_matches(|c: char| c == '\'' || c.is_whitespace())
            .to_string();
        if base.is_empty() {
            base = format!("Sheet{}", i + 1);
        }
        let mut candidate = base.clone();
        let mut n = 2;
        while seen.contains(&candidate.to_lowercase()) {
            let suffix = format!(" ({})", n);
            let keep = EXCEL_SHEET_NAME_MAX - suffix.chars().count();
            let stem: String = base.chars().take(keep).collect();
            candidate = format!("{}{}", stem.trim_end(), suffix);
            n += 1;
        }
        seen.insert(candidate.to_lowercase());
        names.push(candidate);
    }
    names
}

/// Build the workbook in memory.
pub fn build_workbook(tables: &[Table]) -> Result<Workbook, ExportError> {
    if tables.is_empty() {
        return Err(ExportError::Empty);
    }
    if let Some(err) = validate_tables(tables).into_iter().next() {
        return Err(ExportError::Malformed(err.to_string()));
    }

    let bold = Format::new().set_bold();
    let mut workbook = Workbook::new();

    for (table, name) in tables.iter().zip(unique_sheet_names(tables)) {
        let too_large = || ExportError::TooLarge(table.title.clone());
        let sheet = workbook.add_worksheet();
        sheet.set_name(name)?;

        for (c, header) in table.headers.iter().enumerate() {
            let col = u16::try_from(c).map_err(|_| too_large())?;
            sheet.write_string_with_format(0, col, header, &bold)?;
        }
        for (r, row) in table.rows.iter().enumerate() {
            let row_num = u32::try_from(r + 1).map_err(|_| too_large())?;
            for (c, cell) in row.iter().enumerate() {
                let col = u16::try_from(c).map_err(|_| too_large())?;
                sheet.write_string(row_num, col, cell)?;
            }
        }
        sheet.autofit();
    }

    Ok(workbook)
}

/// Serialize the workbook to xlsx bytes.
pub fn export_to_buffer(tables: &[Table]) -> Result<Vec<u8>, ExportError> {
    let mut workbook = build_workbook(tables)?;
    Ok(workbook.save_to_buffer()?)
}

/// Write the workbook to `path`.
pub fn export_to_file(tables: &[Table], path: &Path) -> Result<(), ExportError> {
    let mut workbook = build_workbook(tables)?;
    workbook.save(path)?;
    info!(path = %path.display(), sheets = tables.len(), "workbook written");
    Ok(())
}

/// Default workbook file name
pub fn default_file_name() -> &'static str {
    &PROFILE.export.file_name
}

/// WASM-friendly version
#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;

#[cfg(feature = "wasm")]
#[wasm_bindgen(js_name = "sheetName")]
pub fn sheet_name_wasm(title: &str) -> String {
    sheet_name(title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{open_workbook_auto_from_rs, Data, Reader};
    use std::io::Cursor;

    fn table(title: &str, headers: &[&str], rows: &[&[&str]]) -> Table {
        Table {
            title: title.to_string(),
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn test_sheet_name_strips_illegal_chars() {
        assert_eq!(sheet_name("MA TRẬN: ĐỌC [1/2]?*"), "MA TRẬN ĐỌC 12");
    }

    #[test]
    fn test_sheet_name_cut_before_stripping() {
        let title = format!("{}:tail", "a".repeat(29));
        // cut to 30 chars first, then ':' removed
        assert_eq!(sheet_name(&title), "a".repeat(29));
    }

    #[test]
    fn test_sheet_name_counts_chars_not_bytes() {
        let title = "Đ".repeat(40);
        assert_eq!(sheet_name(&title).chars().count(), 30);
    }

    #[test]
    fn test_unique_names_dedupe_and_fill_blank() {
        let tables = vec![
            table("Ma trận", &["A"], &[]),
            table("MA TRẬN", &["A"], &[]),
            table("[]", &["A"], &[]),
            table("Ma trận", &["A"], &[]),
        ];
        assert_eq!(
            unique_sheet_names(&tables),
            vec!["Ma trận", "MA TRẬN (2)", "Sheet3", "Ma trận (3)"]
        );
    }

    #[test]
    fn test_apostrophes_behind_spaces_are_trimmed() {
        let tables = vec![table("' 'Đọc' '", &["A"], &[&["1"]])];
        assert_eq!(unique_sheet_names(&tables), vec!["Đọc"]);
        assert!(export_to_buffer(&tables).is_ok());
    }

    #[test]
    fn test_unique_names_respect_length_limit() {
        let long = "x".repeat(30);
        let tables = vec![table(&long, &["A"], &[]), table(&long, &["A"], &[])];
        let names = unique_sheet_names(&tables);
        assert_eq!(names[1].chars().count(), EXCEL_SHEET_NAME_MAX);
        assert!(names[1].ends_with(" (2)"));
    }

    #[test]
    fn test_export_round_trip_through_calamine() {
        let tables = vec![
            table("MA TRẬN ĐỌC", &["STT", "Nội dung"], &[&["1", "Thơ"], &["2", ""]]),
            table("MA TRẬN VIẾT", &["STT", "Nội dung"], &[&["1", "Nghị luận"]]),
        ];
        let bytes = export_to_buffer(&tables).unwrap();

        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["MA TRẬN ĐỌC", "MA TRẬN VIẾT"]);

        let range = workbook.worksheet_range("MA TRẬN ĐỌC").unwrap();
        assert_eq!(range.get_value((0, 1)), Some(&Data::String("Nội dung".to_string())));
        assert_eq!(range.get_value((1, 1)), Some(&Data::String("Thơ".to_string())));
        assert_eq!(range.get_value((2, 0)), Some(&Data::String("2".to_string())));
    }

    #[test]
    fn test_export_empty_is_error() {
        assert!(matches!(export_to_buffer(&[]), Err(ExportError::Empty)));
    }

    #[test]
    fn test_export_rejects_ragged_rows() {
        let tables = vec![table("T", &["A", "B"], &[&["only one"]])];
        assert!(matches!(export_to_buffer(&tables), Err(ExportError::Malformed(_))));
    }

    #[test]
    fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(default_file_name());
        export_to_file(&[table("T", &["A"], &[&["1"]])], &path).unwrap();
        assert!(path.exists());
    }
}
