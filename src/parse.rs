//! AI reply parsing
//!
//! Turns the model's line-oriented reply into matrix tables:
//!
//! ```text
//! SECTION: MA TRẬN ĐỌC
//! HEADERS: STT|||Nội dung|||Số câu
//! ROW: 1|||Đọc hiểu văn bản|||4
//! ```
//!
//! The parser never fails. Missing headers fall back to the caller's column
//! template, short rows are padded and long rows truncated. Every such
//! adjustment is recorded as a `ParseIssue` for callers that want to see it.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::profile::{default_title, reply_format};
use crate::table::{normalize_row, RowFit, Table};

/// Compiled reply grammar
struct Grammar {
    section: Regex,
    header_line: Regex,
    row_line: Regex,
}

static GRAMMAR: LazyLock<Grammar> = LazyLock::new(|| {
    let f = reply_format();
    let compile = |pattern: String| {
        Regex::new(&pattern).expect("reply grammar pattern must compile")
    };
    Grammar {
        section: compile(format!("(?i){}", regex::escape(&f.section_marker))),
        header_line: compile(format!("^{}(?P<body>.*)$", regex::escape(&f.header_prefix))),
        row_line: compile(format!("^{}(?P<body>.*)$", regex::escape(&f.row_prefix))),
    }
});

/// A silent normalization performed while parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseIssue {
    /// Non-blank text before the first section marker was dropped
    DiscardedPreamble { chars: usize },
    /// Section had no header line; caller's fallback headers used
    FallbackHeaders { section: usize, title: String },
    /// Row had fewer cells than headers
    RowPadded { section: usize, row: usize, missing: usize },
    /// Row had more cells than headers; excess dropped
    RowTruncated { section: usize, row: usize, dropped: usize },
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DiscardedPreamble { chars } => {
                write!(f, "discarded {} chars before first section", chars)
            }
            Self::FallbackHeaders { section, title } => {
                write!(f, "section {} ({}): no header line, template columns used", section + 1, title)
            }
            Self::RowPadded { section, row, missing } => {
                write!(f, "section {} row {}: padded {} empty cells", section + 1, row + 1, missing)
            }
            Self::RowTruncated { section, row, dropped } => {
                write!(f, "section {} row {}: dropped {} extra cells", section + 1, row + 1, dropped)
            }
        }
    }
}

/// Tables plus every normalization applied to build them
#[derive(Debug, Clone, Default)]
pub struct ParseReport {
    pub tables: Vec<Table>,
    pub issues: Vec<ParseIssue>,
}

impl ParseReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Parse the AI reply into tables.
///
/// `fallback_headers` replaces the header line of any section that lacks one.
pub fn parse_matrices(raw: &str, fallback_headers: &[String]) -> Vec<Table> {
    parse_matrices_report(raw, fallback_headers).tables
}

/// Parse the AI reply and report every silent normalization.
pub fn parse_matrices_report(raw: &str, fallback_headers: &[String]) -> ParseReport {
    let grammar = &*GRAMMAR;
    let mut report = ParseReport::default();

    let mut segments = grammar.section.split(raw);
    let preamble = segments.next().unwrap_or_default().trim();
    if !preamble.is_empty() {
        report.issues.push(ParseIssue::DiscardedPreamble {
            chars: preamble.chars().count(),
        });
    }

    let bodies = segments.filter(|s| !s.trim().is_empty());
    for (section, body) in bodies.enumerate() {
        let table = parse_section(grammar, section, body, fallback_headers, &mut report.issues);
        report.tables.push(table);
    }

    report
}

fn parse_section(
    grammar: &Grammar,
    section: usize,
    body: &str,
    fallback_headers: &[String],
    issues: &mut Vec<ParseIssue>,
) -> Table {
    let lines: Vec<&str> = body
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let title = lines
        .first()
        .map(|l| l.to_string())
        .unwrap_or_else(|| default_title().to_string());

    let headers = match lines.iter().find_map(|l| grammar.header_line.captures(l)) {
        Some(caps) => split_cells(&caps["body"]),
        None => {
            issues.push(ParseIssue::FallbackHeaders {
                section,
                title: title.clone(),
            });
            fallback_headers.to_vec()
        }
    };

    let width = headers.len();
    let rows = lines
        .iter()
        .filter_map(|l| grammar.row_line.captures(l))
        .enumerate()
        .map(|(row, caps)| {
            let (cells, fit) = normalize_row(split_cells(&caps["body"]), width);
            match fit {
                RowFit::Exact => {}
                RowFit::Padded { missing } => {
                    issues.push(ParseIssue::RowPadded { section, row, missing })
                }
                RowFit::Truncated { dropped } => {
                    issues.push(ParseIssue::RowTruncated { section, row, dropped })
                }
            }
            cells
        })
        .collect();

    Table {
        title,
        headers,
        rows,
    }
}

fn split_cells(body: &str) -> Vec<String> {
    body.split(reply_format().cell_delimiter.as_str())
        .map(|c| c.trim().to_string())
        .collect()
}

/// WASM-friendly version (fallback headers as JSON array, tables returned as JSON)
#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;

#[cfg(feature = "wasm")]
#[wasm_bindgen(js_name = "parseMatrices")]
pub fn parse_matrices_wasm(raw: &str, fallback_json: &str) -> String {
    let fallback: Vec<String> = serde_json::from_str(fallback_json).unwrap_or_default();
    let tables = parse_matrices(raw, &fallback);
    serde_json::to_string(&tables).unwrap_or_else(|_| "[]".to_string())
}
