//! Request and result validation
//!
//! Checks a request before any network call, enforces the optional strict
//! reply mode, and verifies the row-width invariant of tables that arrive
//! from outside the parser.

use crate::parse::{ParseIssue, ParseReport};
use crate::pipeline::{MatrixRequest, PipelineError};
use crate::prompt::parse_template_columns;
use crate::table::Table;

/// A table row whose width differs from its header count
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub table: String,
    pub row: usize,
    pub expected: usize,
    pub found: usize,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} row {}: {}", self.table, self.row + 1, self.message)
    }
}

/// Validate a request and return its template columns.
///
/// Only missing reference material is rejected. An empty template yields
/// no columns; sections then rely on their own header lines.
pub fn validate_request(request: &MatrixRequest) -> Result<Vec<String>, PipelineError> {
    if !request.reference.has_material() {
        return Err(PipelineError::MissingReference);
    }
    Ok(parse_template_columns(&request.template))
}

impl ParseIssue {
    /// True for normalizations that change which cells a table holds.
    pub fn affects_cells(&self) -> bool {
        matches!(
            self,
            Self::FallbackHeaders { .. } | Self::RowPadded { .. } | Self::RowTruncated { .. }
        )
    }
}

/// Strict mode: fail when any issue changed the cells of a table.
pub fn check_strict(report: &ParseReport) -> Result<(), PipelineError> {
    let violations: Vec<ParseIssue> = report
        .issues
        .iter()
        .filter(|i| i.affects_cells())
        .cloned()
        .collect();
    if violations.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::StrictViolation(violations))
    }
}

/// Check every row has exactly as many cells as its table has headers.
/// Returns a list of validation errors (empty = all valid).
pub fn validate_tables(tables: &[Table]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for table in tables {
        let expected = table.headers.len();
        for (row, cells) in table.rows.iter().enumerate() {
            if cells.len() != expected {
                errors.push(ValidationError {
                    table: table.title.clone(),
                    row,
                    expected,
                    found: cells.len(),
                    message: format!("{} cells, expected {}", cells.len(), expected),
                });
            }
        }
    }
    errors
}
