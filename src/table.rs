//! Reconstructed matrix table
//!
//! A `Table` is built once from one reply section and never mutated.
//! Every row holds exactly `headers.len()` cells.

use crate::profile::{default_title, reply_format};

/// One matrix reconstructed from a reply section
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Table {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// What `normalize_row` had to do to fit a row to the header width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFit {
    Exact,
    Padded { missing: usize },
    Truncated { dropped: usize },
}

/// Fit a row to `width` cells: pad with empty strings on the right,
/// or drop excess cells from the right.
pub fn normalize_row(mut cells: Vec<String>, width: usize) -> (Vec<String>, RowFit) {
    let len = cells.len();
    let fit = if len < width {
        cells.resize(width, String::new());
        RowFit::Padded { missing: width - len }
    } else if len > width {
        cells.truncate(width);
        RowFit::Truncated { dropped: len - width }
    } else {
        RowFit::Exact
    };
    (cells, fit)
}

impl Table {
    /// Build a table, normalizing every row to the header width.
    /// A blank title is replaced by the default title.
    pub fn new(title: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let mut title = title.into();
        if title.trim().is_empty() {
            title = default_title().to_string();
        }
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|r| normalize_row(r, width).0)
            .collect();
        Self {
            title,
            headers,
            rows,
        }
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Render the table back into the reply wire format.
    ///
    /// Parsing the result yields a table with the same title, headers and rows.
    /// A table without headers emits no header line; parse it back with an
    /// empty fallback.
    pub fn to_section_text(&self) -> String {
        let f = reply_format();
        let mut out = format!("{} {}\n", f.section_marker, self.title);
        if !self.headers.is_empty() {
            out.push_str(&format!(
                "{} {}\n",
                f.header_prefix,
                self.headers.join(&f.cell_delimiter)
            ));
        }
        for row in &self.rows {
            out.push_str(&format!("{} {}\n", f.row_prefix, row.join(&f.cell_delimiter)));
        }
        out
    }
}
