//! Plain-text table rendering for the terminal

use crate::table::Table;

/// Render every table, separated by a blank line.
pub fn render_tables(tables: &[Table]) -> String {
    tables
        .iter()
        .map(render_table)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Title line, header row, separator, body rows; columns padded to the
/// widest cell (counted in chars).
pub fn render_table(table: &Table) -> String {
    let widths: Vec<usize> = (0..table.headers.len())
        .map(|c| {
            std::iter::once(&table.headers[c])
                .chain(table.rows.iter().filter_map(|r| r.get(c)))
                .map(|s| s.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = format!("== {} ==\n", table.title);
    out.push_str(&render_row(&table.headers, &widths));
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    out.push('\n');
    for row in &table.rows {
        out.push_str(&render_row(row, &widths));
    }
    out
}

fn render_row(cells: &[String], widths: &[usize]) -> String {
    let padded: Vec<String> = widths
        .iter()
        .enumerate()
        .map(|(c, w)| {
            let cell = cells.get(c).map(String::as_str).unwrap_or("").replace('\n', " ");
            let pad = w.saturating_sub(cell.chars().count());
            format!("{}{}", cell, " ".repeat(pad))
        })
        .collect();
    format!("{}\n", padded.join(" | ").trim_end())
}
