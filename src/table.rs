//! Plain-text tables for the `plan` and `history` commands.

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::{audit::AuditRecord, schema::ColumnPlan};

const HISTORY_PREVIEW_CHARS: usize = 60;

pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers
        .iter()
        .map(|h| h.chars().count().max(1))
        .collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(clean_cell(cell).chars().count());
        }
    }

    let mut output = String::new();
    let header_cells = headers.iter().map(|h| h.to_string()).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&header_cells, &widths));
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

pub fn render_plan(plan: &ColumnPlan) -> String {
    let rows = plan
        .columns
        .iter()
        .map(|column| {
            vec![
                column.target_name.clone(),
                column.source_name.clone().unwrap_or_else(|| "-".to_string()),
                column.column_type.describe(),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&["column", "source", "type"], &rows)
}

pub fn render_history(records: &[AuditRecord]) -> String {
    let rows = records
        .iter()
        .map(|record| {
            let payload = serde_json::Value::Object(record.row_data.clone()).to_string();
            vec![
                record.id.to_string(),
                record.filename.clone(),
                record.imported_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                preview(&payload),
            ]
        })
        .collect::<Vec<_>>();
    render_table(&["id", "filename", "imported_at", "row_data"], &rows)
}

fn preview(value: &str) -> String {
    if value.chars().count() <= HISTORY_PREVIEW_CHARS {
        return value.to_string();
    }
    let mut truncated = value
        .chars()
        .take(HISTORY_PREVIEW_CHARS - 3)
        .collect::<String>();
    truncated.push_str("...");
    truncated
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let cell = clean_cell(value);
            let padding = width.saturating_sub(cell.chars().count());
            format!("{cell}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn clean_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{schema::infer, upload::parse_csv};
    use encoding_rs::UTF_8;

    #[test]
    fn render_table_aligns_columns() {
        let rows = vec![
            vec!["1".to_string(), "Alice".to_string()],
            vec!["2".to_string(), "Bob".to_string()],
        ];
        let rendered = render_table(&["id", "name"], &rows);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines, vec!["id  name", "--  -----", "1   Alice", "2   Bob"]);
    }

    #[test]
    fn render_plan_lists_synthetic_columns_without_source() {
        let raw = parse_csv(b"Full Name\nAda\n", UTF_8).unwrap();
        let rendered = render_plan(&infer(&raw).unwrap());
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[2], "id               -          integer");
        assert_eq!(lines[3], "full_name        Full Name  varchar(255)");
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn preview_truncates_long_payloads() {
        let long = "x".repeat(100);
        let shown = preview(&long);
        assert_eq!(shown.chars().count(), HISTORY_PREVIEW_CHARS);
        assert!(shown.ends_with("..."));
    }
}
