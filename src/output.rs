use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};
use tracing::debug;

use crate::error::Result;

/// Create the export directory if needed and return the full path of `file`.
pub fn output_path(dir: &Path, file: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    Ok(dir.join(file))
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    debug!(path = %path.display(), rows = rows.len(), "CSV written");
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    fs::write(path, s)?;
    debug!(path = %path.display(), "JSON written");
    Ok(())
}

/// Markdown rendering of the first `max_rows` rows.
pub fn render_table<T>(rows: &[T], max_rows: usize) -> Option<String>
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        return None;
    }
    Some(Table::new(slice).with(Style::markdown()).to_string())
}

pub fn preview_table<T>(report_no: usize, title: &str, note: Option<&str>, rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("Report {}: {}", report_no, title);
    if let Some(n) = note {
        println!("({})", n);
    }
    println!();
    preview_table_rows(rows, max_rows);
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    match render_table(rows, max_rows) {
        Some(table) => println!("{}\n", table),
        None => println!("(no rows)\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Debug, Clone, Serialize, Tabled)]
    struct Row {
        #[serde(rename = "Branch")]
        #[tabled(rename = "Branch")]
        branch: String,
        #[serde(rename = "TotalCost")]
        #[tabled(rename = "TotalCost")]
        total_cost: f64,
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { branch: "CURITIBA".into(), total_cost: 10.5 },
            Row { branch: "LONDRINA".into(), total_cost: 3.0 },
        ]
    }

    #[test]
    fn csv_uses_serde_headers() {
        let dir = tempdir().unwrap();
        let path = output_path(&dir.path().join("out"), "branches.csv").unwrap();
        write_csv(&path, &rows()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next(), Some("Branch,TotalCost"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn json_is_pretty_printed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("summary.json");
        write_json(&path, &rows()).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value[1]["Branch"], "LONDRINA");
    }

    #[test]
    fn markdown_preview_is_truncated() {
        let table = render_table(&rows(), 1).unwrap();
        assert!(table.contains("CURITIBA"));
        assert!(!table.contains("LONDRINA"));
        assert!(render_table::<Row>(&[], 5).is_none());
    }
}
