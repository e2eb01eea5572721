use calamine::{open_workbook_auto, Data, Range, Reader};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{Cell, RawTable, SourceTables};
use crate::util::collapse_whitespace;

#[derive(Debug, Clone)]
pub struct SheetNames {
    pub transactions: String,
    pub fleet: String,
    pub branches: String,
}

impl Default for SheetNames {
    fn default() -> Self {
        Self {
            transactions: "BD 2023".to_string(),
            fleet: "FROTA".to_string(),
            branches: "Filiais".to_string(),
        }
    }
}

fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        // Date cells keep their serial value; the pipeline converts serials.
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) => Cell::Empty,
    }
}

/// First row becomes the (normalized) header; fully empty rows are skipped.
pub fn range_to_table(name: &str, range: &Range<Data>) -> RawTable {
    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header
            .iter()
            .map(|c| match c {
                Data::String(s) => collapse_whitespace(s),
                other => collapse_whitespace(&other.to_string()),
            })
            .collect(),
        None => Vec::new(),
    };
    let body: Vec<Vec<Cell>> = rows
        .map(|r| r.iter().map(to_cell).collect::<Vec<_>>())
        .filter(|r| r.iter().any(|c| !c.is_empty()))
        .collect();
    debug!(sheet = name, columns = headers.len(), rows = body.len(), "Sheet read");
    RawTable::new(name, headers, body)
}

/// Read the transaction sheet and both registries from a workbook
/// (`.xlsx`, `.xlsb`, `.xls` or `.ods`).
pub fn read_workbook(path: &Path, sheets: &SheetNames) -> Result<SourceTables> {
    if !path.exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("workbook not found: {}", path.display()),
        )));
    }
    let mut workbook = open_workbook_auto(path)?;
    let available = workbook.sheet_names().to_vec();

    let mut read = |name: &str| -> Result<RawTable> {
        if !available.iter().any(|s| s == name) {
            return Err(Error::MissingSheet(name.to_string()));
        }
        let range = workbook.worksheet_range(name)?;
        Ok(range_to_table(name, &range))
    };

    let transactions = read(&sheets.transactions)?;
    let fleet = read(&sheets.fleet)?;
    let branches = read(&sheets.branches)?;

    info!(
        path = %path.display(),
        transactions = transactions.rows.len(),
        fleet = fleet.rows.len(),
        branches = branches.rows.len(),
        "Workbook loaded"
    );

    Ok(SourceTables {
        transactions,
        fleet: Some(fleet),
        branches: Some(branches),
    })
}
