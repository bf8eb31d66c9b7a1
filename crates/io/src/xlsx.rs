// Excel reading (xlsx, xlsm, xls) via calamine

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};

use crate::grid::{Cell, Grid};
use crate::IoError;

/// Maximum number of cells to read (prevents DoS from huge files)
const MAX_CELLS: usize = 2_000_000;

/// Read the first worksheet of an Excel workbook
pub fn read(path: &Path) -> Result<Grid, IoError> {
    let mut workbook: Sheets<_> = open_workbook_auto(path)
        .map_err(|e| IoError::Format(format!("Failed to open Excel file: {}", e)))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| IoError::Format("Excel file contains no sheets".to_string()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| IoError::Format(format!("Failed to read sheet '{}': {}", sheet_name, e)))?;

    let (height, width) = range.get_size();
    if height.saturating_mul(width) > MAX_CELLS {
        return Err(IoError::Format(format!(
            "Sheet '{}' is too large ({}x{} cells)",
            sheet_name, height, width
        )));
    }

    // Range start offset (data may not begin at A1)
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let start_row = start_row as usize;
    let start_col = start_col as usize;

    let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); start_row];
    for row in range.rows() {
        let mut cells = vec![Cell::Empty; start_col];
        cells.extend(row.iter().map(to_cell));
        rows.push(cells);
    }

    log::debug!(
        "{}: read sheet '{}' ({} rows)",
        path.display(),
        sheet_name,
        rows.len()
    );

    Ok(Grid::from_cells(rows)?)
}

fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(n) => Cell::Number(*n),
        Data::Int(n) => Cell::Number(*n as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::Error(e) => Cell::Text(format!("#{:?}", e)),
        // Dates stay as their serial number
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) => Cell::Text(s.clone()),
        Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_first_sheet_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.xlsx");

        let mut workbook = rust_xlsxwriter::Workbook::new();
        let first = workbook.add_worksheet();
        first.write_string(0, 0, "项目名称").unwrap();
        first.write_string(0, 1, "金额").unwrap();
        first.write_string(1, 0, "员工工资").unwrap();
        first.write_number(1, 1, 5000.0).unwrap();
        first.write_string(2, 0, "房租").unwrap();
        first.write_number(2, 1, 1200.5).unwrap();
        let second = workbook.add_worksheet();
        second.write_string(0, 0, "ignored").unwrap();
        workbook.save(&path).unwrap();

        let grid = read(&path).unwrap();
        assert_eq!(grid.width(), 2);
        assert_eq!(grid.height(), 3);
        assert_eq!(grid.cell(0, 1), "金额");
        assert_eq!(grid.cell(1, 1), "5000");
        assert_eq!(grid.cell(2, 1), "1200.5");
    }

    #[test]
    fn offset_range_keeps_positions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("offset.xlsx");

        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(2, 1, "name").unwrap();
        sheet.write_string(2, 2, "amount").unwrap();
        sheet.write_boolean(3, 1, true).unwrap();
        workbook.save(&path).unwrap();

        let grid = read(&path).unwrap();
        assert_eq!(grid.cell(2, 1), "name");
        assert_eq!(grid.cell(3, 1), "TRUE");
        assert_eq!(grid.cell(0, 0), "");
    }
}
