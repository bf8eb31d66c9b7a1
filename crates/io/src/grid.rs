// Cell grid normalization
//
// Readers hand over rows of loosely typed cells; everything downstream works
// on a rectangular grid of cleaned strings.

use std::fmt;

/// A single scalar from a source sheet
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    /// Render the cell as cleaned text
    pub fn to_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => clean_text(s),
            Cell::Number(n) => format_number(*n),
            Cell::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }
}

/// Integers without decimals, everything else with its shortest representation
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Remove zero-width characters, turn exotic spaces into ordinary ones, trim.
pub fn clean_text(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '\u{200B}'..='\u{200D}' | '\u{2060}' | '\u{FEFF}'))
        .map(|c| match c {
            '\u{00A0}' | '\u{2007}' | '\u{202F}' | '\u{3000}' => ' ',
            other => other,
        })
        .collect();
    cleaned.trim().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    /// The sheet has no non-empty cell
    Empty,
    /// A row is wider than the grid it is being placed in
    RowTooWide { row: usize, len: usize, width: usize },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::Empty => write!(f, "sheet contains no data"),
            GridError::RowTooWide { row, len, width } => write!(
                f,
                "row {} has {} cells but the grid is {} columns wide",
                row + 1,
                len,
                width
            ),
        }
    }
}

impl std::error::Error for GridError {}

/// Rectangular grid of cleaned strings. Every row has exactly `width` cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    rows: Vec<Vec<String>>,
    width: usize,
}

impl Grid {
    /// Build a grid of the given width. Short rows are padded; a row longer
    /// than `width` is an error, never truncated.
    pub fn with_width(width: usize, rows: Vec<Vec<String>>) -> Result<Self, GridError> {
        let mut padded = Vec::with_capacity(rows.len());
        for (idx, mut row) in rows.into_iter().enumerate() {
            if row.len() > width {
                return Err(GridError::RowTooWide {
                    row: idx,
                    len: row.len(),
                    width,
                });
            }
            row.resize(width, String::new());
            padded.push(row);
        }
        Ok(Self { rows: padded, width })
    }

    /// Normalize raw reader output
    pub fn from_cells(rows: Vec<Vec<Cell>>) -> Result<Self, GridError> {
        let text_rows: Vec<Vec<String>> = rows
            .into_iter()
            .map(|row| row.iter().map(Cell::to_text).collect())
            .collect();
        Self::from_text_rows(text_rows)
    }

    /// Normalize rows of plain strings (CSV output, tests)
    pub fn from_rows<S: AsRef<str>>(rows: &[Vec<S>]) -> Result<Self, GridError> {
        let text_rows = rows
            .iter()
            .map(|row| row.iter().map(|s| clean_text(s.as_ref())).collect())
            .collect();
        Self::from_text_rows(text_rows)
    }

    fn from_text_rows(mut rows: Vec<Vec<String>>) -> Result<Self, GridError> {
        // Width is set by the right-most non-empty cell anywhere in the sheet
        let width = rows
            .iter()
            .filter_map(|row| row.iter().rposition(|c| !c.is_empty()).map(|i| i + 1))
            .max()
            .ok_or(GridError::Empty)?;

        while rows
            .last()
            .map(|row| row.iter().all(String::is_empty))
            .unwrap_or(false)
        {
            rows.pop();
        }

        for row in rows.iter_mut() {
            // Only empty cells lie beyond `width`
            row.truncate(width);
        }

        Self::with_width(width, rows)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> Option<&[String]> {
        self.rows.get(idx).map(Vec::as_slice)
    }

    /// Cell text, or "" outside the grid
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }
}
