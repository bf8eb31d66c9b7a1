// File input: validation, readers, grid normalization

pub mod csv;
pub mod grid;
pub mod xlsx;

use std::fmt;
use std::path::{Path, PathBuf};

use ledgermatch_config::ParseSettings;

pub use grid::{clean_text, Cell, Grid, GridError};

/// Accepted spreadsheet formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Excel,
}

impl FileKind {
    /// Classify by extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(FileKind::Csv),
            "xlsx" | "xlsm" | "xls" => Some(FileKind::Excel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoError {
    NotFound(PathBuf),
    UnsupportedExtension(String),
    TooLarge { size: u64, limit: u64 },
    Read(String),
    Format(String),
    Grid(GridError),
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoError::NotFound(path) => write!(f, "file not found: {}", path.display()),
            IoError::UnsupportedExtension(ext) => write!(
                f,
                "unsupported file type '{}' (expected .xlsx, .xls, .xlsm or .csv)",
                ext
            ),
            IoError::TooLarge { size, limit } => write!(
                f,
                "file is {} bytes, larger than the {} byte limit",
                size, limit
            ),
            IoError::Read(msg) => write!(f, "read failed: {}", msg),
            IoError::Format(msg) => write!(f, "{}", msg),
            IoError::Grid(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IoError::Grid(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GridError> for IoError {
    fn from(e: GridError) -> Self {
        IoError::Grid(e)
    }
}

/// Validate and read a spreadsheet file into a normalized grid.
///
/// Only the first worksheet of a workbook is read.
pub fn load_grid(path: &Path, settings: &ParseSettings) -> Result<Grid, IoError> {
    let kind = FileKind::from_path(path).ok_or_else(|| {
        IoError::UnsupportedExtension(
            path.extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_string(),
        )
    })?;

    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => IoError::NotFound(path.to_path_buf()),
        _ => IoError::Read(e.to_string()),
    })?;
    if metadata.len() > settings.max_file_bytes {
        return Err(IoError::TooLarge {
            size: metadata.len(),
            limit: settings.max_file_bytes,
        });
    }

    let grid = match kind {
        FileKind::Csv => csv::read(path)?,
        FileKind::Excel => xlsx::read(path)?,
    };
    log::info!(
        "loaded {} ({} rows x {} columns)",
        path.display(),
        grid.height(),
        grid.width()
    );
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn extension_is_case_insensitive() {
        assert_eq!(FileKind::from_path(Path::new("a.CSV")), Some(FileKind::Csv));
        assert_eq!(FileKind::from_path(Path::new("a.XlSm")), Some(FileKind::Excel));
        assert_eq!(FileKind::from_path(Path::new("a.ods")), None);
        assert_eq!(FileKind::from_path(Path::new("noext")), None);
    }

    #[test]
    fn rejects_unsupported_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.txt");
        fs::write(&path, "a,b\n").unwrap();
        let err = load_grid(&path, &ParseSettings::default()).unwrap_err();
        assert_eq!(err, IoError::UnsupportedExtension("txt".into()));
    }

    #[test]
    fn rejects_oversized_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.csv");
        fs::write(&path, "name,amount\nx,1\n").unwrap();
        let settings = ParseSettings {
            max_file_bytes: 4,
            ..ParseSettings::default()
        };
        assert!(matches!(
            load_grid(&path, &settings),
            Err(IoError::TooLarge { limit: 4, .. })
        ));
    }

    #[test]
    fn missing_file() {
        let err = load_grid(Path::new("/nonexistent/ledger.csv"), &ParseSettings::default())
            .unwrap_err();
        assert!(matches!(err, IoError::NotFound(_)));
    }

    #[test]
    fn empty_csv_is_grid_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        fs::write(&path, "\n,,\n").unwrap();
        let err = load_grid(&path, &ParseSettings::default()).unwrap_err();
        assert_eq!(err, IoError::Grid(GridError::Empty));
    }
}
