//! Worksheet ingest.
//!
//! A workbook is either a directory holding one `<sheet>.csv` per worksheet,
//! a single `.csv` file (one sheet named after the file stem), or a JSON
//! document of the form `{ "<sheet>": [ { "<header>": "<value>" } ] }`.
//!
//! Cell values are trimmed and blank cells are left out of the row, so a
//! column that is absent and a column that is empty read the same way.

use csv::ReaderBuilder;
use log::debug;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One worksheet data row keyed by column header.
pub type DataRow = BTreeMap<String, String>;

#[derive(Error, Debug)]
pub enum WorkbookError {
    #[error("Failed to read workbook {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse sheet {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Failed to parse workbook {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Unsupported workbook format: {0:?}")]
    Unsupported(PathBuf),
    #[error("Unable to find sheet name ({sheet}) in spreadsheet: ({workbook})")]
    MissingSheet { sheet: String, workbook: String },
}

#[derive(Debug, Clone, Default)]
pub struct Workbook {
    name: String,
    sheets: BTreeMap<String, Vec<DataRow>>,
}

impl Workbook {
    /// Builds a workbook from in-memory sheets.
    pub fn from_sheets<I, S>(name: &str, sheets: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<DataRow>)>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            sheets: sheets.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn open(path: &Path) -> Result<Self, WorkbookError> {
        let name = path.display().to_string();
        let mut sheets = BTreeMap::new();

        if path.is_dir() {
            let entries = std::fs::read_dir(path).map_err(|source| WorkbookError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            for entry in entries {
                let entry = entry.map_err(|source| WorkbookError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                let sheet_path = entry.path();
                if has_extension(&sheet_path, "csv") {
                    if let Some(stem) = sheet_path.file_stem() {
                        let rows = read_csv_sheet(&sheet_path)?;
                        sheets.insert(stem.to_string_lossy().to_string(), rows);
                    }
                }
            }
        } else if has_extension(path, "csv") {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            sheets.insert(stem, read_csv_sheet(path)?);
        } else if has_extension(path, "json") {
            sheets = read_json_workbook(path)?;
        } else {
            return Err(WorkbookError::Unsupported(path.to_path_buf()));
        }

        debug!(
            "Loaded workbook {} with sheets {:?}",
            name,
            sheets.keys().collect::<Vec<_>>()
        );
        Ok(Self { name, sheets })
    }

    /// Rows of `sheet`, header row excluded, indexed from 0.
    pub fn sheet(&self, sheet: &str) -> Result<&[DataRow], WorkbookError> {
        self.sheets
            .get(sheet)
            .map(Vec::as_slice)
            .ok_or_else(|| WorkbookError::MissingSheet {
                sheet: sheet.to_string(),
                workbook: self.name.clone(),
            })
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.keys().map(String::as_str)
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
}

fn read_csv_sheet(path: &Path) -> Result<Vec<DataRow>, WorkbookError> {
    let csv_err = |source| WorkbookError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim_matches('\u{feff}').trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        let row: DataRow = record
            .iter()
            .zip(headers.iter())
            .filter(|(value, header)| !header.is_empty() && !value.trim().is_empty())
            .map(|(value, header)| (header.clone(), value.trim().to_string()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

fn read_json_workbook(path: &Path) -> Result<BTreeMap<String, Vec<DataRow>>, WorkbookError> {
    let content = std::fs::read_to_string(path).map_err(|source| WorkbookError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: BTreeMap<String, Vec<serde_json::Map<String, Value>>> =
        serde_json::from_str(&content).map_err(|source| WorkbookError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(raw
        .into_iter()
        .map(|(sheet, rows)| (sheet, rows.into_iter().map(json_row).collect()))
        .collect())
}

fn json_row(cells: serde_json::Map<String, Value>) -> DataRow {
    cells
        .into_iter()
        .filter_map(|(header, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            };
            (!text.is_empty()).then(|| (header.trim().to_string(), text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_open_csv_directory() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("Sheet 1.csv"),
            "ID,VALUE1, VALUE2 \n001, Value1 ,\n002,Value2,Other\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let workbook = Workbook::open(dir.path()).unwrap();
        let rows = workbook.sheet("Sheet 1").unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("VALUE1").map(String::as_str), Some("Value1"));
        assert!(!rows[0].contains_key("VALUE2"));
        assert_eq!(rows[1].get("VALUE2").map(String::as_str), Some("Other"));
        assert_eq!(workbook.sheet_names().collect::<Vec<_>>(), vec!["Sheet 1"]);
    }

    #[test]
    fn test_open_json_workbook() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("book.json");
        fs::write(
            &path,
            r#"{"Accounts": [{"ID": 7, "NAME": " Ann ", "BLANK": "", "NONE": null}]}"#,
        )
        .unwrap();

        let workbook = Workbook::open(&path).unwrap();
        let row = &workbook.sheet("Accounts").unwrap()[0];

        assert_eq!(row.get("ID").map(String::as_str), Some("7"));
        assert_eq!(row.get("NAME").map(String::as_str), Some("Ann"));
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_missing_sheet() {
        let workbook = Workbook::from_sheets("book", [("Sheet 1", Vec::new())]);
        let err = workbook.sheet("Sheet 2").unwrap_err();
        assert!(matches!(err, WorkbookError::MissingSheet { .. }));
        assert!(err.to_string().contains("Sheet 2"));
    }

    #[test]
    fn test_unsupported_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("book.xlsx");
        fs::write(&path, "").unwrap();
        assert!(matches!(
            Workbook::open(&path),
            Err(WorkbookError::Unsupported(_))
        ));
    }
}
