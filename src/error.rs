use thiserror::Error;

use crate::config::ConfigError;
use crate::files::FileError;
use crate::workbook::WorkbookError;

/// Everything that can abort a profile run.
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Workbook(#[from] WorkbookError),

    #[error(transparent)]
    File(#[from] FileError),

    #[error("Failed to serialize simulator {file}: {source}")]
    SimulatorJson {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    /// `row` is the spreadsheet row number (the header is row 1).
    #[error("Row: {row} - Column Name ({column}) not found in spreadsheet")]
    MissingColumn { row: usize, column: String },
}
