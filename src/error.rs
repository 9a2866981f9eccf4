// Error types for the conversion engine and the settings document

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Invalid column layout: {0}")]
    InvalidLayout(String),

    #[error("Invalid voltage range: low voltage {min} must be below high voltage {max}")]
    InvalidVoltageRange { min: f64, max: f64 },

    #[error("Cannot open data file for reading: {source}")]
    InputUnreadable {
        #[source]
        source: io::Error,
    },

    #[error("Cannot write output file ({rows_written} rows written): {source}")]
    OutputUnwritable {
        rows_written: u64,
        /// Length of the complete lines that reached the output.
        bytes_written: u64,
        #[source]
        source: io::Error,
    },

    #[error("Input and output files must not be the same file: {}", path.display())]
    SameFileConflict { path: PathBuf },

    #[error("Error reading data file at row {row} ({rows_written} rows written): {source}")]
    ReadFailure {
        row: u64,
        rows_written: u64,
        #[source]
        source: io::Error,
    },

    #[error("Processing cancelled")]
    Cancelled,
}

impl ConversionError {
    /// Number of complete lines known to be in the output when the run stopped.
    pub fn rows_written(&self) -> u64 {
        match self {
            ConversionError::OutputUnwritable { rows_written, .. }
            | ConversionError::ReadFailure { rows_written, .. } => *rows_written,
            _ => 0,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConversionError>;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Unable to read or create settings file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot get settings from {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
