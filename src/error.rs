use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BinError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Missing header section: {0}")]
    MissingSection(&'static str),

    #[error("Layout mismatch at line {line}: expected '{expected}', found '{found}'")]
    LayoutMismatch {
        line: usize,
        expected: &'static str,
        found: String,
    },

    #[error("Corrupt sample data: {0}")]
    Decode(String),

    #[error("Start page {start} is beyond the end of the file ({page_count} pages)")]
    StartOutOfRange { start: usize, page_count: usize },

    #[error("No pages match the requested window{0}")]
    NoMatchingPages(String),

    #[error("Invalid window specification: {0}")]
    InvalidWindow(String),

    #[error("Invalid time specification: {0}")]
    InvalidTime(String),

    #[error("Invalid read option: {0}")]
    InvalidOption(String),

    #[error("Invalid calibration input: {0}")]
    CalibrationInput(String),
}

pub type Result<T> = std::result::Result<T, BinError>;
