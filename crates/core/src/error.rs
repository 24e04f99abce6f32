//! Error types for covershift

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for covershift operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required band, file or model artifact is absent.
    #[error("missing input: {item} in {}; available: [{}]", location.display(), available.join(", "))]
    MissingInput {
        item: String,
        location: PathBuf,
        available: Vec<String>,
    },

    /// No scenes, blocks or rows to process.
    #[error("empty dataset: {0}")]
    EmptyDataset(String),

    /// Rasters combined by one operation disagree on shape, transform or CRS.
    #[error("geometry mismatch in {context}: {detail}")]
    GeometryMismatch { context: String, detail: String },

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("TIFF error: {0}")]
    Tiff(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("classifier error: {0}")]
    Classifier(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a [`Error::MissingInput`] listing the entries of `location`.
    ///
    /// The listing is best effort: an unreadable directory yields an empty list.
    pub fn missing_in_dir(item: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        let location = location.into();
        let mut available: Vec<String> = std::fs::read_dir(&location)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        available.sort();
        Error::MissingInput {
            item: item.into(),
            location,
            available,
        }
    }

    pub fn geometry(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::GeometryMismatch {
            context: context.into(),
            detail: detail.into(),
        }
    }
}

impl From<tiff::TiffError> for Error {
    fn from(e: tiff::TiffError) -> Self {
        match e {
            tiff::TiffError::IoError(io) => Error::Io(io),
            other => Error::Tiff(other.to_string()),
        }
    }
}

/// Result type alias for covershift operations
pub type Result<T> = std::result::Result<T, Error>;
