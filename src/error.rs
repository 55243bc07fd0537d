use std::path::PathBuf;

use thiserror::Error;

/// Shape of the (spin, kpoint, band) block shared by both raw arrays.
pub type BlockShape = (usize, usize, usize);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(
        "eigenvalue array has shape (spins, kpoints, bands) = {eigenvalues:?} \
         but projection array has {projections:?}"
    )]
    ShapeMismatch {
        eigenvalues: BlockShape,
        projections: BlockShape,
    },

    #[error("{array} array is not rectangular: {details}")]
    RaggedArray { array: &'static str, details: String },

    #[error("cache artifact {} is corrupt: {details}", path.display())]
    CorruptCache { path: PathBuf, details: String },

    #[error("unsupported input format for {}: expected .xml, .parquet or .pq", path.display())]
    UnsupportedInputFormat { path: PathBuf },

    #[error("unsupported output format for {}: expected .csv, .json, .parquet or .pq", path.display())]
    UnsupportedOutputFormat { path: PathBuf },

    #[error("invalid predicate combination: {0}")]
    InvalidPredicateCombination(String),

    #[error("unknown orbital '{0}'")]
    UnknownOrbital(String),

    #[error("table invariant violated: {0}")]
    InvalidTable(String),

    #[error("failed to read {} at byte {position}: {details}", path.display())]
    RawParse {
        path: PathBuf,
        position: usize,
        details: String,
    },

    #[error("I/O operation failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Arrow conversion failed: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet write failed: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON export failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn corrupt(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        Self::CorruptCache {
            path: path.into(),
            details: details.into(),
        }
    }

    pub fn raw_parse(path: impl Into<PathBuf>, position: usize, details: impl Into<String>) -> Self {
        Self::RawParse {
            path: path.into(),
            position,
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
