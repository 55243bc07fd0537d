use std::path::Path;

use super::model::Table;
use super::normalize::normalize;
use super::{cache, vasprun};
use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Source kinds
// ---------------------------------------------------------------------------

/// How a source file is turned into a [`Table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Raw calculation output (`vasprun.xml`), parsed and normalized.
    Raw,
    /// A cache artifact written by [`cache::save`].
    Cache,
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

/// Classify `path` by extension, before anything is read.
///
/// Supported formats:
/// * `.xml`             – vasprun.xml with projected eigenvalues
/// * `.parquet` / `.pq` – cache artifact
pub fn source_kind(path: &Path) -> Result<SourceKind> {
    match extension(path).as_str() {
        "xml" => Ok(SourceKind::Raw),
        "parquet" | "pq" => Ok(SourceKind::Cache),
        _ => Err(EngineError::UnsupportedInputFormat {
            path: path.to_path_buf(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a table from a file. Dispatch by extension.
pub fn load_table(path: &Path) -> Result<Table> {
    match source_kind(path)? {
        SourceKind::Raw => load_raw(path),
        SourceKind::Cache => cache::load(path),
    }
}

/// Parse a raw calculation artifact and normalize it.
pub fn load_raw(path: &Path) -> Result<Table> {
    let raw = vasprun::read_vasprun(path)?;
    normalize(&raw.eigenvalues, &raw.projections)
}
