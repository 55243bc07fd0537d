use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use super::cache;
use super::model::{Record, Table};
use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Table output
// ---------------------------------------------------------------------------

/// File format picked from an output path's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
    Cache,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            "parquet" | "pq" => Ok(OutputFormat::Cache),
            _ => Err(EngineError::UnsupportedOutputFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// Header of the delimited table layout.
pub const CSV_HEADER: [&str; 8] = [
    "Spin",
    "Kpoint",
    "Band",
    "Ion",
    "Orbital",
    "Energy",
    "Occupation",
    "Value",
];

fn csv_fields(r: &Record) -> [String; 8] {
    [
        r.spin.to_string(),
        r.kpoint.to_string(),
        r.band.to_string(),
        r.ion.map(|i| i.to_string()).unwrap_or_default(),
        r.orbital.to_string(),
        r.energy.to_string(),
        r.occupation.to_string(),
        r.value.to_string(),
    ]
}

/// Write `table` in the format implied by `path`'s extension.
pub fn write_table(table: &Table, path: &Path) -> Result<()> {
    match OutputFormat::from_path(path)? {
        OutputFormat::Csv => write_csv(table, path),
        OutputFormat::Json => write_json(table.records(), path),
        OutputFormat::Cache => cache::save(table, path),
    }
}

/// Comma-separated records; ion-summed rows leave the `Ion` cell empty.
pub fn write_csv(table: &Table, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(CSV_HEADER)?;
    for r in table {
        writer.write_record(csv_fields(r))?;
    }
    writer.flush()?;
    log::info!("Wrote {} records to {}", table.len(), path.display());
    Ok(())
}

/// Records-oriented JSON array: `[{"Spin": 0, "Kpoint": 0, ...}, ...]`.
pub fn write_json<T: Serialize>(rows: &[T], path: &Path) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut out, rows)?;
    out.write_all(b"\n")?;
    out.flush()?;
    log::info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Write any serializable rows as CSV with the given header and cell mapper.
pub fn write_rows_csv<T, const N: usize>(
    rows: &[T],
    header: [&str; N],
    cells: impl Fn(&T) -> [String; N],
    path: &Path,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(cells(row))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Orbital;

    fn table() -> Table {
        Table::try_from_records(vec![
            Record {
                spin: 0,
                kpoint: 1,
                band: 2,
                ion: Some(3),
                orbital: Orbital::Index(4),
                energy: -1.25,
                occupation: 1.0,
                value: 0.5,
            },
            Record {
                spin: 0,
                kpoint: 1,
                band: 2,
                ion: None,
                orbital: Orbital::Composite("Psum".into()),
                energy: -1.25,
                occupation: 1.0,
                value: 0.75,
            },
        ])
        .unwrap()
    }

    #[test]
    fn csv_output_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_table(&table(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Spin,Kpoint,Band,Ion,Orbital,Energy,Occupation,Value");
        assert_eq!(lines[1], "0,1,2,3,4,-1.25,1,0.5");
        assert_eq!(lines[2], "0,1,2,,Psum,-1.25,1,0.75");
    }

    #[test]
    fn json_output_is_records_oriented() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_table(&table(), &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<Record> = serde_json::from_str(&text).unwrap();
        assert_eq!(rows, table().into_records());
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value[0]["Orbital"], 4);
        assert_eq!(value[1]["Orbital"], "Psum");
        assert!(value[1]["Ion"].is_null());
    }

    #[test]
    fn unknown_output_extension_is_rejected() {
        let err = write_table(&table(), Path::new("result.xlsx")).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedOutputFormat { .. }));
    }
}
