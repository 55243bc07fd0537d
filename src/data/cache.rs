use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, StringArray, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use super::model::{Orbital, Record, Table};
use crate::error::{EngineError, Result};

/// Rows per Arrow batch (and Parquet row group) when writing.
const BATCH_ROWS: usize = 64 * 1024;

/// Column layout of a cache artifact, in write order.
const COLUMNS: [(&str, DataType, bool); 8] = [
    ("Spin", DataType::UInt32, false),
    ("Kpoint", DataType::UInt32, false),
    ("Band", DataType::UInt32, false),
    ("Ion", DataType::UInt32, true),
    ("Orbital", DataType::Utf8, false),
    ("Energy", DataType::Float64, false),
    ("Occupation", DataType::Float64, false),
    ("Value", DataType::Float64, false),
];

/// Arrow schema shared by cache artifacts and tabular dumps.
pub fn table_schema() -> SchemaRef {
    Arc::new(Schema::new(
        COLUMNS
            .iter()
            .map(|(name, ty, nullable)| Field::new(*name, ty.clone(), *nullable))
            .collect::<Vec<_>>(),
    ))
}

/// Convert records into one Arrow batch with the [`table_schema`] layout.
pub fn to_record_batch(records: &[Record]) -> std::result::Result<RecordBatch, ArrowError> {
    let spin = UInt32Array::from(records.iter().map(|r| r.spin).collect::<Vec<_>>());
    let kpoint = UInt32Array::from(records.iter().map(|r| r.kpoint).collect::<Vec<_>>());
    let band = UInt32Array::from(records.iter().map(|r| r.band).collect::<Vec<_>>());
    let ion = UInt32Array::from(records.iter().map(|r| r.ion).collect::<Vec<_>>());
    let orbital = StringArray::from_iter_values(records.iter().map(|r| r.orbital.to_string()));
    let energy = Float64Array::from(records.iter().map(|r| r.energy).collect::<Vec<_>>());
    let occupation = Float64Array::from(records.iter().map(|r| r.occupation).collect::<Vec<_>>());
    let value = Float64Array::from(records.iter().map(|r| r.value).collect::<Vec<_>>());

    let columns: Vec<ArrayRef> = vec![
        Arc::new(spin),
        Arc::new(kpoint),
        Arc::new(band),
        Arc::new(ion),
        Arc::new(orbital),
        Arc::new(energy),
        Arc::new(occupation),
        Arc::new(value),
    ];
    RecordBatch::try_new(table_schema(), columns)
}

// ---------------------------------------------------------------------------
// Save
// ---------------------------------------------------------------------------

/// Write `table` to a Snappy-compressed Parquet file.
///
/// Records are written in (spin, kpoint, band, ion, orbital) order so saving
/// the same table twice produces identical bytes. The file is written next to
/// `path` and renamed into place once complete.
pub fn save(table: &Table, path: &Path) -> Result<()> {
    let tmp = staging_path(path);
    let written = write_parquet(table, &tmp).and_then(|()| Ok(fs::rename(&tmp, path)?));
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written?;
    log::info!("Saved {} records to {}", table.len(), path.display());
    Ok(())
}

fn write_parquet(table: &Table, path: &Path) -> Result<()> {
    let sorted = table.sorted();
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_max_row_group_size(BATCH_ROWS)
        .build();

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, table_schema(), Some(props))?;
    for chunk in sorted.records().chunks(BATCH_ROWS) {
        writer.write(&to_record_batch(chunk)?)?;
    }
    writer.close()?;
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read a table previously written by [`save`].
///
/// Anything that does not decode to the expected column set, or violates the
/// table invariants, is reported as [`EngineError::CorruptCache`].
pub fn load(path: &Path) -> Result<Table> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| EngineError::corrupt(path, format!("reading parquet metadata: {e}")))?;
    check_schema(path, builder.schema())?;

    let n_rows = usize::try_from(builder.metadata().file_metadata().num_rows()).unwrap_or(0);
    let reader = builder
        .build()
        .map_err(|e| EngineError::corrupt(path, format!("building parquet reader: {e}")))?;

    let mut records = Vec::with_capacity(n_rows);
    for batch_result in reader {
        let batch = batch_result
            .map_err(|e| EngineError::corrupt(path, format!("reading record batch: {e}")))?;
        read_batch(path, &batch, &mut records)?;
    }
    log::info!("Loaded {} records from {}", records.len(), path.display());

    Table::try_from_records(records).map_err(|e| EngineError::corrupt(path, e.to_string()))
}

fn check_schema(path: &Path, schema: &SchemaRef) -> Result<()> {
    let found: Vec<(&str, &DataType)> = schema
        .fields()
        .iter()
        .map(|f| (f.name().as_str(), f.data_type()))
        .collect();
    let matches = found.len() == COLUMNS.len()
        && found
            .iter()
            .zip(COLUMNS.iter())
            .all(|((name, ty), (want, want_ty, _))| name == want && *ty == want_ty);

    if !matches {
        let describe = |cols: Vec<String>| cols.join(", ");
        return Err(EngineError::corrupt(
            path,
            format!(
                "expected columns [{}], found [{}]",
                describe(COLUMNS.iter().map(|(n, t, _)| format!("{n}: {t}")).collect()),
                describe(found.iter().map(|(n, t)| format!("{n}: {t}")).collect()),
            ),
        ));
    }
    Ok(())
}

fn column<'a, T: 'static>(path: &Path, batch: &'a RecordBatch, name: &str, nullable: bool) -> Result<&'a T> {
    let col = batch
        .column_by_name(name)
        .ok_or_else(|| EngineError::corrupt(path, format!("missing column '{name}'")))?;
    if !nullable && col.null_count() > 0 {
        return Err(EngineError::corrupt(
            path,
            format!("column '{name}' contains {} nulls", col.null_count()),
        ));
    }
    col.as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| EngineError::corrupt(path, format!("column '{name}' has type {}", col.data_type())))
}

fn read_batch(path: &Path, batch: &RecordBatch, out: &mut Vec<Record>) -> Result<()> {
    let spin = column::<UInt32Array>(path, batch, "Spin", false)?;
    let kpoint = column::<UInt32Array>(path, batch, "Kpoint", false)?;
    let band = column::<UInt32Array>(path, batch, "Band", false)?;
    let ion = column::<UInt32Array>(path, batch, "Ion", true)?;
    let orbital = column::<StringArray>(path, batch, "Orbital", false)?;
    let energy = column::<Float64Array>(path, batch, "Energy", false)?;
    let occupation = column::<Float64Array>(path, batch, "Occupation", false)?;
    let value = column::<Float64Array>(path, batch, "Value", false)?;

    for row in 0..batch.num_rows() {
        let orbital: Orbital = orbital
            .value(row)
            .parse()
            .map_err(|e| EngineError::corrupt(path, format!("row {row}: {e}")))?;
        out.push(Record {
            spin: spin.value(row),
            kpoint: kpoint.value(row),
            band: band.value(row),
            ion: (!ion.is_null(row)).then(|| ion.value(row)),
            orbital,
            energy: energy.value(row),
            occupation: occupation.value(row),
            value: value.value(row),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::normalize::{normalize, EigenArray, ProjectionArray};
    use crate::data::orbital::OrbitalGroup;
    use crate::data::aggregate::with_orbital_sum;

    fn sample_table() -> Table {
        let eigen = EigenArray::from_nested(vec![
            vec![vec![(-1.5, 1.0), (2.0, 0.0)], vec![(-1.2, 1.0), (2.4, 0.0)]],
        ])
        .unwrap();
        let proj = ProjectionArray::from_nested(vec![vec![
            vec![
                vec![vec![0.1, 0.2, 0.0, 0.3], vec![0.05, 0.05, 0.1, 0.1]],
                vec![vec![0.2, 0.1, 0.1, 0.1], vec![0.1, 0.1, 0.1, 0.1]],
            ],
            vec![
                vec![vec![0.3, 0.1, 0.1, 0.1], vec![0.1, 0.1, 0.1, 0.1]],
                vec![vec![0.0, 0.4, 0.1, 0.1], vec![0.1, 0.1, 0.1, 0.0]],
            ],
        ]])
        .unwrap();
        normalize(&eigen, &proj).unwrap()
    }

    #[test]
    fn round_trip_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("procar.parquet");
        let table = with_orbital_sum(&sample_table(), &OrbitalGroup::lookup("Psum").unwrap());

        save(&table, &path).unwrap();
        let loaded = load(&path).unwrap();
        assert!(loaded.same_records(&table));
        assert!(!dir.path().join("procar.parquet.partial").exists());
    }

    #[test]
    fn saving_twice_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.parquet");
        let b = dir.path().join("b.parquet");
        let table = sample_table();
        let mut reversed = table.clone().into_records();
        reversed.reverse();
        let reversed = Table::try_from_records(reversed).unwrap();

        save(&table, &a).unwrap();
        save(&reversed, &b).unwrap();
        assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());
    }

    #[test]
    fn foreign_schema_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.parquet");
        let schema = Arc::new(Schema::new(vec![Field::new("x", DataType::Float64, false)]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Float64Array::from(vec![1.0, 2.0])) as ArrayRef],
        )
        .unwrap();
        let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, EngineError::CorruptCache { .. }));
        assert!(err.to_string().contains("expected columns"));
    }

    #[test]
    fn garbage_bytes_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.parquet");
        fs::write(&path, b"definitely not parquet").unwrap();
        assert!(matches!(load(&path), Err(EngineError::CorruptCache { .. })));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("absent.parquet")).unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }

    #[test]
    fn empty_table_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pq");
        save(&Table::empty(), &path).unwrap();
        assert!(load(&path).unwrap().is_empty());
    }
}
