//! Parquet export of the training matrix for the external fitting harness.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use parquet::data_type::{ByteArray, ByteArrayType, DoubleType, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::writer::SerializedFileWriter;
use parquet::record::RowAccessor;
use parquet::schema::parser::parse_message_type;

use crate::features::{FEATURE_COUNT, FEATURE_NAMES};
use crate::training::TrainingSet;

const LEADING_COLUMNS: usize = 3;

fn message_type() -> String {
    let mut out = String::from(
        "message training_row {\n  REQUIRED INT64 fixture_id;\n  REQUIRED INT64 kickoff;\n  REQUIRED BYTE_ARRAY result (UTF8);\n",
    );
    for name in FEATURE_NAMES {
        out.push_str(&format!("  REQUIRED DOUBLE {name};\n"));
    }
    out.push('}');
    out
}

/// Writes one row group with `fixture_id`, `kickoff` (unix seconds), `result`
/// and the feature columns in contract order. Returns the row count.
pub fn write_training_parquet(path: &Path, set: &TrainingSet) -> Result<usize> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }

    let schema = Arc::new(parse_message_type(&message_type()).context("parse parquet schema")?);
    let props = Arc::new(WriterProperties::builder().build());
    let file = fs::File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut writer =
        SerializedFileWriter::new(file, schema, props).context("open parquet writer")?;

    let ids: Vec<i64> = set.rows.iter().map(|r| r.fixture_id.0 as i64).collect();
    let kickoffs: Vec<i64> = set.rows.iter().map(|r| r.kickoff.timestamp()).collect();
    let results: Vec<ByteArray> = set
        .rows
        .iter()
        .map(|r| ByteArray::from(r.outcome.code().to_string().as_str()))
        .collect();
    let arrays: Vec<[f64; FEATURE_COUNT]> =
        set.rows.iter().map(|r| r.features.to_array()).collect();

    let mut row_group = writer.next_row_group().context("start row group")?;
    let mut idx = 0usize;
    while let Some(mut col) = row_group.next_column().context("next column")? {
        match idx {
            0 => {
                col.typed::<Int64Type>()
                    .write_batch(&ids, None, None)
                    .context("write fixture_id")?;
            }
            1 => {
                col.typed::<Int64Type>()
                    .write_batch(&kickoffs, None, None)
                    .context("write kickoff")?;
            }
            2 => {
                col.typed::<ByteArrayType>()
                    .write_batch(&results, None, None)
                    .context("write result")?;
            }
            _ => {
                let feature = idx - LEADING_COLUMNS;
                let values: Vec<f64> = arrays.iter().map(|a| a[feature]).collect();
                col.typed::<DoubleType>()
                    .write_batch(&values, None, None)
                    .with_context(|| format!("write {}", FEATURE_NAMES[feature]))?;
            }
        }
        col.close().context("close column")?;
        idx += 1;
    }
    row_group.close().context("close row group")?;
    writer.close().context("close parquet writer")?;

    log::info!("wrote {} training rows to {}", ids.len(), path.display());
    Ok(ids.len())
}

/// Reads back `(fixture_id, result, features)` rows; used to verify exports.
pub fn read_training_parquet(path: &Path) -> Result<Vec<(i64, String, Vec<f64>)>> {
    let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = SerializedFileReader::new(file).context("open parquet reader")?;
    let columns = reader.metadata().file_metadata().schema_descr().num_columns();
    if columns != LEADING_COLUMNS + FEATURE_COUNT {
        return Err(anyhow!(
            "training export has {columns} columns, expected {}",
            LEADING_COLUMNS + FEATURE_COUNT
        ));
    }

    let mut out = Vec::new();
    for row in reader.get_row_iter(None).context("iterate training rows")? {
        let row = row.context("read training row")?;
        let id = row.get_long(0).context("fixture_id")?;
        let result = row.get_string(2).context("result")?.clone();
        let mut features = Vec::with_capacity(FEATURE_COUNT);
        for i in 0..FEATURE_COUNT {
            features.push(row.get_double(LEADING_COLUMNS + i).context("feature value")?);
        }
        out.push((id, result, features));
    }
    Ok(out)
}
