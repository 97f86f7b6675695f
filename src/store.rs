//! Parquet persistence of the aligned dataset.
//!
//! Layout: a `timestamp` column (milliseconds, UTC) followed by the columns of every
//! instrument in dataset order (`ETH_open`, ..., `ETH_ret`, `SOL_open`, ...). The instrument
//! prefixes are also recorded in the schema metadata under [`INSTRUMENTS_METADATA_KEY`].

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, TimestampMillisecondArray,
    TimestampNanosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;
use tracing::info;

use crate::align::{column_name, ColumnRef, InstrumentColumns, PairedDataset};
use crate::config::output_dir;
use crate::data::from_millis;
use crate::errors::{PairDatasetError, Result};

/// Schema metadata key holding the comma separated instrument prefixes.
pub const INSTRUMENTS_METADATA_KEY: &str = "instruments";
/// Name of the time index column.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

fn column_field(name: String, col: &ColumnRef<'_>) -> Field {
    let data_type = match col {
        ColumnRef::Float(_) => DataType::Float64,
        ColumnRef::Int(_) => DataType::Int64,
        ColumnRef::Bool(_) => DataType::Boolean,
    };
    Field::new(name, data_type, true)
}

fn column_array(col: &ColumnRef<'_>) -> ArrayRef {
    match col {
        ColumnRef::Float(v) => Arc::new(Float64Array::from(v.to_vec())),
        ColumnRef::Int(v) => Arc::new(Int64Array::from(v.to_vec())),
        ColumnRef::Bool(v) => Arc::new(BooleanArray::from(v.to_vec())),
    }
}

/// Build the Arrow record batch for `dataset`.
pub fn to_record_batch(dataset: &PairedDataset) -> Result<RecordBatch> {
    dataset.check_shape()?;

    let millis: Vec<i64> = dataset.timestamps.iter().map(|t| t.timestamp_millis()).collect();
    let mut fields = vec![Field::new(
        TIMESTAMP_COLUMN,
        DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
        false,
    )];
    let mut columns: Vec<ArrayRef> =
        vec![Arc::new(TimestampMillisecondArray::from(millis).with_timezone("UTC"))];

    for (name, col) in dataset.columns() {
        columns.push(column_array(&col));
        fields.push(column_field(name, &col));
    }

    let metadata = HashMap::from([(
        INSTRUMENTS_METADATA_KEY.to_string(),
        dataset.prefixes().join(","),
    )]);
    let schema = Arc::new(Schema::new(fields).with_metadata(metadata));
    Ok(RecordBatch::try_new(schema, columns)?)
}

/// Persist `dataset` to `path`. Refuses datasets with duplicate timestamps.
///
/// The file is staged next to `path` and renamed into place. A failed write removes the
/// staging file and leaves no truncated dataset behind.
pub fn write_dataset(dataset: &PairedDataset, path: &Path) -> Result<()> {
    let duplicates = dataset.duplicate_timestamps();
    if duplicates > 0 {
        return Err(PairDatasetError::data_integrity(format!(
            "Refusing to persist dataset with {} duplicate timestamps",
            duplicates
        )));
    }

    let batch = to_record_batch(dataset)?;
    let mut staging = tempfile::Builder::new()
        .prefix(".pair-dataset-")
        .suffix(".parquet.partial")
        .tempfile_in(output_dir(path))?;
    {
        let mut writer = ArrowWriter::try_new(staging.as_file_mut(), batch.schema(), None)?;
        writer.write(&batch)?;
        writer.close()?;
    }
    staging.persist(path).map_err(|e| e.error)?;

    info!(
        "wrote {} rows x {} columns to {}",
        batch.num_rows(),
        batch.num_columns(),
        path.display()
    );
    Ok(())
}

/// Read a dataset written by [`write_dataset`].
pub fn read_dataset(path: &Path) -> Result<PairedDataset> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    let prefixes = instrument_prefixes(&schema);
    if prefixes.is_empty() {
        return Err(PairDatasetError::data_conversion(format!(
            "{} contains no instrument columns",
            path.display()
        )));
    }
    let reader = builder.build()?;

    let mut dataset = PairedDataset {
        timestamps: Vec::new(),
        instruments: prefixes.iter().map(InstrumentColumns::new).collect(),
    };

    for batch in reader {
        let batch = batch?;
        read_timestamps(&batch, &mut dataset.timestamps)?;
        for cols in &mut dataset.instruments {
            append_instrument(&batch, cols)?;
        }
    }

    dataset.check_shape()?;
    Ok(dataset)
}

/// Prefixes from the schema metadata, or inferred from `*_close` columns.
fn instrument_prefixes(schema: &Schema) -> Vec<String> {
    if let Some(raw) = schema.metadata().get(INSTRUMENTS_METADATA_KEY) {
        let listed: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        if !listed.is_empty() {
            return listed;
        }
    }
    schema
        .fields()
        .iter()
        .filter_map(|f| f.name().strip_suffix("_close").map(str::to_string))
        .collect()
}

fn read_timestamps(batch: &RecordBatch, out: &mut Vec<DateTime<Utc>>) -> Result<()> {
    let col = batch.column_by_name(TIMESTAMP_COLUMN).ok_or_else(|| {
        PairDatasetError::data_conversion(format!("Missing column {}", TIMESTAMP_COLUMN))
    })?;

    if let Some(arr) = col.as_any().downcast_ref::<TimestampMillisecondArray>() {
        for i in 0..arr.len() {
            out.push(from_millis(arr.value(i))?);
        }
    } else if let Some(arr) = col.as_any().downcast_ref::<TimestampNanosecondArray>() {
        for i in 0..arr.len() {
            out.push(DateTime::<Utc>::from_timestamp_nanos(arr.value(i)));
        }
    } else {
        return Err(PairDatasetError::data_conversion(format!(
            "Column {} is not a timestamp",
            TIMESTAMP_COLUMN
        )));
    }
    Ok(())
}

fn typed_column<'a, A: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a A> {
    batch
        .column_by_name(name)
        .ok_or_else(|| PairDatasetError::data_conversion(format!("Missing column {}", name)))?
        .as_any()
        .downcast_ref::<A>()
        .ok_or_else(|| PairDatasetError::data_conversion(format!("Unexpected type for column {}", name)))
}

fn append_floats(batch: &RecordBatch, name: &str, out: &mut Vec<Option<f64>>) -> Result<()> {
    out.extend(typed_column::<Float64Array>(batch, name)?.iter());
    Ok(())
}

fn append_instrument(batch: &RecordBatch, cols: &mut InstrumentColumns) -> Result<()> {
    let p = cols.prefix.clone();
    append_floats(batch, &column_name(&p, "open"), &mut cols.open)?;
    append_floats(batch, &column_name(&p, "high"), &mut cols.high)?;
    append_floats(batch, &column_name(&p, "low"), &mut cols.low)?;
    append_floats(batch, &column_name(&p, "close"), &mut cols.close)?;
    append_floats(batch, &column_name(&p, "volume"), &mut cols.volume)?;
    append_floats(batch, &column_name(&p, "daily_funding_sum"), &mut cols.daily_funding_sum)?;
    cols.funding_events.extend(
        typed_column::<Int64Array>(batch, &column_name(&p, "funding_events"))?.iter(),
    );
    append_floats(batch, &column_name(&p, "daily_funding_mean"), &mut cols.daily_funding_mean)?;
    cols.funding_incomplete.extend(
        typed_column::<BooleanArray>(batch, &column_name(&p, "funding_incomplete"))?.iter(),
    );
    append_floats(batch, &column_name(&p, "log"), &mut cols.log)?;
    append_floats(batch, &column_name(&p, "ret"), &mut cols.ret)?;
    Ok(())
}
