//! Parquet reading and writing for signal frames
//!
//! Decoded message tables carry a timestamp column `t` plus one column per
//! physical signal. Reading normalises `t` to microseconds since the epoch
//! and every numeric signal to `f64`; writing produces the same layout with
//! `t` stored as a timezone-less microsecond timestamp.

use crate::frame::{ColumnData, SignalFrame};
use crate::types::{ProcessorError, Result};
use arrow::array::{
    ArrayRef, AsArray, Float64Array, RecordBatch, StringArray, TimestampMicrosecondArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema, TimeUnit};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::{WriterProperties, WriterVersion};
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

/// Name of the timestamp column in every table
pub const TIME_COLUMN: &str = "t";

/// Read one decoded message table
///
/// A missing file is reported as [`ProcessorError::MissingDecodedFile`] so
/// callers can tell "no data for this group" apart from a corrupt file.
pub fn read_signal_frame(path: &Path) -> Result<SignalFrame> {
    if !path.is_file() {
        return Err(ProcessorError::MissingDecodedFile(path.to_path_buf()));
    }

    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut frames = Vec::new();
    for batch in reader {
        let batch = batch?;
        frames.push(batch_to_frame(&batch, path)?);
    }

    let frame = SignalFrame::concat_rows(frames)?;
    log::trace!("Read {} rows from {:?}", frame.len(), path);
    Ok(frame)
}

fn batch_to_frame(batch: &RecordBatch, path: &Path) -> Result<SignalFrame> {
    let schema = batch.schema();
    let time_index = schema.index_of(TIME_COLUMN).map_err(|_| {
        ProcessorError::InvalidData(format!("{:?} has no {} column", path, TIME_COLUMN))
    })?;

    let mut frame = SignalFrame::new(timestamps_us(batch.column(time_index), path)?);

    for (index, field) in schema.fields().iter().enumerate() {
        if index == time_index {
            continue;
        }
        let array = batch.column(index);
        let data = match field.data_type() {
            dt if dt.is_numeric() || *dt == DataType::Boolean => {
                let values = cast(array, &DataType::Float64)?;
                ColumnData::Numeric(values.as_primitive::<Float64Type>().iter().collect())
            }
            DataType::Utf8 | DataType::LargeUtf8 => {
                let values = cast(array, &DataType::Utf8)?;
                ColumnData::Text(
                    values
                        .as_string::<i32>()
                        .iter()
                        .map(|v| v.map(str::to_string))
                        .collect(),
                )
            }
            other => {
                log::debug!(
                    "Skipping column {} of unsupported type {} in {:?}",
                    field.name(),
                    other,
                    path
                );
                continue;
            }
        };
        frame.insert_column(field.name().clone(), data)?;
    }

    Ok(frame)
}

/// Normalise a timestamp (or plain integer) column to microseconds
fn timestamps_us(array: &ArrayRef, path: &Path) -> Result<Vec<i64>> {
    let to_micros: fn(i64) -> i64 = match array.data_type() {
        DataType::Timestamp(TimeUnit::Second, _) => |v| v * 1_000_000,
        DataType::Timestamp(TimeUnit::Millisecond, _) => |v| v * 1_000,
        DataType::Timestamp(TimeUnit::Microsecond, _) | DataType::Int64 => |v| v,
        DataType::Timestamp(TimeUnit::Nanosecond, _) => |v| v.div_euclid(1_000),
        other => {
            return Err(ProcessorError::InvalidData(format!(
                "{:?}: column {} has unsupported type {}",
                path, TIME_COLUMN, other
            )))
        }
    };

    let raw = cast(array, &DataType::Int64)?;
    raw.as_primitive::<Int64Type>()
        .iter()
        .map(|v| {
            v.map(to_micros).ok_or_else(|| {
                ProcessorError::InvalidData(format!("{:?}: null timestamp", path))
            })
        })
        .collect()
}

/// Arrow schema for a frame
pub fn frame_schema(frame: &SignalFrame) -> Arc<Schema> {
    let mut fields = vec![Field::new(
        TIME_COLUMN,
        DataType::Timestamp(TimeUnit::Microsecond, None),
        false,
    )];
    for column in frame.columns() {
        let data_type = match column.data {
            ColumnData::Numeric(_) => DataType::Float64,
            ColumnData::Text(_) => DataType::Utf8,
        };
        fields.push(Field::new(column.name.as_str(), data_type, true));
    }
    Arc::new(Schema::new(fields))
}

/// Convert a frame to a record batch
pub fn frame_to_batch(frame: &SignalFrame) -> Result<RecordBatch> {
    let mut arrays: Vec<ArrayRef> = vec![Arc::new(TimestampMicrosecondArray::from(
        frame.timestamps().to_vec(),
    ))];
    for column in frame.columns() {
        let array: ArrayRef = match &column.data {
            ColumnData::Numeric(values) => Arc::new(Float64Array::from(values.clone())),
            ColumnData::Text(values) => Arc::new(StringArray::from(values.clone())),
        };
        arrays.push(array);
    }
    Ok(RecordBatch::try_new(frame_schema(frame), arrays)?)
}

/// Write a frame as a Parquet file, creating parent directories
pub fn write_signal_frame(frame: &SignalFrame, path: &Path) -> Result<()> {
    let batch = frame_to_batch(frame)?;
    write_batch(&batch, path)
}

/// Write one record batch to `path`
///
/// Data goes to a temporary sibling first and is renamed into place once the
/// Parquet footer has been written. The temporary file is removed if any
/// step fails.
pub fn write_batch(batch: &RecordBatch, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("parquet.tmp");
    let written = write_parquet_file(batch, &temp_path)
        .and_then(|()| fs::rename(&temp_path, path).map_err(ProcessorError::from));
    if let Err(e) = written {
        if temp_path.exists() {
            if let Err(cleanup) = fs::remove_file(&temp_path) {
                log::warn!("Failed to remove {:?}: {}", temp_path, cleanup);
            }
        }
        return Err(e);
    }

    log::debug!("Wrote {} rows to {:?}", batch.num_rows(), path);
    Ok(())
}

fn write_parquet_file(batch: &RecordBatch, path: &Path) -> Result<()> {
    let file = File::create(path)?;

    let props = WriterProperties::builder()
        .set_writer_version(WriterVersion::PARQUET_2_0)
        .set_compression(Compression::SNAPPY)
        .build();

    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}
