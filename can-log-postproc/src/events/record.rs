//! Event records and their Parquet layout
//!
//! Every event file uses the same 11-column schema, whether or not GPS data
//! was available, so downstream queries can union them freely.

use crate::events::detector::EventType;
use crate::parquet_io::{write_batch, TIME_COLUMN};
use crate::types::{format_micros, ProcessorError, Result};
use arrow::array::{
    Array, ArrayRef, AsArray, Float64Array, Int64Array, RecordBatch, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{
    DataType, Field, Float64Type, Int64Type, Schema, TimeUnit, TimestampMicrosecondType,
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// One Start or Stop row of an event file
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// Microseconds since the epoch
    pub t: i64,
    pub event_name: String,
    pub device_id: String,
    pub event_id: String,
    pub message: String,
    pub signal: String,
    pub event_type: EventType,
    pub signal_value: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl EventRecord {
    pub fn event_value(&self) -> i64 {
        self.event_type.value()
    }
}

/// `{event_name}_{device}_{yyyymmddTHHMMSS}`
pub fn event_id(event_name: &str, device: &str, t: i64) -> String {
    format!(
        "{}_{}_{}",
        event_name,
        device,
        format_micros(t, "%Y%m%dT%H%M%S")
    )
}

/// Fixed schema of every event file
pub fn event_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(TIME_COLUMN, DataType::Timestamp(TimeUnit::Microsecond, None), false),
        Field::new("EventName", DataType::Utf8, false),
        Field::new("DeviceID", DataType::Utf8, false),
        Field::new("EventId", DataType::Utf8, false),
        Field::new("Message", DataType::Utf8, false),
        Field::new("Signal", DataType::Utf8, false),
        Field::new("EventType", DataType::Utf8, false),
        Field::new("EventValue", DataType::Int64, false),
        Field::new("SignalValue", DataType::Float64, true),
        Field::new("Latitude", DataType::Float64, true),
        Field::new("Longitude", DataType::Float64, true),
    ]))
}

/// Convert records to a batch with [`event_schema`]
pub fn records_to_batch(records: &[EventRecord]) -> Result<RecordBatch> {
    let strings = |field: fn(&EventRecord) -> &str| -> ArrayRef {
        Arc::new(StringArray::from_iter_values(records.iter().map(field)))
    };

    let columns: Vec<ArrayRef> = vec![
        Arc::new(TimestampMicrosecondArray::from_iter_values(
            records.iter().map(|r| r.t),
        )),
        strings(|r| r.event_name.as_str()),
        strings(|r| r.device_id.as_str()),
        strings(|r| r.event_id.as_str()),
        strings(|r| r.message.as_str()),
        strings(|r| r.signal.as_str()),
        strings(|r| r.event_type.as_str()),
        Arc::new(Int64Array::from_iter_values(
            records.iter().map(EventRecord::event_value),
        )),
        Arc::new(Float64Array::from_iter(records.iter().map(|r| r.signal_value))),
        Arc::new(Float64Array::from_iter(records.iter().map(|r| r.latitude))),
        Arc::new(Float64Array::from_iter(records.iter().map(|r| r.longitude))),
    ];

    Ok(RecordBatch::try_new(event_schema(), columns)?)
}

/// Write records to an event Parquet file
pub fn write_event_records(records: &[EventRecord], path: &Path) -> Result<()> {
    let batch = records_to_batch(records)?;
    write_batch(&batch, path)
}

/// Read an event Parquet file back into records
pub fn read_event_records(path: &Path) -> Result<Vec<EventRecord>> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch?;
        let column = |name: &str| {
            batch.column_by_name(name).ok_or_else(|| {
                ProcessorError::SchemaMismatch(format!("{:?} has no {} column", path, name))
            })
        };

        let t = column(TIME_COLUMN)?.as_primitive::<TimestampMicrosecondType>();
        let event_name = column("EventName")?.as_string::<i32>();
        let device_id = column("DeviceID")?.as_string::<i32>();
        let event_id = column("EventId")?.as_string::<i32>();
        let message = column("Message")?.as_string::<i32>();
        let signal = column("Signal")?.as_string::<i32>();
        let event_value = column("EventValue")?.as_primitive::<Int64Type>();
        let signal_value = column("SignalValue")?.as_primitive::<Float64Type>();
        let latitude = column("Latitude")?.as_primitive::<Float64Type>();
        let longitude = column("Longitude")?.as_primitive::<Float64Type>();

        for row in 0..batch.num_rows() {
            let event_type = match event_value.value(row) {
                1 => EventType::Start,
                0 => EventType::Stop,
                other => {
                    return Err(ProcessorError::InvalidData(format!(
                        "{:?}: unexpected EventValue {}",
                        path, other
                    )))
                }
            };
            records.push(EventRecord {
                t: t.value(row),
                event_name: event_name.value(row).to_string(),
                device_id: device_id.value(row).to_string(),
                event_id: event_id.value(row).to_string(),
                message: message.value(row).to_string(),
                signal: signal.value(row).to_string(),
                event_type,
                signal_value: signal_value.is_valid(row).then(|| signal_value.value(row)),
                latitude: latitude.is_valid(row).then(|| latitude.value(row)),
                longitude: longitude.is_valid(row).then(|| longitude.value(row)),
            });
        }
    }
    Ok(records)
}
