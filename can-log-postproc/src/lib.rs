//! CAN Log Post-Processor Library
//!
//! Post-processes decoded CAN/LIN log data stored as one Parquet table per
//! (device, message, date, log file) in the layout
//! `{device}/{message}/{yyyy}/{mm}/{dd}/{file}.parquet`.
//!
//! # Architecture
//!
//! - [`PathIndex`] groups the decoded tables by the log file they came from
//! - [`selector`] resolves message filters into concrete message lists
//! - [`SignalFrameBuilder`] loads and combines the tables of one log file,
//!   optionally resampled onto a fixed raster
//! - [`CustomMessageEngine`] derives new message tables (DTC combination,
//!   geofences, trip distance split, resampled copies)
//! - [`EventDetectionEngine`] finds threshold crossings on trigger signals,
//!   writes event records and announces new events through a [`Notifier`]
//! - [`Pipeline`] runs both stages against injected [`ObjectStore`]s
//!
//! Decoding raw log files is out of scope; the decoded tree is the input.
//!
//! # Example Usage
//!
//! ```no_run
//! use can_log_postproc::{LocalObjectStore, LogNotifier, Pipeline};
//! use std::path::Path;
//!
//! let configs = LocalObjectStore::new("config");
//! let output = LocalObjectStore::new("output");
//! let pipeline = Pipeline::new(&configs, &output, &LogNotifier);
//!
//! let summary = pipeline
//!     .run(Path::new("decoded"), Path::new("scratch"))
//!     .unwrap();
//! println!("{} event files written", summary.event_files);
//! ```

// Public modules
pub mod builder;
pub mod config;
pub mod custom;
pub mod events;
pub mod frame;
pub mod gps;
pub mod parquet_io;
pub mod path_index;
pub mod pipeline;
pub mod ports;
pub mod selector;
pub mod types;

// Re-export main types for convenience
pub use builder::{FrameOptions, SignalFrameBuilder};
pub use config::{
    CustomMessageConfig, EventConfig, EventsConfig, GeneralEventConfig, Geofence, MatchType,
    MessageFilterConfig, MessageList, Raster, TransformKind,
};
pub use custom::CustomMessageEngine;
pub use events::{EdgeDetector, EventDetectionEngine, EventRecord, EventType};
pub use frame::{ColumnData, SignalFrame};
pub use path_index::PathIndex;
pub use pipeline::{stage_decoded_files, Pipeline, RunSummary};
pub use ports::{LocalObjectStore, LogNotifier, Notifier, ObjectInfo, ObjectStore};
pub use types::{MessageGroup, PathKey, ProcessorError, Result, Timestamp};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: an empty index resolves nothing
        let index = PathIndex::default();
        let filter = MessageFilterConfig::contains("Speed");
        assert!(selector::resolve_filter(&filter, &index).is_empty());
        assert!(!VERSION.is_empty());
    }
}
