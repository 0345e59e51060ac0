//! Threshold event detection
//!
//! Implements edge detection on trigger signals, the fixed event record
//! layout and the engine that ties both to the decoded tree.

pub mod detector;
pub mod engine;
pub mod record;

pub use detector::{Edge, EdgeDetector, EventType};
pub use engine::{EventDetectionEngine, EventRunStats, EVENTS_DIR};
pub use record::{event_id, event_schema, read_event_records, write_event_records, EventRecord};
