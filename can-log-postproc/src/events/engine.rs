//! Event detection over the decoded tree
//!
//! For each configured event every matching log file is loaded, optionally
//! enriched with GPS positions, and scanned for threshold edges on each
//! trigger signal. Edges are written to
//! `aggregations/events/{yyyy}/{mm}/{dd}/` and the first Start of an event
//! per run is published through the [`Notifier`].

use crate::builder::{FrameOptions, SignalFrameBuilder};
use crate::config::{EventConfig, EventsConfig, GeneralEventConfig};
use crate::events::detector::{EdgeDetector, EventType};
use crate::events::record::{event_id, write_event_records, EventRecord};
use crate::frame::SignalFrame;
use crate::gps::{load_gps_frame, merge_gps, position_columns};
use crate::path_index::{PathIndex, AGGREGATIONS_DIR};
use crate::ports::Notifier;
use crate::selector::{related_groups, resolve_filter};
use crate::types::{format_micros, PathKey, ProcessorError, Result};
use log::{debug, error, info, warn};
use std::path::PathBuf;

/// Directory below `aggregations/` holding event files
pub const EVENTS_DIR: &str = "events";

const NOTIFICATION_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Counters of one event detection run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventRunStats {
    pub files_written: usize,
    pub notifications_sent: usize,
}

impl std::ops::AddAssign for EventRunStats {
    fn add_assign(&mut self, other: Self) {
        self.files_written += other.files_written;
        self.notifications_sent += other.notifications_sent;
    }
}

/// Tracks whether an event has already been announced in this run
///
/// The latch only closes on a successful publish, so a failed notification
/// is retried at the next Start.
#[derive(Debug, Default)]
struct NotificationLatch {
    sent: bool,
}

impl NotificationLatch {
    fn is_open(&self) -> bool {
        !self.sent
    }

    fn close(&mut self) {
        self.sent = true;
    }
}

/// Detects threshold events in the decoded tree
pub struct EventDetectionEngine<'a> {
    index: &'a PathIndex,
    notifier: &'a dyn Notifier,
}

impl<'a> EventDetectionEngine<'a> {
    pub fn new(index: &'a PathIndex, notifier: &'a dyn Notifier) -> Self {
        Self { index, notifier }
    }

    /// Process every configured event
    pub fn run(&self, config: &EventsConfig) -> Result<EventRunStats> {
        let mut stats = EventRunStats::default();
        for (position, event) in config.events.iter().enumerate() {
            info!(
                "Processing event {}/{}: {}",
                position + 1,
                config.events.len(),
                event.event_name
            );
            stats += self.process(&config.general, event)?;
        }
        Ok(stats)
    }

    /// Process one event configuration
    pub fn process(
        &self,
        general: &GeneralEventConfig,
        event: &EventConfig,
    ) -> Result<EventRunStats> {
        let variants = resolve_filter(&event.filter, self.index);
        info!("- Input messages: {:?}", variants);

        let builder = SignalFrameBuilder::new(self.index);
        let detector = EdgeDetector::from_config(event);
        let mut latch = NotificationLatch::default();
        let mut stats = EventRunStats::default();

        for messages_filtered in &variants {
            let groups = related_groups(self.index, messages_filtered);
            if groups.is_empty() {
                info!("- No matching decoded files found: {:?}", messages_filtered);
                continue;
            }

            for (key, messages) in &groups {
                let frame = match self.load_frame(&builder, general, event, key, messages) {
                    Ok(frame) => frame,
                    Err(ProcessorError::MissingDecodedFile(path)) => {
                        warn!("- Decoded file missing, skipping {}: {:?}", key, path);
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                if frame.is_empty() {
                    info!(
                        "- Decoded file found, but frame is empty (typically a short file): \
                         {:?} {}",
                        messages_filtered, key
                    );
                    continue;
                }

                let (latitudes, longitudes) = if general.include_gps_data {
                    position_columns(&frame, &general.signal_latitude, &general.signal_longitude)
                } else {
                    (vec![None; frame.len()], vec![None; frame.len()])
                };

                for trigger in &event.trigger_signals {
                    let Some(values) = frame.numeric(trigger) else {
                        warn!("- Trigger signal {} not found in {}, skipping", trigger, key);
                        continue;
                    };

                    let edges = detector.detect(frame.timestamps(), values);
                    if edges.is_empty() {
                        info!("- No events found: {:?} {} {}", messages_filtered, trigger, key);
                        continue;
                    }

                    let t = frame.timestamps();
                    let records: Vec<EventRecord> = edges
                        .iter()
                        .map(|edge| EventRecord {
                            t: t[edge.row],
                            event_name: event.event_name.clone(),
                            device_id: key.device.clone(),
                            event_id: event_id(&event.event_name, &key.device, t[edge.row]),
                            message: messages[0].clone(),
                            signal: trigger.clone(),
                            event_type: edge.event_type,
                            signal_value: values[edge.row],
                            latitude: latitudes[edge.row],
                            longitude: longitudes[edge.row],
                        })
                        .collect();

                    let path = self.output_path(key, &messages[0], trigger, &event.event_name);
                    write_event_records(&records, &path)?;
                    info!("- Wrote event Parquet file to {:?}", path);
                    stats.files_written += 1;

                    if !latch.is_open() {
                        continue;
                    }
                    let first_start = records.iter().find(|r| r.event_type == EventType::Start);
                    if let Some(start) = first_start {
                        let (subject, body) =
                            notification(general, event, key, messages_filtered, start.t);
                        match self.notifier.publish(&subject, &body) {
                            Ok(()) => {
                                info!("- Published notification: {}", subject);
                                latch.close();
                                stats.notifications_sent += 1;
                            }
                            Err(e) => error!("- Error publishing notification: {}", e),
                        }
                    }
                }
            }
        }
        Ok(stats)
    }

    /// Load the trigger frame of a group, merged with GPS data when enabled
    fn load_frame(
        &self,
        builder: &SignalFrameBuilder<'_>,
        general: &GeneralEventConfig,
        event: &EventConfig,
        key: &PathKey,
        messages: &[String],
    ) -> Result<SignalFrame> {
        let frame = builder.build(key, messages, FrameOptions::new(event.raster))?;
        if !general.include_gps_data {
            return Ok(frame);
        }

        match load_gps_frame(builder, key, &general.messages_gps, event.raster) {
            Some((_, gps)) => merge_gps(frame, gps, event.raster),
            None => {
                debug!("- No GPS message available for {}", key);
                Ok(frame)
            }
        }
    }

    fn output_path(
        &self,
        key: &PathKey,
        message: &str,
        trigger: &str,
        event_name: &str,
    ) -> PathBuf {
        let mut path = self.index.root().join(AGGREGATIONS_DIR).join(EVENTS_DIR);
        for part in key.date.split('/') {
            path.push(part);
        }
        path.push(format!(
            "{}_{}_{}_{}_{}",
            key.device, message, trigger, event_name, key.file_name
        ));
        path
    }
}

/// Subject and body announcing the first Start of an event
fn notification(
    general: &GeneralEventConfig,
    event: &EventConfig,
    key: &PathKey,
    messages: &[String],
    t: i64,
) -> (String, String) {
    let time = format_micros(t, NOTIFICATION_TIME_FORMAT);
    let subject = format!("EVENT: {} | {} | {}", event.event_name, key.device, time);
    let body = format!(
        "{} was triggered. {}\n\nDetails:\n- device: {}\n- message(s): {:?}\n- file: {}\n\
         - time: {}",
        event.event_name, general.static_body_content, key.device, messages, key.file_name, time
    );
    (subject, body)
}
