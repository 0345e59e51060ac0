//! GPS enrichment of event frames
//!
//! Position data lives in its own decoded message. When enabled, the first
//! configured GPS message that loads for a group is merged into the trigger
//! frame so event records can carry a position.

use crate::builder::{combine_frames, FrameOptions, SignalFrameBuilder};
use crate::config::Raster;
use crate::frame::SignalFrame;
use crate::types::{PathKey, Result};

/// Load the first GPS message available for `key`, trying `candidates` in order
///
/// Any load failure moves on to the next candidate; `None` means no candidate
/// produced data.
pub fn load_gps_frame(
    builder: &SignalFrameBuilder<'_>,
    key: &PathKey,
    candidates: &[String],
    raster: Raster,
) -> Option<(String, SignalFrame)> {
    for message in candidates {
        match builder.load_message(key, message, FrameOptions::new(raster)) {
            Ok(frame) => {
                log::debug!("Using GPS message {} for {}", message, key);
                return Some((message.clone(), frame));
            }
            Err(e) => log::debug!("GPS message {} not usable for {}: {}", message, key, e),
        }
    }
    None
}

/// Merge a GPS frame into the working frame using the raster's combine rule
pub fn merge_gps(frame: SignalFrame, gps: SignalFrame, raster: Raster) -> Result<SignalFrame> {
    combine_frames(vec![frame, gps], raster)
}

/// Latitude and longitude per row, null where the columns are absent
pub fn position_columns(
    frame: &SignalFrame,
    signal_latitude: &str,
    signal_longitude: &str,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let column = |name: &str| {
        frame
            .numeric(name)
            .map(<[Option<f64>]>::to_vec)
            .unwrap_or_else(|| vec![None; frame.len()])
    };
    (column(signal_latitude), column(signal_longitude))
}
