//! Custom message transforms
//!
//! Each [`TransformKind`] maps a built frame to the derived table that gets
//! written for the custom message.

use crate::builder::MESSAGE_COLUMN;
use crate::config::{CustomMessageConfig, Geofence, TransformKind};
use crate::frame::{ColumnData, SignalFrame};
use crate::types::{ProcessorError, Result};

/// Mean Earth radius used for great-circle distances
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Speed above which distance counts as high-speed driving
pub const HIGH_SPEED_THRESHOLD: f64 = 20.0;

pub const DTC_SPN_SIGNAL: &str = "DM01_SPN";
pub const DTC_SPN_HIGH_SIGNAL: &str = "DM01_SPN_High";
pub const DTC_SPN_FINAL_SIGNAL: &str = "DM01_SPN_Final";
pub const SOURCE_ADDRESS_SIGNAL: &str = "SA";

pub const GEOFENCE_SIGNAL: &str = "GeofenceId";

pub const DISTANCE_TRIP_SIGNAL: &str = "DistanceTrip";
pub const SPEED_SIGNAL: &str = "Speed";
pub const SPEED_VALID_SIGNAL: &str = "SpeedValid";
pub const DELTA_DISTANCE_SIGNAL: &str = "DeltaDistance";
pub const DELTA_DISTANCE_HIGH_SPEED_SIGNAL: &str = "DeltaDistanceHighSpeed";
pub const DELTA_DISTANCE_LOW_SPEED_SIGNAL: &str = "DeltaDistanceLowSpeed";

/// Apply the configured transform
pub fn apply_transform(frame: SignalFrame, config: &CustomMessageConfig) -> Result<SignalFrame> {
    match config.transform() {
        TransformKind::CombineDtcs => combine_dtcs(frame),
        TransformKind::CustomGeofences => custom_geofences(
            &frame,
            &config.geofences,
            &config.signal_latitude,
            &config.signal_longitude,
        ),
        TransformKind::DeltaDistance => delta_distance(&frame),
        TransformKind::Resample | TransformKind::Passthrough(_) => Ok(frame),
    }
}

/// Combine DM01 messages of several source addresses into one table
///
/// Adds `SA` (the source address taken from the last two hex digits of the
/// message name) and `DM01_SPN_Final = DM01_SPN + DM01_SPN_High`.
pub fn combine_dtcs(mut frame: SignalFrame) -> Result<SignalFrame> {
    let addresses: Vec<Option<f64>> = frame
        .text(MESSAGE_COLUMN)
        .ok_or_else(|| ProcessorError::SignalNotFound(MESSAGE_COLUMN.to_string()))?
        .iter()
        .map(|message| message.as_deref().and_then(source_address))
        .collect();

    let spn = frame.require_numeric(DTC_SPN_SIGNAL)?;
    let spn_high = frame.require_numeric(DTC_SPN_HIGH_SIGNAL)?;
    let spn_final: Vec<Option<f64>> = spn
        .iter()
        .zip(spn_high)
        .map(|(low, high)| Some((*low)? + (*high)?))
        .collect();

    frame.insert_column(SOURCE_ADDRESS_SIGNAL, ColumnData::Numeric(addresses))?;
    frame.insert_column(DTC_SPN_FINAL_SIGNAL, ColumnData::Numeric(spn_final))?;
    frame.sort_by_time();
    Ok(frame)
}

fn source_address(message: &str) -> Option<f64> {
    let tail = message.get(message.len().saturating_sub(2)..)?;
    u8::from_str_radix(tail, 16).ok().map(f64::from)
}

/// Tag each position with the id of the first geofence containing it
///
/// Rows with a position outside every geofence get 0; rows without a
/// position are dropped.
pub fn custom_geofences(
    frame: &SignalFrame,
    geofences: &[Geofence],
    signal_latitude: &str,
    signal_longitude: &str,
) -> Result<SignalFrame> {
    let latitudes = frame.require_numeric(signal_latitude)?;
    let longitudes = frame.require_numeric(signal_longitude)?;

    let ids: Vec<Option<f64>> = latitudes
        .iter()
        .zip(longitudes)
        .map(|(lat, lon)| match (lat, lon) {
            (Some(lat), Some(lon)) => Some(geofence_id(*lat, *lon, geofences) as f64),
            _ => None,
        })
        .collect();

    let geofenced = SignalFrame::new(frame.timestamps().to_vec())
        .with_column(GEOFENCE_SIGNAL, ColumnData::Numeric(ids))?;
    Ok(geofenced.drop_all_null_rows())
}

/// Id of the first geofence (in configuration order) containing the point, else 0
pub fn geofence_id(latitude: f64, longitude: f64, geofences: &[Geofence]) -> i64 {
    geofences
        .iter()
        .find(|fence| {
            haversine_km(latitude, longitude, fence.latitude, fence.longitude) <= fence.radius_km
        })
        .map_or(0, |fence| fence.id)
}

/// Great-circle distance in km between two WGS84 positions
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Split trip distance increments into high- and low-speed parts
pub fn delta_distance(frame: &SignalFrame) -> Result<SignalFrame> {
    let distance = frame.require_numeric(DISTANCE_TRIP_SIGNAL)?;
    let speed = frame.require_numeric(SPEED_SIGNAL)?;
    let speed_valid = frame.require_numeric(SPEED_VALID_SIGNAL)?;

    let delta: Vec<Option<f64>> = (0..distance.len())
        .map(|row| {
            if row == 0 {
                return None;
            }
            Some(distance[row]? - distance[row - 1]?)
        })
        .collect();

    let split = |high_speed: bool| -> Vec<Option<f64>> {
        delta
            .iter()
            .zip(speed.iter().zip(speed_valid))
            .map(|(delta, (speed, valid))| {
                let (speed, valid) = ((*speed)?, (*valid)?);
                let in_band = if high_speed {
                    speed > HIGH_SPEED_THRESHOLD
                } else {
                    speed <= HIGH_SPEED_THRESHOLD
                };
                if in_band && valid == 1.0 {
                    *delta
                } else {
                    None
                }
            })
            .collect()
    };
    let high = split(true);
    let low = split(false);

    let deltas = SignalFrame::new(frame.timestamps().to_vec())
        .with_column(DELTA_DISTANCE_SIGNAL, ColumnData::Numeric(delta.clone()))?
        .with_column(DELTA_DISTANCE_HIGH_SPEED_SIGNAL, ColumnData::Numeric(high))?
        .with_column(DELTA_DISTANCE_LOW_SPEED_SIGNAL, ColumnData::Numeric(low))?;
    Ok(deltas.drop_all_null_rows())
}
