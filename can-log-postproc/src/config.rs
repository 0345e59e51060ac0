//! Job configuration types
//!
//! Typed forms of `custom-messages.json` and `events.json`. Both files are
//! optional for a run; when present they are parsed and validated up front so
//! that a bad raster or an unknown match type fails before any data is read.

use crate::types::{ProcessorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Object name of the custom message configuration in the config store
pub const CUSTOM_MESSAGES_FILE: &str = "custom-messages.json";

/// Object name of the event configuration in the config store
pub const EVENTS_FILE: &str = "events.json";

const MICROS_PER_SECOND: i64 = 1_000_000;

/// Resampling interval, parsed from an offset string such as `1s` or `100ms`
///
/// An empty string means "no resampling".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Raster {
    step_us: Option<i64>,
}

impl Raster {
    /// No resampling: frames are concatenated by rows
    pub fn none() -> Self {
        Self { step_us: None }
    }

    /// Resample onto a grid of `step_us` microseconds
    pub fn from_micros(step_us: i64) -> Result<Self> {
        if step_us <= 0 {
            return Err(ProcessorError::InvalidRaster(format!("{}us", step_us)));
        }
        Ok(Self {
            step_us: Some(step_us),
        })
    }

    /// Parse `""`, `"1s"`, `"100ms"`, `"5min"`, `"S"`, ...
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Self::none());
        }

        let split = text
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| ProcessorError::InvalidRaster(text.to_string()))?;
        let (count, unit) = text.split_at(split);
        let count: i64 = if count.is_empty() {
            1
        } else {
            count
                .parse()
                .map_err(|_| ProcessorError::InvalidRaster(text.to_string()))?
        };

        let unit_us = match unit {
            "us" | "U" => 1,
            "ms" | "L" => 1_000,
            "s" | "S" => MICROS_PER_SECOND,
            "min" | "T" => 60 * MICROS_PER_SECOND,
            "h" | "H" => 3_600 * MICROS_PER_SECOND,
            "d" | "D" => 86_400 * MICROS_PER_SECOND,
            _ => return Err(ProcessorError::InvalidRaster(text.to_string())),
        };

        count
            .checked_mul(unit_us)
            .ok_or_else(|| ProcessorError::InvalidRaster(text.to_string()))
            .and_then(|step| {
                Self::from_micros(step)
                    .map_err(|_| ProcessorError::InvalidRaster(text.to_string()))
            })
    }

    /// Grid step in microseconds, if resampling is enabled
    pub fn step_us(&self) -> Option<i64> {
        self.step_us
    }

    pub fn is_enabled(&self) -> bool {
        self.step_us.is_some()
    }
}

impl TryFrom<String> for Raster {
    type Error = ProcessorError;

    fn try_from(value: String) -> Result<Self> {
        Raster::parse(&value)
    }
}

impl From<Raster> for String {
    fn from(raster: Raster) -> Self {
        raster.to_string()
    }
}

impl fmt::Display for Raster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step_us {
            None => Ok(()),
            Some(step) if step % MICROS_PER_SECOND == 0 => {
                write!(f, "{}s", step / MICROS_PER_SECOND)
            }
            Some(step) if step % 1_000 == 0 => write!(f, "{}ms", step / 1_000),
            Some(step) => write!(f, "{}us", step),
        }
    }
}

/// How `messages_filtered_list` is matched against decoded message names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Equals,
    Contains,
    AllMessages,
}

/// The raw `messages_filtered_list` value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageList {
    /// A single name or substring
    Single(String),
    /// One list of names (or several substrings)
    Flat(Vec<String>),
    /// Several message lists, each tried on its own
    Nested(Vec<Vec<String>>),
}

impl Default for MessageList {
    fn default() -> Self {
        MessageList::Flat(Vec::new())
    }
}

impl MessageList {
    /// Every string in the list, flattened
    pub fn names(&self) -> Vec<&str> {
        match self {
            MessageList::Single(name) => vec![name.as_str()],
            MessageList::Flat(names) => names.iter().map(String::as_str).collect(),
            MessageList::Nested(lists) => lists.iter().flatten().map(String::as_str).collect(),
        }
    }
}

/// Message filter shared by custom messages and events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageFilterConfig {
    #[serde(rename = "messages_match_type")]
    pub match_type: MatchType,
    #[serde(default)]
    pub messages_filtered_list: MessageList,
}

impl MessageFilterConfig {
    pub fn equals(messages: Vec<String>) -> Self {
        Self {
            match_type: MatchType::Equals,
            messages_filtered_list: MessageList::Flat(messages),
        }
    }

    pub fn contains(pattern: impl Into<String>) -> Self {
        Self {
            match_type: MatchType::Contains,
            messages_filtered_list: MessageList::Single(pattern.into()),
        }
    }

    pub fn all_messages() -> Self {
        Self {
            match_type: MatchType::AllMessages,
            messages_filtered_list: MessageList::default(),
        }
    }

    fn validate(&self, owner: &str) -> Result<()> {
        let names = self.messages_filtered_list.names();
        match self.match_type {
            MatchType::AllMessages => Ok(()),
            MatchType::Equals | MatchType::Contains if names.is_empty() => Err(
                ProcessorError::Config(format!("{}: messages_filtered_list is empty", owner)),
            ),
            MatchType::Equals | MatchType::Contains => {
                if names.iter().any(|name| name.is_empty()) {
                    return Err(ProcessorError::Config(format!(
                        "{}: messages_filtered_list contains an empty name",
                        owner
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Transform applied by a custom message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformKind {
    CombineDtcs,
    CustomGeofences,
    DeltaDistance,
    Resample,
    /// Unknown function name: data passes through unchanged
    Passthrough(String),
}

impl TransformKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "combine_dtcs" => TransformKind::CombineDtcs,
            "custom_geofences" => TransformKind::CustomGeofences,
            "delta_distance" => TransformKind::DeltaDistance,
            "resample" => TransformKind::Resample,
            other => TransformKind::Passthrough(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TransformKind::CombineDtcs => "combine_dtcs",
            TransformKind::CustomGeofences => "custom_geofences",
            TransformKind::DeltaDistance => "delta_distance",
            TransformKind::Resample => "resample",
            TransformKind::Passthrough(name) => name,
        }
    }
}

/// A circular geofence used by the `custom_geofences` transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: f64,
}

/// One entry of `custom-messages.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomMessageConfig {
    pub custom_message_name: String,
    #[serde(flatten)]
    pub filter: MessageFilterConfig,
    #[serde(default)]
    pub raster: Raster,
    #[serde(default)]
    pub prefix: bool,
    pub function: String,
    #[serde(default = "default_geofences")]
    pub geofences: Vec<Geofence>,
    #[serde(default = "default_signal_latitude")]
    pub signal_latitude: String,
    #[serde(default = "default_signal_longitude")]
    pub signal_longitude: String,
}

impl CustomMessageConfig {
    pub fn new(
        name: impl Into<String>,
        filter: MessageFilterConfig,
        function: impl Into<String>,
    ) -> Self {
        Self {
            custom_message_name: name.into(),
            filter,
            raster: Raster::none(),
            prefix: false,
            function: function.into(),
            geofences: default_geofences(),
            signal_latitude: default_signal_latitude(),
            signal_longitude: default_signal_longitude(),
        }
    }

    /// Builder method: set the resampling raster
    pub fn with_raster(mut self, raster: Raster) -> Self {
        self.raster = raster;
        self
    }

    /// Builder method: prefix signal names with their message name
    pub fn with_prefix(mut self, prefix: bool) -> Self {
        self.prefix = prefix;
        self
    }

    /// Builder method: replace the geofences checked by `custom_geofences`
    pub fn with_geofences(mut self, geofences: Vec<Geofence>) -> Self {
        self.geofences = geofences;
        self
    }

    pub fn transform(&self) -> TransformKind {
        TransformKind::from_name(&self.function)
    }

    pub fn validate(&self) -> Result<()> {
        if self.custom_message_name.trim().is_empty() {
            return Err(ProcessorError::Config(
                "custom_message_name must not be empty".to_string(),
            ));
        }
        if self.custom_message_name.contains('/') {
            return Err(ProcessorError::Config(format!(
                "custom_message_name {:?} must not contain '/'",
                self.custom_message_name
            )));
        }
        self.filter.validate(&self.custom_message_name)?;

        if let TransformKind::Passthrough(name) = self.transform() {
            log::warn!(
                "Custom message {}: unknown function {:?}, data is written unchanged",
                self.custom_message_name,
                name
            );
        }
        for fence in &self.geofences {
            if !(fence.radius_km >= 0.0) {
                return Err(ProcessorError::Config(format!(
                    "{}: geofence {} has invalid radius {}",
                    self.custom_message_name, fence.id, fence.radius_km
                )));
            }
        }
        Ok(())
    }
}

/// Run-scoped event settings (`general` section of `events.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralEventConfig {
    #[serde(default = "default_messages_gps")]
    pub messages_gps: Vec<String>,
    #[serde(default = "default_true")]
    pub include_gps_data: bool,
    #[serde(default = "default_signal_latitude")]
    pub signal_latitude: String,
    #[serde(default = "default_signal_longitude")]
    pub signal_longitude: String,
    #[serde(default = "default_static_body_content")]
    pub static_body_content: String,
}

impl Default for GeneralEventConfig {
    fn default() -> Self {
        Self {
            messages_gps: default_messages_gps(),
            include_gps_data: true,
            signal_latitude: default_signal_latitude(),
            signal_longitude: default_signal_longitude(),
            static_body_content: default_static_body_content(),
        }
    }
}

/// One entry of the `events` list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    pub event_name: String,
    #[serde(flatten)]
    pub filter: MessageFilterConfig,
    #[serde(default)]
    pub raster: Raster,
    pub trigger_signals: Vec<String>,
    pub lower_threshold: f64,
    pub upper_threshold: f64,
    #[serde(default)]
    pub exact_match: bool,
    #[serde(default = "default_true")]
    pub rising_as_start: bool,
}

impl EventConfig {
    pub fn new(
        name: impl Into<String>,
        filter: MessageFilterConfig,
        trigger_signals: Vec<String>,
        lower_threshold: f64,
        upper_threshold: f64,
    ) -> Self {
        Self {
            event_name: name.into(),
            filter,
            raster: Raster::none(),
            trigger_signals,
            lower_threshold,
            upper_threshold,
            exact_match: false,
            rising_as_start: true,
        }
    }

    /// Builder method: set the resampling raster
    pub fn with_raster(mut self, raster: Raster) -> Self {
        self.raster = raster;
        self
    }

    /// Builder method: compare thresholds with equality instead of <= / >=
    pub fn with_exact_match(mut self, exact: bool) -> Self {
        self.exact_match = exact;
        self
    }

    /// Builder method: choose whether rising edges start the event
    pub fn with_rising_as_start(mut self, rising_as_start: bool) -> Self {
        self.rising_as_start = rising_as_start;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_name.trim().is_empty() {
            return Err(ProcessorError::Config("event_name must not be empty".to_string()));
        }
        self.filter.validate(&self.event_name)?;
        if self.trigger_signals.is_empty() {
            return Err(ProcessorError::Config(format!(
                "{}: trigger_signals is empty",
                self.event_name
            )));
        }
        if !self.lower_threshold.is_finite() || !self.upper_threshold.is_finite() {
            return Err(ProcessorError::Config(format!(
                "{}: thresholds must be finite",
                self.event_name
            )));
        }
        Ok(())
    }
}

/// Contents of `events.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default)]
    pub general: GeneralEventConfig,
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

impl EventsConfig {
    pub fn validate(&self) -> Result<()> {
        for event in &self.events {
            event.validate()?;
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_messages_gps() -> Vec<String> {
    vec!["CAN9_GnssPos".to_string()]
}

fn default_signal_latitude() -> String {
    "Latitude".to_string()
}

fn default_signal_longitude() -> String {
    "Longitude".to_string()
}

/// Fences checked when a config names none
fn default_geofences() -> Vec<Geofence> {
    vec![
        Geofence {
            id: 1,
            name: "Area1".to_string(),
            latitude: 56.072706,
            longitude: 10.103398,
            radius_km: 0.2,
        },
        Geofence {
            id: 2,
            name: "Area2".to_string(),
            latitude: 56.116626,
            longitude: 10.154564,
            radius_km: 0.3,
        },
    ]
}

fn default_static_body_content() -> String {
    "Review details via e.g. your event dashboard".to_string()
}

/// Parse and validate a `custom-messages.json` document
pub fn parse_custom_messages(json: &str) -> Result<Vec<CustomMessageConfig>> {
    let configs: Vec<CustomMessageConfig> = serde_json::from_str(json)?;
    for config in &configs {
        config.validate()?;
    }
    Ok(configs)
}

/// Parse and validate an `events.json` document
pub fn parse_events(json: &str) -> Result<EventsConfig> {
    let config: EventsConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

/// Load `custom-messages.json` from disk
pub fn load_custom_messages(path: &Path) -> Result<Vec<CustomMessageConfig>> {
    let content = std::fs::read_to_string(path)?;
    parse_custom_messages(&content).map_err(|e| match e {
        ProcessorError::Json(err) => {
            ProcessorError::Config(format!("Failed to parse {:?}: {}", path, err))
        }
        other => other,
    })
}

/// Load `events.json` from disk
pub fn load_events(path: &Path) -> Result<EventsConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_events(&content).map_err(|e| match e {
        ProcessorError::Json(err) => {
            ProcessorError::Config(format!("Failed to parse {:?}: {}", path, err))
        }
        other => other,
    })
}
