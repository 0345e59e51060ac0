//! Custom message generation
//!
//! Builds derived tables from decoded messages and writes them back into the
//! decoded tree as `{device}/{custom_message_name}/{yyyy}/{mm}/{dd}/{file}`,
//! so they are picked up like any other message by later stages.

pub mod transforms;

pub use transforms::apply_transform;

use crate::builder::{FrameOptions, SignalFrameBuilder, MESSAGE_COLUMN};
use crate::config::CustomMessageConfig;
use crate::parquet_io::write_signal_frame;
use crate::path_index::PathIndex;
use crate::selector::{related_groups, resolve_filter};
use crate::types::{PathKey, ProcessorError, Result};
use log::{debug, info, warn};
use std::path::PathBuf;

/// Runs every configured custom message against an indexed decoded tree
pub struct CustomMessageEngine<'a> {
    index: &'a PathIndex,
}

impl<'a> CustomMessageEngine<'a> {
    pub fn new(index: &'a PathIndex) -> Self {
        Self { index }
    }

    /// Process all configurations, returning the number of files written
    pub fn run(&self, configs: &[CustomMessageConfig]) -> Result<usize> {
        let mut written = 0;
        for (position, config) in configs.iter().enumerate() {
            info!(
                "Processing custom message {}/{}: {}",
                position + 1,
                configs.len(),
                config.custom_message_name
            );
            written += self.process(config)?;
        }
        Ok(written)
    }

    /// Process one configuration
    pub fn process(&self, config: &CustomMessageConfig) -> Result<usize> {
        let variants = resolve_filter(&config.filter, self.index);
        info!("- Input messages: {:?}", variants);

        let builder = SignalFrameBuilder::new(self.index);
        let options = FrameOptions::new(config.raster)
            .with_prefix(config.prefix)
            .with_message_tags(true);

        let mut written = 0;
        for messages_filtered in &variants {
            let groups = related_groups(self.index, messages_filtered);
            if groups.is_empty() {
                info!("- No matching decoded files found: {:?}", messages_filtered);
                continue;
            }

            for (key, messages) in &groups {
                let frame = match builder.build(key, messages, options) {
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

                let mut result = apply_transform(frame, config)?;
                result.remove_column(MESSAGE_COLUMN);
                if result.is_empty() {
                    debug!("- {} produced no rows for {}", config.function, key);
                    continue;
                }

                let path = self.output_path(config, key);
                write_signal_frame(&result, &path)?;
                info!("- Wrote custom message Parquet file to {:?}", path);
                written += 1;
            }
        }
        Ok(written)
    }

    fn output_path(&self, config: &CustomMessageConfig, key: &PathKey) -> PathBuf {
        self.index
            .root()
            .join(key.message_path(&config.custom_message_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Geofence, MessageFilterConfig, Raster};
    use crate::frame::{ColumnData, SignalFrame};
    use crate::parquet_io::read_signal_frame;
    use std::path::Path;
    use tempfile::TempDir;

    fn key(file: &str) -> PathKey {
        PathKey::new("DEV1", "2024/01/02", file)
    }

    fn write(root: &Path, key: &PathKey, message: &str, frame: &SignalFrame) {
        write_signal_frame(frame, &root.join(key.message_path(message))).unwrap();
    }

    fn custom_path(root: &Path, file: &str, message: &str) -> PathBuf {
        root.join(key(file).message_path(message))
    }

    fn gnss(t: &[i64], lat: f64, lon: f64) -> SignalFrame {
        SignalFrame::new(t.to_vec())
            .with_column("Latitude", ColumnData::Numeric(vec![Some(lat); t.len()]))
            .unwrap()
            .with_column("Longitude", ColumnData::Numeric(vec![Some(lon); t.len()]))
            .unwrap()
    }

    #[test]
    fn test_geofence_message_written_per_group() {
        let dir = TempDir::new().unwrap();
        let depot = gnss(&[0, 1_000_000], 56.0727, 10.1034);
        let away = gnss(&[0], 57.0, 10.1034);
        write(dir.path(), &key("1.parquet"), "CAN9_GnssPos", &depot);
        write(dir.path(), &key("2.parquet"), "CAN9_GnssPos", &away);
        write(dir.path(), &key("3.parquet"), "CAN1_Other", &away);

        let index = PathIndex::build(dir.path()).unwrap();
        let config = CustomMessageConfig::new(
            "GeofenceStatus",
            MessageFilterConfig::equals(vec!["CAN9_GnssPos".to_string()]),
            "custom_geofences",
        )
        .with_raster(Raster::parse("1s").unwrap())
        .with_geofences(vec![Geofence {
            id: 3,
            name: "Depot".to_string(),
            latitude: 56.0727,
            longitude: 10.1034,
            radius_km: 0.2,
        }]);

        let written = CustomMessageEngine::new(&index).run(&[config]).unwrap();
        assert_eq!(written, 2);

        let inside =
            read_signal_frame(&custom_path(dir.path(), "1.parquet", "GeofenceStatus")).unwrap();
        assert_eq!(inside.column_names(), vec!["GeofenceId"]);
        assert_eq!(inside.numeric("GeofenceId").unwrap(), &[Some(3.0), Some(3.0)]);

        let outside =
            read_signal_frame(&custom_path(dir.path(), "2.parquet", "GeofenceStatus")).unwrap();
        assert_eq!(outside.numeric("GeofenceId").unwrap(), &[Some(0.0)]);

        assert!(!custom_path(dir.path(), "3.parquet", "GeofenceStatus").exists());
    }

    #[test]
    fn test_passthrough_drops_message_column() {
        let dir = TempDir::new().unwrap();
        let frame = SignalFrame::new(vec![0, 1])
            .with_column("Speed", ColumnData::Numeric(vec![Some(1.0), Some(2.0)]))
            .unwrap();
        write(dir.path(), &key("1.parquet"), "CAN1_Speed", &frame);

        let index = PathIndex::build(dir.path()).unwrap();
        let config = CustomMessageConfig::new(
            "SpeedCopy",
            MessageFilterConfig::contains("Speed"),
            "resample",
        )
        .with_prefix(true);

        assert_eq!(CustomMessageEngine::new(&index).run(&[config]).unwrap(), 1);
        let copy = read_signal_frame(&custom_path(dir.path(), "1.parquet", "SpeedCopy")).unwrap();
        assert_eq!(copy.column_names(), vec!["CAN1_Speed_Speed"]);
        assert_eq!(copy.timestamps(), &[0, 1]);
    }

    #[test]
    fn test_default_geofences_applied() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), &key("1.parquet"), "CAN9_GnssPos", &gnss(&[0], 56.116626, 10.154564));

        let index = PathIndex::build(dir.path()).unwrap();
        let config = CustomMessageConfig::new(
            "GeofenceStatus",
            MessageFilterConfig::equals(vec!["CAN9_GnssPos".to_string()]),
            "custom_geofences",
        );

        assert_eq!(CustomMessageEngine::new(&index).run(&[config]).unwrap(), 1);
        let status =
            read_signal_frame(&custom_path(dir.path(), "1.parquet", "GeofenceStatus")).unwrap();
        assert_eq!(status.numeric("GeofenceId").unwrap(), &[Some(2.0)]);
    }

    #[test]
    fn test_group_with_vanished_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let frame = SignalFrame::new(vec![0, 1])
            .with_column("Speed", ColumnData::Numeric(vec![Some(1.0), Some(2.0)]))
            .unwrap();
        write(dir.path(), &key("1.parquet"), "CAN1_Speed", &frame);
        write(dir.path(), &key("2.parquet"), "CAN1_Speed", &frame);

        let index = PathIndex::build(dir.path()).unwrap();
        std::fs::remove_file(custom_path(dir.path(), "1.parquet", "CAN1_Speed")).unwrap();

        let config = CustomMessageConfig::new(
            "SpeedCopy",
            MessageFilterConfig::equals(vec!["CAN1_Speed".to_string()]),
            "resample",
        );
        assert_eq!(CustomMessageEngine::new(&index).run(&[config]).unwrap(), 1);
        assert!(!custom_path(dir.path(), "1.parquet", "SpeedCopy").exists());
        assert!(custom_path(dir.path(), "2.parquet", "SpeedCopy").exists());
    }

    #[test]
    fn test_missing_signal_propagates() {
        let dir = TempDir::new().unwrap();
        let frame = SignalFrame::new(vec![0])
            .with_column("Speed", ColumnData::Numeric(vec![Some(1.0)]))
            .unwrap();
        write(dir.path(), &key("1.parquet"), "CAN1_Speed", &frame);

        let index = PathIndex::build(dir.path()).unwrap();
        let config = CustomMessageConfig::new(
            "Distance",
            MessageFilterConfig::all_messages(),
            "delta_distance",
        );
        assert!(matches!(
            CustomMessageEngine::new(&index).run(&[config]),
            Err(ProcessorError::SignalNotFound(_))
        ));
    }

    #[test]
    fn test_no_matching_groups_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let index = PathIndex::build(dir.path()).unwrap();
        let config = CustomMessageConfig::new(
            "Nothing",
            MessageFilterConfig::equals(vec!["CAN1_Missing".to_string()]),
            "resample",
        );
        assert_eq!(CustomMessageEngine::new(&index).run(&[config]).unwrap(), 0);
    }
}
