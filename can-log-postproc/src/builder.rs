//! Building one working frame per message group
//!
//! Loads the decoded tables of a group's messages and combines them either by
//! stacking rows (no raster) or by resampling each table onto the raster grid
//! and inner-joining them on `t`.

use crate::config::Raster;
use crate::frame::{ColumnData, SignalFrame};
use crate::parquet_io::read_signal_frame;
use crate::path_index::PathIndex;
use crate::types::{PathKey, Result};

/// Name of the provenance column added for custom messages
pub const MESSAGE_COLUMN: &str = "Message";

/// How the tables of a group are loaded and combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameOptions {
    pub raster: Raster,
    /// Rename signals to `{message}_{signal}`
    pub prefix: bool,
    /// Add a `Message` column holding each row's source message
    pub tag_messages: bool,
}

impl FrameOptions {
    pub fn new(raster: Raster) -> Self {
        Self {
            raster,
            ..Self::default()
        }
    }

    /// Builder method: prefix signal names with their message name
    pub fn with_prefix(mut self, prefix: bool) -> Self {
        self.prefix = prefix;
        self
    }

    /// Builder method: tag rows with their source message
    pub fn with_message_tags(mut self, tag: bool) -> Self {
        self.tag_messages = tag;
        self
    }
}

/// Loads and combines decoded message tables found through a [`PathIndex`]
pub struct SignalFrameBuilder<'a> {
    index: &'a PathIndex,
}

impl<'a> SignalFrameBuilder<'a> {
    pub fn new(index: &'a PathIndex) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &PathIndex {
        self.index
    }

    /// Load one message table, applying prefix and raster
    pub fn load_message(
        &self,
        key: &PathKey,
        message: &str,
        options: FrameOptions,
    ) -> Result<SignalFrame> {
        let path = self.index.message_file(key, message);
        let mut frame = read_signal_frame(&path)?;

        if options.prefix {
            frame.prefix_columns(message);
        }
        if let Some(step) = options.raster.step_us() {
            frame = frame.resample(step);
        }
        if options.tag_messages {
            let tags = vec![Some(message.to_string()); frame.len()];
            frame.insert_column(MESSAGE_COLUMN, ColumnData::Text(tags))?;
        }
        Ok(frame)
    }

    /// Load every message of a group into one frame
    ///
    /// Fails with `MissingDecodedFile` if any table is absent; callers decide
    /// whether that skips the group.
    pub fn build(
        &self,
        key: &PathKey,
        messages: &[String],
        options: FrameOptions,
    ) -> Result<SignalFrame> {
        let mut frames = Vec::with_capacity(messages.len());
        for message in messages {
            frames.push(self.load_message(key, message, options)?);
        }

        let frame = combine_frames(frames, options.raster)?;
        log::debug!(
            "Built frame for {} from {:?}: {} rows, {} columns",
            key,
            messages,
            frame.len(),
            frame.columns().len()
        );
        Ok(frame)
    }
}

/// Combine loaded tables according to the raster
///
/// Without a raster the tables are stacked and sorted by time; with a raster
/// they are joined on the shared grid timestamps.
pub fn combine_frames(frames: Vec<SignalFrame>, raster: Raster) -> Result<SignalFrame> {
    if raster.is_enabled() {
        let mut joined = SignalFrame::inner_join(frames);
        joined.sort_by_time();
        Ok(joined)
    } else {
        let mut stacked = SignalFrame::concat_rows(frames)?;
        stacked.sort_by_time();
        Ok(stacked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parquet_io::write_signal_frame;
    use tempfile::TempDir;

    fn write(
        root: &std::path::Path,
        key: &PathKey,
        message: &str,
        t: &[i64],
        name: &str,
        values: &[f64],
    ) {
        let column = ColumnData::Numeric(values.iter().map(|v| Some(*v)).collect());
        let frame = SignalFrame::new(t.to_vec())
            .with_column(name, column)
            .unwrap();
        write_signal_frame(&frame, &root.join(key.message_path(message))).unwrap();
    }

    fn key() -> PathKey {
        PathKey::new("DEV1", "2024/01/02", "00000001.parquet")
    }

    #[test]
    fn test_no_raster_stacks_rows() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), &key(), "A", &[0], "SigA", &[1.0]);
        write(dir.path(), &key(), "B", &[0], "SigB", &[2.0]);
        write(dir.path(), &key(), "C", &[0], "SigC", &[3.0]);

        let index = PathIndex::build(dir.path()).unwrap();
        let builder = SignalFrameBuilder::new(&index);
        let messages = vec!["A".to_string(), "B".to_string(), "C".to_string()];

        let frame = builder
            .build(&key(), &messages, FrameOptions::new(Raster::none()))
            .unwrap();
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.column_names(), vec!["SigA", "SigB", "SigC"]);
    }

    #[test]
    fn test_raster_joins_columns() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), &key(), "A", &[0], "SigA", &[1.0]);
        write(dir.path(), &key(), "B", &[0], "SigB", &[2.0]);
        write(dir.path(), &key(), "C", &[0], "SigC", &[3.0]);

        let index = PathIndex::build(dir.path()).unwrap();
        let builder = SignalFrameBuilder::new(&index);
        let messages = vec!["A".to_string(), "B".to_string(), "C".to_string()];

        let frame = builder
            .build(&key(), &messages, FrameOptions::new(Raster::parse("1s").unwrap()))
            .unwrap();
        assert_eq!(frame.len(), 1);
        assert_eq!(frame.column_names(), vec!["SigA", "SigB", "SigC"]);
        assert_eq!(frame.numeric("SigC").unwrap(), &[Some(3.0)]);
    }

    #[test]
    fn test_prefix_and_message_tags() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), &key(), "A", &[0, 1_000_000], "Value", &[1.0, 2.0]);

        let index = PathIndex::build(dir.path()).unwrap();
        let builder = SignalFrameBuilder::new(&index);
        let options = FrameOptions::new(Raster::none())
            .with_prefix(true)
            .with_message_tags(true);

        let frame = builder.load_message(&key(), "A", options).unwrap();
        assert_eq!(frame.column_names(), vec!["A_Value", MESSAGE_COLUMN]);
        assert_eq!(
            frame.text(MESSAGE_COLUMN).unwrap(),
            &[Some("A".to_string()), Some("A".to_string())]
        );
    }

    #[test]
    fn test_missing_message_fails() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), &key(), "A", &[0], "SigA", &[1.0]);

        let index = PathIndex::build(dir.path()).unwrap();
        let builder = SignalFrameBuilder::new(&index);
        let result = builder.build(
            &key(),
            &["A".to_string(), "Missing".to_string()],
            FrameOptions::default(),
        );
        assert!(matches!(
            result,
            Err(crate::types::ProcessorError::MissingDecodedFile(_))
        ));
    }
}
