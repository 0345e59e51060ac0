//! One post-processing run
//!
//! Fetches the optional job configurations from the config store, generates
//! custom messages, detects events on the refreshed index and uploads every
//! Parquet file of the work tree to the output store.

use crate::config::{load_custom_messages, load_events, CUSTOM_MESSAGES_FILE, EVENTS_FILE};
use crate::custom::CustomMessageEngine;
use crate::events::EventDetectionEngine;
use crate::path_index::{list_parquet_files, PathIndex};
use crate::ports::{object_name, Notifier, ObjectStore};
use crate::types::{ProcessorError, Result};
use log::info;
use std::path::Path;

/// Counters reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub custom_files: usize,
    pub event_files: usize,
    pub notifications: usize,
    pub uploaded: usize,
}

/// Post-processing run wired to its storage and notification backends
pub struct Pipeline<'a> {
    config_store: &'a dyn ObjectStore,
    output_store: &'a dyn ObjectStore,
    notifier: &'a dyn Notifier,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config_store: &'a dyn ObjectStore,
        output_store: &'a dyn ObjectStore,
        notifier: &'a dyn Notifier,
    ) -> Self {
        Self {
            config_store,
            output_store,
            notifier,
        }
    }

    /// Process the decoded tree at `decoded_dir` in place
    ///
    /// `scratch_dir` receives the downloaded configuration files. Custom
    /// messages and events are written into `decoded_dir` before the upload.
    pub fn run(&self, decoded_dir: &Path, scratch_dir: &Path) -> Result<RunSummary> {
        let custom_messages =
            self.fetch_config(CUSTOM_MESSAGES_FILE, scratch_dir, load_custom_messages)?;
        let events = self.fetch_config(EVENTS_FILE, scratch_dir, load_events)?;
        let mut summary = RunSummary::default();

        match custom_messages {
            Some(configs) => {
                let index = PathIndex::build(decoded_dir)?;
                summary.custom_files = CustomMessageEngine::new(&index).run(&configs)?;
            }
            None => info!("No {} found, skipping custom messages", CUSTOM_MESSAGES_FILE),
        }

        match events {
            Some(config) => {
                // Rebuilt so custom messages can serve as event input
                let index = PathIndex::build(decoded_dir)?;
                let stats = EventDetectionEngine::new(&index, self.notifier).run(&config)?;
                summary.event_files = stats.files_written;
                summary.notifications = stats.notifications_sent;
            }
            None => info!("No {} found, skipping events", EVENTS_FILE),
        }

        summary.uploaded = self.upload_results(decoded_dir)?;
        Ok(summary)
    }

    /// Download and parse one configuration file; `None` when it is absent
    fn fetch_config<T>(
        &self,
        name: &str,
        scratch_dir: &Path,
        load: fn(&Path) -> Result<T>,
    ) -> Result<Option<T>> {
        let local = scratch_dir.join(name);
        if !self.config_store.download(name, &local)? {
            return Ok(None);
        }
        info!("Loaded {}", name);
        load(&local).map(Some)
    }

    /// Upload every Parquet file below `decoded_dir`, keeping relative paths
    pub fn upload_results(&self, decoded_dir: &Path) -> Result<usize> {
        let files = list_parquet_files(decoded_dir)?;
        if files.is_empty() {
            return Err(ProcessorError::NothingToUpload(decoded_dir.to_path_buf()));
        }
        for file in &files {
            self.output_store.upload(file, &object_name(decoded_dir, file))?;
        }
        info!("Uploaded {} Parquet files", files.len());
        Ok(files.len())
    }
}

/// Copy every Parquet object below `prefix` from `store` into `work_dir`
///
/// Object names are kept as relative paths so the staged tree has the
/// decoded layout.
pub fn stage_decoded_files(
    store: &dyn ObjectStore,
    prefix: &str,
    work_dir: &Path,
) -> Result<usize> {
    let mut staged = 0;
    for object in store.list(prefix)? {
        if !object.name.ends_with(".parquet") {
            continue;
        }
        let relative = object.name.strip_prefix(prefix).unwrap_or(&object.name);
        let local = work_dir.join(relative.trim_start_matches('/'));
        if store.download(&object.name, &local)? {
            staged += 1;
        }
    }
    info!("Staged {} decoded files into {:?}", staged, work_dir);
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{ColumnData, SignalFrame};
    use crate::parquet_io::write_signal_frame;
    use crate::ports::{LocalObjectStore, LogNotifier};
    use crate::types::PathKey;
    use std::fs;
    use tempfile::TempDir;

    fn write_decoded(root: &Path) {
        let key = PathKey::new("DEV1", "2024/01/02", "1.parquet");
        let frame = SignalFrame::new(vec![0])
            .with_column("Speed", ColumnData::Numeric(vec![Some(1.0)]))
            .unwrap();
        write_signal_frame(&frame, &root.join(key.message_path("CAN1_Speed"))).unwrap();
    }

    #[test]
    fn test_absent_configs_only_upload() {
        let decoded = TempDir::new().unwrap();
        let configs = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        write_decoded(decoded.path());

        let config_store = LocalObjectStore::new(configs.path());
        let output_store = LocalObjectStore::new(output.path());
        let pipeline = Pipeline::new(&config_store, &output_store, &LogNotifier);

        let summary = pipeline.run(decoded.path(), scratch.path()).unwrap();
        assert_eq!(summary, RunSummary { uploaded: 1, ..RunSummary::default() });
        assert!(output.path().join("DEV1/CAN1_Speed/2024/01/02/1.parquet").is_file());
    }

    #[test]
    fn test_empty_tree_is_an_error() {
        let decoded = TempDir::new().unwrap();
        let stores = TempDir::new().unwrap();
        let store = LocalObjectStore::new(stores.path());
        let pipeline = Pipeline::new(&store, &store, &LogNotifier);

        let result = pipeline.run(decoded.path(), stores.path());
        assert!(matches!(result, Err(ProcessorError::NothingToUpload(_))));
    }

    #[test]
    fn test_malformed_config_aborts() {
        let decoded = TempDir::new().unwrap();
        let configs = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        write_decoded(decoded.path());
        fs::write(configs.path().join(EVENTS_FILE), "{ not json").unwrap();

        let config_store = LocalObjectStore::new(configs.path());
        let pipeline = Pipeline::new(&config_store, &config_store, &LogNotifier);
        let result = pipeline.run(decoded.path(), scratch.path());
        assert!(matches!(result, Err(ProcessorError::Config(_))));
    }

    #[test]
    fn test_stage_decoded_files() {
        let source = TempDir::new().unwrap();
        let work = TempDir::new().unwrap();
        write_decoded(&source.path().join("incoming"));
        fs::write(source.path().join("incoming/readme.txt"), "x").unwrap();

        let store = LocalObjectStore::new(source.path());
        let staged = stage_decoded_files(&store, "incoming/", work.path()).unwrap();
        assert_eq!(staged, 1);
        assert!(work.path().join("DEV1/CAN1_Speed/2024/01/02/1.parquet").is_file());
    }
}
