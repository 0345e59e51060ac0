//! Notification outbox
//!
//! Published notifications are appended as JSON lines so another process
//! (mail relay, chat bot) can forward them.

use can_log_postproc::{Notifier, ProcessorError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// One line of the outbox file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub subject: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// Notifier appending to a JSON-lines file
#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    path: PathBuf,
}

impl OutboxNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entry: &OutboxEntry) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

impl Notifier for OutboxNotifier {
    fn publish(&self, subject: &str, body: &str) -> can_log_postproc::Result<()> {
        let entry = OutboxEntry {
            subject: subject.to_string(),
            body: body.to_string(),
            sent_at: Utc::now(),
        };
        self.append(&entry).map_err(|e| {
            ProcessorError::Notification(format!("failed to write {:?}: {}", self.path, e))
        })?;
        log::info!("Queued notification '{}' in {:?}", subject, self.path);
        Ok(())
    }
}
