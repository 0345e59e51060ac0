//! Ports to the surrounding platform
//!
//! The pipeline never talks to a cloud SDK directly. Storage and notification
//! backends are passed in as trait objects; this module defines the traits
//! plus a local-directory store and a notifier that only logs.

use crate::path_index::list_files;
use crate::types::{ProcessorError, Result, Timestamp};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Metadata of one stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Object path using `/` separators
    pub name: String,
    pub size: u64,
    pub modified: Option<Timestamp>,
}

/// Object storage (bucket / container) access
pub trait ObjectStore {
    /// List objects whose name starts with `prefix`
    fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>>;

    /// Copy an object to `local_path`; `Ok(false)` when the object does not exist
    fn download(&self, path: &str, local_path: &Path) -> Result<bool>;

    /// Store a local file under `path`
    fn upload(&self, local_path: &Path, path: &str) -> Result<()>;
}

/// Event notification channel (SNS topic, webhook, mail relay, ...)
pub trait Notifier {
    fn publish(&self, subject: &str, body: &str) -> Result<()>;
}

/// Object store backed by a local directory
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if name.is_empty() || escapes {
            return Err(ProcessorError::Storage(format!("invalid object name {:?}", name)));
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for LocalObjectStore {
    fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        for path in list_files(&self.root)? {
            let name = object_name(&self.root, &path);
            if !name.starts_with(prefix) {
                continue;
            }
            let metadata = fs::metadata(&path)?;
            objects.push(ObjectInfo {
                name,
                size: metadata.len(),
                modified: metadata.modified().ok().map(Timestamp::from),
            });
        }
        Ok(objects)
    }

    fn download(&self, path: &str, local_path: &Path) -> Result<bool> {
        let source = self.object_path(path)?;
        if !source.is_file() {
            log::debug!("Object {} not found in {:?}", path, self.root);
            return Ok(false);
        }
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&source, local_path)?;
        Ok(true)
    }

    fn upload(&self, local_path: &Path, path: &str) -> Result<()> {
        let target = self.object_path(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(local_path, &target)?;
        Ok(())
    }
}

/// Object name of `path` relative to `root`, with `/` separators
pub fn object_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Notifier that writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn publish(&self, subject: &str, body: &str) -> Result<()> {
        log::info!("Notification: {}\n{}", subject, body);
        Ok(())
    }
}
