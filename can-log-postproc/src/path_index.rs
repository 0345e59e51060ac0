//! Index of the decoded Parquet tree
//!
//! The external decoder writes one file per message and log file using the
//! layout `{device}/{message}/{yyyy}/{mm}/{dd}/{file}.parquet`. The index
//! groups those files by (device, date, file) so that the messages belonging
//! to one physical log file can be loaded together.

use crate::types::{MessageGroup, PathKey, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Top-level directory holding derived aggregations (never decoded input)
pub const AGGREGATIONS_DIR: &str = "aggregations";

/// Number of path components in a decoded file path below the root
const DECODED_PATH_DEPTH: usize = 6;

/// Mapping of every decoded log file to the messages present for it
#[derive(Debug, Clone, Default)]
pub struct PathIndex {
    root: PathBuf,
    groups: MessageGroup,
}

impl PathIndex {
    /// Walk `root` and index every decoded Parquet file found below it
    pub fn build(root: &Path) -> Result<Self> {
        let files = list_parquet_files(root)?;
        let mut groups = MessageGroup::new();
        let mut skipped = 0usize;

        for file in &files {
            let relative = file.strip_prefix(root).unwrap_or(file);
            match parse_decoded_path(relative) {
                Some((key, message)) => {
                    let messages = groups.entry(key).or_insert_with(Vec::new);
                    if !messages.contains(&message) {
                        messages.push(message);
                    }
                }
                None => {
                    log::trace!("Not a decoded message file: {:?}", relative);
                    skipped += 1;
                }
            }
        }

        log::debug!(
            "Indexed {} decoded files into {} groups ({} other files ignored)",
            files.len() - skipped,
            groups.len(),
            skipped
        );

        Ok(Self {
            root: root.to_path_buf(),
            groups,
        })
    }

    /// Create an index from an already known group mapping
    pub fn from_groups(root: impl Into<PathBuf>, groups: MessageGroup) -> Self {
        let groups = groups
            .into_iter()
            .filter(|(_, messages)| !messages.is_empty())
            .collect();
        Self {
            root: root.into(),
            groups,
        }
    }

    /// Root directory of the decoded tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn groups(&self) -> &MessageGroup {
        &self.groups
    }

    /// Every distinct message name in the tree
    pub fn message_names(&self) -> BTreeSet<&str> {
        self.groups
            .values()
            .flat_map(|messages| messages.iter().map(String::as_str))
            .collect()
    }

    /// Absolute path of one message's decoded file
    pub fn message_file(&self, key: &PathKey, message: &str) -> PathBuf {
        self.root.join(key.message_path(message))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Split a relative decoded file path into its group key and message name
fn parse_decoded_path(relative: &Path) -> Option<(PathKey, String)> {
    let parts: Vec<&str> = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;

    if parts.len() != DECODED_PATH_DEPTH || parts[0] == AGGREGATIONS_DIR {
        return None;
    }

    let (device, message, yyyy, mm, dd, file_name) =
        (parts[0], parts[1], parts[2], parts[3], parts[4], parts[5]);
    let date = format!("{}/{}/{}", yyyy, mm, dd);

    Some((PathKey::new(device, date, file_name), message.to_string()))
}

/// Recursively list every `.parquet` file below `root`, sorted by path
pub fn list_parquet_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = list_files(root)?;
    files.retain(|path| path.extension().is_some_and(|ext| ext == "parquet"));
    Ok(files)
}

/// Recursively list every regular file below `root`, sorted by path
pub fn list_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if root.is_dir() {
        scan_dir(root, &mut files)?;
    }
    files.sort();
    Ok(files)
}

fn scan_dir(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            scan_dir(&path, files)?;
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(())
}
