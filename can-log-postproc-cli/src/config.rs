//! Job configuration loading and merging

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Optional job configuration (loaded from a TOML file)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub stores: StoresConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InputConfig {
    /// Root of the decoded Parquet tree
    pub decoded_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoresConfig {
    /// Directory holding `custom-messages.json` / `events.json`
    pub config_dir: Option<PathBuf>,
    /// Directory receiving every Parquet file of the run
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotificationsConfig {
    /// JSON-lines file receiving published notifications
    pub outbox: Option<PathBuf>,
}

/// Fully resolved settings of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    pub decoded_dir: PathBuf,
    pub config_dir: PathBuf,
    pub output_dir: PathBuf,
    pub outbox: Option<PathBuf>,
}

/// Values given on the command line; they take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub decoded_dir: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub outbox: Option<PathBuf>,
}

impl AppConfig {
    /// Merge command line values over the file and check required settings
    pub fn resolve(self, overrides: Overrides) -> Result<JobSettings> {
        let decoded_dir = overrides.decoded_dir.or(self.input.decoded_dir);
        let config_dir = overrides.config_dir.or(self.stores.config_dir);
        let output_dir = overrides.output_dir.or(self.stores.output_dir);
        let outbox = overrides.outbox.or(self.notifications.outbox);

        let Some(decoded_dir) = decoded_dir else {
            bail!("No decoded directory given (use --decoded or [input] decoded_dir)");
        };
        let Some(output_dir) = output_dir else {
            bail!("No output directory given (use --output or [stores] output_dir)");
        };
        if !decoded_dir.is_dir() {
            bail!("Decoded directory does not exist: {:?}", decoded_dir);
        }

        Ok(JobSettings {
            config_dir: config_dir.unwrap_or_else(|| decoded_dir.clone()),
            decoded_dir,
            output_dir,
            outbox,
        })
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [input]
            decoded_dir = "/data/decoded"

            [stores]
            config_dir = "/data/config"
            output_dir = "/data/output"

            [notifications]
            outbox = "/data/outbox.jsonl"
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.input.decoded_dir, Some(PathBuf::from("/data/decoded")));
        assert_eq!(config.stores.output_dir, Some(PathBuf::from("/data/output")));
        assert_eq!(
            config.notifications.outbox,
            Some(PathBuf::from("/data/outbox.jsonl"))
        );
    }

    #[test]
    fn test_arguments_win() {
        let decoded = TempDir::new().unwrap();
        let config = AppConfig {
            input: InputConfig {
                decoded_dir: Some(PathBuf::from("/does/not/exist")),
            },
            stores: StoresConfig {
                config_dir: Some(PathBuf::from("/cfg")),
                output_dir: Some(PathBuf::from("/out")),
            },
            ..AppConfig::default()
        };
        let overrides = Overrides {
            decoded_dir: Some(decoded.path().to_path_buf()),
            output_dir: Some(PathBuf::from("/elsewhere")),
            ..Overrides::default()
        };

        let settings = config.resolve(overrides).unwrap();
        assert_eq!(settings.decoded_dir, decoded.path());
        assert_eq!(settings.config_dir, PathBuf::from("/cfg"));
        assert_eq!(settings.output_dir, PathBuf::from("/elsewhere"));
        assert_eq!(settings.outbox, None);
    }

    #[test]
    fn test_config_dir_defaults_to_decoded() {
        let decoded = TempDir::new().unwrap();
        let overrides = Overrides {
            decoded_dir: Some(decoded.path().to_path_buf()),
            output_dir: Some(PathBuf::from("/out")),
            ..Overrides::default()
        };
        let settings = AppConfig::default().resolve(overrides).unwrap();
        assert_eq!(settings.config_dir, decoded.path());
    }

    #[test]
    fn test_missing_required_settings() {
        assert!(AppConfig::default().resolve(Overrides::default()).is_err());

        let overrides = Overrides {
            decoded_dir: Some(PathBuf::from("/does/not/exist")),
            output_dir: Some(PathBuf::from("/out")),
            ..Overrides::default()
        };
        assert!(AppConfig::default().resolve(overrides).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job.toml");
        fs::write(&path, "[stores]\noutput_dir = \"out\"\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.stores.output_dir, Some(PathBuf::from("out")));
        assert!(config.input.decoded_dir.is_none());

        assert!(load_config(&dir.path().join("missing.toml")).is_err());
    }
}
