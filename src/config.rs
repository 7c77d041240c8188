//! Run configuration.
//!
//! Every setting has a default, so most runs need no file at all. When one is
//! wanted, `riloe.toml` in the notes folder (or a file passed with
//! `--config`) overrides just the keys it names:
//!
//! ```toml
//! [images]
//! quality = 70
//!
//! [package]
//! author = "Ana"
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! [selection]
//! count = 10                    # Notes per package when -n is not given
//!
//! [layout]
//! output_dir = "epub"           # Created inside the notes folder
//! images_dir = "imaxes"         # Created inside output_dir
//!
//! [images]
//! max_width = 600               # Larger images are scaled down to fit
//! max_height = 800
//! quality = 85                  # JPEG re-encoding quality (1-100)
//!
//! [fetch]
//! timeout_secs = 10
//! user_agent = "Mozilla/5.0 ..."
//!
//! [package]
//! title_prefix = "Notas"        # Title is "<prefix> <date>"
//! author = "Riloe"
//! language = "gl"
//! identity = "run-date"         # or "input-range"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File looked up inside the notes folder when `--config` is not given.
pub const CONFIG_FILENAME: &str = "riloe.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Complete run configuration. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RiloeConfig {
    pub selection: SelectionConfig,
    pub layout: LayoutConfig,
    pub images: ImagesConfig,
    pub fetch: FetchConfig,
    pub package: PackageConfig,
}

impl RiloeConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.selection.count == 0 {
            return Err(ConfigError::Validation(
                "selection.count must be at least 1".into(),
            ));
        }
        if !(1..=100).contains(&self.images.quality) {
            return Err(ConfigError::Validation(
                "images.quality must be 1-100".into(),
            ));
        }
        if self.images.max_width == 0 || self.images.max_height == 0 {
            return Err(ConfigError::Validation(
                "images.max_width and images.max_height must be non-zero".into(),
            ));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "fetch.timeout_secs must be non-zero".into(),
            ));
        }
        for (key, value) in [
            ("layout.output_dir", &self.layout.output_dir),
            ("layout.images_dir", &self.layout.images_dir),
        ] {
            let name = value.trim();
            if name.is_empty() || name == "." || name == ".." || value.contains(['/', '\\']) {
                return Err(ConfigError::Validation(format!(
                    "{key} must be a single folder name"
                )));
            }
        }
        if self.layout.output_dir.trim() == self.layout.images_dir.trim() {
            return Err(ConfigError::Validation(
                "layout.output_dir and layout.images_dir must differ".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectionConfig {
    pub count: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self { count: 10 }
    }
}

/// Folder names created under the notes folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    pub output_dir: String,
    pub images_dir: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            output_dir: "epub".to_string(),
            images_dir: "imaxes".to_string(),
        }
    }
}

/// Downscaling bound and re-encoding quality for fetched images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u32,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            max_width: 600,
            max_height: 800,
            quality: 85,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

/// How the package identifier and title are derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageIdentity {
    /// From the date of the run.
    #[default]
    RunDate,
    /// From the first and last selected note dates; stable across reruns.
    InputRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackageConfig {
    pub title_prefix: String,
    pub author: String,
    pub language: String,
    pub identity: PackageIdentity,
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            title_prefix: "Notas".to_string(),
            author: "Riloe".to_string(),
            language: "gl".to_string(),
            identity: PackageIdentity::RunDate,
        }
    }
}

/// Parse and validate a config file.
pub fn load_config(path: &Path) -> Result<RiloeConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    let config: RiloeConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Pick the config for a run.
///
/// An explicit path must exist. Otherwise `riloe.toml` in the notes folder is
/// used when present, and stock defaults when not.
pub fn resolve_config(
    explicit: Option<&Path>,
    notes_dir: &Path,
) -> Result<RiloeConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    let local = notes_dir.join(CONFIG_FILENAME);
    if local.is_file() {
        return load_config(&local);
    }
    Ok(RiloeConfig::default())
}

/// Returns a fully-commented stock `riloe.toml` with all keys and defaults.
///
/// Printed by `riloe --gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# Riloe Configuration
# ====================
# All settings are optional. Remove any you don't need.
# Values shown below are the defaults.
#
# Place this file as riloe.toml in the notes folder, or pass it with --config.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Selection
# ---------------------------------------------------------------------------
[selection]
# Number of notes to include when -n is not given. Oldest notes go first.
count = 10

# ---------------------------------------------------------------------------
# Output layout (folder names inside the notes folder)
# ---------------------------------------------------------------------------
[layout]
# Receives the moved notes and the finished package.
output_dir = "epub"

# Image cache inside output_dir. Images here are reused on later runs.
images_dir = "imaxes"

# ---------------------------------------------------------------------------
# Images
# ---------------------------------------------------------------------------
[images]
# Images larger than this box are scaled down to fit, keeping proportions.
max_width = 600
max_height = 800

# JPEG quality used when a scaled image is re-encoded (1-100).
quality = 85

# ---------------------------------------------------------------------------
# Downloads
# ---------------------------------------------------------------------------
[fetch]
# Seconds before an image download is abandoned. Failed images are dropped.
timeout_secs = 10

# Sent with every request; some hosts refuse unknown clients.
user_agent = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"

# ---------------------------------------------------------------------------
# Package metadata
# ---------------------------------------------------------------------------
[package]
# The book title is "<title_prefix> <date>".
title_prefix = "Notas"
author = "Riloe"
language = "gl"

# "run-date": identifier and title use today's date.
# "input-range": they use the first and last note dates, so rerunning over
# the same notes produces the same identifier.
identity = "run-date"
"##
}
