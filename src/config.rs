//! Preferences file support.
//!
//! Preferences are a plain serde struct stored as pretty-printed JSON. A
//! missing file is bootstrapped with the defaults on first load.

use crate::enums::Symbol;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Errors that can occur when loading or saving preferences.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse preferences: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Marker symbols offered for point layers, in menu order.
    pub symbol_order: Vec<Symbol>,
    pub default_symbol_size: f64,
    pub default_symbol_opacity: u8,
    pub default_line_width: f64,
    /// Colours handed out to successive image stacks.
    pub color_order: Vec<String>,
    pub recent_files: Vec<PathBuf>,
    pub max_recent_files: usize,
    pub plugin_paths: Vec<PathBuf>,
    pub hide_axes: bool,
    pub hide_zoom_buttons: bool,
    pub show_cross_hairs: bool,
    /// Used when a stack carries no voxel spacing.
    pub default_axis_ratios: [f64; 3],
    /// How far from the current slice a point may be and still be drawn,
    /// per axis.
    pub default_point_z_spread: [f64; 3],
    pub last_load_dir: Option<PathBuf>,
    pub log_level: LogLevel,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            symbol_order: vec![
                Symbol::Circle,
                Symbol::Square,
                Symbol::Triangle,
                Symbol::Diamond,
                Symbol::Plus,
            ],
            default_symbol_size: 5.0,
            default_symbol_opacity: 255,
            default_line_width: 2.0,
            color_order: ["red", "green", "blue", "magenta", "cyan", "yellow", "gray"]
                .into_iter()
                .map(String::from)
                .collect(),
            recent_files: Vec::new(),
            max_recent_files: 5,
            plugin_paths: Vec::new(),
            hide_axes: false,
            hide_zoom_buttons: false,
            show_cross_hairs: true,
            default_axis_ratios: [1.0, 1.0, 1.0],
            default_point_z_spread: [0.0, 0.0, 0.0],
            last_load_dir: None,
            log_level: LogLevel::default(),
        }
    }
}

impl Preferences {
    pub fn default_filename() -> &'static str {
        "preferences.json"
    }

    /// `<config dir>/triview/preferences.json`, falling back to `~/.config`.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("triview").join(Self::default_filename()))
        } else {
            dirs::home_dir().map(|home| {
                home.join(".config")
                    .join("triview")
                    .join(Self::default_filename())
            })
        }
    }

    /// Read preferences from `path`, writing the defaults there first if the
    /// file does not exist yet.
    pub fn load_or_bootstrap(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load_json_or_bootstrap(path.as_ref())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        save_json(self, path.as_ref())
    }

    /// Move `path` to the front of the recent-file list, dropping older
    /// duplicates and trimming to `max_recent_files`.
    pub fn push_recent_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.recent_files.retain(|p| *p != path);
        self.recent_files.insert(0, path);
        self.recent_files.truncate(self.max_recent_files);
    }
}

/// Load any serde type from a JSON file, bootstrapping it with
/// `T::default()` when the file is missing.
pub fn load_json_or_bootstrap<T>(path: &Path) -> Result<T, ConfigError>
where
    T: Serialize + DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("No preferences at {path:?}; writing defaults");
        let value = T::default();
        save_json(&value, path)?;
        return Ok(value);
    }
    let json = fs::read_to_string(path)?;
    let value = serde_json::from_str(&json)?;
    log::debug!("Loaded preferences from {path:?}");
    Ok(value)
}

pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}
