use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::db::search::ARTIST_PREVIEW_SIZE;
use crate::db::sort::MOST_PLAYED_LIMIT;
use crate::db::DEFAULT_THUMBNAIL_SIZE;

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults; the config file is optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Square edge, in pixels, for artist thumbnails refreshed from remote pages.
    pub thumbnail_size: u32,
    /// Songs shown in an artist preview.
    pub preview_size: usize,
    /// Artists on the "most played" list.
    pub most_played_limit: usize,
    /// How far back play history counts toward "most played".
    pub most_played_days: i64,
    /// Sort key used when a listing command is given none.
    pub default_sort: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
            preview_size: ARTIST_PREVIEW_SIZE,
            most_played_limit: MOST_PLAYED_LIMIT,
            most_played_days: 30,
            default_sort: "create_date".to_string(),
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/tunedb/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        match config_path {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }),
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join("tunedb.db")
    } else {
        // Fallback: current directory
        PathBuf::from("tunedb.db")
    }
}
