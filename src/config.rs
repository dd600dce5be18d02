//! Engine configuration.
//!
//! Consolidates the tunable paths and bounds in one validated struct so
//! consumers never read environment variables themselves.

use log::debug;
use std::env;
use std::path::PathBuf;

use crate::game::constants::{
    DEFAULT_DISCUSSION_SECS, MAX_PLAYERS, MIN_PLAYERS, REGULATIONS_FILE,
};

/// Engine settings.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Directory holding persisted data (regulation presets).
    pub data_dir: PathBuf,
    /// File name of the regulation preset document inside `data_dir`.
    pub regulations_file: String,
    /// Smallest roster a session may use.
    pub min_players: usize,
    /// Largest roster a session may use.
    pub max_players: usize,
    /// Default per-round discussion time, in seconds.
    pub default_discussion_secs: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            regulations_file: REGULATIONS_FILE.to_string(),
            min_players: MIN_PLAYERS,
            max_players: MAX_PLAYERS,
            default_discussion_secs: DEFAULT_DISCUSSION_SECS,
        }
    }
}

impl Settings {
    /// Load settings, honoring the `WEREWOLF_DATA_DIR` environment
    /// variable as a data-directory override.
    #[must_use]
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(dir) = env::var("WEREWOLF_DATA_DIR") {
            debug!("data dir overridden from environment: {dir}");
            settings.data_dir = PathBuf::from(dir);
        }
        settings
    }

    /// Settings rooted at an explicit data directory, mainly for tests.
    #[must_use]
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.data_dir, PathBuf::from("data"));
        assert_eq!(settings.regulations_file, "regulations.json");
        assert_eq!(settings.min_players, 3);
        assert_eq!(settings.max_players, 20);
        assert_eq!(settings.default_discussion_secs, 180);
    }

    #[test]
    fn test_with_data_dir() {
        let settings = Settings::with_data_dir("/tmp/somewhere");
        assert_eq!(settings.data_dir, PathBuf::from("/tmp/somewhere"));
        assert_eq!(settings.regulations_file, "regulations.json");
    }
}
