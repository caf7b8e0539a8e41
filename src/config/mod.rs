//! Configuration for smartmarks.
//!
//! Read from `~/.config/smartmarks/config.toml` (or `--config`). A commented
//! default file is written on first run. `SUPABASE_URL` and
//! `SUPABASE_ANON_KEY` override the backend section.

pub mod backend;
pub mod colors;
pub mod keybindings;

pub use backend::BackendConfig;
pub use colors::ColorConfig;
pub use keybindings::KeybindingConfig;

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub colors: ColorConfig,
    pub keybindings: KeybindingConfig,
}

impl Config {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file is created with defaults. Missing fields fall back to
    /// defaults; an unparsable file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path()?,
        };

        let mut config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else {
            Self::create_default_config(&config_path)?;
            Self::default()
        };
        config.backend.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("smartmarks").join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        fs::write(path, Self::default_config_content()).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn default_config_content() -> &'static str {
        r##"# smartmarks configuration
#
# The backend section points at a Supabase project. SUPABASE_URL and
# SUPABASE_ANON_KEY in the environment take precedence over these values.

[backend]
url = ""
anon_key = ""
schema = "public"
table = "bookmarks"
channel = "bookmarks-realtime"
provider = "google"
# Local port the OAuth provider redirects back to. Add
# http://localhost:<port>/callback to the project's redirect allow list.
redirect_port = 54321
request_timeout_secs = 10

# Colors: named ("LightBlue", "DarkGray", ...), 256-color index ("62"),
# or hex ("#4f46e5", "#fff").
[colors]
active_border = "62"
inactive_border = "DarkGray"
selection_bg = "62"
selection_fg = "White"
heading = "White"
bookmark_title = "White"
bookmark_url = "LightBlue"
placeholder = "DarkGray"
alert_border = "LightRed"
status_fg = "White"
status_bg = "DarkGray"

# Keys: single characters ("d"), names ("Enter", "Tab", "Delete", "F1"),
# optionally with modifiers ("Ctrl+c", "Shift+Tab").
# These apply while the bookmark list has focus.
[keybindings]
quit = ["q", "Ctrl+c"]
move_up = ["k", "Up"]
move_down = ["j", "Down"]
next_focus = ["Tab"]
prev_focus = ["BackTab", "Shift+Tab"]
submit = ["Enter"]
delete_bookmark = ["d", "Delete"]
open_in_browser = ["o"]
refresh = ["R"]
sign_in = ["s"]
sign_out = ["L"]
"##
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
