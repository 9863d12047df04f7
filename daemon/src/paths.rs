/// Canonical file locations.
///
/// Everything lives in the waybar config directory, `$XDG_CONFIG_HOME/waybar/`
/// (or `~/.config/waybar/`):
///   - mediaplayer_config.json  Read by the daemon; created with defaults if absent.
///   - waybar.log               Shared log file for all bar scripts.
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

const APP_DIR_NAME: &str = "waybar";
pub const CONFIG_FILE_NAME: &str = "mediaplayer_config.json";
pub const LOG_FILE_NAME: &str = "waybar.log";

/// Returns the waybar config directory from the environment.
pub fn config_dir() -> Result<PathBuf> {
    match resolve_config_dir(std::env::var_os("XDG_CONFIG_HOME"), std::env::var_os("HOME")) {
        Some(dir) => Ok(dir),
        None => bail!("Neither XDG_CONFIG_HOME nor HOME is set"),
    }
}

/// Returns the full path to the config file: `<config dir>/mediaplayer_config.json`.
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// The log file sits next to whichever config file is in use.
pub fn log_file_path(config_file: &Path) -> PathBuf {
    config_file
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(LOG_FILE_NAME)
}

/// An empty or relative `XDG_CONFIG_HOME` is ignored, per the XDG base directory spec.
fn resolve_config_dir(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    let base = xdg_config_home
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .or_else(|| {
            home.filter(|h| !h.is_empty())
                .map(|h| PathBuf::from(h).join(".config"))
        })?;
    Some(base.join(APP_DIR_NAME))
}
