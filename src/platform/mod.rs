// linksync platform abstraction
// Resolves where settings and the bookmark store live on each OS.
//
// Uses `cfg(target_os)` for conditional compilation; the per-OS modules only
// know the conventional base directories.

use std::env;
use std::path::PathBuf;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "windows")]
mod windows;

/// Environment variable that relocates the data directory (store files, SQLite db).
pub const DATA_DIR_ENV: &str = "LINKSYNC_DATA_DIR";

/// Returns the configuration directory holding `settings.json`.
///
/// - **Linux**: `$XDG_CONFIG_HOME/linksync` or `~/.config/linksync`
/// - **macOS**: `~/Library/Application Support/linksync`
/// - **Windows**: `%APPDATA%/linksync`
pub fn get_config_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        linux::get_config_dir()
    }
    #[cfg(target_os = "macos")]
    {
        macos::get_config_dir()
    }
    #[cfg(target_os = "windows")]
    {
        windows::get_config_dir()
    }
}

/// Returns the data directory, honouring `LINKSYNC_DATA_DIR` when set and non-empty.
pub fn get_data_dir() -> PathBuf {
    data_dir_with_override(env::var(DATA_DIR_ENV).ok())
}

fn data_dir_with_override(value: Option<String>) -> PathBuf {
    match value {
        Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => platform_data_dir(),
    }
}

fn platform_data_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        linux::get_data_dir()
    }
    #[cfg(target_os = "macos")]
    {
        macos::get_data_dir()
    }
    #[cfg(target_os = "windows")]
    {
        windows::get_data_dir()
    }
}
