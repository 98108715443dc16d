// linksync paths on Linux, following the XDG base directory layout.
// Config: $XDG_CONFIG_HOME/linksync or ~/.config/linksync
// Data:   $XDG_DATA_HOME/linksync or ~/.local/share/linksync

use std::env;
use std::path::PathBuf;

const APP_DIR: &str = "linksync";

pub fn get_config_dir() -> PathBuf {
    xdg_dir(env::var("XDG_CONFIG_HOME").ok(), env::var("HOME").ok(), &[".config"])
}

pub fn get_data_dir() -> PathBuf {
    xdg_dir(env::var("XDG_DATA_HOME").ok(), env::var("HOME").ok(), &[".local", "share"])
}

/// `$XDG_*/linksync` when the variable is set and absolute, else `$HOME/<fallback>/linksync`.
fn xdg_dir(xdg: Option<String>, home: Option<String>, fallback: &[&str]) -> PathBuf {
    if let Some(base) = xdg.filter(|v| v.starts_with('/')) {
        return PathBuf::from(base).join(APP_DIR);
    }
    let mut path = PathBuf::from(home.unwrap_or_else(|| String::from("/tmp")));
    for part in fallback {
        path.push(part);
    }
    path.join(APP_DIR)
}
