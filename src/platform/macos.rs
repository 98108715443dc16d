// linksync paths on macOS. Config and data share the Application Support folder.

use std::env;
use std::path::PathBuf;

fn app_support_dir() -> PathBuf {
    PathBuf::from(env::var("HOME").unwrap_or_else(|_| String::from("/tmp")))
        .join("Library")
        .join("Application Support")
        .join("linksync")
}

pub fn get_config_dir() -> PathBuf {
    app_support_dir()
}

/// Bookmarks live next to `settings.json`, under `store/`.
pub fn get_data_dir() -> PathBuf {
    app_support_dir().join("store")
}
