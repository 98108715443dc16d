// linksync paths on Windows: roaming settings, local data.

use std::env;
use std::path::PathBuf;

pub fn get_config_dir() -> PathBuf {
    let appdata =
        env::var("APPDATA").unwrap_or_else(|_| String::from("C:\\Users\\Default\\AppData\\Roaming"));
    PathBuf::from(appdata).join("linksync")
}

/// The store is per machine, so it stays out of the roaming profile.
pub fn get_data_dir() -> PathBuf {
    let local =
        env::var("LOCALAPPDATA").unwrap_or_else(|_| String::from("C:\\Users\\Default\\AppData\\Local"));
    PathBuf::from(local).join("linksync")
}
