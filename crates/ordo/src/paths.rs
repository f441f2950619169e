//! Well-known locations for config and log files.

use std::path::PathBuf;

fn env_dir(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|dir| !dir.trim().is_empty())
        .map(PathBuf::from)
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"))
}

pub(crate) fn config_dir() -> PathBuf {
    if let Some(dir) = env_dir("ORDO_CONFIG_DIR") {
        return dir;
    }
    env_dir("XDG_CONFIG_HOME")
        .unwrap_or_else(|| home().join(".config"))
        .join("ordo")
}

pub(crate) fn data_dir() -> PathBuf {
    if let Some(dir) = env_dir("ORDO_DATA_DIR") {
        return dir;
    }
    env_dir("XDG_DATA_HOME")
        .unwrap_or_else(|| home().join(".local").join("share"))
        .join("ordo")
}

pub(crate) fn log_dir() -> PathBuf {
    env_dir("ORDO_LOG_DIR").unwrap_or_else(|| data_dir().join("logs"))
}
