use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

const APP_DIR: &str = "event-catalog";

/// `EVENT_CATALOG_HOME` when set, else `<platform data dir>/event-catalog`.
static DATA_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    if let Some(home) = std::env::var_os("EVENT_CATALOG_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    dirs::data_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
});

pub fn database_path() -> PathBuf {
    DATA_ROOT.join("events.sqlite")
}

pub fn config_path() -> PathBuf {
    DATA_ROOT.join("config.json")
}

/// Creates the directory that will hold `path`. Bare file names need nothing.
pub fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}
