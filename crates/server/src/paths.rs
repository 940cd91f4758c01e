//! Central path resolution for muxdeck data files.
//!
//! Resolved once at startup from: `--data-dir` / `MUXDECK_DATA_DIR` > `~/.muxdeck`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

static DATA_DIR: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Initialize the global data directory. Returns the resolved path.
pub fn init_data_dir(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = match explicit {
        Some(path) => path.to_path_buf(),
        None => dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("HOME directory not found; pass --data-dir"))?
            .join(".muxdeck"),
    };

    let mut guard = DATA_DIR.write().unwrap_or_else(PoisonError::into_inner);
    *guard = Some(dir.clone());
    Ok(dir)
}

/// Current data directory. Errors if `init_data_dir` hasn't run.
pub fn data_dir() -> anyhow::Result<PathBuf> {
    DATA_DIR
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or_else(|| anyhow::anyhow!("data dir not initialized"))
}

pub fn log_dir() -> anyhow::Result<PathBuf> {
    Ok(data_dir()?.join("logs"))
}

pub fn activity_db_path() -> anyhow::Result<PathBuf> {
    Ok(data_dir()?.join("activity.db"))
}

/// Create the data dir and its `logs/` subdirectory.
pub fn ensure_dirs(base: &Path) -> io::Result<()> {
    std::fs::create_dir_all(base)?;
    std::fs::create_dir_all(base.join("logs"))?;
    Ok(())
}
