use std::path::{Path, PathBuf};

pub const DATA_FILE_NAME: &str = "userdata.fws";
pub const BACKUP_SUFFIX: &str = ".bak";
pub const PENDING_SUFFIX: &str = ".tmp";

#[must_use]
pub fn default_data_file(dir: &Path) -> PathBuf {
    dir.join(DATA_FILE_NAME)
}

/// Returns `<path>.bak`, keeping any existing extension (`userdata.fws.bak`).
#[must_use]
pub fn backup_path_for(path: &Path) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(BACKUP_SUFFIX);
    PathBuf::from(raw)
}

/// Returns `<path>.tmp`, where a checkpoint is staged while an older `.bak`
/// is still on disk.
#[must_use]
pub fn pending_path_for(path: &Path) -> PathBuf {
    let mut raw = path.as_os_str().to_owned();
    raw.push(PENDING_SUFFIX);
    PathBuf::from(raw)
}
