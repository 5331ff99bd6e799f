use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use crate::error::UserDataError;
use crate::paths::{backup_path_for, default_data_file, pending_path_for};
use crate::schema::{PersistedState, RawUserData, COMMENT_MARKER};

static CHECKPOINT_LOCKS: Lazy<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// No identity was ever established; the file was left untouched.
    Skipped,
    Written {
        path: PathBuf,
        /// A previous primary file existed and was kept as backup until the
        /// new one was complete.
        replaced_previous: bool,
    },
}

/// Owner of the data file path. No other component opens the file.
#[derive(Debug, Clone)]
pub struct UserDataStore {
    path: PathBuf,
}

impl UserDataStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store for `userdata.fws` inside `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(default_data_file(dir))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn backup_path(&self) -> PathBuf {
        backup_path_for(&self.path)
    }

    #[must_use]
    pub fn has_backup(&self) -> bool {
        self.backup_path().exists()
    }

    /// Reads the payload lines of the data file.
    ///
    /// Returns `Ok(None)` when the file does not exist. The version line is not
    /// checked; callers decide what an unknown version means. If a previous
    /// checkpoint failed mid-write the primary file may be truncated, and what
    /// this returns for it is unspecified; the `.bak` sibling holds the last
    /// complete state.
    pub fn load(&self) -> Result<Option<RawUserData>, UserDataError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no data file, starting without prior state");
                return Ok(None);
            }
            Err(source) => {
                return Err(UserDataError::io("opening data file", &self.path, source));
            }
        };

        let mut reader = BufReader::new(file);
        let mut lines = Vec::new();
        let mut buffer = String::new();
        let mut line_number = 0usize;

        loop {
            buffer.clear();
            line_number += 1;
            let read = reader
                .read_line(&mut buffer)
                .map_err(|source| UserDataError::io_line(&self.path, line_number, source))?;
            if read == 0 {
                break;
            }

            let line = buffer.strip_suffix('\n').unwrap_or(&buffer);
            if line.starts_with(COMMENT_MARKER) {
                continue;
            }
            lines.push(line.to_string());
        }

        debug!(path = %self.path.display(), lines = lines.len(), "loaded data file");
        Ok(Some(RawUserData::new(lines)))
    }

    /// [`UserDataStore::load`] interpreted as a [`PersistedState`].
    pub fn load_state(&self) -> Result<Option<PersistedState>, UserDataError> {
        Ok(self.load()?.map(PersistedState::from))
    }

    /// Writes `state` through a buffered file writer. See
    /// [`UserDataStore::checkpoint_through`].
    pub fn checkpoint(&self, state: &PersistedState) -> Result<CheckpointOutcome, UserDataError> {
        self.checkpoint_through(state, BufWriter::new)
    }

    /// Writes a checkpoint, letting the caller wrap the freshly created file.
    ///
    /// Sequence: move the current file to `.bak`, write and sync the new file,
    /// then delete `.bak`. Any error after the move leaves `.bak` on disk and
    /// is returned as is.
    ///
    /// A `.bak` that is already present means an earlier checkpoint did not
    /// finish, and either file may hold the newest complete state. Neither is
    /// touched until the new state is durable: it is written and synced to
    /// `<path>.tmp` first, then the primary replaces `.bak`, the staged file
    /// replaces the primary, and `.bak` is deleted. A failed staged write
    /// removes `.tmp` and leaves both files as they were.
    ///
    /// Checkpoints targeting the same path are serialized.
    pub fn checkpoint_through<W, F>(
        &self,
        state: &PersistedState,
        wrap: F,
    ) -> Result<CheckpointOutcome, UserDataError>
    where
        W: Write,
        F: FnOnce(File) -> W,
    {
        if !state.has_identity() {
            debug!(path = %self.path.display(), "no session was ever established, skipping checkpoint");
            return Ok(CheckpointOutcome::Skipped);
        }

        state.validate()?;

        let lock = checkpoint_lock(&self.path);
        let _guard = lock_unpoisoned(&lock);

        let backup = self.backup_path();
        let replaced_previous = self.path.exists();
        if backup.exists() {
            warn!(
                backup = %backup.display(),
                "backup from an unfinished checkpoint found, staging the new file first"
            );
            self.write_staged(state, wrap, replaced_previous)?;
        } else {
            if replaced_previous {
                fs::rename(&self.path, &backup).map_err(|source| {
                    UserDataError::io("moving previous data file to backup", &self.path, source)
                })?;
                debug!(backup = %backup.display(), "previous data file moved to backup");
            }
            write_synced(&self.path, state, wrap)?;
        }

        if backup.exists() {
            fs::remove_file(&backup)
                .map_err(|source| UserDataError::io("removing backup file", &backup, source))?;
        }

        info!(path = %self.path.display(), username = %state.username, "checkpoint written");
        Ok(CheckpointOutcome::Written {
            path: self.path.clone(),
            replaced_previous,
        })
    }

    fn write_staged<W, F>(
        &self,
        state: &PersistedState,
        wrap: F,
        primary_exists: bool,
    ) -> Result<(), UserDataError>
    where
        W: Write,
        F: FnOnce(File) -> W,
    {
        let pending = pending_path_for(&self.path);
        if let Err(error) = write_synced(&pending, state, wrap) {
            if let Err(source) = fs::remove_file(&pending) {
                if source.kind() != io::ErrorKind::NotFound {
                    warn!(path = %pending.display(), error = %source, "could not remove staged data file");
                }
            }
            return Err(error);
        }

        let backup = self.backup_path();
        if primary_exists {
            fs::rename(&self.path, &backup).map_err(|source| {
                UserDataError::io("moving previous data file to backup", &self.path, source)
            })?;
        }
        fs::rename(&pending, &self.path).map_err(|source| {
            UserDataError::io("moving staged data file into place", &pending, source)
        })?;
        debug!(path = %self.path.display(), "staged data file moved into place");
        Ok(())
    }

    /// Replaces the primary file with the `.bak` sibling.
    pub fn restore_backup(&self) -> Result<(), UserDataError> {
        let backup = self.backup_path();
        if !backup.exists() {
            return Err(UserDataError::MissingBackup { path: backup });
        }

        let lock = checkpoint_lock(&self.path);
        let _guard = lock_unpoisoned(&lock);

        fs::rename(&backup, &self.path)
            .map_err(|source| UserDataError::io("restoring backup file", &backup, source))?;
        info!(path = %self.path.display(), "data file restored from backup");
        Ok(())
    }
}

fn write_synced<W, F>(path: &Path, state: &PersistedState, wrap: F) -> Result<(), UserDataError>
where
    W: Write,
    F: FnOnce(File) -> W,
{
    let file = File::create(path)
        .map_err(|source| UserDataError::io("creating data file", path, source))?;
    let mut writer = wrap(file);
    state
        .encode_into(&mut writer)
        .and_then(|()| writer.flush())
        .map_err(|source| UserDataError::io("writing data file", path, source))?;
    drop(writer);
    sync_file(path)
}

fn sync_file(path: &Path) -> Result<(), UserDataError> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|file| file.sync_all())
        .map_err(|source| UserDataError::io("syncing data file", path, source))
}

fn checkpoint_lock(path: &Path) -> Arc<Mutex<()>> {
    let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut locks = lock_unpoisoned(&CHECKPOINT_LOCKS);
    Arc::clone(locks.entry(key).or_default())
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_path_shares_one_checkpoint_lock() {
        let first = checkpoint_lock(Path::new("/tmp/fw-local-lock-test/userdata.fws"));
        let second = checkpoint_lock(Path::new("/tmp/fw-local-lock-test/userdata.fws"));
        let other = checkpoint_lock(Path::new("/tmp/fw-local-lock-test/other.fws"));

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn skipped_checkpoint_does_not_create_file() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let store = UserDataStore::in_dir(dir.path());

        let outcome = store
            .checkpoint(&PersistedState::new("", "cfg", "records"))
            .expect("skipping should succeed");

        assert_eq!(outcome, CheckpointOutcome::Skipped);
        assert!(!store.path().exists());
    }
}
