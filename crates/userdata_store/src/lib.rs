//! Single-file persistence for FW local user data.
//!
//! The file is line-oriented UTF-8. Lines starting with `#` are section markers
//! or comments and are dropped on load; everything else is payload:
//!
//! ```text
//! #VERSION
//! <version-string>
//! #USERNAME
//! <username-string, may be empty>
//! #MOVIES
//! <filter-config blob>
//! <record-store blob, zero or more lines>
//! ```
//!
//! Checkpoints move the previous file to a `.bak` sibling before writing and
//! remove the backup only after the new file is complete. Restoring from the
//! backup is an explicit operator action ([`UserDataStore::restore_backup`]),
//! never something [`UserDataStore::load`] does on its own.

mod error;
mod paths;
mod schema;
mod store;

pub use error::UserDataError;
pub use paths::{
    backup_path_for, default_data_file, pending_path_for, BACKUP_SUFFIX, DATA_FILE_NAME,
    PENDING_SUFFIX,
};
pub use schema::{
    PersistedState, RawUserData, COMMENT_MARKER, CURRENT_VERSION, MOVIES_MARKER,
    USERNAME_MARKER, VERSION_MARKER,
};
pub use store::{CheckpointOutcome, UserDataStore};
