use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UserDataError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while reading line {line} in {path}: {source}")]
    IoLine {
        path: PathBuf,
        line: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("no backup file to restore at {path}")]
    MissingBackup { path: PathBuf },

    #[error("{field} cannot be stored: {reason}")]
    UnencodableField {
        field: &'static str,
        reason: &'static str,
    },
}

impl UserDataError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn io_line(path: impl Into<PathBuf>, line: usize, source: std::io::Error) -> Self {
        Self::IoLine {
            path: path.into(),
            line,
            source,
        }
    }
}
