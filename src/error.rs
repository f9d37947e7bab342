use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot access {}: {reason}", path.display())]
    FileAccess { path: PathBuf, reason: String },

    #[error("invalid strategy: {0}")]
    InvalidStrategy(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("content generation failed: {0}")]
    Generation(String),

    #[error("version control error: {0}")]
    Vcs(String),
}

impl Error {
    pub fn file_access(path: &Path, err: &io::Error) -> Self {
        Error::FileAccess {
            path: path.to_path_buf(),
            reason: format_io_error(err),
        }
    }

    pub fn storage(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Error::Storage(format!("{context}: {err}"))
    }
}

pub(crate) fn format_io_error(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::NotFound => format!("not found ({err})"),
        io::ErrorKind::PermissionDenied => format!("permission denied ({err})"),
        _ => err.to_string(),
    }
}
