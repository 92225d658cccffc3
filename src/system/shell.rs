// src/system/shell.rs

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("shell name is empty")]
    Empty,
    #[error("shell {0:?} not found")]
    NotFound(String),
    #[error("failed to stat {path:?}: {source}")]
    Stat {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot resolve path {path:?}: {source}")]
    Absolute {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Resolves a shell name or path to the absolute path of an executable.
///
/// The lookup order is:
/// 1.  An absolute path is returned as-is (it is not checked for existence).
/// 2.  A relative path that exists on disk is made absolute against the current
///     directory. Symlinks are left alone.
/// 3.  Anything else is searched for on `PATH`.
///
/// A leading `~` is expanded to the home directory before any of this happens.
///
/// # Errors
/// Returns a `ShellError` if the name is empty, if `stat` fails for a reason other
/// than the file being missing, or if the name cannot be found on `PATH`.
pub fn resolve_shell(shell: &str) -> Result<PathBuf, ShellError> {
    let trimmed = shell.trim();
    if trimmed.is_empty() {
        return Err(ShellError::Empty);
    }

    let expanded = shellexpand::tilde(trimmed);
    let candidate = Path::new(expanded.as_ref());

    if candidate.is_absolute() {
        return Ok(candidate.to_path_buf());
    }

    match fs::metadata(candidate) {
        Ok(_) => {
            let absolute =
                std::path::absolute(candidate).map_err(|source| ShellError::Absolute {
                    path: trimmed.to_string(),
                    source,
                })?;
            Ok(dunce::simplified(&absolute).to_path_buf())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("'{}' is not a path on disk, searching PATH", trimmed);
            which::which(candidate).map_err(|_| ShellError::NotFound(trimmed.to_string()))
        }
        Err(source) => Err(ShellError::Stat {
            path: trimmed.to_string(),
            source,
        }),
    }
}
