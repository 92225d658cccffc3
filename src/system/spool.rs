// src/system/spool.rs

use crate::constants::SPOOL_PREFIX;
use std::{
    io::{self, ErrorKind},
    path::Path,
};
use tempfile::{Builder, TempPath};
use tokio::{fs::File, io::AsyncWriteExt};

enum SpoolState {
    Writing { file: File, path: TempPath },
    Sealed(TempPath),
    Released,
}

/// A uniquely named temporary file holding one script while it is received and run.
///
/// The file is removed by `release`, or on drop if `release` was never called.
pub struct Spool {
    state: SpoolState,
}

impl std::fmt::Debug for Spool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            SpoolState::Writing { path, .. } => format!("Writing({})", path.display()),
            SpoolState::Sealed(path) => format!("Sealed({})", path.display()),
            SpoolState::Released => "Released".to_string(),
        };
        f.debug_struct("Spool").field("state", &state).finish()
    }
}

impl Spool {
    /// Creates a fresh spool file in the system temp directory.
    pub fn open() -> io::Result<Self> {
        let (file, path) = Builder::new()
            .prefix(SPOOL_PREFIX)
            .tempfile()?
            .into_parts();
        log::debug!("Spool file created at: {}", path.display());
        Ok(Self {
            state: SpoolState::Writing {
                file: File::from_std(file),
                path,
            },
        })
    }

    /// The on-disk location, or `None` once the spool has been released.
    pub fn path(&self) -> Option<&Path> {
        match &self.state {
            SpoolState::Writing { path, .. } | SpoolState::Sealed(path) => Some(path),
            SpoolState::Released => None,
        }
    }

    /// Appends raw bytes (a received line, terminator included) to the file.
    pub async fn append(&mut self, line: &[u8]) -> io::Result<()> {
        match &mut self.state {
            SpoolState::Writing { file, .. } => file.write_all(line).await,
            _ => Err(io::Error::other("spool is no longer open for writing")),
        }
    }

    /// Flushes and closes the writer, returning the path for the interpreter to read.
    ///
    /// Calling it again on an already sealed spool just returns the path.
    pub async fn finalize(&mut self) -> io::Result<&Path> {
        match std::mem::replace(&mut self.state, SpoolState::Released) {
            SpoolState::Writing { mut file, path } => {
                // Seal first so a failed flush still leaves the path owned for cleanup.
                self.state = SpoolState::Sealed(path);
                file.flush().await?;
            }
            other => self.state = other,
        }
        self.path()
            .ok_or_else(|| io::Error::new(ErrorKind::NotFound, "spool already released"))
    }

    /// Removes the file. Safe to call repeatedly; a file that is already gone is not an error.
    pub fn release(&mut self) -> io::Result<()> {
        let path = match std::mem::replace(&mut self.state, SpoolState::Released) {
            SpoolState::Writing { file, path } => {
                drop(file);
                path
            }
            SpoolState::Sealed(path) => path,
            SpoolState::Released => return Ok(()),
        };
        match path.close() {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spool_round_trip_and_release() {
        // --- Setup ---
        let mut spool = Spool::open().unwrap();
        spool.append(b"echo one\n").await.unwrap();
        spool.append(b"echo two\r\n").await.unwrap();

        // --- Execute ---
        let path = spool.finalize().await.unwrap().to_path_buf();

        // --- Assert ---
        assert_eq!(std::fs::read(&path).unwrap(), b"echo one\necho two\r\n");
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(SPOOL_PREFIX));

        spool.release().unwrap();
        assert!(!path.exists());
        assert!(spool.path().is_none());
    }

    #[tokio::test]
    async fn test_release_is_idempotent_and_tolerates_missing_file() {
        let mut spool = Spool::open().unwrap();
        let path = spool.finalize().await.unwrap().to_path_buf();

        // Someone else got there first.
        std::fs::remove_file(&path).unwrap();

        assert!(spool.release().is_ok());
        assert!(spool.release().is_ok());
    }

    #[tokio::test]
    async fn test_append_after_finalize_fails() {
        let mut spool = Spool::open().unwrap();
        spool.finalize().await.unwrap();
        assert!(spool.append(b"late\n").await.is_err());
        spool.release().unwrap();
    }

    #[tokio::test]
    async fn test_drop_removes_file() {
        let spool = Spool::open().unwrap();
        let path = spool.path().unwrap().to_path_buf();
        assert!(path.exists());
        drop(spool);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_concurrent_spools_never_share_a_name() {
        let mut spools = Vec::new();
        for _ in 0..32 {
            spools.push(Spool::open().unwrap());
        }
        let mut paths: Vec<_> = spools
            .iter()
            .map(|s| s.path().unwrap().to_path_buf())
            .collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 32);
    }
}
