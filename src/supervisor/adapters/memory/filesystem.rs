//! In-memory filesystem adapter.

use crate::supervisor::ports::{Filesystem, FilesystemError, FilesystemResult};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory filesystem keyed by path.
///
/// Directories are implicit. Failures can be injected to exercise the
/// environment-failure paths of the supervisor.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFilesystem {
    state: Arc<RwLock<InMemoryFilesystemState>>,
}

#[derive(Debug, Default)]
struct InMemoryFilesystemState {
    files: HashMap<Utf8PathBuf, Vec<u8>>,
    fail_removals: bool,
    fail_writes: bool,
}

fn lock_error(path: &Utf8Path, err: impl ToString) -> FilesystemError {
    FilesystemError::io(path, std::io::Error::other(err.to_string()))
}

impl InMemoryFilesystem {
    /// Creates an empty filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `contents` at `path`, replacing any previous file.
    ///
    /// # Errors
    ///
    /// Returns filesystem errors when lock acquisition fails.
    pub fn insert_text(&self, path: impl AsRef<Utf8Path>, contents: &str) -> FilesystemResult<()> {
        self.insert_bytes(path, contents.as_bytes())
    }

    /// Stores raw bytes at `path`, which need not be valid UTF-8.
    ///
    /// # Errors
    ///
    /// Returns filesystem errors when lock acquisition fails.
    pub fn insert_bytes(&self, path: impl AsRef<Utf8Path>, contents: &[u8]) -> FilesystemResult<()> {
        let target = path.as_ref();
        let mut state = self.state.write().map_err(|err| lock_error(target, err))?;
        state.files.insert(target.to_owned(), contents.to_vec());
        Ok(())
    }

    /// Returns the text stored at `path`, if any.
    ///
    /// Invalid UTF-8 is replaced lossily.
    #[must_use]
    pub fn contents(&self, path: impl AsRef<Utf8Path>) -> Option<String> {
        let state = self.state.read().ok()?;
        state
            .files
            .get(path.as_ref())
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Returns whether a file is stored at `path`.
    #[must_use]
    pub fn contains(&self, path: impl AsRef<Utf8Path>) -> bool {
        self.state
            .read()
            .is_ok_and(|state| state.files.contains_key(path.as_ref()))
    }

    /// Makes every subsequent removal fail with an I/O error.
    ///
    /// # Errors
    ///
    /// Returns filesystem errors when lock acquisition fails.
    pub fn fail_removals(&self) -> FilesystemResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| lock_error(Utf8Path::new(""), err))?;
        state.fail_removals = true;
        Ok(())
    }

    /// Makes every subsequent write fail with an I/O error.
    ///
    /// # Errors
    ///
    /// Returns filesystem errors when lock acquisition fails.
    pub fn fail_writes(&self) -> FilesystemResult<()> {
        let mut state = self
            .state
            .write()
            .map_err(|err| lock_error(Utf8Path::new(""), err))?;
        state.fail_writes = true;
        Ok(())
    }
}

#[async_trait]
impl Filesystem for InMemoryFilesystem {
    async fn read_text(&self, path: &Utf8Path) -> FilesystemResult<Option<String>> {
        let state = self.state.read().map_err(|err| lock_error(path, err))?;
        state
            .files
            .get(path)
            .map(|bytes| {
                String::from_utf8(bytes.clone())
                    .map_err(|_| FilesystemError::NotText(path.to_owned()))
            })
            .transpose()
    }

    async fn write_text(&self, path: &Utf8Path, contents: &str) -> FilesystemResult<()> {
        let mut state = self.state.write().map_err(|err| lock_error(path, err))?;
        if state.fail_writes {
            return Err(FilesystemError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "writes disabled"),
            ));
        }
        state
            .files
            .insert(path.to_owned(), contents.as_bytes().to_vec());
        Ok(())
    }

    async fn remove(&self, path: &Utf8Path) -> FilesystemResult<bool> {
        let mut state = self.state.write().map_err(|err| lock_error(path, err))?;
        if state.fail_removals {
            return Err(FilesystemError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "removals disabled"),
            ));
        }
        Ok(state.files.remove(path).is_some())
    }
}
