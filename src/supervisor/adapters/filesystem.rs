//! Filesystem adapter backed by capability-based directory handles.

use crate::supervisor::ports::{Filesystem, FilesystemError, FilesystemResult};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use std::io;

/// Filesystem adapter using `cap-std` UTF-8 directory handles.
///
/// Each operation opens the parent directory of the target file and acts on
/// the file name relative to it. Blocking calls run on the blocking thread
/// pool so the async executor is never stalled.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapStdFilesystem;

impl CapStdFilesystem {
    /// Creates the adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Splits `path` into its parent directory and file name.
fn split_path(path: &Utf8Path) -> FilesystemResult<(Utf8PathBuf, String)> {
    let file_name = path
        .file_name()
        .ok_or_else(|| FilesystemError::InvalidPath(path.to_owned()))?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent.to_owned(),
        _ => Utf8PathBuf::from("."),
    };
    Ok((parent, file_name.to_owned()))
}

/// Opens `parent`, returning `None` when the directory does not exist.
fn open_parent(path: &Utf8Path, parent: &Utf8Path) -> FilesystemResult<Option<Dir>> {
    match Dir::open_ambient_dir(parent, ambient_authority()) {
        Ok(dir) => Ok(Some(dir)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(FilesystemError::io(path, err)),
    }
}

/// Runs a blocking filesystem operation on the blocking thread pool.
async fn run_blocking<F, T>(path: &Utf8Path, operation: F) -> FilesystemResult<T>
where
    F: FnOnce() -> FilesystemResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(operation)
        .await
        .map_err(|err| FilesystemError::io(path, io::Error::other(format!("task join error: {err}"))))?
}

#[async_trait]
impl Filesystem for CapStdFilesystem {
    async fn read_text(&self, path: &Utf8Path) -> FilesystemResult<Option<String>> {
        let target = path.to_owned();
        run_blocking(path, move || {
            let (parent, file_name) = split_path(&target)?;
            let Some(dir) = open_parent(&target, &parent)? else {
                return Ok(None);
            };
            match dir.read_to_string(&file_name) {
                Ok(contents) => Ok(Some(contents)),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                    Err(FilesystemError::NotText(target.clone()))
                }
                Err(err) => Err(FilesystemError::io(&target, err)),
            }
        })
        .await
    }

    async fn write_text(&self, path: &Utf8Path, contents: &str) -> FilesystemResult<()> {
        let target = path.to_owned();
        let payload = contents.to_owned();
        run_blocking(path, move || {
            let (parent, file_name) = split_path(&target)?;
            Dir::create_ambient_dir_all(&parent, ambient_authority())
                .map_err(|err| FilesystemError::io(&target, err))?;
            let dir = Dir::open_ambient_dir(&parent, ambient_authority())
                .map_err(|err| FilesystemError::io(&target, err))?;
            dir.write(&file_name, payload.as_bytes())
                .map_err(|err| FilesystemError::io(&target, err))
        })
        .await
    }

    async fn remove(&self, path: &Utf8Path) -> FilesystemResult<bool> {
        let target = path.to_owned();
        run_blocking(path, move || {
            let (parent, file_name) = split_path(&target)?;
            let Some(dir) = open_parent(&target, &parent)? else {
                return Ok(false);
            };
            match dir.remove_file(&file_name) {
                Ok(()) => Ok(true),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(err) => Err(FilesystemError::io(&target, err)),
            }
        })
        .await
    }
}
