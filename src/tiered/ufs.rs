//! The under filesystem used to lay out storage directories.

use std::fmt::Debug;
use std::io::ErrorKind;
use std::path::Path;

use crate::common::error::{Context, StoreResult};

/// The `UnderFileSystem` trait represents the filesystem storage directories
/// live on.
pub trait UnderFileSystem: Debug + Send + Sync {
    /// Create the folder at `path`, and its parents when `recursive` is set.
    /// An existing folder is not an error.
    fn mkdirs(&self, path: &Path, recursive: bool) -> StoreResult<()>;

    /// Delete the file or folder at `path`, a folder's content only when
    /// `recursive` is set. A missing path is not an error.
    fn delete(&self, path: &Path, recursive: bool) -> StoreResult<()>;

    /// Move the file at `src` to `dst`, replacing `dst`.
    fn rename(&self, src: &Path, dst: &Path) -> StoreResult<()>;

    /// The length of the file at `path`, `None` if it does not exist.
    fn file_len(&self, path: &Path) -> StoreResult<Option<u64>>;
}

/// The `LocalUnderFileSystem` uses the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalUnderFileSystem;

impl UnderFileSystem for LocalUnderFileSystem {
    #[inline]
    fn mkdirs(&self, path: &Path, recursive: bool) -> StoreResult<()> {
        let res = if recursive {
            std::fs::create_dir_all(path)
        } else {
            match std::fs::create_dir(path) {
                Err(e) if e.kind() == ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
                other => other,
            }
        };
        res.with_context(|| format!("failed to create folder {}", path.display()))
    }

    #[inline]
    fn delete(&self, path: &Path, recursive: bool) -> StoreResult<()> {
        let res = if path.is_dir() {
            if recursive {
                std::fs::remove_dir_all(path)
            } else {
                std::fs::remove_dir(path)
            }
        } else {
            std::fs::remove_file(path)
        };
        match res {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            other => other.with_context(|| format!("failed to delete {}", path.display())),
        }
    }

    #[inline]
    fn rename(&self, src: &Path, dst: &Path) -> StoreResult<()> {
        if std::fs::rename(src, dst).is_ok() {
            return Ok(());
        }
        // Across filesystems
        std::fs::copy(src, dst)
            .with_context(|| format!("failed to copy {} to {}", src.display(), dst.display()))?;
        std::fs::remove_file(src).with_context(|| format!("failed to remove {}", src.display()))
    }

    #[inline]
    fn file_len(&self, path: &Path) -> StoreResult<Option<u64>> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to stat {}", path.display())),
        }
    }
}
