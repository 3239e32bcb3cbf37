//! A minimal handler of a block file on the local filesystem.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::common::error::{Context, StoreResult};

/// Writes the bytes of one block file.
///
/// Writers append into the temp file of a block and close it before the
/// directory commits the block with `StorageDir::cache_block`.
#[derive(Debug)]
pub struct BlockFileHandler {
    /// The path of the block file
    path: PathBuf,
    /// The opened file, `None` after `close`
    file: Option<File>,
}

impl BlockFileHandler {
    /// Open the block file at `path`, creating it and its parent folders if
    /// needed.
    #[inline]
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create folder {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("failed to open block file {}", path.display()))?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// The path of the handled file.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `buf` at `offset` of the file, return the number of bytes written.
    #[inline]
    pub fn append(&mut self, offset: u64, buf: &[u8]) -> StoreResult<usize> {
        let path = &self.path;
        let Some(ref mut file) = self.file else {
            return Err(anyhow::anyhow!("block file {} is already closed", path.display()).into());
        };
        file.seek(SeekFrom::Start(offset))
            .with_context(|| format!("failed to seek {} to {offset}", path.display()))?;
        file.write_all(buf)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(buf.len())
    }

    /// Flush and close the file, later appends fail.
    #[inline]
    pub fn close(&mut self) -> StoreResult<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()
                .with_context(|| format!("failed to sync {}", self.path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::BlockFileHandler;

    #[test]
    fn test_append_and_close() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("users").join("1").join("10");
        let mut handler = BlockFileHandler::open(&path).unwrap();
        assert_eq!(handler.append(0, &[1_u8; 100]).unwrap(), 100);
        assert_eq!(handler.append(100, &[2_u8; 28]).unwrap(), 28);
        handler.close().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 128);

        assert!(handler.append(128, &[0_u8; 1]).is_err());
        // Closing twice is fine.
        handler.close().unwrap();
    }
}
