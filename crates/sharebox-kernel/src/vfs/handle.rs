//! Open file handles returned by [`Namespace::open`](super::Namespace::open).

use std::io::SeekFrom;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::vfs::config_channel::ConfigChannel;
use crate::vfs::error::VfsResult;
use crate::vfs::types::{FileAttr, MAX_READ_LEN};

/// A file opened through the namespace.
#[derive(Debug)]
pub enum OpenFile {
    /// A real file inside the caller's sandbox.
    Storage(File),
    /// The virtual `/config` object.
    Config(ConfigChannel),
}

impl OpenFile {
    /// Read up to `len` bytes at `offset`, capped at [`MAX_READ_LEN`].
    /// An empty result means EOF.
    pub async fn read(&mut self, offset: u64, len: u32) -> VfsResult<Vec<u8>> {
        let len = len.min(MAX_READ_LEN);
        match self {
            OpenFile::Storage(file) => {
                file.seek(SeekFrom::Start(offset)).await?;
                let mut buffer = Vec::with_capacity(len as usize);
                (&mut *file).take(u64::from(len)).read_to_end(&mut buffer).await?;
                Ok(buffer)
            }
            OpenFile::Config(channel) => channel.read(offset, len),
        }
    }

    /// Write `data` at `offset`, returning the number of bytes written.
    pub async fn write(&mut self, offset: u64, data: &[u8]) -> VfsResult<u32> {
        match self {
            OpenFile::Storage(file) => {
                file.seek(SeekFrom::Start(offset)).await?;
                file.write_all(data).await?;
                Ok(data.len() as u32)
            }
            OpenFile::Config(channel) => channel.write(offset, data),
        }
    }

    /// Attributes of the open file.
    pub async fn stat(&self) -> VfsResult<FileAttr> {
        match self {
            OpenFile::Storage(file) => Ok(FileAttr::from_metadata(&file.metadata().await?)),
            OpenFile::Config(channel) => Ok(channel.stat()),
        }
    }

    /// Close the handle. For a `/config` write this is the commit point.
    pub async fn close(self) -> VfsResult<()> {
        match self {
            OpenFile::Storage(mut file) => {
                file.flush().await?;
                Ok(())
            }
            OpenFile::Config(mut channel) => channel.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        std::fs::write(&path, vec![7u8; 3 * MAX_READ_LEN as usize]).unwrap();

        let mut file = OpenFile::Storage(File::open(&path).await.unwrap());
        let first = file.read(0, u32::MAX).await.unwrap();
        assert_eq!(first.len(), MAX_READ_LEN as usize);

        let tail = file.read(2 * u64::from(MAX_READ_LEN), u32::MAX).await.unwrap();
        assert_eq!(tail.len(), MAX_READ_LEN as usize);
        assert!(file.read(3 * u64::from(MAX_READ_LEN), u32::MAX).await.unwrap().is_empty());
    }
}
