use std::io::Read;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::{Bytes, BytesMut};
use md5::{Digest, Md5};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::{DEFAULT_CHUNK_SIZE, FileError};

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Base64 of the raw md5 digest of `data`.
pub fn md5_base64(data: &[u8]) -> String {
    STANDARD.encode(Md5::digest(data))
}

/// Base64 md5 of a whole file, read in blocks.
pub fn file_md5(path: &Path) -> Result<String, FileError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; DEFAULT_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(STANDARD.encode(hasher.finalize()))
}

/// Number of chunks needed for `size` bytes, `ceil(size / chunk_size)`.
///
/// A zero-byte file needs no chunks.
pub fn chunk_count(size: u64, chunk_size: usize) -> u64 {
    let chunk_size = if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    };
    size.div_ceil(chunk_size as u64)
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads a file in fixed-size chunks.
///
/// The cancellation token, when set, is checked before every read, so a
/// cancelled upload stops at a chunk boundary.
pub struct ChunkReader {
    file: tokio::fs::File,
    chunk_size: usize,
    offset: u64,
    file_size: u64,
    cancel: Option<CancellationToken>,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub async fn open(path: &Path, chunk_size: usize) -> Result<Self, FileError> {
        let file = match tokio::fs::File::open(path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FileError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        let file_size = file.metadata().await?.len();
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Ok(Self {
            file,
            chunk_size,
            offset: 0,
            file_size,
            cancel: None,
        })
    }

    /// Attaches a cancellation token.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Seeks to the given byte offset (for resume).
    pub async fn seek_to(&mut self, offset: u64) -> Result<(), FileError> {
        let offset = offset.min(self.file_size);
        self.file.seek(std::io::SeekFrom::Start(offset)).await?;
        self.offset = offset;
        Ok(())
    }

    /// Reads the next chunk. Returns `None` at EOF.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, FileError> {
        if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(FileError::Cancelled);
        }

        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(None);
        }

        let read_size = remaining.min(self.chunk_size as u64) as usize;
        let mut buf = BytesMut::zeroed(read_size);
        match self.file.read_exact(&mut buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(FileError::SizeMismatch(format!(
                    "expected {} bytes, file ended before offset {}",
                    self.file_size,
                    self.offset + read_size as u64
                )));
            }
            Err(e) => return Err(e.into()),
        }

        self.offset += read_size as u64;
        Ok(Some(buf.freeze()))
    }

    /// Current byte offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// File size in bytes, as seen when the reader was opened.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.file_size - self.offset
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

// ---------------------------------------------------------------------------
// PartFile
// ---------------------------------------------------------------------------

/// Download target that is written as `<name>.part` and renamed into
/// place only once every byte has arrived.
pub struct PartFile {
    file: tokio::fs::File,
    part_path: PathBuf,
    final_path: PathBuf,
    written: u64,
}

impl PartFile {
    /// Creates (or truncates) the `.part` file next to `final_path`,
    /// creating parent directories as needed.
    pub async fn create(final_path: &Path) -> Result<Self, FileError> {
        let name = final_path
            .file_name()
            .ok_or_else(|| FileError::InvalidPath(final_path.display().to_string()))?;
        let mut part_name = name.to_os_string();
        part_name.push(".part");
        let part_path = final_path.with_file_name(part_name);

        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::File::create(&part_path).await?;
        Ok(Self {
            file,
            part_path,
            final_path: final_path.to_path_buf(),
            written: 0,
        })
    }

    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<(), FileError> {
        self.file.write_all(data).await?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn part_path(&self) -> &Path {
        &self.part_path
    }

    /// Flushes and renames the `.part` file to its final name.
    pub async fn finish(mut self) -> Result<PathBuf, FileError> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        drop(self.file);
        tokio::fs::rename(&self.part_path, &self.final_path).await?;
        Ok(self.final_path)
    }

    /// Removes the `.part` file after a failed or cancelled download.
    pub async fn discard(self) {
        drop(self.file);
        if let Err(e) = tokio::fs::remove_file(&self.part_path).await {
            tracing::debug!(path = %self.part_path.display(), error = %e, "could not remove partial download");
        }
    }
}
