use std::path::{Path, PathBuf};

use filemail_protocol::{RemoteFile, RequestParams};

use crate::FileError;
use crate::chunked::file_md5;

/// Extensions that mark a file as already compressed.
const COMPRESSED_EXTENSIONS: &[&str] = &["zip", "rar", "tar", "gz", "7z"];

/// Where a descriptor's bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// A file on local disk, to be uploaded.
    Local(PathBuf),
    /// A file already stored by the service.
    Remote { download_url: String },
}

/// Metadata for one file participating in a transfer.
///
/// Everything except the chunk position is fixed at construction. The
/// md5 is hashed once, from the full file, when the descriptor is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    file_id: String,
    source: FileSource,
    file_name: String,
    total_size: u64,
    md5: Option<String>,
    content_type: String,
    compressed: bool,
    chunk_position: u64,
    sent: bool,
}

impl FileDescriptor {
    /// Builds a descriptor for a local file, named by its final path component.
    pub fn from_path(path: &Path, checksum: bool) -> Result<Self, FileError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| FileError::InvalidPath(path.display().to_string()))?;
        Self::with_name(path, name, checksum)
    }

    /// Builds a descriptor for a local file under an explicit remote name.
    ///
    /// Folder uploads use this to keep `sub/dir/file.txt` as the name the
    /// recipient sees.
    pub fn with_name(path: &Path, file_name: String, checksum: bool) -> Result<Self, FileError> {
        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FileError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        if !meta.is_file() {
            return Err(FileError::NotAFile(path.to_path_buf()));
        }

        // Opening up front surfaces permission errors even when hashing is off.
        let md5 = if checksum {
            Some(file_md5(path)?)
        } else {
            std::fs::File::open(path)?;
            None
        };

        Ok(Self {
            file_id: new_file_id(),
            content_type: content_type_for(&file_name),
            compressed: is_compressed_name(&file_name),
            source: FileSource::Local(path.to_path_buf()),
            file_name,
            total_size: meta.len(),
            md5,
            chunk_position: 0,
            sent: false,
        })
    }

    /// Rebuilds a descriptor from a server file listing. No disk access.
    pub fn from_remote_data(file: &RemoteFile) -> Self {
        let content_type = if file.contenttype.is_empty() {
            content_type_for(&file.filename)
        } else {
            file.contenttype.clone()
        };
        Self {
            file_id: file.fileid.clone(),
            source: FileSource::Remote {
                download_url: file.downloadurl.clone(),
            },
            file_name: file.filename.clone(),
            total_size: file.filesize,
            md5: file.md5.clone().filter(|m| !m.is_empty()),
            content_type,
            compressed: file.compressed || is_compressed_name(&file.filename),
            chunk_position: file.filesize,
            sent: true,
        }
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    /// Local path, if the file lives on disk.
    pub fn local_path(&self) -> Option<&Path> {
        match &self.source {
            FileSource::Local(p) => Some(p),
            FileSource::Remote { .. } => None,
        }
    }

    /// Download URL, if the file is stored remotely.
    pub fn download_url(&self) -> Option<&str> {
        match &self.source {
            FileSource::Remote { download_url } if !download_url.is_empty() => {
                Some(download_url)
            }
            _ => None,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn md5(&self) -> Option<&str> {
        self.md5.as_deref()
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn compressed(&self) -> bool {
        self.compressed
    }

    /// Bytes acknowledged by the service so far.
    pub fn chunk_position(&self) -> u64 {
        self.chunk_position
    }

    /// Whether every byte of the file has been acknowledged.
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    pub fn is_local(&self) -> bool {
        matches!(self.source, FileSource::Local(_))
    }

    /// Records `n` more acknowledged bytes.
    pub fn advance(&mut self, n: u64) {
        self.chunk_position = (self.chunk_position + n).min(self.total_size);
        if self.chunk_position == self.total_size {
            self.sent = true;
        }
    }

    /// Marks a file as fully sent. Used for zero-byte files, which have no
    /// chunks to advance through.
    pub fn mark_sent(&mut self) {
        self.chunk_position = self.total_size;
        self.sent = true;
    }

    /// Query parameters for the upload request carrying the chunk at `offset`.
    ///
    /// `md5` is left out entirely when checksums were disabled.
    pub fn upload_params(&self, transfer_id: &str, transfer_key: &str, offset: u64) -> RequestParams {
        let mut params = RequestParams::new();
        params
            .set("transferid", transfer_id)
            .set("transferkey", transfer_key)
            .set("fileid", &self.file_id)
            .set("thefilename", &self.file_name)
            .set("chunkpos", offset)
            .set("totalsize", self.total_size)
            .set_opt("md5", self.md5.as_deref())
            .set("compressed", self.compressed)
            .set("content-type", &self.content_type);
        params
    }
}

/// Whether a file name carries one of the archive extensions.
pub fn is_compressed_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            COMPRESSED_EXTENSIONS
                .iter()
                .any(|c| ext.eq_ignore_ascii_case(c))
        })
}

fn content_type_for(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// UUID v4 without hyphens, the format the service expects.
fn new_file_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
