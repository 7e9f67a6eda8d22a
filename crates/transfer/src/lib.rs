//! Local file side of a Filemail transfer.
//!
//! Builds [`FileDescriptor`]s from disk or from server listings, reads
//! files in fixed-size chunks for upload, and writes downloads through a
//! `.part` file. Nothing here talks to the network.

mod archive;
mod chunked;
mod descriptor;
mod progress;
mod scan;
mod validation;

pub use archive::build_archive;
pub use chunked::{ChunkReader, PartFile, chunk_count, file_md5, md5_base64};
pub use descriptor::{FileDescriptor, FileSource, is_compressed_name};
pub use progress::{SpeedCalculator, TransferProgress};
pub use scan::{ScannedFile, scan_dir};
pub use validation::validate_relative_path;

use std::path::PathBuf;

/// Default chunk size: 64 KiB. Each chunk is one HTTP request.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Smallest chunk size a client may be configured with.
pub const MIN_CHUNK_SIZE: usize = 4 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("file has no local source: {0}")]
    NotLocal(String),

    #[error("file changed while reading: {0}")]
    SizeMismatch(String),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("cancelled")]
    Cancelled,
}
