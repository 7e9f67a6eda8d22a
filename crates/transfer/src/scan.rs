use std::path::{Path, PathBuf};

use crate::FileError;

/// A file found while walking a folder, with the name it will carry remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    /// `<folder>/<relative path>` with `/` separators on every platform.
    pub remote_name: String,
    pub size: u64,
}

/// Walks `root` recursively and lists the files to upload.
///
/// Zero-byte files are skipped: the service rejects their checksums.
/// Symlinked directories are not followed. Entries are sorted by name so
/// the upload order is stable.
pub fn scan_dir(root: &Path) -> Result<Vec<ScannedFile>, FileError> {
    if !root.exists() {
        return Err(FileError::NotFound(root.to_path_buf()));
    }
    let base = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut out = Vec::new();
    walk(root, &base, &mut out)?;
    Ok(out)
}

fn walk(dir: &Path, prefix: &str, out: &mut Vec<ScannedFile>) -> Result<(), FileError> {
    let mut entries = std::fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let remote_name = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            walk(&path, &remote_name, out)?;
            continue;
        }

        let meta = match std::fs::metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !meta.is_file() {
            continue;
        }
        if meta.len() == 0 {
            tracing::warn!(file = %remote_name, "skipping zero-byte file");
            continue;
        }
        out.push(ScannedFile {
            path,
            remote_name,
            size: meta.len(),
        });
    }
    Ok(())
}
