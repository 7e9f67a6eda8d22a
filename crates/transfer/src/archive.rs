use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::FileError;

/// Packs `paths` into one zip archive written to `dest`.
///
/// A plain file is stored under its file name. A folder is stored under
/// its own name with every entry below it, directories and zero-byte
/// files included. Blocking; returns the number of files packed.
pub fn build_archive(paths: &[PathBuf], dest: &Path) -> Result<usize, FileError> {
    for path in paths {
        if !path.exists() {
            return Err(FileError::NotFound(path.clone()));
        }
    }

    let mut zip = ZipWriter::new(BufWriter::new(File::create(dest)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut packed = 0;

    for path in paths {
        let name = entry_name(path)?;
        if path.is_dir() {
            packed += pack_dir(&mut zip, path, &name, options)?;
        } else {
            pack_file(&mut zip, path, &name, options)?;
            packed += 1;
        }
    }

    zip.finish()?.flush()?;
    tracing::debug!(archive = %dest.display(), files = packed, "archive built");
    Ok(packed)
}

fn entry_name(path: &Path) -> Result<String, FileError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| FileError::InvalidPath(path.display().to_string()))
}

fn pack_dir<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    dir: &Path,
    prefix: &str,
    options: SimpleFileOptions,
) -> Result<usize, FileError> {
    zip.add_directory(format!("{prefix}/"), options)?;

    let mut entries = std::fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    let mut packed = 0;
    for entry in entries {
        let name = format!("{prefix}/{}", entry.file_name().to_string_lossy());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            packed += pack_dir(zip, &entry.path(), &name, options)?;
        } else if entry.path().is_file() {
            pack_file(zip, &entry.path(), &name, options)?;
            packed += 1;
        }
    }
    Ok(packed)
}

fn pack_file<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    path: &Path,
    name: &str,
    options: SimpleFileOptions,
) -> Result<(), FileError> {
    let mut source = File::open(path)?;
    let large = source.metadata()?.len() >= u64::from(u32::MAX);
    zip.start_file(name, options.large_file(large))?;
    std::io::copy(&mut source, zip)?;
    Ok(())
}
