use std::path::{Component, Path};

use crate::FileError;

/// Validates that a remote file name stays inside the download directory.
///
/// The service returns names like `album/2024/beach.jpg`; they are joined
/// onto the destination, so anything that could climb out is refused:
/// empty names, absolute paths, `..` components and Windows prefixes.
/// Backslashes count as separators.
pub fn validate_relative_path(file_path: &str) -> Result<(), FileError> {
    if file_path.trim().is_empty() {
        return Err(FileError::InvalidPath("empty path".into()));
    }

    let normalized = file_path.replace('\\', "/");
    let path = Path::new(&normalized);

    if path.is_absolute() {
        return Err(FileError::InvalidPath(format!(
            "absolute path not allowed: {file_path}"
        )));
    }

    for component in path.components() {
        match component {
            Component::ParentDir => {
                return Err(FileError::InvalidPath(format!(
                    "parent directory traversal not allowed: {file_path}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(FileError::InvalidPath(format!(
                    "absolute path not allowed: {file_path}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    if path.components().all(|c| matches!(c, Component::CurDir)) {
        return Err(FileError::InvalidPath(format!(
            "no file name in path: {file_path}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_path() {
        assert!(validate_relative_path("").is_err());
        assert!(validate_relative_path("   ").is_err());
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        assert!(validate_relative_path("../../../etc/passwd").is_err());
        assert!(validate_relative_path("sub/../../escape").is_err());
        assert!(validate_relative_path("..").is_err());
    }

    #[test]
    fn rejects_backslash_traversal() {
        assert!(validate_relative_path("..\\..\\boot.ini").is_err());
    }

    #[test]
    fn rejects_absolute_path() {
        assert!(validate_relative_path("/tmp/malicious").is_err());
        assert!(validate_relative_path("\\tmp\\malicious").is_err());
    }

    #[test]
    fn rejects_bare_current_dir() {
        assert!(validate_relative_path(".").is_err());
    }

    #[test]
    fn accepts_nested_names() {
        assert!(validate_relative_path("report.pdf").is_ok());
        assert!(validate_relative_path("album/2024/beach.jpg").is_ok());
        assert!(validate_relative_path(".config/settings.json").is_ok());
        assert!(validate_relative_path("./photo.jpg").is_ok());
    }
}
