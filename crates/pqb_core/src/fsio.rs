use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::error::AppError;

/// Replace `path` with `bytes` so readers observe either the old or the new content.
///
/// The payload goes to a sibling `*.tmp` file, is flushed to disk, then renamed over the
/// destination. A crash before the rename leaves the previous file untouched.
pub fn write_atomic(path: &Path, bytes: &[u8], code: &str, what: &str) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::new(code, format!("Failed to create directory for {what}"))
                    .with_details(format!("path={}; err={}", parent.display(), e))
            })?;
        }
    }

    let tmp = path.with_extension("tmp");
    let mut file = File::create(&tmp).map_err(|e| {
        AppError::new(code, format!("Failed to write {what}"))
            .with_details(format!("path={}; err={}", tmp.display(), e))
    })?;
    file.write_all(bytes)
        .and_then(|_| file.sync_all())
        .map_err(|e| {
            AppError::new(code, format!("Failed to write {what}"))
                .with_details(format!("path={}; err={}", tmp.display(), e))
        })?;
    drop(file);

    fs::rename(&tmp, path).map_err(|e| {
        AppError::new(code, format!("Failed to finalize {what} write"))
            .with_details(format!("tmp={}; dest={}; err={}", tmp.display(), path.display(), e))
    })
}

/// Read a file that may legitimately not exist yet.
pub fn read_optional(path: &Path, code: &str, what: &str) -> Result<Option<Vec<u8>>, AppError> {
    if !path.exists() {
        return Ok(None);
    }
    fs::read(path).map(Some).map_err(|e| {
        AppError::new(code, format!("Failed to read {what}"))
            .with_details(format!("path={}; err={}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_content_and_leaves_no_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("value.json");

        write_atomic(&path, b"[1]", "TEST", "value").expect("first write");
        write_atomic(&path, b"[1,2]", "TEST", "value").expect("second write");

        assert_eq!(fs::read_to_string(&path).unwrap(), "[1,2]");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn read_optional_returns_none_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let got = read_optional(&dir.path().join("absent"), "TEST", "value").unwrap();
        assert!(got.is_none());
    }
}
