//! Storage of uploaded bytes under the media directory.

use std::path::{Path, PathBuf};

use chrono::{Datelike, Utc};
use tiki_shared::{Result, TikiError};
use uuid::Uuid;

/// Final path component of a client-supplied filename, or `None` when
/// nothing usable is left.
pub fn upload_basename(name: &str) -> Option<&str> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    match base {
        "" | "." | ".." => None,
        base => Some(base),
    }
}

/// Like [`upload_basename`], falling back to `"upload"`.
pub fn sanitize_filename(name: &str) -> String {
    upload_basename(name).unwrap_or("upload").to_string()
}

/// Write `bytes` to `media_dir/uploads/YYYY/MM/<uuid>_<name>` and return the
/// path.
pub async fn save_upload(media_dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
    let now = Utc::now();
    let dir = media_dir
        .join("uploads")
        .join(format!("{:04}", now.year()))
        .join(format!("{:02}", now.month()));

    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| TikiError::io(&dir, e))?;

    let path = dir.join(format!("{}_{}", Uuid::now_v7(), sanitize_filename(filename)));
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| TikiError::io(&path, e))?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\docs\\plan.docx"), "plan.docx");
        assert_eq!(sanitize_filename(""), "upload");
        assert_eq!(sanitize_filename("dir/"), "upload");
        assert_eq!(sanitize_filename(".."), "upload");
    }

    #[test]
    fn basename_rejects_empty_names() {
        assert_eq!(upload_basename("dir/report.pdf"), Some("report.pdf"));
        assert_eq!(upload_basename(" notes.txt "), Some("notes.txt"));
        assert_eq!(upload_basename(""), None);
        assert_eq!(upload_basename("a/b/"), None);
        assert_eq!(upload_basename("."), None);
    }

    #[tokio::test]
    async fn save_writes_under_dated_directory() {
        let media = std::env::temp_dir().join(format!("tiki_media_{}", Uuid::now_v7()));
        let path = save_upload(&media, "notes.txt", b"hello").await.unwrap();

        assert!(path.starts_with(media.join("uploads")));
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .ends_with("_notes.txt")
        );
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }
}
