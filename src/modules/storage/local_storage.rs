//! Local filesystem storage for uploaded files
//!
//! Files are laid out per owner and upload day:
//! ```text
//! {root}/{owner_id}/{yyyy}/{MM}/{dd}/{uuid}_{epoch_millis}{.ext}
//! ```
//! Nothing from the client-supplied filename reaches a path except a
//! strictly validated extension, so a derived path can never leave the
//! owner's directory under the root.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::core::config::StorageConfig;

lazy_static! {
    /// Accepted extension: a dot followed by 1-16 ASCII alphanumerics
    static ref EXTENSION_REGEX: Regex = Regex::new(r"^\.[A-Za-z0-9]{1,16}$").unwrap();

    /// Owner segment of a public URL (positive numeric id)
    static ref OWNER_SEGMENT_REGEX: Regex = Regex::new(r"^[0-9]{1,19}$").unwrap();

    /// Date segment of a public URL (`yyyy/MM/dd`)
    static ref DATE_PATH_REGEX: Regex = Regex::new(r"^[0-9]{4}/[0-9]{2}/[0-9]{2}$").unwrap();

    /// Stored filename segment of a public URL
    static ref STORED_NAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,254}$").unwrap();
}

/// Where a new upload goes on disk
#[derive(Debug, Clone)]
pub struct StoragePath {
    /// `{root}/{owner_id}/{yyyy}/{MM}/{dd}`
    pub directory: PathBuf,
    /// `{uuid}_{epoch_millis}{extension}`
    pub stored_file_name: String,
    /// Validated extension including the leading dot, or empty
    pub extension: String,
    /// `yyyy/MM/dd`
    pub date_path: String,
}

impl StoragePath {
    pub fn file_path(&self) -> PathBuf {
        self.directory.join(&self.stored_file_name)
    }
}

/// Extension of a client filename, from the last `.` to the end.
///
/// Empty when the dot is the first or last character, or when the result is
/// not a short run of ASCII alphanumerics (it is copied into a disk path).
pub fn file_extension(original_name: &str) -> String {
    match original_name.rfind('.') {
        Some(idx) if idx > 0 && idx < original_name.len() - 1 => {
            let ext = &original_name[idx..];
            if EXTENSION_REGEX.is_match(ext) {
                ext.to_string()
            } else {
                String::new()
            }
        }
        _ => String::new(),
    }
}

#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    public_url_prefix: String,
}

impl LocalStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            root: config.upload_path.clone(),
            public_url_prefix: config.public_url_prefix.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_url_prefix(&self) -> &str {
        &self.public_url_prefix
    }

    /// Create the upload root if missing (called once at startup)
    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    /// Compute directory and stored filename for an upload made at `now`
    pub fn derive(&self, owner_id: i64, now: DateTime<Utc>, original_name: &str) -> StoragePath {
        let year = format!("{:04}", now.year());
        let month = format!("{:02}", now.month());
        let day = format!("{:02}", now.day());

        let directory = self
            .root
            .join(owner_id.to_string())
            .join(&year)
            .join(&month)
            .join(&day);

        let extension = file_extension(original_name);
        let stored_file_name = format!(
            "{}_{}{}",
            Uuid::new_v4(),
            now.timestamp_millis(),
            extension
        );

        StoragePath {
            directory,
            stored_file_name,
            extension,
            date_path: format!("{}/{}/{}", year, month, day),
        }
    }

    /// Public preview URL embedding owner, date path and stored filename
    pub fn public_url(&self, owner_id: i64, path: &StoragePath) -> String {
        format!(
            "{}{}/{}/{}",
            self.public_url_prefix, owner_id, path.date_path, path.stored_file_name
        )
    }

    /// Write the payload to its derived location and flush it to disk.
    ///
    /// Directory creation is create-if-absent, so concurrent first uploads for
    /// the same owner and day are fine. The file itself is opened with
    /// `create_new`, an existing file is never overwritten.
    pub async fn write(&self, path: &StoragePath, data: &[u8]) -> io::Result<PathBuf> {
        fs::create_dir_all(&path.directory).await?;

        let file_path = path.file_path();
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&file_path)
            .await?;

        let written = async {
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            let _ = fs::remove_file(&file_path).await;
            return Err(e);
        }

        Ok(file_path)
    }

    /// Map a stored public URL back to its on-disk location.
    ///
    /// Returns `None` if the URL does not carry the configured prefix or any
    /// segment fails validation.
    pub fn resolve_public_url(&self, public_url: &str) -> Option<PathBuf> {
        let rest = public_url.strip_prefix(&self.public_url_prefix)?;
        let (owner, rest) = rest.split_once('/')?;
        let (date_path, file_name) = rest.rsplit_once('/')?;
        self.resolve_segments(owner, date_path, file_name)
    }

    /// Build the on-disk path from public URL segments, refusing anything that
    /// could point outside `{root}/{owner}/{yyyy}/{MM}/{dd}`
    pub fn resolve_segments(&self, owner: &str, date_path: &str, file_name: &str) -> Option<PathBuf> {
        if !OWNER_SEGMENT_REGEX.is_match(owner)
            || !DATE_PATH_REGEX.is_match(date_path)
            || !STORED_NAME_REGEX.is_match(file_name)
            || file_name.contains("..")
        {
            return None;
        }

        let mut path = self.root.join(owner);
        for part in date_path.split('/') {
            path.push(part);
        }
        path.push(file_name);
        Some(path)
    }

    /// Open a stored file for streaming, returning it with its length
    pub async fn open(&self, path: &Path) -> io::Result<(File, u64)> {
        let file = File::open(path).await?;
        let size = file.metadata().await?.len();
        Ok((file, size))
    }

    /// Remove a stored file. `Ok(false)` when it was already gone.
    pub async fn remove(&self, path: &Path) -> io::Result<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn setup_storage() -> (TempDir, LocalStorage) {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage {
            root: temp_dir.path().to_path_buf(),
            public_url_prefix: "/api/files/public/".to_string(),
        };
        (temp_dir, storage)
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 7, 10, 30, 0).unwrap()
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("report.pdf"), ".pdf");
        assert_eq!(file_extension("archive.tar.gz"), ".gz");
        assert_eq!(file_extension("image.PNG"), ".PNG");
        assert_eq!(file_extension("季度报告.docx"), ".docx");
        assert_eq!(file_extension(".bashrc"), "");
        assert_eq!(file_extension("trailing."), "");
        assert_eq!(file_extension("no_extension"), "");
    }

    #[test]
    fn test_file_extension_rejects_unsafe_characters() {
        assert_eq!(file_extension("x.a/../../etc/passwd"), "");
        assert_eq!(file_extension("evil.p\\hp"), "");
        assert_eq!(file_extension("名前.文書"), "");
        assert_eq!(file_extension("name.averyveryverylongextension"), "");
    }

    #[tokio::test]
    async fn test_concurrent_first_writes_share_new_directory() {
        let (_temp_dir, storage) = setup_storage();
        let now = fixed_now();

        let a = storage.derive(9, now, "a.txt");
        let b = storage.derive(9, now, "b.txt");
        let c = storage.derive(9, now, "c.txt");
        let d = storage.derive(9, now, "d.txt");
        assert!(!a.directory.exists());

        let (ra, rb, rc, rd) = tokio::join!(
            storage.write(&a, b"first"),
            storage.write(&b, b"second"),
            storage.write(&c, b"third"),
            storage.write(&d, b"fourth"),
        );

        for (written, expected) in [
            (ra.unwrap(), "first"),
            (rb.unwrap(), "second"),
            (rc.unwrap(), "third"),
            (rd.unwrap(), "fourth"),
        ] {
            assert_eq!(std::fs::read_to_string(written).unwrap(), expected);
        }
        assert_eq!(std::fs::read_dir(&a.directory).unwrap().count(), 4);
    }

    #[test]
    fn test_derive_layout() {
        let (_temp_dir, storage) = setup_storage();
        let path = storage.derive(7, fixed_now(), "report.pdf");

        assert_eq!(
            path.directory,
            storage.root().join("7").join("2025").join("03").join("07")
        );
        assert_eq!(path.date_path, "2025/03/07");
        assert_eq!(path.extension, ".pdf");
        assert!(path
            .stored_file_name
            .ends_with(&format!("_{}.pdf", fixed_now().timestamp_millis())));
    }

    #[test]
    fn test_derive_names_are_unique() {
        let (_temp_dir, storage) = setup_storage();
        let a = storage.derive(7, fixed_now(), "a.txt");
        let b = storage.derive(7, fixed_now(), "a.txt");
        assert_ne!(a.stored_file_name, b.stored_file_name);
    }

    #[test]
    fn test_derive_never_escapes_owner_directory() {
        let (_temp_dir, storage) = setup_storage();
        let owner_dir = storage.root().join("7");
        let hostile = [
            "../../etc/passwd",
            "/etc/passwd",
            "..\\..\\windows\\system32.dll",
            "a/b/c.txt",
            "x.a/../../b",
            "报告/../../季度.pdf",
            "\u{0000}.txt",
        ];

        for name in hostile {
            let path = storage.derive(7, fixed_now(), name);
            let file_path = path.file_path();
            assert!(file_path.starts_with(&owner_dir), "{name} escaped");
            assert_eq!(file_path.parent(), Some(path.directory.as_path()));
            assert!(!path.stored_file_name.contains('/'));
            assert!(!path.stored_file_name.contains('\\'));
            assert!(!path.stored_file_name.contains(".."));
            assert!(path.stored_file_name.is_ascii());
        }
    }

    #[test]
    fn test_public_url_round_trips_to_disk_path() {
        let (_temp_dir, storage) = setup_storage();
        let path = storage.derive(7, fixed_now(), "photo.jpg");
        let url = storage.public_url(7, &path);

        assert!(url.starts_with("/api/files/public/7/2025/03/07/"));
        assert_eq!(storage.resolve_public_url(&url), Some(path.file_path()));
    }

    #[test]
    fn test_resolve_rejects_traversal_segments() {
        let (_temp_dir, storage) = setup_storage();
        assert!(storage.resolve_segments("..", "2025/03/07", "a.txt").is_none());
        assert!(storage.resolve_segments("7", "../../..", "a.txt").is_none());
        assert!(storage.resolve_segments("7", "2025/03/07", "..").is_none());
        assert!(storage.resolve_segments("7", "2025/03/07", "a..b").is_none());
        assert!(storage.resolve_segments("7", "2025/03/07", ".hidden").is_none());
        assert!(storage.resolve_segments("7", "2025/03/07", "a%2Fb").is_none());
        assert!(storage.resolve_public_url("/other/7/2025/03/07/a.txt").is_none());
        assert!(storage
            .resolve_public_url("/api/files/public/7/2025/03/07/../../x")
            .is_none());
    }

    #[tokio::test]
    async fn test_write_open_and_remove() {
        let (_temp_dir, storage) = setup_storage();
        let path = storage.derive(7, fixed_now(), "notes.txt");

        let file_path = storage.write(&path, b"hello").await.unwrap();
        assert!(file_path.exists());

        let (_file, size) = storage.open(&file_path).await.unwrap();
        assert_eq!(size, 5);

        assert!(storage.remove(&file_path).await.unwrap());
        assert!(!storage.remove(&file_path).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_into_existing_directory() {
        let (_temp_dir, storage) = setup_storage();
        let first = storage.derive(7, fixed_now(), "a.txt");
        let second = storage.derive(7, fixed_now(), "b.txt");

        storage.write(&first, b"a").await.unwrap();
        storage.write(&second, b"b").await.unwrap();

        assert_eq!(std::fs::read(first.file_path()).unwrap(), b"a");
        assert_eq!(std::fs::read(second.file_path()).unwrap(), b"b");
    }
}
