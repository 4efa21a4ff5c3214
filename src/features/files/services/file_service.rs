use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::fs::File;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::features::files::models::{
    BatchUploadOutcome, DeletedFilter, FileQuery, FileRecord, IncomingFile, NewFileRecord,
    UploadMetadata,
};
use crate::features::files::repositories::FileRepository;
use crate::features::files::services::UploadPolicy;
use crate::modules::storage::{sniffer, LocalStorage};
use crate::shared::constants::FALLBACK_CONTENT_TYPE;
use crate::shared::content_disposition::DispositionType;

/// An opened stored file, ready to be streamed to the client
#[derive(Debug)]
pub struct FileDownload {
    pub file: File,
    pub size: u64,
    pub content_type: String,
    /// Name presented to the client in `Content-Disposition`
    pub file_name: String,
    pub disposition: DispositionType,
}

/// Orchestrates uploads, retrieval and deletion across the metadata store
/// and the local disk.
///
/// Every owner-facing operation takes the authenticated owner id explicitly.
pub struct FileService {
    repository: Arc<dyn FileRepository>,
    storage: Arc<LocalStorage>,
    policy: UploadPolicy,
}

impl FileService {
    pub fn new(
        repository: Arc<dyn FileRepository>,
        storage: Arc<LocalStorage>,
        policy: UploadPolicy,
    ) -> Self {
        Self {
            repository,
            storage,
            policy,
        }
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Validate, write, sniff, then record a single file.
    ///
    /// The metadata row is only inserted once the bytes are on disk and their
    /// type is verified. If the insert fails the written file is removed.
    pub async fn upload_file(
        &self,
        owner_id: i64,
        file: IncomingFile,
        metadata: &UploadMetadata,
    ) -> Result<FileRecord> {
        self.policy.validate(&file)?;

        let original_name = file.file_name.unwrap_or_default().trim().to_string();
        let declared_type = file.content_type.unwrap_or_default();
        let size_bytes = file.data.len() as i64;

        let now = Utc::now();
        let target = self.storage.derive(owner_id, now, &original_name);

        let disk_path = self
            .storage
            .write(&target, &file.data)
            .await
            .map_err(|e| {
                error!(
                    owner_id,
                    file_name = %original_name,
                    "Failed to write uploaded file: {}",
                    e
                );
                AppError::Storage(format!("failed to write {}: {}", original_name, e))
            })?;

        let detected = match sniffer::sniff(&disk_path).await {
            Ok(detected) => detected,
            Err(e) => {
                error!(
                    owner_id,
                    file_name = %original_name,
                    "Failed to read back uploaded file: {}",
                    e
                );
                self.discard(&disk_path).await;
                return Err(AppError::Storage(format!(
                    "failed to verify {}: {}",
                    original_name, e
                )));
            }
        };
        let verified_type = sniffer::verified_type(detected.as_deref(), &declared_type);

        if verified_type != declared_type {
            debug!(
                "Declared type {} differs from detected type {} for {}",
                declared_type, verified_type, original_name
            );
        }

        let record = NewFileRecord {
            owner_id,
            original_name: original_name.clone(),
            storage_path: disk_path.to_string_lossy().into_owned(),
            public_url: self.storage.public_url(owner_id, &target),
            declared_type,
            verified_type,
            size_bytes,
            extension: target.extension.clone(),
            category: metadata.category.clone(),
            tags: metadata.tags.clone(),
            description: metadata.description.clone(),
        };

        let file = match self.repository.insert(record).await {
            Ok(file) => file,
            Err(e) => {
                self.discard(&disk_path).await;
                return Err(e);
            }
        };

        info!(
            owner_id,
            file_id = %file.id,
            size = file.size_bytes,
            verified_type = %file.verified_type,
            "File uploaded"
        );

        Ok(file)
    }

    /// Upload several files sharing one set of metadata.
    ///
    /// The batch size is checked before any file is touched. Each file then
    /// succeeds or fails on its own; only a batch with no success is an error.
    pub async fn upload_files(
        &self,
        owner_id: i64,
        files: Vec<IncomingFile>,
        metadata: &UploadMetadata,
    ) -> Result<BatchUploadOutcome> {
        self.policy.check_batch_size(files.len())?;

        let mut uploaded = Vec::with_capacity(files.len());
        let mut errors = Vec::new();

        for file in files {
            let label = file
                .file_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| "unnamed".to_string());

            match self.upload_file(owner_id, file, metadata).await {
                Ok(record) => uploaded.push(record),
                Err(e) => {
                    debug!("Batch item {} rejected: {}", label, e);
                    errors.push(format!("{}: {}", label, e.client_message()));
                }
            }
        }

        if uploaded.is_empty() {
            return Err(AppError::BatchUploadFailed(errors));
        }

        info!(
            owner_id,
            success_count = uploaded.len(),
            failure_count = errors.len(),
            "Batch upload finished"
        );

        Ok(BatchUploadOutcome { uploaded, errors })
    }

    pub async fn list_files(&self, owner_id: i64, query: &FileQuery) -> Result<(Vec<FileRecord>, i64)> {
        self.repository
            .list(owner_id, query, DeletedFilter::ExcludeDeleted)
            .await
    }

    pub async fn get_file(&self, owner_id: i64, id: Uuid) -> Result<FileRecord> {
        self.repository
            .find_by_id(id, owner_id, DeletedFilter::ExcludeDeleted)
            .await?
            .ok_or_else(|| AppError::NotFound("File not found".to_string()))
    }

    /// Open an owned file for download and count the download
    pub async fn prepare_download(&self, owner_id: i64, id: Uuid) -> Result<FileDownload> {
        let record = self.get_file(owner_id, id).await?;
        let path = self.disk_path(&record);

        let (file, size) = match self.storage.open(&path).await {
            Ok(opened) => opened,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                error!(
                    owner_id,
                    file_id = %record.id,
                    path = %path.display(),
                    "File record exists but the stored file is missing"
                );
                return Err(AppError::NotFound("File not found".to_string()));
            }
            Err(e) => {
                return Err(AppError::Storage(format!(
                    "failed to open {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        if let Err(e) = self.repository.increment_download_count(record.id).await {
            warn!(file_id = %record.id, "Failed to increment download count: {}", e);
        }

        Ok(FileDownload {
            file,
            size,
            content_type: content_type_of(&record),
            file_name: record.original_name,
            disposition: DispositionType::Attachment,
        })
    }

    /// Serve a file addressed by its public URL segments, without an owner
    /// check.
    ///
    /// Segments that fail validation and files whose record is soft-deleted
    /// are reported as not found. A live record gets its view counter bumped.
    pub async fn open_public(
        &self,
        owner: &str,
        date_path: &str,
        file_name: &str,
    ) -> Result<FileDownload> {
        let not_found = || AppError::NotFound("File not found".to_string());

        let path = self
            .storage
            .resolve_segments(owner, date_path, file_name)
            .ok_or_else(not_found)?;

        let public_url = format!(
            "{}{}/{}/{}",
            self.storage.public_url_prefix(),
            owner,
            date_path,
            file_name
        );
        let record = self
            .repository
            .find_by_public_url(&public_url, DeletedFilter::IncludeDeleted)
            .await?;

        if record.as_ref().is_some_and(|r| r.deleted) {
            return Err(not_found());
        }

        let (file, size) = match self.storage.open(&path).await {
            Ok(opened) => opened,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if let Some(record) = &record {
                    error!(
                        file_id = %record.id,
                        path = %path.display(),
                        "File record exists but the stored file is missing"
                    );
                }
                return Err(not_found());
            }
            Err(e) => {
                return Err(AppError::Storage(format!(
                    "failed to open {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let (content_type, presented_name) = match &record {
            Some(record) => {
                if let Err(e) = self.repository.increment_view_count(record.id).await {
                    warn!(file_id = %record.id, "Failed to increment view count: {}", e);
                }
                (content_type_of(record), record.original_name.clone())
            }
            None => {
                let detected = sniffer::sniff(&path).await.ok().flatten();
                let content_type = detected
                    .or_else(|| sniffer::guess_from_name(file_name))
                    .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());
                (content_type, file_name.to_string())
            }
        };

        Ok(FileDownload {
            file,
            size,
            disposition: DispositionType::for_content_type(&content_type),
            content_type,
            file_name: presented_name,
        })
    }

    /// Best-effort unlink of the stored file, then soft delete of the record
    pub async fn delete_file(&self, owner_id: i64, id: Uuid) -> Result<()> {
        let record = self.get_file(owner_id, id).await?;
        let path = self.disk_path(&record);

        match self.storage.remove(&path).await {
            Ok(true) => debug!("Removed stored file {}", path.display()),
            Ok(false) => warn!(
                file_id = %record.id,
                path = %path.display(),
                "Stored file already missing on delete"
            ),
            Err(e) => warn!(
                file_id = %record.id,
                path = %path.display(),
                "Failed to remove stored file: {}",
                e
            ),
        }

        if !self.repository.soft_delete(id, owner_id).await? {
            return Err(AppError::NotFound("File not found".to_string()));
        }

        info!(owner_id, file_id = %id, "File deleted");

        Ok(())
    }

    pub async fn list_categories(&self, owner_id: i64) -> Result<Vec<String>> {
        self.repository
            .distinct_categories(owner_id, DeletedFilter::ExcludeDeleted)
            .await
    }

    /// On-disk location of a record, recomputed from its public URL and
    /// falling back to the stored path
    fn disk_path(&self, record: &FileRecord) -> PathBuf {
        self.storage
            .resolve_public_url(&record.public_url)
            .unwrap_or_else(|| PathBuf::from(&record.storage_path))
    }

    /// Remove a file written by an upload that did not complete
    async fn discard(&self, path: &std::path::Path) {
        if let Err(e) = self.storage.remove(path).await {
            warn!(
                path = %path.display(),
                "Failed to remove orphaned upload: {}",
                e
            );
        } else {
            warn!(path = %path.display(), "Removed orphaned upload");
        }
    }
}

fn content_type_of(record: &FileRecord) -> String {
    if record.verified_type.is_empty() {
        FALLBACK_CONTENT_TYPE.to_string()
    } else {
        record.verified_type.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::StorageConfig;
    use crate::shared::test_helpers::InMemoryFileRepository;
    use axum::body::Bytes;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    const PNG_BYTES: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01,
    ];

    struct Fixture {
        temp_dir: TempDir,
        repository: Arc<InMemoryFileRepository>,
        service: FileService,
    }

    fn setup() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            upload_path: temp_dir.path().to_path_buf(),
            public_url_prefix: "/api/files/public/".to_string(),
            allowed_types: vec![
                "text/plain".to_string(),
                "image/png".to_string(),
                "image/jpeg".to_string(),
            ],
            max_file_size: 1024,
            max_batch_size: 20,
        };
        let repository = Arc::new(InMemoryFileRepository::new());
        let service = FileService::new(
            repository.clone(),
            Arc::new(LocalStorage::new(&config)),
            UploadPolicy::from_config(&config),
        );
        Fixture {
            temp_dir,
            repository,
            service,
        }
    }

    fn text_file(name: &str, body: &str) -> IncomingFile {
        IncomingFile {
            file_name: Some(name.to_string()),
            content_type: Some("text/plain".to_string()),
            data: Bytes::copy_from_slice(body.as_bytes()),
        }
    }

    async fn read_all(mut download: FileDownload) -> Vec<u8> {
        let mut buf = Vec::new();
        download.file.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_upload_then_download_round_trip() {
        let fx = setup();
        let record = fx
            .service
            .upload_file(7, text_file("notes.txt", "hello world"), &UploadMetadata::default())
            .await
            .unwrap();

        assert_eq!(record.owner_id, 7);
        assert_eq!(record.extension, ".txt");
        assert_eq!(record.verified_type, "text/plain");
        assert!(record.public_url.starts_with("/api/files/public/7/"));

        let download = fx.service.prepare_download(7, record.id).await.unwrap();
        assert_eq!(download.size, 11);
        assert_eq!(download.file_name, "notes.txt");
        assert_eq!(download.disposition, DispositionType::Attachment);
        assert_eq!(read_all(download).await, b"hello world");
    }

    #[tokio::test]
    async fn test_verified_type_comes_from_content() {
        let fx = setup();
        let file = IncomingFile {
            file_name: Some("photo.jpg".to_string()),
            content_type: Some("image/jpeg".to_string()),
            data: Bytes::from_static(PNG_BYTES),
        };
        let record = fx
            .service
            .upload_file(1, file, &UploadMetadata::default())
            .await
            .unwrap();

        assert_eq!(record.declared_type, "image/jpeg");
        assert_eq!(record.verified_type, "image/png");
    }

    #[tokio::test]
    async fn test_rejected_upload_writes_nothing() {
        let fx = setup();
        let file = IncomingFile {
            file_name: Some("run.sh".to_string()),
            content_type: Some("application/x-sh".to_string()),
            data: Bytes::from_static(b"echo"),
        };
        let err = fx
            .service
            .upload_file(1, file, &UploadMetadata::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::FileTypeNotAllowed(_)));
        assert_eq!(fx.repository.len(), 0);
        assert!(!fx.temp_dir.path().join("1").exists());
    }

    #[tokio::test]
    async fn test_failed_insert_removes_written_file() {
        let fx = setup();
        fx.repository.fail_inserts();

        let err = fx
            .service
            .upload_file(3, text_file("a.txt", "data"), &UploadMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));

        let day_dir = fx.temp_dir.path().join("3").join(Utc::now().format("%Y/%m/%d").to_string());
        let leftover = std::fs::read_dir(&day_dir).map(|d| d.count()).unwrap_or(0);
        assert_eq!(leftover, 0);
    }

    #[tokio::test]
    async fn test_hostile_name_stays_under_owner_directory() {
        let fx = setup();
        let record = fx
            .service
            .upload_file(
                5,
                text_file("../../../etc/passwd", "x"),
                &UploadMetadata::default(),
            )
            .await
            .unwrap();

        let owner_dir = fx.temp_dir.path().join("5");
        assert!(PathBuf::from(&record.storage_path).starts_with(&owner_dir));
        assert_eq!(record.original_name, "../../../etc/passwd");
    }

    #[tokio::test]
    async fn test_cross_owner_access_is_not_found() {
        let fx = setup();
        let record = fx
            .service
            .upload_file(1, text_file("a.txt", "mine"), &UploadMetadata::default())
            .await
            .unwrap();

        assert!(matches!(
            fx.service.get_file(2, record.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            fx.service.prepare_download(2, record.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            fx.service.delete_file(2, record.id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(fx.service.get_file(1, record.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_is_soft_and_not_repeatable() {
        let fx = setup();
        let record = fx
            .service
            .upload_file(1, text_file("a.txt", "bye"), &UploadMetadata::default())
            .await
            .unwrap();

        fx.service.delete_file(1, record.id).await.unwrap();

        assert!(fx.repository.get(record.id).unwrap().deleted);
        assert!(!PathBuf::from(&record.storage_path).exists());
        assert!(matches!(
            fx.service.get_file(1, record.id).await,
            Err(AppError::NotFound(_))
        ));
        let (files, total) = fx
            .service
            .list_files(1, &FileQuery::default())
            .await
            .unwrap();
        assert!(files.is_empty());
        assert_eq!(total, 0);

        assert!(matches!(
            fx.service.delete_file(1, record.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_proceeds_when_file_already_gone() {
        let fx = setup();
        let record = fx
            .service
            .upload_file(1, text_file("a.txt", "x"), &UploadMetadata::default())
            .await
            .unwrap();
        std::fs::remove_file(&record.storage_path).unwrap();

        fx.service.delete_file(1, record.id).await.unwrap();
        assert!(fx.repository.get(record.id).unwrap().deleted);
    }

    #[tokio::test]
    async fn test_missing_disk_file_is_not_found_on_download() {
        let fx = setup();
        let record = fx
            .service
            .upload_file(1, text_file("a.txt", "x"), &UploadMetadata::default())
            .await
            .unwrap();
        std::fs::remove_file(&record.storage_path).unwrap();

        assert!(matches!(
            fx.service.prepare_download(1, record.id).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(fx.repository.get(record.id).unwrap().download_count, 0);
    }

    #[tokio::test]
    async fn test_download_count_is_monotonic() {
        let fx = setup();
        let record = fx
            .service
            .upload_file(1, text_file("a.txt", "x"), &UploadMetadata::default())
            .await
            .unwrap();

        for _ in 0..4 {
            fx.service.prepare_download(1, record.id).await.unwrap();
        }
        assert_eq!(fx.repository.get(record.id).unwrap().download_count, 4);
    }

    #[tokio::test]
    async fn test_batch_partial_success() {
        let fx = setup();
        let files = vec![
            text_file("a.txt", "1"),
            text_file("b.txt", ""),
            text_file("c.txt", "3"),
            IncomingFile {
                file_name: Some("d.exe".to_string()),
                content_type: Some("application/x-msdownload".to_string()),
                data: Bytes::from_static(b"MZ"),
            },
            text_file("e.txt", "5"),
        ];
        let metadata = UploadMetadata {
            category: Some("docs".to_string()),
            tags: Some("q1".to_string()),
            description: None,
        };

        let outcome = fx.service.upload_files(1, files, &metadata).await.unwrap();

        assert_eq!(outcome.uploaded.len(), 3);
        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome.errors[0].starts_with("b.txt: "));
        assert!(outcome.errors[1].starts_with("d.exe: "));
        assert!(outcome
            .uploaded
            .iter()
            .all(|r| r.category.as_deref() == Some("docs")));
    }

    #[tokio::test]
    async fn test_batch_with_no_success_fails() {
        let fx = setup();
        let err = fx
            .service
            .upload_files(
                1,
                vec![text_file("a.txt", ""), text_file("b.txt", "")],
                &UploadMetadata::default(),
            )
            .await
            .unwrap_err();

        match err {
            AppError::BatchUploadFailed(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected_before_processing() {
        let fx = setup();
        let files = (0..21)
            .map(|i| text_file(&format!("{i}.txt"), "x"))
            .collect();

        let err = fx
            .service
            .upload_files(1, files, &UploadMetadata::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(fx.repository.len(), 0);
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_filtered() {
        let fx = setup();
        for (name, category) in [("a.txt", "x"), ("b.txt", "y"), ("c.txt", "x")] {
            let metadata = UploadMetadata {
                category: Some(category.to_string()),
                ..Default::default()
            };
            fx.service
                .upload_file(1, text_file(name, "x"), &metadata)
                .await
                .unwrap();
        }

        let (files, total) = fx
            .service
            .list_files(1, &FileQuery::default())
            .await
            .unwrap();
        let names: Vec<_> = files.iter().map(|f| f.original_name.as_str()).collect();
        assert_eq!(names, vec!["c.txt", "b.txt", "a.txt"]);
        assert_eq!(total, 3);

        let query = FileQuery::new(None, Some("x"), None, Some(2), Some(1));
        let (files, total) = fx.service.list_files(1, &query).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(files[0].original_name, "a.txt");

        assert_eq!(
            fx.service.list_categories(1).await.unwrap(),
            vec!["x".to_string(), "y".to_string()]
        );
    }

    #[tokio::test]
    async fn test_public_open_counts_views_and_refuses_deleted() {
        let fx = setup();
        let file = IncomingFile {
            file_name: Some("pic.png".to_string()),
            content_type: Some("image/png".to_string()),
            data: Bytes::from_static(PNG_BYTES),
        };
        let record = fx
            .service
            .upload_file(9, file, &UploadMetadata::default())
            .await
            .unwrap();

        let rest = record.public_url.strip_prefix("/api/files/public/").unwrap();
        let (owner, rest) = rest.split_once('/').unwrap();
        let (date_path, name) = rest.rsplit_once('/').unwrap();

        let preview = fx.service.open_public(owner, date_path, name).await.unwrap();
        assert_eq!(preview.content_type, "image/png");
        assert_eq!(preview.disposition, DispositionType::Inline);
        assert_eq!(preview.file_name, "pic.png");
        assert_eq!(fx.repository.get(record.id).unwrap().view_count, 1);

        fx.service.delete_file(9, record.id).await.unwrap();
        assert!(matches!(
            fx.service.open_public(owner, date_path, name).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_public_open_rejects_traversal_segments() {
        let fx = setup();
        assert!(matches!(
            fx.service.open_public("1", "2025/01/01", "..").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            fx.service.open_public("..", "2025/01/01", "a.txt").await,
            Err(AppError::NotFound(_))
        ));
    }
}
