use crate::core::config::StorageConfig;
use crate::core::error::{AppError, Result};
use crate::features::files::models::IncomingFile;
use crate::shared::constants::MAX_FILE_NAME_LENGTH;

/// Allowance for multipart boundaries and text fields on top of file bytes
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// Type and size rules applied to every upload before any disk I/O
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    allowed_types: Vec<String>,
    max_file_size: u64,
    max_batch_size: usize,
}

impl UploadPolicy {
    pub fn new(allowed_types: Vec<String>, max_file_size: u64, max_batch_size: usize) -> Self {
        Self {
            allowed_types,
            max_file_size,
            max_batch_size,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(
            config.allowed_types.clone(),
            config.max_file_size,
            config.max_batch_size,
        )
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Request body limit for a single-file upload
    pub fn single_request_limit(&self) -> u64 {
        self.max_file_size.saturating_add(MULTIPART_OVERHEAD)
    }

    /// Request body limit for a batch upload
    pub fn batch_request_limit(&self) -> u64 {
        self.max_file_size
            .saturating_mul(self.max_batch_size as u64)
            .saturating_add(MULTIPART_OVERHEAD)
    }

    /// Check a received file, in order: empty payload, declared type against
    /// the allow-list (exact match), size ceiling, missing or overlong filename
    pub fn validate(&self, file: &IncomingFile) -> Result<()> {
        if file.data.is_empty() {
            return Err(AppError::EmptyFile);
        }

        match file.content_type.as_deref() {
            Some(content_type) if self.is_type_allowed(content_type) => {}
            Some(content_type) => {
                return Err(AppError::FileTypeNotAllowed(content_type.to_string()));
            }
            None => return Err(AppError::FileTypeNotAllowed("unknown".to_string())),
        }

        let size = file.data.len() as u64;
        if size > self.max_file_size {
            return Err(AppError::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }

        let file_name = match file.file_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(AppError::Validation("File name is required".to_string())),
        };
        if file_name.chars().count() > MAX_FILE_NAME_LENGTH {
            return Err(AppError::Validation(format!(
                "File name must be at most {} characters",
                MAX_FILE_NAME_LENGTH
            )));
        }

        Ok(())
    }

    /// Reject a batch wholesale before any file in it is processed
    pub fn check_batch_size(&self, count: usize) -> Result<()> {
        if count == 0 {
            return Err(AppError::Validation(
                "At least one file is required".to_string(),
            ));
        }
        if count > self.max_batch_size {
            return Err(AppError::Validation(format!(
                "Too many files: {} exceeds the limit of {} per batch",
                count, self.max_batch_size
            )));
        }
        Ok(())
    }

    fn is_type_allowed(&self, content_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == content_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;

    fn policy() -> UploadPolicy {
        UploadPolicy::new(
            vec!["text/plain".to_string(), "image/png".to_string()],
            16,
            3,
        )
    }

    fn incoming(name: Option<&str>, content_type: Option<&str>, data: &[u8]) -> IncomingFile {
        IncomingFile {
            file_name: name.map(str::to_string),
            content_type: content_type.map(str::to_string),
            data: Bytes::copy_from_slice(data),
        }
    }

    #[test]
    fn test_accepts_allowed_file() {
        assert!(policy()
            .validate(&incoming(Some("a.txt"), Some("text/plain"), b"hello"))
            .is_ok());
    }

    #[test]
    fn test_empty_file_is_checked_first() {
        let err = policy()
            .validate(&incoming(None, Some("application/x-sh"), b""))
            .unwrap_err();
        assert!(matches!(err, AppError::EmptyFile));
    }

    #[test]
    fn test_type_must_match_exactly() {
        let err = policy()
            .validate(&incoming(Some("a.txt"), Some("text/plain; charset=utf-8"), b"x"))
            .unwrap_err();
        assert!(matches!(err, AppError::FileTypeNotAllowed(_)));

        let err = policy()
            .validate(&incoming(Some("a.txt"), None, b"x"))
            .unwrap_err();
        assert!(matches!(err, AppError::FileTypeNotAllowed(_)));
    }

    #[test]
    fn test_size_ceiling() {
        let err = policy()
            .validate(&incoming(Some("a.txt"), Some("text/plain"), &[b'a'; 17]))
            .unwrap_err();
        assert!(matches!(err, AppError::FileTooLarge { size: 17, max: 16 }));

        assert!(policy()
            .validate(&incoming(Some("a.txt"), Some("text/plain"), &[b'a'; 16]))
            .is_ok());
    }

    #[test]
    fn test_missing_file_name() {
        let err = policy()
            .validate(&incoming(Some("  "), Some("text/plain"), b"x"))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_file_name_length_limit() {
        let name = format!("{}.txt", "a".repeat(MAX_FILE_NAME_LENGTH - 4));
        assert!(policy()
            .validate(&incoming(Some(&name), Some("text/plain"), b"x"))
            .is_ok());

        let name = format!("{}.txt", "a".repeat(MAX_FILE_NAME_LENGTH - 3));
        let err = policy()
            .validate(&incoming(Some(&name), Some("text/plain"), b"x"))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        // counted in characters, not bytes
        let name = format!("{}.txt", "é".repeat(MAX_FILE_NAME_LENGTH - 4));
        assert!(policy()
            .validate(&incoming(Some(&name), Some("text/plain"), b"x"))
            .is_ok());
    }

    #[test]
    fn test_request_limits_cover_file_bytes() {
        let policy = policy();
        assert_eq!(policy.single_request_limit(), 16 + 1024 * 1024);
        assert_eq!(policy.batch_request_limit(), 48 + 1024 * 1024);
    }

    #[test]
    fn test_batch_size_bounds() {
        assert!(policy().check_batch_size(3).is_ok());
        assert!(matches!(
            policy().check_batch_size(4),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            policy().check_batch_size(0),
            Err(AppError::Validation(_))
        ));
    }
}
