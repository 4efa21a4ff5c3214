use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::features::files::models::{BatchUploadOutcome, FileQuery, FileRecord, UploadMetadata};
use crate::shared::content_disposition::is_previewable;

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Single upload form for OpenAPI documentation.
/// The handler reads the multipart stream directly.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct UploadFileDto {
    /// The file to upload
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
    #[schema(example = "finance")]
    pub category: Option<String>,
    /// Comma-separated tags
    #[schema(example = "tax,2025")]
    pub tags: Option<String>,
    pub description: Option<String>,
}

/// Batch upload form for OpenAPI documentation
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct BatchUploadFileDto {
    /// Files to upload (field name `files` or `files[]`)
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub files: Vec<String>,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub description: Option<String>,
}

/// Text fields of an upload form, shared by every file in the request
#[derive(Debug, Clone, Default, Validate)]
pub struct UploadMetadataDto {
    #[validate(length(max = 100, message = "category must be at most 100 characters"))]
    pub category: Option<String>,
    #[validate(length(max = 500, message = "tags must be at most 500 characters"))]
    pub tags: Option<String>,
    #[validate(length(max = 2000, message = "description must be at most 2000 characters"))]
    pub description: Option<String>,
}

impl From<UploadMetadataDto> for UploadMetadata {
    fn from(dto: UploadMetadataDto) -> Self {
        Self {
            category: non_blank(dto.category),
            tags: non_blank(dto.tags),
            description: non_blank(dto.description),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// File metadata as returned to the owner
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FileResponseDto {
    pub id: Uuid,
    pub owner_id: i64,
    /// Name as uploaded by the client
    pub original_name: String,
    /// Public preview URL
    pub public_url: String,
    /// Content type detected from the stored bytes
    pub content_type: String,
    /// Content type declared by the client
    pub declared_type: String,
    pub size_bytes: i64,
    /// Human readable size, e.g. "1.50 KB"
    pub formatted_size: String,
    pub extension: String,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub description: Option<String>,
    pub download_count: i64,
    pub view_count: i64,
    /// Whether a browser can display the file inline
    pub previewable: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<FileRecord> for FileResponseDto {
    fn from(file: FileRecord) -> Self {
        Self {
            formatted_size: format_size(file.size_bytes),
            previewable: is_previewable(&file.verified_type),
            id: file.id,
            owner_id: file.owner_id,
            original_name: file.original_name,
            public_url: file.public_url,
            content_type: file.verified_type,
            declared_type: file.declared_type,
            size_bytes: file.size_bytes,
            extension: file.extension,
            category: file.category,
            tags: file.tags,
            description: file.description,
            download_count: file.download_count,
            view_count: file.view_count,
            created_at: file.created_at,
            updated_at: file.updated_at,
        }
    }
}

/// "0 B" for empty files, otherwise two decimals in the largest unit below 1024
pub fn format_size(size_bytes: i64) -> String {
    if size_bytes <= 0 {
        return "0 B".to_string();
    }

    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{:.2} {}", size, SIZE_UNITS[unit])
}

/// Outcome of a batch upload with at least one stored file
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchUploadResponseDto {
    pub success_count: usize,
    pub failure_count: usize,
    pub files: Vec<FileResponseDto>,
    /// `"{file name}: {reason}"` per rejected file
    pub errors: Vec<String>,
}

impl From<BatchUploadOutcome> for BatchUploadResponseDto {
    fn from(outcome: BatchUploadOutcome) -> Self {
        Self {
            success_count: outcome.uploaded.len(),
            failure_count: outcome.errors.len(),
            files: outcome
                .uploaded
                .into_iter()
                .map(FileResponseDto::from)
                .collect(),
            errors: outcome.errors,
        }
    }
}

impl BatchUploadResponseDto {
    pub fn summary(&self) -> String {
        if self.failure_count == 0 {
            format!("Uploaded {} files", self.success_count)
        } else {
            format!(
                "Uploaded {} files, {} failed",
                self.success_count, self.failure_count
            )
        }
    }
}

/// Query params for listing files
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ListFilesQuery {
    /// Case-insensitive match on the file name or description
    pub keyword: Option<String>,
    /// Exact category
    pub category: Option<String>,
    /// Comma-separated tags, all of which must be present
    pub tags: Option<String>,
    /// Page number (1-indexed, default: 1)
    #[param(minimum = 1)]
    pub current: Option<i64>,
    /// Items per page (default: 10, max: 100)
    #[param(minimum = 1, maximum = 100)]
    pub size: Option<i64>,
}

impl ListFilesQuery {
    pub fn to_query(&self) -> FileQuery {
        FileQuery::new(
            self.keyword.as_deref(),
            self.category.as_deref(),
            self.tags.as_deref(),
            self.current,
            self.size,
        )
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteFileResponseDto {
    pub deleted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512.00 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_size(3 * 1024_i64.pow(5)), "3072.00 TB");
    }

    #[test]
    fn test_metadata_blank_values_are_dropped() {
        let metadata: UploadMetadata = UploadMetadataDto {
            category: Some("  finance ".to_string()),
            tags: Some("   ".to_string()),
            description: None,
        }
        .into();

        assert_eq!(metadata.category.as_deref(), Some("finance"));
        assert_eq!(metadata.tags, None);
    }

    #[test]
    fn test_metadata_length_limits() {
        let dto = UploadMetadataDto {
            category: Some("c".repeat(101)),
            ..Default::default()
        };
        assert!(dto.validate().is_err());
    }

    #[test]
    fn test_list_query_defaults() {
        let query = ListFilesQuery::default().to_query();
        assert_eq!((query.page, query.page_size), (1, 10));
    }
}
