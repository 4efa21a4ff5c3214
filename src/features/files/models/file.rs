use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Database model for an uploaded file
#[derive(Debug, Clone, FromRow)]
pub struct FileRecord {
    pub id: Uuid,
    pub owner_id: i64,
    /// Client-supplied name, for display and the download header only
    pub original_name: String,
    /// Absolute on-disk location, fixed at creation
    pub storage_path: String,
    /// `{prefix}{owner_id}/{yyyy}/{MM}/{dd}/{stored_file_name}`
    pub public_url: String,
    pub declared_type: String,
    pub verified_type: String,
    pub size_bytes: i64,
    pub extension: String,
    pub category: Option<String>,
    /// Comma-joined free-text tags
    pub tags: Option<String>,
    pub description: Option<String>,
    pub download_count: i64,
    pub view_count: i64,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values for a new row; id, counters, flags and timestamps come from the store
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    pub owner_id: i64,
    pub original_name: String,
    pub storage_path: String,
    pub public_url: String,
    pub declared_type: String,
    pub verified_type: String,
    pub size_bytes: i64,
    pub extension: String,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub description: Option<String>,
}

/// Whether a store read may return soft-deleted rows.
///
/// Every read method takes one explicitly; owner-facing paths pass
/// `ExcludeDeleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletedFilter {
    ExcludeDeleted,
    IncludeDeleted,
}

impl DeletedFilter {
    pub fn admits(&self, record: &FileRecord) -> bool {
        match self {
            DeletedFilter::ExcludeDeleted => !record.deleted,
            DeletedFilter::IncludeDeleted => true,
        }
    }
}
