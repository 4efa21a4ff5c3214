use axum::body::Bytes;

use super::FileRecord;

/// One file part received from a multipart request
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub file_name: Option<String>,
    /// Content type declared by the client for this part
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Metadata applied to every file of an upload request
#[derive(Debug, Clone, Default)]
pub struct UploadMetadata {
    pub category: Option<String>,
    pub tags: Option<String>,
    pub description: Option<String>,
}

/// Result of a batch upload that stored at least one file
#[derive(Debug)]
pub struct BatchUploadOutcome {
    pub uploaded: Vec<FileRecord>,
    /// `"{file name}: {reason}"` per rejected file
    pub errors: Vec<String>,
}
