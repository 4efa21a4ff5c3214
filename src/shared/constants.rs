/// Default page size for pagination
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Maximum page size allowed
pub const MAX_PAGE_SIZE: i64 = 100;

/// Longest client filename kept, in characters (`original_name` column width)
pub const MAX_FILE_NAME_LENGTH: usize = 255;

/// Content type used when neither the record nor the bytes tell us better
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Extension used for the ASCII download name when the original one is unusable
pub const FALLBACK_EXTENSION: &str = ".bin";

// =============================================================================
// ERROR CODES
// =============================================================================

pub const CODE_VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub const CODE_EMPTY_FILE: &str = "EMPTY_FILE";
pub const CODE_FILE_TYPE_NOT_ALLOWED: &str = "FILE_TYPE_NOT_ALLOWED";
pub const CODE_FILE_TOO_LARGE: &str = "FILE_TOO_LARGE";
pub const CODE_REQUEST_TOO_LARGE: &str = "REQUEST_TOO_LARGE";
pub const CODE_BATCH_UPLOAD_FAILED: &str = "BATCH_UPLOAD_FAILED";
pub const CODE_STORAGE_ERROR: &str = "STORAGE_ERROR";
pub const CODE_NOT_FOUND: &str = "NOT_FOUND";
pub const CODE_BAD_REQUEST: &str = "BAD_REQUEST";
pub const CODE_UNAUTHORIZED: &str = "UNAUTHORIZED";
pub const CODE_DATABASE_ERROR: &str = "DATABASE_ERROR";
pub const CODE_INTERNAL_ERROR: &str = "INTERNAL_ERROR";
