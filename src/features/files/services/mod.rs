mod file_service;
mod upload_policy;

pub use file_service::{FileDownload, FileService};
pub use upload_policy::UploadPolicy;
