mod file;
mod file_query;
mod upload;

pub use file::{DeletedFilter, FileRecord, NewFileRecord};
pub use file_query::{split_tags, FileQuery};
pub use upload::{BatchUploadOutcome, IncomingFile, UploadMetadata};
