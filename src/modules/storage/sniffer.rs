//! Content type detection from file bytes

use std::io;
use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Bytes read from the head of a file for signature matching
const SNIFF_WINDOW: usize = 8192;

/// Generic container types that a more specific declared type may refine
const CONTAINER_TYPES: &[&str] = &["application/zip", "application/x-ole-storage"];

/// Detect a MIME type from raw bytes via magic signatures
pub fn detect(bytes: &[u8]) -> Option<String> {
    infer::get(bytes).map(|kind| kind.mime_type().to_string())
}

/// Read the head of a stored file and detect its type
pub async fn sniff(path: &Path) -> io::Result<Option<String>> {
    let mut file = File::open(path).await?;
    let mut buf = vec![0u8; SNIFF_WINDOW];
    let mut filled = 0;

    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    Ok(detect(&buf[..filled]))
}

/// Pick the type recorded as verified for an upload.
///
/// Detection wins over the client declaration, except when it only found a
/// generic container (zip/OLE) and the client declared a format built on it
/// (docx, xlsx, odt, ...). No detection falls back to the declared type,
/// which is how plain text and CSV end up typed.
pub fn verified_type(detected: Option<&str>, declared: &str) -> String {
    match detected {
        Some(found) if CONTAINER_TYPES.contains(&found) && is_container_based(declared) => {
            declared.to_string()
        }
        Some(found) => found.to_string(),
        None => declared.to_string(),
    }
}

fn is_container_based(content_type: &str) -> bool {
    content_type.starts_with("application/vnd.")
        || content_type == "application/msword"
        || content_type == "application/epub+zip"
        || content_type == "application/java-archive"
}

/// Type guessed from a filename's extension
pub fn guess_from_name(file_name: &str) -> Option<String> {
    mime_guess::from_path(file_name)
        .first()
        .map(|mime| mime.essence_str().to_string())
}
