//! `Content-Disposition` header construction for downloads and previews.
//!
//! The real filename always travels in the RFC 5987 extended parameter
//! (`filename*=UTF-8''...`). The legacy `filename="..."` parameter only ever
//! carries printable ASCII: the original name when it already is, otherwise a
//! synthesized `file_{millis}{ext}` name.

use crate::shared::constants::FALLBACK_EXTENSION;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispositionType {
    Inline,
    Attachment,
}

impl DispositionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispositionType::Inline => "inline",
            DispositionType::Attachment => "attachment",
        }
    }

    /// Inline for types a browser can render, attachment otherwise
    pub fn for_content_type(content_type: &str) -> Self {
        if is_previewable(content_type) {
            DispositionType::Inline
        } else {
            DispositionType::Attachment
        }
    }
}

/// Whether a browser can display this type directly
pub fn is_previewable(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    content_type.starts_with("image/")
        || content_type.starts_with("video/")
        || content_type.starts_with("audio/")
        || content_type == "application/pdf"
}

/// Full header value, e.g.
/// `attachment; filename="file_1700000000000.pdf"; filename*=UTF-8''%E6%8A%A5%E5%91%8A.pdf`
pub fn build(disposition: DispositionType, file_name: &str, now_millis: i64) -> String {
    format!(
        "{}; filename=\"{}\"; filename*=UTF-8''{}",
        disposition.as_str(),
        ascii_fallback_name(file_name, now_millis),
        encode_ext_value(file_name)
    )
}

/// Percent-encode a filename for the extended parameter.
/// Only unreserved ASCII (`A-Z a-z 0-9 - _ . ~`) is left as is.
pub fn encode_ext_value(file_name: &str) -> String {
    urlencoding::encode(file_name).into_owned()
}

/// Name for the legacy `filename` parameter, quoted-string escaped
pub fn ascii_fallback_name(file_name: &str, now_millis: i64) -> String {
    let printable_ascii =
        !file_name.is_empty() && file_name.chars().all(|c| c.is_ascii() && !c.is_ascii_control());

    if printable_ascii {
        file_name.replace('\\', "\\\\").replace('"', "\\\"")
    } else {
        format!("file_{}{}", now_millis, ascii_extension(file_name))
    }
}

/// Extension of `file_name` reduced to ASCII alphanumerics, `.bin` when
/// nothing survives, empty when the name has no extension at all
fn ascii_extension(file_name: &str) -> String {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 && idx < file_name.len() - 1 => {
            let kept: String = file_name[idx + 1..]
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect();
            if kept.is_empty() {
                FALLBACK_EXTENSION.to_string()
            } else {
                format!(".{}", kept)
            }
        }
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const NOW: i64 = 1_700_000_000_000;

    /// Every byte is ASCII and every `%` starts a valid hex triplet
    fn assert_header_safe(value: &str) {
        let bytes = value.as_bytes();
        assert!(value.is_ascii(), "non-ASCII byte in {value}");
        for (i, b) in bytes.iter().enumerate() {
            if *b == b'%' {
                assert!(i + 2 < bytes.len());
                assert!(bytes[i + 1].is_ascii_hexdigit() && bytes[i + 2].is_ascii_hexdigit());
            }
        }
        assert!(HeaderValue::from_str(value).is_ok());
    }

    #[test]
    fn test_ascii_name_is_kept() {
        let header = build(DispositionType::Attachment, "report final.pdf", NOW);
        assert_eq!(
            header,
            "attachment; filename=\"report final.pdf\"; filename*=UTF-8''report%20final.pdf"
        );
        assert_header_safe(&header);
    }

    #[test]
    fn test_multibyte_name_uses_synthesized_fallback() {
        let name = "招商信诺历史费控系统历史数据迁移方案评审.docx";
        let header = build(DispositionType::Attachment, name, NOW);

        assert!(header.contains("filename=\"file_1700000000000.docx\""));
        assert!(header.contains("filename*=UTF-8''%E6%8B%9B"));
        assert!(header.ends_with(".docx"));
        assert_header_safe(&header);
    }

    #[test]
    fn test_non_ascii_extension_falls_back_to_bin() {
        assert_eq!(ascii_fallback_name("报告.文档", NOW), "file_1700000000000.bin");
        assert_eq!(ascii_fallback_name("报告", NOW), "file_1700000000000");
    }

    #[test]
    fn test_quotes_and_control_characters() {
        assert_eq!(ascii_fallback_name("a\"b.txt", NOW), "a\\\"b.txt");

        let header = build(DispositionType::Inline, "evil\r\nSet-Cookie: x.txt", NOW);
        assert!(header.starts_with("inline; filename=\"file_1700000000000.txt\""));
        assert_header_safe(&header);
    }

    #[test]
    fn test_extended_value_encodes_reserved_characters() {
        assert_eq!(encode_ext_value("a;b\"c'd.txt"), "a%3Bb%22c%27d.txt");
        assert_eq!(encode_ext_value("é"), "%C3%A9");
    }

    #[test]
    fn test_disposition_for_content_type() {
        assert_eq!(
            DispositionType::for_content_type("image/png"),
            DispositionType::Inline
        );
        assert_eq!(
            DispositionType::for_content_type("application/pdf"),
            DispositionType::Inline
        );
        assert_eq!(
            DispositionType::for_content_type("application/zip"),
            DispositionType::Attachment
        );
    }
}
