//! MIME lookup tables: file extensions, magic numbers and the coarse
//! content classification shown in lifecycle notifications.

use std::path::Path;

pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";
pub const TEXT_PLAIN: &str = "text/plain";
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
pub const APPLICATION_GRAPHQL: &str = "application/graphql";
pub const APPLICATION_XML: &str = "application/xml";

const EXTENSIONS: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("jfif", "image/jpeg"),
    ("pjpeg", "image/jpeg"),
    ("pjp", "image/jpeg"),
    ("avif", "image/avif"),
    ("gif", "image/gif"),
    ("tif", "image/tiff"),
    ("svg", "image/svg+xml"),
    ("obj", "model/obj"),
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("oga", "audio/ogg"),
    ("mp4", "video/mp4"),
    ("ogv", "video/ogg"),
    ("json", "application/json"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("xml", "application/xml"),
];

const FRIENDLY: &[(&str, &str)] = &[
    ("text/html", "document"),
    ("application/xhtml+xml", "document"),
    ("application/javascript", "script"),
    ("text/javascript", "script"),
    ("application/x-javascript", "script"),
    ("application/json", "json"),
    ("text/css", "stylesheet"),
    ("font/woff", "font"),
    ("font/woff2", "font"),
    ("application/font-woff", "font"),
    ("application/x-font-ttf", "font"),
    ("text/plain", "text"),
    ("application/xml", "xml"),
    ("application/octet-stream", "binary"),
];

/// Looks up a MIME type by extension, with or without the leading dot.
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    let extension = extension.trim_start_matches('.');
    EXTENSIONS
        .iter()
        .find(|(ext, _)| ext.eq_ignore_ascii_case(extension))
        .map(|(_, mime)| *mime)
}

pub fn mime_for_file_name(file_name: &str) -> Option<&'static str> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(mime_for_extension)
}

/// Infers a MIME type from the leading bytes of a payload.
pub fn sniff_bytes(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, 0x50]) {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8]) {
        "image/jpeg"
    } else if bytes.starts_with(b"%PDF") {
        "application/pdf"
    } else {
        APPLICATION_OCTET_STREAM
    }
}

/// Strips parameters: `text/html; charset=utf-8` -> `text/html`.
pub fn essence(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
}

/// Coarse category of a content type for request inspectors.
pub fn friendly_content_type(content_type: &str) -> &'static str {
    let mime = essence(content_type);
    if mime.is_empty() {
        return "other";
    }

    if let Some((_, friendly)) = FRIENDLY.iter().find(|(m, _)| m.eq_ignore_ascii_case(mime)) {
        return friendly;
    }

    let lower = mime.to_ascii_lowercase();
    if lower.starts_with("image/") {
        "texture"
    } else if lower.starts_with("video/") || lower.starts_with("audio/") {
        "media"
    } else if lower.starts_with("text/") {
        "text"
    } else {
        "other"
    }
}

#[cfg(test)]
mod tests {
    use super::{essence, friendly_content_type, mime_for_extension, mime_for_file_name, sniff_bytes};

    #[test]
    fn extension_lookup_is_case_insensitive() {
        assert_eq!(mime_for_extension(".PNG"), Some("image/png"));
        assert_eq!(mime_for_extension("jfif"), Some("image/jpeg"));
        assert_eq!(mime_for_file_name("report.final.pdf"), Some("application/pdf"));
        assert_eq!(mime_for_file_name("archive"), None);
        assert_eq!(mime_for_extension("exe"), None);
    }

    #[test]
    fn sniffs_magic_numbers() {
        assert_eq!(sniff_bytes(&[0x89, 0x50, 0x4E, 0x47]), "image/png");
        assert_eq!(sniff_bytes(&[0xFF, 0xD8, 0xFF]), "image/jpeg");
        assert_eq!(sniff_bytes(b"%PDF-1.7"), "application/pdf");
        assert_eq!(sniff_bytes(&[0x00, 0x01]), "application/octet-stream");
        assert_eq!(sniff_bytes(&[]), "application/octet-stream");
    }

    #[test]
    fn friendly_classification() {
        assert_eq!(essence("text/html; charset=utf-8"), "text/html");
        assert_eq!(friendly_content_type("application/json; charset=utf-8"), "json");
        assert_eq!(friendly_content_type("image/webp"), "texture");
        assert_eq!(friendly_content_type("audio/flac"), "media");
        assert_eq!(friendly_content_type("text/markdown"), "text");
        assert_eq!(friendly_content_type(""), "other");
        assert_eq!(friendly_content_type("application/zip"), "other");
    }
}
