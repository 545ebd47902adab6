//! Content-type handling for downloaded documents
//!
//! - Normalizing the `Content-Type` header to a bare `type/subtype`
//! - Checking it against the configured allow-list
//! - Choosing a file extension
//! - Turning caller-supplied ids into safe file stems

/// Content type assumed when the response carries none
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Every document type the harvester knows how to name
pub const SUPPORTED_DOCUMENT_TYPES: &[&str] = &[
    "application/pdf",
    "text/html",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/plain",
    "application/rtf",
];

/// Reduces a `Content-Type` header value to `type/subtype`
///
/// Parameters such as `charset` are dropped and the result is lower-cased.
/// A missing or blank header yields [`FALLBACK_CONTENT_TYPE`].
pub fn normalize_content_type(header: Option<&str>) -> String {
    header
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string())
}

/// Returns true if `content_type` is on the allow-list
pub fn is_allowed(allowed: &[String], content_type: &str) -> bool {
    allowed
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(content_type))
}

/// Picks the file extension for a normalized content type
pub fn extension_for(content_type: &str) -> String {
    let known = match content_type {
        "application/pdf" => Some("pdf"),
        "text/html" => Some("html"),
        "application/msword" => Some("doc"),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => Some("docx"),
        "application/vnd.ms-excel" => Some("xls"),
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => Some("xlsx"),
        "text/plain" => Some("txt"),
        "application/rtf" | "text/rtf" => Some("rtf"),
        _ => None,
    };

    known
        .map(str::to_string)
        .or_else(|| {
            mime_guess::get_mime_extensions_str(content_type)
                .and_then(|extensions| extensions.first())
                .map(|ext| ext.to_string())
        })
        .unwrap_or_else(|| "bin".to_string())
}

/// Makes an id safe to use as a file name stem
///
/// Path separators, reserved characters and control characters become `_`,
/// surrounding whitespace and dots are trimmed, and the stem is capped at
/// 200 characters. An id with nothing usable left becomes `"document"`.
pub fn sanitize_file_stem(id: &str) -> String {
    let replaced: String = id
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim().trim_matches('.');
    let stem: String = trimmed.chars().take(200).collect();

    if stem.trim_matches('_').is_empty() {
        "document".to_string()
    } else {
        stem
    }
}
