//! Filename-extension <-> content-type mapping. Pure functions, no I/O.
//!
//! Grounded on the teacher's `get_mime_type`/`get_ext_from_content_type`
//! (`src/http/response.rs`), extended with a few more common types and a
//! documented fallback for each direction.

/// Maps a lowercase extension (without the leading dot) to a content type.
/// Unknown extensions fall back to `application/octet-stream`.
pub fn mime_for_extension(extension: Option<&str>) -> &'static str {
    match extension.map(|e| e.to_ascii_lowercase()).as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "application/javascript",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("txt") => "text/plain; charset=utf-8",
        Some("csv") => "text/csv; charset=utf-8",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// Maps a file's extension (as returned by `Path::extension`) to a mime
/// type; convenience wrapper over `mime_for_extension` for `Option<&OsStr>`-free
/// callers that already hold a `&str`.
pub fn mime_for_path(path: &std::path::Path) -> &'static str {
    mime_for_extension(path.extension().and_then(|e| e.to_str()))
}

/// Reverse of `mime_for_extension`: used when a generated filename needs
/// an extension derived from a request's `Content-Type` (§4.9 POST-to-directory).
/// Content types with no known extension, and the type-less case itself,
/// resolve to the generic `.bin` suffix (Open Question, resolved in
/// SPEC_FULL.md §9: "Content-Type-less POST-to-directory upload uses a
/// generic `.bin` extension").
pub fn extension_for_mime(content_type: &str) -> &'static str {
    let base = content_type.split(';').next().unwrap_or(content_type).trim();
    match base {
        "text/html" => ".html",
        "text/css" => ".css",
        "text/javascript" | "application/javascript" => ".js",
        "application/json" => ".json",
        "application/xml" | "text/xml" => ".xml",
        "text/plain" => ".txt",
        "text/csv" => ".csv",
        "image/png" => ".png",
        "image/jpeg" => ".jpg",
        "image/gif" => ".gif",
        "image/svg+xml" => ".svg",
        "image/webp" => ".webp",
        "application/pdf" => ".pdf",
        "application/zip" => ".zip",
        "audio/mpeg" => ".mp3",
        "video/mp4" => ".mp4",
        _ => ".bin",
    }
}
