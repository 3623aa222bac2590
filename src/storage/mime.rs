//! Content-type to file-extension lookup

/// Extension used when a content type is missing or unknown
pub const FALLBACK_EXTENSION: &str = "bin";

/// Maps a `Content-Type` value to a file extension (without the dot).
///
/// Implementations must be pure and total. An empty string means "append no
/// extension".
pub trait ExtensionLookup: Send + Sync {
    fn extension_for(&self, content_type: &str) -> String;
}

/// Built-in table of common web content types
#[derive(Clone, Copy, Debug, Default)]
pub struct MimeExtensions;

const TABLE: &[(&str, &str)] = &[
    ("text/html", "html"),
    ("application/xhtml+xml", "xhtml"),
    ("text/css", "css"),
    ("text/javascript", "js"),
    ("application/javascript", "js"),
    ("application/x-javascript", "js"),
    ("application/json", "json"),
    ("application/ld+json", "jsonld"),
    ("application/manifest+json", "webmanifest"),
    ("application/xml", "xml"),
    ("text/xml", "xml"),
    ("application/rss+xml", "rss"),
    ("application/atom+xml", "atom"),
    ("text/plain", "txt"),
    ("text/csv", "csv"),
    ("text/markdown", "md"),
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/pjpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/svg+xml", "svg"),
    ("image/webp", "webp"),
    ("image/avif", "avif"),
    ("image/bmp", "bmp"),
    ("image/x-icon", "ico"),
    ("image/vnd.microsoft.icon", "ico"),
    ("font/woff", "woff"),
    ("font/woff2", "woff2"),
    ("application/font-woff", "woff"),
    ("font/ttf", "ttf"),
    ("font/otf", "otf"),
    ("application/pdf", "pdf"),
    ("application/zip", "zip"),
    ("application/gzip", "gz"),
    ("application/wasm", "wasm"),
    ("audio/mpeg", "mp3"),
    ("audio/ogg", "ogg"),
    ("audio/wav", "wav"),
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("video/ogg", "ogv"),
    ("application/octet-stream", "bin"),
];

impl ExtensionLookup for MimeExtensions {
    fn extension_for(&self, content_type: &str) -> String {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        TABLE
            .iter()
            .find(|(mime, _)| *mime == essence)
            .map(|(_, ext)| *ext)
            .unwrap_or(FALLBACK_EXTENSION)
            .to_string()
    }
}
