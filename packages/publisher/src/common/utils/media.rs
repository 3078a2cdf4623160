//! Media type helpers for uploaded post assets.

use std::path::Path;

/// Extensions accepted for post images, with their MIME types.
const IMAGE_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
];

/// Longest extension the `files.ext` column accepts.
pub const MAX_EXT_LEN: usize = 30;

/// Extension of a file reference, without the dot. `None` when there is none.
pub fn file_extension(reference: &str) -> Option<String> {
    Path::new(reference)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_string())
}

/// MIME type for a supported image extension (case-insensitive).
pub fn image_content_type(ext: &str) -> Option<&'static str> {
    let ext = ext.to_ascii_lowercase();
    IMAGE_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
}
