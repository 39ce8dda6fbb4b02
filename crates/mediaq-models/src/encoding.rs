//! Thumbnail extraction settings and key derivation.

/// Seek offset for the extracted frame.
pub const THUMBNAIL_TIMESTAMP: &str = "00:00:01";
/// JPEG quality passed as `-q:v`.
pub const THUMBNAIL_QUALITY: u8 = 2;
/// Suffix appended to both the local thumbnail and the object key.
pub const THUMBNAIL_SUFFIX: &str = "_thumb.jpg";
/// Object key prefix for derived thumbnails.
pub const THUMBNAIL_KEY_PREFIX: &str = "thumbnails";

/// Object key for the thumbnail derived from `file_name`.
///
/// `thumbnails/<fileName>_thumb.jpg`; the original extension is kept so
/// `clip.mp4` and `clip.mov` never share a key.
pub fn thumbnail_key(file_name: &str) -> String {
    format!("{}/{}{}", THUMBNAIL_KEY_PREFIX, file_name, THUMBNAIL_SUFFIX)
}
