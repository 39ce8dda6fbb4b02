//! Sanitization of job-supplied `fileName` values.
//!
//! A `fileName` may carry a virtual subfolder (`user/42/clip.mp4`). Before it is
//! turned into a filesystem path it must be proven to stay inside the staging
//! root, so anything that could escape it is rejected here.

use std::path::{Component, Path, PathBuf};

use crate::encoding::{thumbnail_key, THUMBNAIL_SUFFIX};
use crate::error::{ModelError, ModelResult};

/// A `fileName` that is safe to mirror under a local directory.
///
/// Accepted names are used verbatim: the object key is always
/// `thumbnails/<fileName>_thumb.jpg` for exactly the `fileName` received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeFileName {
    name: String,
    /// `/`-separated segments, last one is the file itself.
    segments: Vec<String>,
}

impl SafeFileName {
    /// Validate a raw `fileName`.
    pub fn parse(raw: &str) -> ModelResult<Self> {
        if raw.is_empty() {
            return Err(ModelError::EmptyField("fileName"));
        }
        if raw.contains('\0') {
            return Err(ModelError::unsafe_file_name(raw, "contains a NUL byte"));
        }
        if raw.contains('\\') {
            return Err(ModelError::unsafe_file_name(raw, "contains a backslash"));
        }
        if raw.starts_with('/') {
            return Err(ModelError::unsafe_file_name(raw, "is absolute"));
        }
        if raw.ends_with('/') {
            return Err(ModelError::unsafe_file_name(raw, "names a directory"));
        }

        let mut segments = Vec::new();
        for (i, segment) in raw.split('/').enumerate() {
            if i == 0 && is_drive_prefix(segment) {
                return Err(ModelError::unsafe_file_name(raw, "is absolute"));
            }
            let mut components = Path::new(segment).components();
            match (components.next(), components.next()) {
                (Some(Component::Normal(_)), None) => segments.push(segment.to_string()),
                (None, _) => {
                    return Err(ModelError::unsafe_file_name(raw, "has an empty segment"));
                }
                (Some(Component::CurDir), None) => {
                    return Err(ModelError::unsafe_file_name(raw, "contains a `.` segment"));
                }
                (Some(Component::ParentDir), None) => {
                    return Err(ModelError::unsafe_file_name(raw, "contains `..`"));
                }
                _ => return Err(ModelError::unsafe_file_name(raw, "is absolute")),
            }
        }

        Ok(Self {
            name: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Virtual subfolder as a relative path (empty for a bare name).
    pub fn subfolder(&self) -> PathBuf {
        self.segments[..self.segments.len() - 1].iter().collect()
    }

    /// Final component of the name.
    pub fn file_name(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    /// File name without its last extension.
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        Path::new(name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(name)
    }

    /// Local thumbnail path relative to a staging root:
    /// `<subfolder>/<stem>_thumb.jpg`.
    pub fn local_thumbnail_path(&self) -> PathBuf {
        self.subfolder()
            .join(format!("{}{}", self.stem(), THUMBNAIL_SUFFIX))
    }

    /// Object key of the derived thumbnail.
    pub fn thumbnail_key(&self) -> String {
        thumbnail_key(&self.name)
    }
}

/// `C:` style drive prefix.
fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_name() {
        let name = SafeFileName::parse("clip.mp4").unwrap();
        assert_eq!(name.as_str(), "clip.mp4");
        assert_eq!(name.subfolder(), PathBuf::new());
        assert_eq!(name.stem(), "clip");
        assert_eq!(name.local_thumbnail_path(), PathBuf::from("clip_thumb.jpg"));
        assert_eq!(name.thumbnail_key(), "thumbnails/clip.mp4_thumb.jpg");
    }

    #[test]
    fn test_virtual_subfolder() {
        let name = SafeFileName::parse("users/42/holiday.final.mov").unwrap();
        assert_eq!(name.subfolder(), PathBuf::from("users/42"));
        assert_eq!(name.stem(), "holiday.final");
        assert_eq!(
            name.local_thumbnail_path(),
            PathBuf::from("users/42/holiday.final_thumb.jpg")
        );
        assert_eq!(
            name.thumbnail_key(),
            "thumbnails/users/42/holiday.final.mov_thumb.jpg"
        );
    }

    #[test]
    fn test_non_canonical_names_rejected() {
        for raw in ["./a/b.mp4", "a/./b.mp4", "a//b.mp4", "."] {
            let err = SafeFileName::parse(raw).unwrap_err();
            assert!(
                matches!(err, ModelError::UnsafeFileName { .. }),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_key_is_built_from_name_verbatim() {
        for raw in ["clip.mp4", "users/42/clip.mp4", "a b/.hidden.mov", "x/y/z"] {
            let name = SafeFileName::parse(raw).unwrap();
            assert_eq!(name.as_str(), raw);
            assert_eq!(name.thumbnail_key(), format!("thumbnails/{}_thumb.jpg", raw));
        }
    }

    #[test]
    fn test_parent_dir_rejected() {
        for raw in ["../etc/passwd", "a/../../b.mp4", "a/.."] {
            let err = SafeFileName::parse(raw).unwrap_err();
            assert!(
                matches!(err, ModelError::UnsafeFileName { .. }),
                "{raw} should be rejected"
            );
        }
    }

    #[test]
    fn test_absolute_and_odd_names_rejected() {
        assert!(SafeFileName::parse("/etc/passwd").is_err());
        assert!(SafeFileName::parse("dir\\clip.mp4").is_err());
        assert!(SafeFileName::parse("dir/").is_err());
        assert!(SafeFileName::parse("C:/video.mp4").is_err());
        assert!(SafeFileName::parse(".").is_err());
        assert_eq!(
            SafeFileName::parse("").unwrap_err(),
            ModelError::EmptyField("fileName")
        );
    }

    #[test]
    fn test_extensionless_name() {
        let name = SafeFileName::parse("raw/recording").unwrap();
        assert_eq!(name.stem(), "recording");
        assert_eq!(
            name.local_thumbnail_path(),
            PathBuf::from("raw/recording_thumb.jpg")
        );
    }
}
