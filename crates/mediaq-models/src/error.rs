//! Model validation errors.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Field `{0}` must not be empty")]
    EmptyField(&'static str),

    #[error("filePath must be absolute: {0}")]
    RelativeFilePath(String),

    #[error("Unsafe fileName {name:?}: {reason}")]
    UnsafeFileName { name: String, reason: &'static str },
}

impl ModelError {
    pub fn unsafe_file_name(name: impl Into<String>, reason: &'static str) -> Self {
        Self::UnsafeFileName {
            name: name.into(),
            reason,
        }
    }
}
