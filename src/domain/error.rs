use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("request validation failed: {message}")]
    Validation { message: String },
    #[error("blob path `{path}` is not a valid object path")]
    InvalidBlobPath { path: String },
    #[error("blob reference `{reference}` has an unrecognized format")]
    UnrecognizedReference { reference: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn invalid_blob_path(path: impl Into<String>) -> Self {
        Self::InvalidBlobPath { path: path.into() }
    }

    pub fn unrecognized_reference(reference: impl Into<String>) -> Self {
        Self::UnrecognizedReference {
            reference: reference.into(),
        }
    }
}
