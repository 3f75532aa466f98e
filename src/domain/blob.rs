//! Normalized blob paths and stored blob-reference parsing.

use std::fmt;

use url::Url;

use super::error::DomainError;

/// A relative object path shared by the fast-cache key, the blob-store key and
/// the image-host URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobPath(String);

impl BlobPath {
    /// Strips leading slashes and rejects empty or escaping paths.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim().trim_start_matches('/');
        let escapes = trimmed.split('/').any(|segment| segment == "..");
        if trimmed.is_empty() || escapes || trimmed.contains(['\\', '\0']) {
            return Err(DomainError::invalid_blob_path(raw));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Interprets a stored `thumb_url`/`poster_url` value.
    ///
    /// Returns `Ok(None)` for values that carry no reference (empty or `/`).
    pub fn from_reference(reference: &str) -> Result<Option<Self>, DomainError> {
        let reference = reference.trim();
        if reference.is_empty() || reference == "/" {
            return Ok(None);
        }

        if reference.starts_with("http://") || reference.starts_with("https://") {
            let url = Url::parse(reference)
                .map_err(|_| DomainError::unrecognized_reference(reference))?;
            return Self::parse(url.path())
                .map(Some)
                .map_err(|_| DomainError::unrecognized_reference(reference));
        }

        if reference.starts_with("upload/") || reference.starts_with("/upload/") {
            return Self::parse(reference).map(Some);
        }

        Err(DomainError::unrecognized_reference(reference))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute URL of this path on the image host.
    pub fn origin_url(&self, image_host: &str) -> String {
        format!("{}/{}", image_host.trim_end_matches('/'), self.0)
    }
}

impl fmt::Display for BlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BlobPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
