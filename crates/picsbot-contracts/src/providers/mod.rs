mod rotation;

pub use rotation::{ProviderRotator, RotationError, RotationState, RANDOM_TOPICS};

/// A full-size image and its thumbnail, both dereferenceable by URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub full_url: String,
    pub thumb_url: String,
}

impl ImageRef {
    pub fn new(full_url: impl Into<String>, thumb_url: impl Into<String>) -> Self {
        Self {
            full_url: full_url.into(),
            thumb_url: thumb_url.into(),
        }
    }

    /// Builds a ref only when both URLs are present and non-blank.
    pub fn from_parts(full_url: Option<&str>, thumb_url: Option<&str>) -> Option<Self> {
        let full_url = full_url.map(str::trim).filter(|value| !value.is_empty())?;
        let thumb_url = thumb_url.map(str::trim).filter(|value| !value.is_empty())?;
        Some(Self::new(full_url, thumb_url))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    #[error("rate limited")]
    RateLimited,
    #[error("no image found")]
    NotFound,
    #[error("transport error: {0}")]
    Transport(String),
}

pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    fn search(&self, query: &str) -> Result<ImageRef, SearchError>;
}

#[cfg(test)]
mod tests {
    use super::ImageRef;

    #[test]
    fn from_parts_requires_both_urls() {
        assert_eq!(
            ImageRef::from_parts(Some("https://a/full.jpg"), Some(" https://a/t.jpg ")),
            Some(ImageRef::new("https://a/full.jpg", "https://a/t.jpg"))
        );
        assert_eq!(ImageRef::from_parts(Some("https://a/full.jpg"), None), None);
        assert_eq!(ImageRef::from_parts(Some("  "), Some("https://a/t.jpg")), None);
    }
}
