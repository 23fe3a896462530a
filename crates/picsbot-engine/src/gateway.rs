use std::sync::Arc;

use bytes::Bytes;
use picsbot_contracts::cache::{new_blob_id, thumb_id_for, BlobStore};
use picsbot_contracts::providers::ImageRef;
use tracing::{debug, warn};

use crate::compose::{ComposeError, Composite, Compositor};
use crate::fetch::ImageFetcher;

/// Fewest successful downloads a composite proceeds with.
pub const MIN_SOURCE_IMAGES: usize = 1;

#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    #[error("no source image could be downloaded")]
    NoDownloads,
    #[error("compositing failed: {0}")]
    Compose(#[from] ComposeError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositeOp {
    Overlay(String),
    Collage,
    CollageWithText(String),
}

/// Turns source images into composites parked in the blob cache, and hands
/// back URLs that point at this service's `/image/{id}` route.
pub struct CompositorGateway {
    fetcher: Box<dyn ImageFetcher>,
    compositor: Box<dyn Compositor>,
    cache: Arc<dyn BlobStore>,
    public_base_url: String,
}

impl CompositorGateway {
    pub fn new(
        fetcher: Box<dyn ImageFetcher>,
        compositor: Box<dyn Compositor>,
        cache: Arc<dyn BlobStore>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            compositor,
            cache,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn cache(&self) -> &Arc<dyn BlobStore> {
        &self.cache
    }

    pub fn served_url(&self, id: &str) -> String {
        format!("{}/image/{}", self.public_base_url, id)
    }

    pub fn materialize(
        &self,
        op: &CompositeOp,
        sources: &[ImageRef],
    ) -> Result<ImageRef, MaterializeError> {
        let downloads = self.download_all(op, sources);
        if downloads.len() < MIN_SOURCE_IMAGES {
            return Err(MaterializeError::NoDownloads);
        }

        let composite = match op {
            CompositeOp::Overlay(text) => self.compositor.overlay(&downloads[0], text)?,
            CompositeOp::Collage => self.compositor.collage(&downloads, None)?,
            CompositeOp::CollageWithText(text) => self.compositor.collage(&downloads, Some(text))?,
        };
        Ok(self.store(composite))
    }

    fn download_all(&self, op: &CompositeOp, sources: &[ImageRef]) -> Vec<Vec<u8>> {
        let wanted = match op {
            CompositeOp::Overlay(_) => 1,
            _ => sources.len(),
        };
        let mut downloads = Vec::with_capacity(wanted);
        for source in sources {
            if downloads.len() == wanted {
                break;
            }
            match self.fetcher.download(&source.full_url) {
                Ok(bytes) => downloads.push(bytes),
                Err(err) => {
                    warn!(url = %source.full_url, error = %err, "source download failed");
                }
            }
        }
        downloads
    }

    fn store(&self, composite: Composite) -> ImageRef {
        let id = new_blob_id();
        let thumb_id = thumb_id_for(&id);
        self.cache.put(&id, Bytes::from(composite.full));
        self.cache.put(&thumb_id, Bytes::from(composite.thumb));
        debug!(id = %id, "composite stored");
        ImageRef::new(self.served_url(&id), self.served_url(&thumb_id))
    }
}
