//! Ephemeral storage for generated images.
//!
//! Generated images only exist as bytes, while the messaging platform only
//! accepts URLs. Blobs are parked here under opaque ids, served over HTTP,
//! and swept once their retention window has passed.

mod memory;

use std::time::{Duration, Instant};

use bytes::Bytes;

pub use memory::InMemoryBlobCache;

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Thumbnail ids are the full-image id behind this prefix.
pub const THUMB_PREFIX: &str = "thumb_";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("blob not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub id: String,
    pub bytes: Bytes,
    pub created_at: Instant,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant, retention: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > retention
    }
}

/// Id store for generated blobs. Implementations must be safe to share
/// between request handlers and the background reaper.
pub trait BlobStore: Send + Sync {
    fn put(&self, id: &str, bytes: Bytes);

    fn get(&self, id: &str) -> Result<Bytes, CacheError>;

    /// Drops every entry older than the retention window at `now` and
    /// returns how many were removed.
    fn reap_expired(&self, now: Instant) -> usize;

    fn len(&self) -> usize;

    fn retention(&self) -> Duration;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn reap(&self) -> usize {
        self.reap_expired(Instant::now())
    }
}

pub fn new_blob_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn thumb_id_for(full_id: &str) -> String {
    format!("{THUMB_PREFIX}{full_id}")
}
