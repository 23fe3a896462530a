use std::sync::atomic::{AtomicUsize, Ordering};

use rand::seq::SliceRandom;
use tracing::{debug, warn};

use super::{ImageProvider, ImageRef, SearchError};

pub const RANDOM_TOPICS: &[&str] = &[
    "nature",
    "city",
    "abstract",
    "people",
    "animals",
    "food",
    "travel",
    "space",
    "art",
    "technology",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RotationError {
    #[error("no image providers configured")]
    NoProviders,
}

/// Round-robin cursor over a fixed, non-empty provider list.
///
/// Every mutation wraps modulo the list length, so concurrent callers may
/// visit a provider twice in one round but never observe an invalid index.
#[derive(Debug)]
pub struct RotationState {
    current: AtomicUsize,
    len: usize,
}

impl RotationState {
    pub fn new(len: usize) -> Result<Self, RotationError> {
        if len == 0 {
            return Err(RotationError::NoProviders);
        }
        Ok(Self {
            current: AtomicUsize::new(0),
            len,
        })
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns the index to try now and moves the cursor to the next one.
    pub fn advance(&self) -> usize {
        let len = self.len;
        match self
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |index| {
                Some((index + 1) % len)
            }) {
            Ok(previous) | Err(previous) => previous % len,
        }
    }
}

pub struct ProviderRotator {
    providers: Vec<Box<dyn ImageProvider>>,
    state: RotationState,
}

impl ProviderRotator {
    pub fn new(providers: Vec<Box<dyn ImageProvider>>) -> Result<Self, RotationError> {
        let state = RotationState::new(providers.len())?;
        Ok(Self { providers, state })
    }

    pub fn names(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|provider| provider.name().to_string())
            .collect()
    }

    pub fn current_index(&self) -> usize {
        self.state.current()
    }

    /// Tries each provider at most once, starting at the cursor. The cursor
    /// advances after every attempt whatever its outcome.
    pub fn get_image(&self, search_term: Option<&str>) -> Option<ImageRef> {
        let query = match search_term.map(str::trim).filter(|value| !value.is_empty()) {
            Some(term) => term.to_string(),
            None => random_topic().to_string(),
        };

        for _ in 0..self.state.len() {
            let provider = &self.providers[self.state.advance()];
            match provider.search(&query) {
                Ok(image) => {
                    debug!(provider = provider.name(), query = %query, "image found");
                    return Some(image);
                }
                Err(SearchError::RateLimited) => {
                    warn!(provider = provider.name(), "provider rate limited; rotating");
                }
                Err(SearchError::NotFound) => {
                    debug!(provider = provider.name(), query = %query, "no results; rotating");
                }
                Err(SearchError::Transport(reason)) => {
                    warn!(provider = provider.name(), error = %reason, "provider request failed; rotating");
                }
            }
        }

        warn!(query = %query, providers = self.state.len(), "all providers exhausted");
        None
    }
}

fn random_topic() -> &'static str {
    RANDOM_TOPICS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("nature")
}
