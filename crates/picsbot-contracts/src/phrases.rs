use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rand::seq::SliceRandom;

const DEFAULT_PHRASES_JSON: &str = include_str!("../resources/phrases.json");

#[derive(Debug, thiserror::Error)]
pub enum PhraseError {
    #[error("failed to read phrase data {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid phrase data: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("phrase data defines no categories")]
    Empty,
}

/// Overlay phrases grouped by category keyword.
///
/// The document is a JSON object mapping each category to a list of
/// phrases. Keys are matched case-insensitively; blank phrases and
/// categories without phrases are dropped.
#[derive(Debug, Clone, Default)]
pub struct PhraseBook {
    categories: IndexMap<String, Vec<String>>,
}

impl PhraseBook {
    pub fn embedded() -> Self {
        Self::from_json(DEFAULT_PHRASES_JSON).unwrap_or_default()
    }

    pub fn load(path: &Path) -> Result<Self, PhraseError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PhraseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, PhraseError> {
        let parsed: IndexMap<String, Vec<String>> = serde_json::from_str(raw)?;
        let mut categories: IndexMap<String, Vec<String>> = IndexMap::new();
        for (name, phrases) in parsed {
            let key = name.trim().to_lowercase();
            if key.is_empty() {
                continue;
            }
            let phrases = phrases
                .into_iter()
                .map(|phrase| phrase.trim().to_string())
                .filter(|phrase| !phrase.is_empty());
            categories.entry(key).or_default().extend(phrases);
        }
        categories.retain(|_, phrases| !phrases.is_empty());
        if categories.is_empty() {
            return Err(PhraseError::Empty);
        }
        Ok(Self { categories })
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn phrases(&self, category: &str) -> Option<&[String]> {
        self.categories
            .get(&category.trim().to_lowercase())
            .map(Vec::as_slice)
    }

    pub fn random_phrase(&self, category: &str) -> Option<&str> {
        self.phrases(category)?
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}
