pub mod compose;
pub mod fetch;
pub mod gateway;
pub mod providers;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use picsbot_contracts::cache::{new_blob_id, BlobStore};
use picsbot_contracts::chat::{find_button, ImageRequest, OverlayText, QueryParser, BUTTON_ACTIONS};
use picsbot_contracts::phrases::PhraseBook;
use picsbot_contracts::providers::{ImageRef, ProviderRotator, RotationError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::compose::RasterCompositor;
use crate::fetch::HttpFetcher;
use crate::gateway::{CompositeOp, CompositorGateway, MaterializeError};
use crate::providers::{build_providers, clamp_provider_timeout, http_client, ProviderCredentials};

/// One inline-query answer candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub id: String,
    pub full_url: String,
    pub thumb_url: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ButtonError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("Couldn't find a picture. Try again later!")]
    NoImage,
    #[error("Couldn't put the picture together. Try again later!")]
    ComposeFailed,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("no provider returned an image")]
    NoSource,
    #[error("category {0} has no phrases")]
    NoPhrase(String),
    #[error(transparent)]
    Materialize(#[from] MaterializeError),
}

impl From<ExecuteError> for ButtonError {
    fn from(err: ExecuteError) -> Self {
        match err {
            ExecuteError::Materialize(MaterializeError::Compose(_)) => ButtonError::ComposeFailed,
            _ => ButtonError::NoImage,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Rotation(#[from] RotationError),
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to load overlay font {path}: {reason}")]
    Font { path: PathBuf, reason: String },
    #[error("phrase data has no {category:?} category, which the {action} button needs")]
    MissingButtonCategory {
        action: &'static str,
        category: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub credentials: ProviderCredentials,
    pub provider_timeout: Duration,
    /// Scheme and host that served `/image/{id}` URLs are built on.
    pub public_base_url: String,
    pub phrases: PhraseBook,
    /// Overrides the bundled caption font.
    pub font_path: Option<PathBuf>,
}

/// Turns free-text queries and button presses into deliverable images.
///
/// Plain requests hand back provider URLs untouched. Every other mode
/// downloads its sources, composites them and answers with URLs served out
/// of the blob cache.
pub struct PicEngine {
    parser: QueryParser,
    rotator: ProviderRotator,
    gateway: CompositorGateway,
    phrases: PhraseBook,
}

impl PicEngine {
    pub fn new(rotator: ProviderRotator, gateway: CompositorGateway, phrases: PhraseBook) -> Self {
        Self {
            parser: QueryParser::new(phrases.categories()),
            rotator,
            gateway,
            phrases,
        }
    }

    /// Wires the live providers, downloader and compositor. Blocking HTTP
    /// clients are created here, so call it outside of an async context.
    pub fn build(config: EngineConfig, cache: Arc<dyn BlobStore>) -> Result<Self, EngineError> {
        check_button_categories(&config.phrases)?;
        let http = http_client(clamp_provider_timeout(config.provider_timeout))?;
        let rotator = ProviderRotator::new(build_providers(&config.credentials, &http))?;

        let compositor = match &config.font_path {
            Some(path) => {
                let font = RasterCompositor::load_font(path).map_err(|err| EngineError::Font {
                    path: path.clone(),
                    reason: err.to_string(),
                })?;
                RasterCompositor::new(Some(font))
            }
            None => RasterCompositor::default(),
        };

        let gateway = CompositorGateway::new(
            Box::new(HttpFetcher::new(http)),
            Box::new(compositor),
            cache,
            config.public_base_url,
        );
        let engine = Self::new(rotator, gateway, config.phrases);
        info!(
            providers = ?engine.provider_names(),
            categories = engine.phrases.len(),
            "engine ready"
        );
        Ok(engine)
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.rotator.names()
    }

    pub fn cache(&self) -> &Arc<dyn BlobStore> {
        self.gateway.cache()
    }

    pub fn parse(&self, raw: &str) -> ImageRequest {
        self.parser.parse(raw)
    }

    /// Answers an inline query. Every failure collapses into an empty list.
    pub fn handle_query(&self, raw: &str) -> Vec<QueryResult> {
        let request = self.parse(raw);
        debug!(query = %raw, mode = ?request.mode(), "query parsed");
        match self.execute(&request) {
            Ok(image) => vec![QueryResult {
                id: new_blob_id(),
                full_url: image.full_url,
                thumb_url: image.thumb_url,
                title: result_title(&request),
                description: result_description(&request),
            }],
            Err(err) => {
                warn!(query = %raw, error = %err, "query produced no image");
                Vec::new()
            }
        }
    }

    pub fn handle_button(&self, action: &str) -> Result<ImageRef, ButtonError> {
        let button = find_button(action).ok_or_else(|| ButtonError::UnknownAction(action.to_string()))?;
        let request = self.parse(button.query);
        self.execute(&request).map_err(|err| {
            warn!(action, error = %err, "button produced no image");
            ButtonError::from(err)
        })
    }

    pub fn execute(&self, request: &ImageRequest) -> Result<ImageRef, ExecuteError> {
        let search_term = request.search_term();
        let (op, sources) = match request {
            ImageRequest::Plain { .. } => {
                return self
                    .rotator
                    .get_image(search_term)
                    .ok_or(ExecuteError::NoSource)
            }
            ImageRequest::Collage { count, .. } => (
                CompositeOp::Collage,
                self.collect_sources(*count, search_term)?,
            ),
            ImageRequest::Overlay { text, .. } => (
                CompositeOp::Overlay(text.clone()),
                self.collect_sources(1, search_term)?,
            ),
            ImageRequest::CollageWithText { count, overlay, .. } => (
                CompositeOp::CollageWithText(self.resolve_overlay(overlay)?),
                self.collect_sources(*count, search_term)?,
            ),
            ImageRequest::CategoryPhrase { category, .. } => (
                CompositeOp::Overlay(
                    self.resolve_overlay(&OverlayText::Category(category.clone()))?,
                ),
                self.collect_sources(1, search_term)?,
            ),
        };
        Ok(self.gateway.materialize(&op, &sources)?)
    }

    fn collect_sources(
        &self,
        count: u8,
        search_term: Option<&str>,
    ) -> Result<Vec<ImageRef>, ExecuteError> {
        let sources: Vec<ImageRef> = (0..count)
            .filter_map(|_| self.rotator.get_image(search_term))
            .collect();
        if sources.is_empty() {
            return Err(ExecuteError::NoSource);
        }
        if sources.len() < usize::from(count) {
            warn!(wanted = count, found = sources.len(), "fewer source images than requested");
        }
        Ok(sources)
    }

    fn resolve_overlay(&self, overlay: &OverlayText) -> Result<String, ExecuteError> {
        match overlay {
            OverlayText::Literal(text) => Ok(text.clone()),
            OverlayText::Category(category) => self
                .phrases
                .random_phrase(category)
                .map(str::to_string)
                .ok_or_else(|| ExecuteError::NoPhrase(category.clone())),
        }
    }
}

/// Buttons that draw a phrase need their category in the loaded data;
/// otherwise the query would silently parse as a plain photo search.
pub fn check_button_categories(phrases: &PhraseBook) -> Result<(), EngineError> {
    for button in BUTTON_ACTIONS {
        if let Some(category) = button.category {
            if phrases.phrases(category).is_none() {
                return Err(EngineError::MissingButtonCategory {
                    action: button.action,
                    category,
                });
            }
        }
    }
    Ok(())
}

fn result_title(request: &ImageRequest) -> String {
    match request {
        ImageRequest::Plain { search_term: None } => "Random picture".to_string(),
        ImageRequest::Plain {
            search_term: Some(term),
        } => format!("Picture: {term}"),
        ImageRequest::Collage { count, .. } | ImageRequest::CollageWithText { count, .. } => {
            format!("Collage of {count}")
        }
        ImageRequest::Overlay { text, .. } => format!("Text: {text}"),
        ImageRequest::CategoryPhrase { category, .. } => format!("Phrase: {category}"),
    }
}

fn result_description(request: &ImageRequest) -> String {
    match request.search_term() {
        Some(term) => format!("Search: {term}"),
        None => "Random topic".to_string(),
    }
}
