use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use picsbot_contracts::cache::BlobStore;
use picsbot_engine::PicEngine;
use tower_http::trace::TraceLayer;

use crate::handler;
use crate::telegram::{self, TelegramHook};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<PicEngine>,
    pub cache: Arc<dyn BlobStore>,
    pub telegram: Option<TelegramHook>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: Arc<PicEngine>, telegram: Option<TelegramHook>) -> Self {
        let cache = Arc::clone(engine.cache());
        Self {
            engine,
            cache,
            telegram,
            started_at: Utc::now(),
        }
    }
}

/// Build the axum router. The webhook route only exists when a bot is wired.
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(handler::status_handler))
        .route("/health", get(handler::health_handler))
        .route(
            "/image/:id",
            get(handler::image_handler).head(handler::image_head_handler),
        );
    if state.telegram.is_some() {
        router = router.route("/webhook/:token", post(telegram::webhook_handler));
    }
    router.layer(TraceLayer::new_for_http()).with_state(state)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use bytes::Bytes;
    use picsbot_contracts::cache::{BlobStore, InMemoryBlobCache};
    use picsbot_contracts::phrases::PhraseBook;
    use picsbot_contracts::providers::{ImageProvider, ImageRef, ProviderRotator, SearchError};
    use picsbot_engine::compose::RasterCompositor;
    use picsbot_engine::fetch::ImageFetcher;
    use picsbot_engine::gateway::CompositorGateway;
    use picsbot_engine::PicEngine;
    use tower::ServiceExt;

    use super::{build_router, AppState};
    use crate::telegram::tests::RecordingBot;
    use crate::telegram::TelegramHook;

    struct StockProvider {
        healthy: bool,
        served: AtomicUsize,
    }

    impl ImageProvider for StockProvider {
        fn name(&self) -> &str {
            "stock"
        }

        fn search(&self, _query: &str) -> Result<ImageRef, SearchError> {
            if !self.healthy {
                return Err(SearchError::RateLimited);
            }
            let idx = self.served.fetch_add(1, Ordering::SeqCst);
            Ok(ImageRef::new(
                format!("https://img.test/{idx}.jpg"),
                format!("https://img.test/{idx}-t.jpg"),
            ))
        }
    }

    struct OfflineFetcher;

    impl ImageFetcher for OfflineFetcher {
        fn download(&self, url: &str) -> Result<Vec<u8>> {
            Err(anyhow!("offline: {url}"))
        }
    }

    pub(crate) fn test_engine(healthy: bool) -> (PicEngine, Arc<InMemoryBlobCache>) {
        let provider = StockProvider {
            healthy,
            served: AtomicUsize::new(0),
        };
        let providers: Vec<Box<dyn ImageProvider>> = vec![Box::new(provider)];
        let rotator = ProviderRotator::new(providers).unwrap();
        let cache = Arc::new(InMemoryBlobCache::default());
        let gateway = CompositorGateway::new(
            Box::new(OfflineFetcher),
            Box::new(RasterCompositor::default()),
            cache.clone(),
            "https://bot.test",
        );
        let engine = PicEngine::new(rotator, gateway, PhraseBook::embedded());
        (engine, cache)
    }

    fn app(bot: Option<Arc<RecordingBot>>) -> (Router, Arc<InMemoryBlobCache>) {
        let (engine, cache) = test_engine(true);
        let telegram = bot.map(|bot| TelegramHook {
            token: "123:secret".to_string(),
            username: "picsbot".to_string(),
            bot,
        });
        (build_router(AppState::new(Arc::new(engine), telegram)), cache)
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn unknown_image_is_not_found() {
        let (app, _) = app(None);
        let response = app.oneshot(get("/image/unknown-id")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn cached_image_is_served_with_headers() {
        let (app, cache) = app(None);
        cache.put("abc", Bytes::from_static(b"jpeg-bytes"));

        let response = app.oneshot(get("/image/abc")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=900");
        assert_eq!(body_text(response).await, "jpeg-bytes");
    }

    #[tokio::test]
    async fn head_reports_length_without_body() {
        let (app, cache) = app(None);
        cache.put("abc", Bytes::from_static(b"jpeg-bytes"));
        let request = Request::builder()
            .method(Method::HEAD)
            .uri("/image/abc")
            .body(Body::empty())
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "10");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert!(body_text(response).await.is_empty());

        let missing = Request::builder()
            .method(Method::HEAD)
            .uri("/image/gone")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(missing).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_and_status_pages() {
        let (app, cache) = app(None);
        cache.put("abc", Bytes::from_static(b"x"));

        let health = app.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);
        assert_eq!(body_text(health).await, "OK");

        let status = app.oneshot(get("/")).await.unwrap();
        assert_eq!(status.status(), StatusCode::OK);
        let text = body_text(status).await;
        assert!(text.contains("providers: stock"));
        assert!(text.contains("cached images: 1"));
    }

    #[tokio::test]
    async fn webhook_is_absent_without_bot() {
        let (app, _) = app(None);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/webhook/123:secret")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"update_id": 1}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn webhook_rejects_wrong_token_and_non_json() {
        let bot = Arc::new(RecordingBot::default());
        let (app, _) = app(Some(bot.clone()));

        let wrong_token = Request::builder()
            .method(Method::POST)
            .uri("/webhook/999:guess")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"update_id": 1}"#))
            .unwrap();
        let response = app.clone().oneshot(wrong_token).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let form = Request::builder()
            .method(Method::POST)
            .uri("/webhook/123:secret")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("update"))
            .unwrap();
        let response = app.oneshot(form).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(bot.methods().is_empty());
    }

    #[tokio::test]
    async fn webhook_dispatches_inline_query() {
        let bot = Arc::new(RecordingBot::default());
        let (app, _) = app(Some(bot.clone()));
        let request = Request::builder()
            .method(Method::POST)
            .uri("/webhook/123:secret")
            .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
            .body(Body::from(
                r#"{"update_id": 7, "inline_query": {"id": "q1", "query": "sea"}}"#,
            ))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(bot.methods(), vec!["answerInlineQuery"]);
    }
}
