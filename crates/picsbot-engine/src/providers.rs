use std::env;
use std::time::Duration;

use picsbot_contracts::providers::{ImageProvider, ImageRef, SearchError};
use rand::seq::SliceRandom;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde_json::Value;

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(8);
pub const MIN_PROVIDER_TIMEOUT: Duration = Duration::from_secs(5);
pub const MAX_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("picsbot/", env!("CARGO_PKG_VERSION"));
const PIXABAY_MAX_QUERY_CHARS: usize = 100;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub unsplash: Option<String>,
    pub pexels: Option<String>,
    pub pixabay: Option<String>,
}

impl ProviderCredentials {
    pub fn is_empty(&self) -> bool {
        [&self.unsplash, &self.pexels, &self.pixabay]
            .into_iter()
            .all(|value| Self::normalized(value).is_none())
    }

    fn normalized(value: &Option<String>) -> Option<String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

pub fn clamp_provider_timeout(timeout: Duration) -> Duration {
    timeout.clamp(MIN_PROVIDER_TIMEOUT, MAX_PROVIDER_TIMEOUT)
}

pub fn http_client(timeout: Duration) -> reqwest::Result<HttpClient> {
    HttpClient::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
}

/// Providers in rotation order; one per credential present.
pub fn build_providers(
    credentials: &ProviderCredentials,
    http: &HttpClient,
) -> Vec<Box<dyn ImageProvider>> {
    let mut providers: Vec<Box<dyn ImageProvider>> = Vec::new();
    if let Some(key) = ProviderCredentials::normalized(&credentials.unsplash) {
        providers.push(Box::new(UnsplashProvider::new(key, http.clone())));
    }
    if let Some(key) = ProviderCredentials::normalized(&credentials.pexels) {
        providers.push(Box::new(PexelsProvider::new(key, http.clone())));
    }
    if let Some(key) = ProviderCredentials::normalized(&credentials.pixabay) {
        providers.push(Box::new(PixabayProvider::new(key, http.clone())));
    }
    providers
}

struct UnsplashProvider {
    api_base: String,
    access_key: String,
    http: HttpClient,
}

impl UnsplashProvider {
    fn new(access_key: String, http: HttpClient) -> Self {
        Self {
            api_base: api_base_from_env("UNSPLASH_API_BASE", "https://api.unsplash.com"),
            access_key,
            http,
        }
    }

    #[cfg(test)]
    fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn parse_payload(payload: &Value) -> Option<ImageRef> {
        let photo = match payload {
            Value::Array(rows) => rows.first()?,
            other => other,
        };
        let urls = photo.get("urls")?;
        ImageRef::from_parts(
            urls.get("regular").and_then(Value::as_str),
            urls.get("thumb")
                .or_else(|| urls.get("small"))
                .and_then(Value::as_str),
        )
    }
}

impl ImageProvider for UnsplashProvider {
    fn name(&self) -> &str {
        "unsplash"
    }

    fn search(&self, query: &str) -> Result<ImageRef, SearchError> {
        let endpoint = format!("{}/photos/random", self.api_base);
        let response = self
            .http
            .get(&endpoint)
            .query(&[("query", query), ("client_id", self.access_key.as_str())])
            .header("Accept-Version", "v1")
            .send()
            .map_err(|err| transport_error(self.name(), err))?;
        let payload = response_json_or_error(self.name(), response)?;
        Self::parse_payload(&payload).ok_or(SearchError::NotFound)
    }
}

struct PexelsProvider {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl PexelsProvider {
    fn new(api_key: String, http: HttpClient) -> Self {
        Self {
            api_base: api_base_from_env("PEXELS_API_BASE", "https://api.pexels.com"),
            api_key,
            http,
        }
    }

    #[cfg(test)]
    fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn candidates(payload: &Value) -> Vec<ImageRef> {
        payload
            .get("photos")
            .and_then(Value::as_array)
            .map(|photos| {
                photos
                    .iter()
                    .filter_map(|photo| {
                        let src = photo.get("src")?;
                        ImageRef::from_parts(
                            src.get("large").and_then(Value::as_str),
                            src.get("small")
                                .or_else(|| src.get("tiny"))
                                .and_then(Value::as_str),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl ImageProvider for PexelsProvider {
    fn name(&self) -> &str {
        "pexels"
    }

    fn search(&self, query: &str) -> Result<ImageRef, SearchError> {
        let endpoint = format!("{}/v1/search", self.api_base);
        let response = self
            .http
            .get(&endpoint)
            .query(&[("query", query), ("per_page", "15")])
            .header(AUTHORIZATION, &self.api_key)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(|err| transport_error(self.name(), err))?;
        let payload = response_json_or_error(self.name(), response)?;
        pick_random(Self::candidates(&payload))
    }
}

struct PixabayProvider {
    api_base: String,
    api_key: String,
    http: HttpClient,
}

impl PixabayProvider {
    fn new(api_key: String, http: HttpClient) -> Self {
        Self {
            api_base: api_base_from_env("PIXABAY_API_BASE", "https://pixabay.com"),
            api_key,
            http,
        }
    }

    #[cfg(test)]
    fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn candidates(payload: &Value) -> Vec<ImageRef> {
        payload
            .get("hits")
            .and_then(Value::as_array)
            .map(|hits| {
                hits.iter()
                    .filter_map(|hit| {
                        ImageRef::from_parts(
                            hit.get("largeImageURL").and_then(Value::as_str),
                            hit.get("previewURL")
                                .or_else(|| hit.get("webformatURL"))
                                .and_then(Value::as_str),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl ImageProvider for PixabayProvider {
    fn name(&self) -> &str {
        "pixabay"
    }

    fn search(&self, query: &str) -> Result<ImageRef, SearchError> {
        let endpoint = format!("{}/api/", self.api_base);
        let query: String = query.chars().take(PIXABAY_MAX_QUERY_CHARS).collect();
        let response = self
            .http
            .get(&endpoint)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", query.as_str()),
                ("image_type", "photo"),
                ("safesearch", "true"),
                ("per_page", "20"),
            ])
            .send()
            .map_err(|err| transport_error(self.name(), err))?;
        let payload = response_json_or_error(self.name(), response)?;
        pick_random(Self::candidates(&payload))
    }
}

fn pick_random(candidates: Vec<ImageRef>) -> Result<ImageRef, SearchError> {
    candidates
        .choose(&mut rand::thread_rng())
        .cloned()
        .ok_or(SearchError::NotFound)
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value, SearchError> {
    let status = response.status();
    match status {
        StatusCode::TOO_MANY_REQUESTS => return Err(SearchError::RateLimited),
        StatusCode::NOT_FOUND => return Err(SearchError::NotFound),
        _ => {}
    }
    let body = response
        .text()
        .map_err(|err| transport_error(provider, err))?;
    if !status.is_success() {
        return Err(classify_failure(provider, status, &body));
    }
    serde_json::from_str(&body).map_err(|err| {
        SearchError::Transport(format!("{provider} returned invalid JSON payload: {err}"))
    })
}

/// Unsplash reports an exhausted hourly quota as 403 with a plain-text body.
fn classify_failure(provider: &str, status: StatusCode, body: &str) -> SearchError {
    if status == StatusCode::FORBIDDEN && body.to_ascii_lowercase().contains("rate limit") {
        return SearchError::RateLimited;
    }
    SearchError::Transport(format!(
        "{provider} request failed ({}): {}",
        status.as_u16(),
        truncate_text(body, 256)
    ))
}

fn transport_error(provider: &str, err: reqwest::Error) -> SearchError {
    let kind = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    SearchError::Transport(format!("{provider} {kind}: {err}"))
}

fn api_base_from_env(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;
    use std::time::Duration;

    use picsbot_contracts::providers::{ImageProvider, ImageRef, SearchError};
    use reqwest::StatusCode;
    use serde_json::json;

    use super::{
        classify_failure, clamp_provider_timeout, http_client, pick_random, truncate_text,
        PexelsProvider, PixabayProvider, ProviderCredentials, UnsplashProvider,
    };

    fn read_request_head(stream: &mut TcpStream) {
        let mut head = Vec::new();
        let mut chunk = [0u8; 1024];
        while !head.windows(4).any(|window| window == b"\r\n\r\n") {
            match stream.read(&mut chunk) {
                Ok(0) | Err(_) => return,
                Ok(n) => head.extend_from_slice(&chunk[..n]),
            }
        }
    }

    /// Local HTTP server answering one connection per scripted reply, in order.
    fn scripted_api(replies: Vec<(u16, &'static str)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for (code, body) in replies {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                read_request_head(&mut stream);
                let reply = format!(
                    "HTTP/1.1 {code} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(reply.as_bytes());
            }
        });
        format!("http://{addr}")
    }

    fn unsplash_at(base: &str) -> UnsplashProvider {
        let http = http_client(Duration::from_secs(5)).unwrap();
        UnsplashProvider::new("key".to_string(), http).with_api_base(base)
    }

    #[test]
    fn unsplash_payload_needs_both_urls() {
        let payload = json!({
            "id": "abc",
            "urls": {"regular": "https://images.unsplash.com/r", "thumb": "https://images.unsplash.com/t"}
        });
        assert_eq!(
            UnsplashProvider::parse_payload(&payload),
            Some(ImageRef::new(
                "https://images.unsplash.com/r",
                "https://images.unsplash.com/t"
            ))
        );
        let half = json!({"urls": {"regular": "https://images.unsplash.com/r"}});
        assert_eq!(UnsplashProvider::parse_payload(&half), None);
        let listed = json!([{"urls": {"regular": "https://u/r", "small": "https://u/s"}}]);
        assert_eq!(
            UnsplashProvider::parse_payload(&listed),
            Some(ImageRef::new("https://u/r", "https://u/s"))
        );
    }

    #[test]
    fn pexels_candidates_skip_incomplete_photos() {
        let payload = json!({
            "photos": [
                {"src": {"large": "https://p/1-large", "small": "https://p/1-small"}},
                {"src": {"large": "https://p/2-large"}},
                {"src": {"large": "https://p/3-large", "tiny": "https://p/3-tiny"}}
            ]
        });
        assert_eq!(
            PexelsProvider::candidates(&payload),
            vec![
                ImageRef::new("https://p/1-large", "https://p/1-small"),
                ImageRef::new("https://p/3-large", "https://p/3-tiny"),
            ]
        );
        assert!(PexelsProvider::candidates(&json!({"photos": []})).is_empty());
    }

    #[test]
    fn pixabay_candidates_use_large_and_preview() {
        let payload = json!({
            "total": 1,
            "hits": [{"largeImageURL": "https://x/large.jpg", "previewURL": "https://x/prev.jpg"}]
        });
        assert_eq!(
            PixabayProvider::candidates(&payload),
            vec![ImageRef::new("https://x/large.jpg", "https://x/prev.jpg")]
        );
    }

    #[test]
    fn empty_candidates_are_not_found() {
        assert_eq!(pick_random(Vec::new()), Err(SearchError::NotFound));
        let only = ImageRef::new("https://a/f", "https://a/t");
        assert_eq!(pick_random(vec![only.clone()]), Ok(only));
    }

    #[test]
    fn unsplash_quota_message_counts_as_rate_limit() {
        assert_eq!(
            classify_failure("unsplash", StatusCode::FORBIDDEN, "Rate Limit Exceeded"),
            SearchError::RateLimited
        );
        assert!(matches!(
            classify_failure("pexels", StatusCode::BAD_GATEWAY, "upstream down"),
            SearchError::Transport(message) if message.contains("502")
        ));
    }

    #[test]
    fn provider_timeout_is_clamped() {
        assert_eq!(
            clamp_provider_timeout(Duration::from_secs(1)),
            Duration::from_secs(5)
        );
        assert_eq!(
            clamp_provider_timeout(Duration::from_secs(60)),
            Duration::from_secs(10)
        );
        assert_eq!(
            clamp_provider_timeout(Duration::from_secs(7)),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn blank_credentials_are_ignored() {
        let credentials = ProviderCredentials {
            unsplash: Some("  ".to_string()),
            ..ProviderCredentials::default()
        };
        assert_eq!(ProviderCredentials::normalized(&credentials.unsplash), None);
        assert!(credentials.is_empty());
        assert!(ProviderCredentials::default().is_empty());
    }

    #[test]
    fn truncate_text_appends_ellipsis() {
        assert_eq!(truncate_text("abcdef", 3), "abc…");
        assert_eq!(truncate_text("abc", 3), "abc");
    }

    #[test]
    fn unsplash_statuses_map_to_search_errors() {
        let base = scripted_api(vec![
            (429, r#"{"errors": ["slow down"]}"#),
            (404, r#"{"errors": ["no photos"]}"#),
            (500, "upstream down"),
            (403, "Rate Limit Exceeded"),
        ]);
        let provider = unsplash_at(&base);

        assert_eq!(provider.search("cats"), Err(SearchError::RateLimited));
        assert_eq!(provider.search("cats"), Err(SearchError::NotFound));
        assert!(matches!(
            provider.search("cats"),
            Err(SearchError::Transport(message)) if message.contains("500")
        ));
        assert_eq!(provider.search("cats"), Err(SearchError::RateLimited));
    }

    #[test]
    fn unsplash_success_bodies_without_urls_are_not_found() {
        let base = scripted_api(vec![
            (200, r#"{"urls": {"regular": "https://u/r"}}"#),
            (200, "[]"),
            (200, "{}"),
            (200, "not json"),
            (200, r#"{"urls": {"regular": "https://u/r", "thumb": "https://u/t"}}"#),
        ]);
        let provider = unsplash_at(&base);

        assert_eq!(provider.search("sea"), Err(SearchError::NotFound));
        assert_eq!(provider.search("sea"), Err(SearchError::NotFound));
        assert_eq!(provider.search("sea"), Err(SearchError::NotFound));
        assert!(matches!(
            provider.search("sea"),
            Err(SearchError::Transport(message)) if message.contains("invalid JSON")
        ));
        assert_eq!(
            provider.search("sea"),
            Ok(ImageRef::new("https://u/r", "https://u/t"))
        );
    }

    #[test]
    fn list_providers_treat_empty_results_as_not_found() {
        let base = scripted_api(vec![
            (200, r#"{"photos": []}"#),
            (200, r#"{"total": 0, "hits": []}"#),
        ]);
        let http = http_client(Duration::from_secs(5)).unwrap();
        let pexels = PexelsProvider::new("key".to_string(), http.clone()).with_api_base(&base);
        let pixabay = PixabayProvider::new("key".to_string(), http).with_api_base(&base);

        assert_eq!(pexels.search("cats"), Err(SearchError::NotFound));
        assert_eq!(pixabay.search("cats"), Err(SearchError::NotFound));
    }

    #[test]
    fn stalled_provider_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                read_request_head(&mut stream);
                thread::sleep(Duration::from_secs(2));
            }
        });
        let http = http_client(Duration::from_millis(200)).unwrap();
        let provider = UnsplashProvider::new("key".to_string(), http).with_api_base(&base);

        assert!(matches!(
            provider.search("cats"),
            Err(SearchError::Transport(message)) if message.contains("timed out")
        ));
    }
}
