use anyhow::{bail, Context, Result};
use reqwest::blocking::Client as HttpClient;

const MAX_DOWNLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Downloads source images for compositing.
pub trait ImageFetcher: Send + Sync {
    fn download(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpFetcher {
    http: HttpClient,
}

impl HttpFetcher {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

impl ImageFetcher for HttpFetcher {
    fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .with_context(|| format!("failed downloading image ({url})"))?;
        if !response.status().is_success() {
            bail!("image download failed ({}): {url}", response.status().as_u16());
        }
        if response
            .content_length()
            .is_some_and(|length| length > MAX_DOWNLOAD_BYTES as u64)
        {
            bail!("image too large: {url}");
        }
        let bytes = response
            .bytes()
            .with_context(|| format!("failed reading image bytes ({url})"))?;
        if bytes.len() > MAX_DOWNLOAD_BYTES {
            bail!("image too large: {url}");
        }
        Ok(bytes.to_vec())
    }
}
