use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use picsbot_contracts::cache::{DEFAULT_REAP_INTERVAL, DEFAULT_RETENTION};
use picsbot_contracts::phrases::PhraseBook;
use picsbot_engine::providers::{clamp_provider_timeout, ProviderCredentials};
use picsbot_engine::EngineConfig;
use tracing::warn;

use crate::error::{ServerError, ServerResult};

const RENDER_HOST_ENV: &str = "RENDER_EXTERNAL_HOSTNAME";

/// Options shared by every command that talks to image providers.
#[derive(Debug, Clone, Args)]
pub struct EngineArgs {
    #[arg(long, env = "UNSPLASH_ACCESS_KEY", hide_env_values = true)]
    pub unsplash_key: Option<String>,
    #[arg(long, env = "PEXELS_API_KEY", hide_env_values = true)]
    pub pexels_key: Option<String>,
    #[arg(long, env = "PIXABAY_API_KEY", hide_env_values = true)]
    pub pixabay_key: Option<String>,
    #[arg(long, env = "PROVIDER_TIMEOUT_SECS", default_value_t = 8)]
    pub provider_timeout_secs: u64,
    /// Category phrase JSON; the bundled dataset is used when unset.
    #[arg(long = "phrases", env = "PHRASES_PATH")]
    pub phrases_path: Option<PathBuf>,
    /// TTF/OTF font for text overlays; the bundled DejaVu Sans is used otherwise.
    #[arg(long = "font", env = "OVERLAY_FONT_PATH")]
    pub font_path: Option<PathBuf>,
}

impl EngineArgs {
    pub fn credentials(&self) -> ProviderCredentials {
        ProviderCredentials {
            unsplash: self.unsplash_key.clone(),
            pexels: self.pexels_key.clone(),
            pixabay: self.pixabay_key.clone(),
        }
    }

    pub fn engine_config(&self, public_base_url: String) -> ServerResult<EngineConfig> {
        let credentials = self.credentials();
        if credentials.is_empty() {
            return Err(ServerError::Config(
                "no image provider configured; set UNSPLASH_ACCESS_KEY, PEXELS_API_KEY or PIXABAY_API_KEY"
                    .to_string(),
            ));
        }
        let phrases = match &self.phrases_path {
            Some(path) => PhraseBook::load(path).map_err(|err| ServerError::Config(err.to_string()))?,
            None => PhraseBook::embedded(),
        };
        Ok(EngineConfig {
            credentials,
            provider_timeout: clamp_provider_timeout(Duration::from_secs(self.provider_timeout_secs)),
            public_base_url,
            phrases,
            font_path: self.font_path.clone(),
        })
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub engine: EngineArgs,
    #[arg(long, env = "TELEGRAM_TOKEN", hide_env_values = true)]
    pub telegram_token: Option<String>,
    /// Host (optionally with scheme) that served image URLs point at.
    #[arg(long, env = "EXTERNAL_HOSTNAME")]
    pub external_host: Option<String>,
    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,
    #[arg(long, env = "BOT_USERNAME")]
    pub bot_username: Option<String>,
    /// Register `{external host}/webhook/{token}` with Telegram on startup.
    #[arg(long, env = "SET_WEBHOOK", default_value_t = false)]
    pub set_webhook: bool,
    #[arg(long, env = "CACHE_RETENTION_SECS", default_value_t = DEFAULT_RETENTION.as_secs())]
    pub cache_retention_secs: u64,
    #[arg(long = "reap-interval-secs", env = "CACHE_REAP_INTERVAL_SECS", default_value_t = DEFAULT_REAP_INTERVAL.as_secs())]
    pub reap_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub telegram_token: String,
    pub bind_addr: SocketAddr,
    pub public_base_url: String,
    pub bot_username: Option<String>,
    pub set_webhook: bool,
    pub cache_retention: Duration,
    pub reap_interval: Duration,
    pub engine: EngineConfig,
}

impl ServeArgs {
    pub fn into_settings(self) -> ServerResult<Settings> {
        let telegram_token = self
            .telegram_token
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ServerError::Config("TELEGRAM_TOKEN is required".to_string()))?
            .to_string();

        let external_host = self
            .external_host
            .clone()
            .or_else(|| env::var(RENDER_HOST_ENV).ok());
        let public_base_url = match public_base_url(external_host.as_deref()) {
            Some(url) => url,
            None => {
                let fallback = format!("http://127.0.0.1:{}", self.port);
                warn!(
                    fallback = %fallback,
                    "no external hostname configured; served image URLs will only work locally"
                );
                fallback
            }
        };
        if self.set_webhook && !public_base_url.starts_with("https://") {
            return Err(ServerError::Config(
                "registering a webhook needs an https external hostname".to_string(),
            ));
        }

        let engine = self.engine.engine_config(public_base_url.clone())?;
        Ok(Settings {
            telegram_token,
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.port),
            public_base_url,
            bot_username: self
                .bot_username
                .map(|name| name.trim().trim_start_matches('@').to_string())
                .filter(|name| !name.is_empty()),
            set_webhook: self.set_webhook,
            cache_retention: Duration::from_secs(self.cache_retention_secs.max(1)),
            reap_interval: Duration::from_secs(self.reap_interval_secs.max(1)),
            engine,
        })
    }
}

/// Normalizes a configured host into a base URL without a trailing slash.
/// Bare hosts get an `https://` scheme.
pub fn public_base_url(host: Option<&str>) -> Option<String> {
    let host = host.map(str::trim).filter(|value| !value.is_empty())?;
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        Some(host.to_string())
    } else {
        Some(format!("https://{host}"))
    }
}
