mod config;
mod error;
mod handler;
mod reaper;
mod router;
mod telegram;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use picsbot_contracts::cache::{BlobStore, InMemoryBlobCache};
use picsbot_engine::PicEngine;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{public_base_url, EngineArgs, ServeArgs, Settings};
use crate::reaper::spawn_reaper;
use crate::router::{build_router, AppState};
use crate::telegram::{TelegramClient, TelegramHook};

#[derive(Debug, Parser)]
#[command(name = "picsbot", version, about = "Telegram inline image bot")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the webhook and image server.
    Serve(ServeArgs),
    /// Answer one query against the live providers and print the results.
    Query(QueryArgs),
}

#[derive(Debug, Parser)]
struct QueryArgs {
    text: String,
    #[command(flatten)]
    engine: EngineArgs,
    #[arg(long, env = "EXTERNAL_HOSTNAME")]
    external_host: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    if let Err(err) = run() {
        eprintln!("picsbot error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => run_serve(args.into_settings()?),
        Command::Query(args) => run_query(args),
    }
}

fn run_query(args: QueryArgs) -> Result<()> {
    let base_url = public_base_url(args.external_host.as_deref())
        .unwrap_or_else(|| "http://127.0.0.1:5000".to_string());
    let cache: Arc<dyn BlobStore> = Arc::new(InMemoryBlobCache::default());
    let engine = PicEngine::build(args.engine.engine_config(base_url)?, cache)?;
    let results = engine.handle_query(&args.text);
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

fn run_serve(settings: Settings) -> Result<()> {
    // Blocking HTTP clients are created and dropped outside the runtime.
    let cache: Arc<dyn BlobStore> = Arc::new(InMemoryBlobCache::new(settings.cache_retention));
    let engine = Arc::new(PicEngine::build(settings.engine.clone(), Arc::clone(&cache))?);

    let bot = Arc::new(TelegramClient::new(settings.telegram_token.clone())?);
    let username = match &settings.bot_username {
        Some(name) => name.clone(),
        None => bot
            .get_me_username()
            .context("failed to look up bot username; set BOT_USERNAME")?,
    };
    if settings.set_webhook {
        let url = format!("{}/webhook/{}", settings.public_base_url, settings.telegram_token);
        bot.set_webhook(&url).context("failed to register webhook")?;
        info!(base = %settings.public_base_url, "webhook registered");
    }
    let hook = TelegramHook {
        token: settings.telegram_token.clone(),
        username,
        bot: bot.clone(),
    };
    let state = AppState::new(Arc::clone(&engine), Some(hook));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    runtime.block_on(serve(settings, state))?;
    drop(runtime);
    drop(bot);
    drop(engine);
    Ok(())
}

async fn serve(settings: Settings, state: AppState) -> Result<()> {
    let reaper = spawn_reaper(Arc::clone(&state.cache), settings.reap_interval);
    info!(
        providers = ?state.engine.provider_names(),
        public_base_url = %settings.public_base_url,
        retention_secs = settings.cache_retention.as_secs(),
        reap_interval_secs = settings.reap_interval.as_secs(),
        "picsbot starting"
    );

    let listener = TcpListener::bind(settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;
    info!("listening on {}", settings.bind_addr);
    let served = axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    reaper.abort();
    served.context("server error")
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
