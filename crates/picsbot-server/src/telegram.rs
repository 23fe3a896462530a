//! Telegram Bot API adapter.
//!
//! Updates arrive on `POST /webhook/{token}`. The token in the path is the
//! only shared secret, so requests carrying any other token are refused.
//! Engine work blocks on upstream HTTP and runs on tokio's blocking pool.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use picsbot_contracts::chat::{ButtonSpec, BUTTON_ACTIONS, MENTION_PROMPT};
use picsbot_engine::{PicEngine, QueryResult};
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{ServerError, ServerResult};
use crate::router::AppState;

const API_BASE: &str = "https://api.telegram.org";
const API_TIMEOUT: Duration = Duration::from_secs(15);
const INLINE_CACHE_SECS: u32 = 0;

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub inline_query: Option<InlineQuery>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InlineQuery {
    pub id: String,
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
}

/// Bot API method invocation. `payload` is the JSON body of the method.
pub trait BotApi: Send + Sync {
    fn call(&self, method: &str, payload: Value) -> Result<Value>;
}

pub struct TelegramClient {
    api_base: String,
    token: String,
    http: HttpClient,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(API_TIMEOUT)
            .build()
            .context("failed to build telegram http client")?;
        Ok(Self {
            api_base: API_BASE.to_string(),
            token: token.into(),
            http,
        })
    }

    pub fn get_me_username(&self) -> Result<String> {
        let me = self.call("getMe", json!({}))?;
        me.get("username")
            .and_then(Value::as_str)
            .map(str::to_string)
            .context("getMe response carried no username")
    }

    pub fn set_webhook(&self, url: &str) -> Result<()> {
        self.call("setWebhook", json!({ "url": url }))?;
        Ok(())
    }
}

impl BotApi for TelegramClient {
    fn call(&self, method: &str, payload: Value) -> Result<Value> {
        let endpoint = format!("{}/bot{}/{}", self.api_base, self.token, method);
        let response = self
            .http
            .post(endpoint)
            .json(&payload)
            .send()
            .with_context(|| format!("telegram {method} request failed"))?;
        let status = response.status();
        let body: Value = response
            .json()
            .with_context(|| format!("telegram {method} returned invalid JSON ({status})"))?;
        if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            let description = body
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            bail!("telegram {method} failed ({}): {description}", status.as_u16());
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }
}

/// Bot identity and transport wired into the webhook route.
#[derive(Clone)]
pub struct TelegramHook {
    pub token: String,
    pub username: String,
    pub bot: Arc<dyn BotApi>,
}

pub async fn webhook_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<StatusCode> {
    let hook = state.telegram.clone().ok_or(ServerError::Forbidden)?;
    if token != hook.token || !is_json(&headers) {
        return Err(ServerError::Forbidden);
    }
    let update: Update =
        serde_json::from_slice(&body).map_err(|err| ServerError::BadRequest(err.to_string()))?;

    let engine = Arc::clone(&state.engine);
    let update_id = update.update_id;
    let outcome = tokio::task::spawn_blocking(move || {
        dispatch_update(&engine, hook.bot.as_ref(), &hook.username, &update)
    })
    .await
    .map_err(|err| ServerError::Internal(err.to_string()))?;
    if let Err(err) = outcome {
        warn!(update_id, error = %err, "update dispatch failed");
    }
    Ok(StatusCode::OK)
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

pub fn dispatch_update(
    engine: &PicEngine,
    bot: &dyn BotApi,
    username: &str,
    update: &Update,
) -> Result<()> {
    if let Some(query) = &update.inline_query {
        return answer_inline_query(engine, bot, query);
    }
    if let Some(callback) = &update.callback_query {
        return answer_callback(engine, bot, callback);
    }
    if let Some(message) = &update.message {
        return answer_mention(bot, username, message);
    }
    debug!(update_id = update.update_id, "ignoring update without a handled payload");
    Ok(())
}

fn answer_inline_query(engine: &PicEngine, bot: &dyn BotApi, query: &InlineQuery) -> Result<()> {
    let results = engine.handle_query(&query.query);
    debug!(query = %query.query, results = results.len(), "answering inline query");
    bot.call(
        "answerInlineQuery",
        json!({
            "inline_query_id": query.id,
            "results": results.iter().map(photo_result).collect::<Vec<_>>(),
            "cache_time": INLINE_CACHE_SECS,
            "is_personal": true,
        }),
    )?;
    Ok(())
}

fn photo_result(result: &QueryResult) -> Value {
    json!({
        "type": "photo",
        "id": result.id,
        "photo_url": result.full_url,
        "thumbnail_url": result.thumb_url,
        "title": result.title,
        "description": result.description,
    })
}

fn answer_callback(engine: &PicEngine, bot: &dyn BotApi, callback: &CallbackQuery) -> Result<()> {
    let action = callback.data.as_deref().unwrap_or_default();
    let delivered = match &callback.message {
        Some(message) => match engine.handle_button(action) {
            Ok(image) => bot
                .call(
                    "sendPhoto",
                    json!({ "chat_id": message.chat.id, "photo": image.full_url }),
                )
                .map(|_| ()),
            Err(err) => bot
                .call(
                    "sendMessage",
                    json!({
                        "chat_id": message.chat.id,
                        "text": err.to_string(),
                        "reply_to_message_id": message.message_id,
                    }),
                )
                .map(|_| ()),
        },
        None => Ok(()),
    };
    // The spinner on the pressed button only stops once the callback is answered.
    bot.call("answerCallbackQuery", json!({ "callback_query_id": callback.id }))?;
    delivered
}

fn answer_mention(bot: &dyn BotApi, username: &str, message: &Message) -> Result<()> {
    let Some(text) = message.text.as_deref() else {
        return Ok(());
    };
    if !mentions(text, username) {
        return Ok(());
    }
    bot.call(
        "sendMessage",
        json!({
            "chat_id": message.chat.id,
            "text": MENTION_PROMPT,
            "reply_to_message_id": message.message_id,
            "reply_markup": { "inline_keyboard": keyboard(BUTTON_ACTIONS) },
        }),
    )?;
    Ok(())
}

fn mentions(text: &str, username: &str) -> bool {
    if username.is_empty() {
        return false;
    }
    let needle = format!("@{}", username.to_lowercase());
    text.to_lowercase().contains(&needle)
}

fn keyboard(buttons: &[ButtonSpec]) -> Vec<Vec<Value>> {
    buttons
        .iter()
        .map(|button| vec![json!({ "text": button.label, "callback_data": button.action })])
        .collect()
}
