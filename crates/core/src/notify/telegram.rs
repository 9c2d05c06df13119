use crate::config::Settings;
use crate::notify::error::NotifyError;
use crate::notify::{CommandBatch, CommandFeed, IncomingCommand, NotificationChannel};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";
const DEFAULT_TIMEOUT_SECS: u64 = 20;
const CHANNEL: &str = "telegram";

#[derive(Debug, Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    default_chat_id: Option<String>,
}

impl TelegramClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let token = settings.require_bot_token()?.to_string();
        let base_url =
            std::env::var("TELEGRAM_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let timeout_secs = std::env::var("TELEGRAM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build telegram http client")?;

        Ok(Self {
            http,
            base_url,
            token,
            default_chat_id: settings.chat_id.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.base_url.trim_end_matches('/'),
            self.token,
            method
        )
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[async_trait::async_trait]
impl NotificationChannel for TelegramClient {
    fn channel_name(&self) -> &'static str {
        CHANNEL
    }

    async fn send(&self, text: &str, destination: Option<&str>) -> Result<()> {
        let Some(chat_id) = destination.or(self.default_chat_id.as_deref()) else {
            return Err(NotifyError {
                channel: CHANNEL,
                stage: "config",
                detail: "no destination chat and CHAT_ID is unset".to_string(),
            }
            .into());
        };

        let req = SendMessageRequest {
            chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let res = self
            .http
            .post(self.method_url("sendMessage"))
            .json(&req)
            .send()
            .await
            .map_err(|e| NotifyError {
                channel: CHANNEL,
                stage: "http",
                // reqwest errors embed the URL, which carries the bot token.
                detail: e.without_url().to_string(),
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(NotifyError {
                channel: CHANNEL,
                stage: "status",
                detail: format!("status={status} body={body}"),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CommandFeed for TelegramClient {
    async fn poll(&self, after: i64) -> Result<CommandBatch> {
        let res = self
            .http
            .get(self.method_url("getUpdates"))
            .query(&[("offset", (after + 1).to_string()), ("timeout", "0".to_string())])
            .send()
            .await
            .map_err(|e| NotifyError {
                channel: CHANNEL,
                stage: "get_updates",
                detail: e.without_url().to_string(),
            })?;

        let text = res
            .text()
            .await
            .context("failed to read getUpdates response")?;
        let parsed = serde_json::from_str::<UpdatesResponse>(&text)
            .context("getUpdates response is not valid JSON")?;
        parse_updates(parsed)
    }
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
    #[serde(default)]
    edited_message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    date: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

fn parse_updates(resp: UpdatesResponse) -> Result<CommandBatch> {
    if !resp.ok {
        return Err(NotifyError {
            channel: CHANNEL,
            stage: "get_updates",
            detail: resp.description.unwrap_or_else(|| "ok=false".to_string()),
        }
        .into());
    }

    let mut batch = CommandBatch::default();
    for update in resp.result {
        batch.max_update_id = Some(batch.max_update_id.map_or(update.update_id, |m| m.max(update.update_id)));

        let Some(msg) = update.message.or(update.edited_message) else {
            continue;
        };
        let text = msg.text.as_deref().map(str::trim).unwrap_or_default();
        if text.is_empty() {
            continue;
        }

        batch.commands.push(IncomingCommand {
            update_id: update.update_id,
            chat_id: msg.chat.id.to_string(),
            chat_title: msg
                .chat
                .title
                .or(msg.chat.username)
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            text: text.to_string(),
            sent_at: msg.date.and_then(|d| DateTime::<Utc>::from_timestamp(d, 0)),
        });
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: serde_json::Value) -> Result<CommandBatch> {
        parse_updates(serde_json::from_value(v).unwrap())
    }

    #[test]
    fn extracts_text_commands_and_cursor() {
        let batch = parse(json!({
            "ok": true,
            "result": [
                {"update_id": 10, "message": {"chat": {"id": -100, "title": "Radar"}, "text": " /ping ", "date": 1700000000}},
                {"update_id": 11, "my_chat_member": {}},
                {"update_id": 12, "edited_message": {"chat": {"id": 5, "username": "ali"}, "text": "/radar top"}}
            ]
        }))
        .unwrap();

        assert_eq!(batch.max_update_id, Some(12));
        assert_eq!(batch.commands.len(), 2);
        assert_eq!(batch.commands[0].text, "/ping");
        assert_eq!(batch.commands[0].chat_id, "-100");
        assert_eq!(batch.commands[0].chat_title.as_deref(), Some("Radar"));
        assert_eq!(batch.commands[0].sent_at.unwrap().timestamp(), 1700000000);
        assert_eq!(batch.commands[1].chat_title.as_deref(), Some("ali"));
        assert_eq!(batch.commands[1].sent_at, None);
    }

    #[test]
    fn empty_result_keeps_cursor_unset() {
        let batch = parse(json!({"ok": true, "result": []})).unwrap();
        assert_eq!(batch.max_update_id, None);
        assert!(batch.commands.is_empty());
    }

    #[test]
    fn not_ok_is_an_error() {
        let err = parse(json!({"ok": false, "description": "Unauthorized"})).unwrap_err();
        let diag = err.downcast_ref::<NotifyError>().unwrap();
        assert_eq!(diag.stage, "get_updates");
        assert!(diag.detail.contains("Unauthorized"));
    }
}
