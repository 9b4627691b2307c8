//! Telegram Bot API client: long-poll `getUpdates` and `sendMessage`.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Server-side wait for `getUpdates`, in seconds. Zero keeps the hub's own
/// poll interval in charge of pacing.
const LONG_POLL_SECS: u64 = 0;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum BotApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("telegram rejected the request: {0}")]
    Api(String),
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, BotApiError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(BotApiError::Api(
                self.description.unwrap_or_else(|| "no description".into()),
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub first_name: String,
}

impl Message {
    /// Sender's first name, empty when Telegram did not include one.
    pub fn from_name(&self) -> &str {
        self.from.as_ref().map(|u| u.first_name.as_str()).unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Client seam
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BotApi: Send + Sync {
    /// Updates with `update_id >= offset`.
    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, BotApiError>;
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), BotApiError>;
}

pub struct TelegramClient {
    base_url: String,
    client: reqwest::Client,
}

impl TelegramClient {
    pub fn new(api_base: &str, token: &str) -> Result<Self, BotApiError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: format!("{}/bot{token}", api_base.trim_end_matches('/')),
            client,
        })
    }
}

#[async_trait]
impl BotApi for TelegramClient {
    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, BotApiError> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": LONG_POLL_SECS,
            "allowed_updates": ["message"],
        });
        let resp: ApiResponse<Vec<Update>> = self
            .client
            .post(format!("{}/getUpdates", self.base_url))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        resp.into_result()
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), BotApiError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        let resp: ApiResponse<serde_json::Value> = self
            .client
            .post(format!("{}/sendMessage", self.base_url))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        resp.into_result().map(|_| ())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_update_batch() {
        let json = r#"{
            "ok": true,
            "result": [
                {"update_id": 801, "message": {"message_id": 1, "chat": {"id": 42, "type": "private"},
                 "from": {"id": 42, "is_bot": false, "first_name": "Ana"}, "text": "/state"}},
                {"update_id": 802, "edited_message": {"message_id": 1}}
            ]
        }"#;
        let resp: ApiResponse<Vec<Update>> = serde_json::from_str(json).unwrap();
        let updates = resp.into_result().unwrap();
        assert_eq!(updates.len(), 2);
        let msg = updates[0].message.as_ref().unwrap();
        assert_eq!(msg.chat.id, 42);
        assert_eq!(msg.from_name(), "Ana");
        assert_eq!(msg.text.as_deref(), Some("/state"));
        assert!(updates[1].message.is_none());
    }

    #[test]
    fn message_without_sender_has_empty_name() {
        let json = r#"{"chat": {"id": -100}, "text": "/help"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.from_name(), "");
    }

    #[test]
    fn error_response_carries_description() {
        let json = r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#;
        let resp: ApiResponse<Vec<Update>> = serde_json::from_str(json).unwrap();
        match resp.into_result() {
            Err(BotApiError::Api(d)) => assert_eq!(d, "Unauthorized"),
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn client_url_includes_token() {
        let client = TelegramClient::new("https://api.telegram.org/", "123:abc").unwrap();
        assert_eq!(client.base_url, "https://api.telegram.org/bot123:abc");
    }
}
