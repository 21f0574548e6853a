//! Telegram Bot API adapter. `notification.recipient` is the chat id.

use async_trait::async_trait;
use nh_common::{AdapterError, AdapterSendResult, AdapterStatus, Channel, Notification};
use nh_config::TelegramConfig;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::classify::{classify_http_status, classify_reqwest_error};
use crate::ChannelAdapter;

pub struct TelegramAdapter {
    client: Client,
    config: TelegramConfig,
}

impl TelegramAdapter {
    pub fn new(config: TelegramConfig) -> Self {
        Self { client: crate::build_http_client(Duration::from_secs(10)), config }
    }

    fn configured(&self) -> bool {
        !self.config.bot_token.is_empty()
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.config.api_base_url, self.config.bot_token, method)
    }
}

/// Interprets a `sendMessage` response. Telegram always answers with HTTP 200
/// and an `ok` field, even on rejection, so non-2xx and `ok: false` are
/// distinct failure modes handled separately.
fn parse_send_response(status: u16, body: serde_json::Value) -> Result<AdapterSendResult, AdapterError> {
    let success = 200..300;
    if success.contains(&status) && body.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
        let message_id = body
            .get("result")
            .and_then(|r| r.get("message_id"))
            .map(|v| v.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(AdapterSendResult { message_id, raw_provider_response: body })
    } else if success.contains(&status) {
        let description = body
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or("telegram API returned ok=false")
            .to_string();
        Err(AdapterError::permanent(description))
    } else {
        Err(classify_http_status(status, &body.to_string()))
    }
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn channel(&self) -> Channel {
        Channel::Telegram
    }

    async fn send(&self, notification: &Notification, recipient: &str) -> Result<AdapterSendResult, AdapterError> {
        if !self.configured() {
            return Err(AdapterError::misconfigured("TELEGRAM_BOT_TOKEN not set"));
        }

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&serde_json::json!({ "chat_id": recipient, "text": notification.content, "parse_mode": "HTML" }))
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .unwrap_or(serde_json::Value::Null);

        let result = parse_send_response(status.as_u16(), body);
        if result.is_ok() {
            debug!(notification_id = notification.id, "telegram message sent");
        }
        result
    }

    async fn verify(&self) -> Result<(), AdapterError> {
        if !self.configured() {
            return Err(AdapterError::misconfigured("TELEGRAM_BOT_TOKEN not set"));
        }

        let response = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(classify_http_status(response.status().as_u16(), ""))
        }
    }

    fn status(&self) -> AdapterStatus {
        AdapterStatus {
            channel: Channel::Telegram,
            configured: self.configured(),
            detail: if self.configured() { None } else { Some("TELEGRAM_BOT_TOKEN not set".to_string()) },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_when_token_empty() {
        let adapter = TelegramAdapter::new(TelegramConfig::default());
        assert!(!adapter.status().configured);
    }

    #[test]
    fn api_url_interpolates_token_and_method() {
        let config = TelegramConfig {
            bot_token: "abc123".to_string(),
            api_base_url: "https://api.telegram.org".to_string(),
        };
        let adapter = TelegramAdapter::new(config);
        assert_eq!(adapter.api_url("sendMessage"), "https://api.telegram.org/botabc123/sendMessage");
    }

    #[test]
    fn ok_true_response_is_a_success() {
        let body = serde_json::json!({ "ok": true, "result": { "message_id": 42 } });
        let result = parse_send_response(200, body).unwrap();
        assert_eq!(result.message_id, "42");
    }

    #[test]
    fn ok_false_on_http_200_is_permanent_with_description() {
        let body = serde_json::json!({ "ok": false, "description": "chat not found" });
        let err = parse_send_response(200, body).unwrap_err();
        assert_eq!(err.kind, nh_common::AdapterErrorKind::Permanent);
        assert_eq!(err.message, "chat not found");
    }

    #[test]
    fn non_2xx_status_uses_generic_http_classification() {
        let body = serde_json::json!({ "ok": false, "description": "unauthorized" });
        let err = parse_send_response(401, body).unwrap_err();
        assert_eq!(err.kind, nh_common::AdapterErrorKind::Misconfigured);
    }
}
