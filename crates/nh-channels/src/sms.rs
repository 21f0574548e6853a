//! Twilio-shaped SMS adapter: HTTPS POST with basic auth, form-encoded body.

use async_trait::async_trait;
use nh_common::{AdapterError, AdapterSendResult, AdapterStatus, Channel, Notification};
use nh_config::SmsConfig;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::classify::{classify_http_status, classify_reqwest_error};
use crate::ChannelAdapter;

pub struct SmsAdapter {
    client: Client,
    config: SmsConfig,
}

impl SmsAdapter {
    pub fn new(config: SmsConfig) -> Self {
        Self { client: crate::build_http_client(Duration::from_secs(15)), config }
    }

    fn configured(&self) -> bool {
        !self.config.account_sid.is_empty() && !self.config.auth_token.is_empty()
    }

    /// Normalize to E.164-ish form: a bare 10-digit number is assumed US/Canada
    /// and gets `+1` prefixed; anything else just gets a leading `+` if missing.
    fn normalize_recipient(recipient: &str) -> Result<String, AdapterError> {
        let trimmed = recipient.trim();
        let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            return Err(AdapterError::permanent(format!("invalid phone number: {recipient}")));
        }
        if digits.len() == 10 {
            Ok(format!("+1{digits}"))
        } else {
            Ok(format!("+{digits}"))
        }
    }
}

#[async_trait]
impl ChannelAdapter for SmsAdapter {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, notification: &Notification, recipient: &str) -> Result<AdapterSendResult, AdapterError> {
        if !self.configured() {
            return Err(AdapterError::misconfigured("ACCOUNT_SID/AUTH_TOKEN not set"));
        }

        let to = Self::normalize_recipient(recipient)?;
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base_url, self.config.account_sid
        );

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[("To", to.as_str()), ("From", self.config.phone_number.as_str()), ("Body", notification.content.as_str())])
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            debug!(notification_id = notification.id, "sms sent");
            let parsed: serde_json::Value = serde_json::from_str(&body).unwrap_or(serde_json::Value::Null);
            let message_id = parsed.get("sid").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
            Ok(AdapterSendResult { message_id, raw_provider_response: parsed })
        } else {
            Err(classify_http_status(status.as_u16(), &body))
        }
    }

    async fn verify(&self) -> Result<(), AdapterError> {
        if !self.configured() {
            return Err(AdapterError::misconfigured("ACCOUNT_SID/AUTH_TOKEN not set"));
        }

        let url = format!("{}/2010-04-01/Accounts/{}.json", self.config.api_base_url, self.config.account_sid);
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
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
            channel: Channel::Sms,
            configured: self.configured(),
            detail: if self.configured() { None } else { Some("ACCOUNT_SID/AUTH_TOKEN not set".to_string()) },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_formatted_number() {
        let n = SmsAdapter::normalize_recipient("+1 (555) 123-4567").unwrap();
        assert_eq!(n, "+15551234567");
    }

    #[test]
    fn bare_ten_digit_number_gets_country_code() {
        let n = SmsAdapter::normalize_recipient("5551234567").unwrap();
        assert_eq!(n, "+15551234567");
    }

    #[test]
    fn rejects_number_with_no_digits() {
        assert!(SmsAdapter::normalize_recipient("not-a-number").is_err());
    }
}
