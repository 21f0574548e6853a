//! SMTP-backed email adapter.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use nh_common::{AdapterError, AdapterSendResult, AdapterStatus, Channel, Notification};
use nh_config::SmtpConfig;
use tracing::{debug, warn};

use crate::ChannelAdapter;

pub struct EmailAdapter {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: String,
    configured: bool,
}

impl EmailAdapter {
    pub fn new(config: &SmtpConfig) -> Self {
        if config.host.is_empty() {
            return Self { transport: None, from: config.from.clone(), configured: false };
        }

        let builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        };

        let transport = builder.ok().map(|b| {
            let mut b = b.port(config.port);
            if !config.user.is_empty() {
                b = b.credentials(Credentials::new(config.user.clone(), config.pass.clone()));
            }
            b.build()
        });

        Self {
            transport,
            from: config.from.clone(),
            configured: true,
        }
    }

    fn build_message(&self, notification: &Notification, recipient: &str) -> Result<Message, AdapterError> {
        let subject = notification.subject.clone().unwrap_or_default();
        Message::builder()
            .from(self.from.parse().map_err(|e| AdapterError::misconfigured(format!("invalid From address: {e}")))?)
            .to(recipient.parse().map_err(|e| AdapterError::permanent(format!("invalid recipient address: {e}")))?)
            .subject(subject)
            .body(notification.content.clone())
            .map_err(|e| AdapterError::permanent(format!("failed to build message: {e}")))
    }
}

#[async_trait]
impl ChannelAdapter for EmailAdapter {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, notification: &Notification, recipient: &str) -> Result<AdapterSendResult, AdapterError> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| AdapterError::misconfigured("SMTP not configured"))?;

        let message = self.build_message(notification, recipient)?;

        match transport.send(message).await {
            Ok(response) => {
                debug!(notification_id = notification.id, "email sent");
                Ok(AdapterSendResult {
                    message_id: format!("smtp-{}", notification.id),
                    raw_provider_response: serde_json::json!({ "code": response.code().to_string() }),
                })
            }
            Err(e) => {
                warn!(notification_id = notification.id, error = %e, "smtp send failed");
                // SMTP 4xx is transient (e.g. mailbox temporarily unavailable), 5xx is permanent
                // (relay rejects the message outright) -- the inverse of the HTTP convention.
                if e.is_transient() {
                    Err(AdapterError::transient(format!("smtp transient error: {e}")))
                } else if e.is_permanent() {
                    Err(AdapterError::permanent(format!("smtp permanent error: {e}")))
                } else {
                    Err(AdapterError::transient(format!("smtp error: {e}")))
                }
            }
        }
    }

    async fn verify(&self) -> Result<(), AdapterError> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| AdapterError::misconfigured("SMTP not configured"))?;

        transport
            .test_connection()
            .await
            .map_err(|e| AdapterError::transient(format!("smtp connection check failed: {e}")))
            .and_then(|ok| {
                if ok {
                    Ok(())
                } else {
                    Err(AdapterError::transient("smtp connection check returned false"))
                }
            })
    }

    fn status(&self) -> AdapterStatus {
        AdapterStatus {
            channel: Channel::Email,
            configured: self.configured,
            detail: if self.configured { None } else { Some("SMTP_HOST not set".to_string()) },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_when_host_empty() {
        let adapter = EmailAdapter::new(&SmtpConfig::default());
        assert!(!adapter.status().configured);
    }
}
