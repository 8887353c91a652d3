use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use caperoute_core::notify::{EmailMessage, Notifier};
use caperoute_core::repository::StoreError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::app_config::EmailConfig;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Resend-backed mailer. Without an API key (or with dispatch disabled) it
/// logs the message and reports success, so development environments never
/// need email credentials.
#[derive(Debug, Clone)]
pub struct ResendMailer {
    client: Client,
    api_key: Option<String>,
    from: String,
    enabled: bool,
}

#[derive(Debug, Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<ResendAttachment<'a>>,
}

#[derive(Debug, Serialize)]
struct ResendAttachment<'a> {
    filename: &'a str,
    /// Base64-encoded file body, per the Resend API.
    content: String,
    content_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct ResendResponse {
    id: String,
}

impl ResendMailer {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
            enabled: config.enabled,
        }
    }

}

#[async_trait]
impl Notifier for ResendMailer {
    async fn send(&self, message: &EmailMessage) -> Result<String, StoreError> {
        let Some(api_key) = self.api_key.as_deref().filter(|_| self.enabled) else {
            info!(
                to = %message.to,
                subject = %message.subject,
                "Email dispatch disabled, logging instead of sending"
            );
            return Ok("disabled".to_string());
        };

        let request = ResendRequest {
            from: &self.from,
            to: vec![&message.to],
            subject: &message.subject,
            html: &message.html,
            attachments: message
                .attachments
                .iter()
                .map(|a| ResendAttachment {
                    filename: &a.filename,
                    content: BASE64.encode(a.content.as_bytes()),
                    content_type: &a.content_type,
                })
                .collect(),
        };

        let response = self
            .client
            .post(RESEND_API_URL)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Resend API error: {}", body).into());
        }

        let result: ResendResponse = response.json().await?;
        info!(to = %message.to, message_id = %result.id, "Email sent via Resend");
        Ok(result.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caperoute_core::notify::EmailAttachment;

    fn message() -> EmailMessage {
        EmailMessage {
            to: "thandi@example.com".to_string(),
            subject: "Booking Confirmed - CRT-K7XP2MQH".to_string(),
            html: "<p>Confirmed</p>".to_string(),
            attachments: vec![EmailAttachment {
                filename: "invoice-CRT-K7XP2MQH.html".to_string(),
                content_type: "text/html".to_string(),
                content: "<html>invoice</html>".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn without_api_key_send_is_a_logged_noop() {
        let mailer = ResendMailer::new(&EmailConfig {
            api_key: None,
            from: "bookings@caperoute.example".to_string(),
            enabled: true,
        });
        assert_eq!(mailer.send(&message()).await.unwrap(), "disabled");
    }

    #[tokio::test]
    async fn disabled_flag_overrides_api_key() {
        let mailer = ResendMailer::new(&EmailConfig {
            api_key: Some("re_test_key".to_string()),
            from: "bookings@caperoute.example".to_string(),
            enabled: false,
        });
        assert_eq!(mailer.send(&message()).await.unwrap(), "disabled");
    }
}
