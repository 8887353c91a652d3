use async_trait::async_trait;

use crate::repository::StoreError;

#[derive(Debug, Clone)]
pub struct EmailAttachment {
    pub filename: String,
    pub content_type: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<EmailAttachment>,
}

/// Outbound email dispatch. Invoked as a fire-and-forget side effect:
/// failures are logged by the caller and never propagate into the
/// transaction that triggered them.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns the provider's message id.
    async fn send(&self, message: &EmailMessage) -> Result<String, StoreError>;
}
