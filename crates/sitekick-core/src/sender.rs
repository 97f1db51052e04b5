use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// A rendered, ready-to-send email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
    /// `(name, value)` tags forwarded to the provider for analytics.
    pub tags: Vec<(String, String)>,
}

/// Transactional email delivery.
///
/// Implementations return the provider's message id, or
/// [`SitekickError::Dispatch`](crate::error::SitekickError::Dispatch) when
/// the provider did not accept the message.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<String>;
}
