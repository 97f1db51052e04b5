//! [`NotificationSender`] backed by the Resend API.

use std::time::Duration;

use async_trait::async_trait;
use resend_client::{Client, SendEmailRequest, Tag};
use sitekick_core::config::EmailConfig;
use sitekick_core::sender::{NotificationSender, OutboundEmail};
use sitekick_core::{Result, SitekickError};

pub struct ResendSender {
    client: Client,
    from: String,
    reply_to: Option<String>,
}

impl ResendSender {
    pub fn from_config(config: &EmailConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| SitekickError::Config("email.api_key is not set".into()))?;
        let client = Client::new(
            &config.api_url,
            api_key,
            Duration::from_secs(config.timeout_secs),
        )
        .map_err(|e| SitekickError::Config(e.to_string()))?;
        Ok(Self {
            client,
            from: config.from.clone(),
            reply_to: config.reply_to.clone(),
        })
    }
}

#[async_trait]
impl NotificationSender for ResendSender {
    async fn send(&self, email: &OutboundEmail) -> Result<String> {
        let request = SendEmailRequest {
            from: self.from.clone(),
            to: vec![email.to.clone()],
            subject: email.subject.clone(),
            html: Some(email.html.clone()),
            text: Some(email.text.clone()),
            reply_to: self.reply_to.clone(),
            tags: email
                .tags
                .iter()
                .map(|(name, value)| Tag::new(name, value))
                .collect(),
        };

        let sent = self
            .client
            .send_email(&request)
            .await
            .map_err(|e| SitekickError::Dispatch(e.to_string()))?;
        tracing::debug!(message_id = %sent.id, to = %email.to, "email accepted by resend");
        Ok(sent.id)
    }
}
