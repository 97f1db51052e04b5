use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

use crate::error::ResendError;
use crate::types::{ApiErrorBody, SendEmailRequest, SendEmailResponse};
use crate::Result;

pub const DEFAULT_API_URL: &str = "https://api.resend.com";

/// Thin wrapper over a pooled `reqwest::Client` with the API key baked into
/// its default headers.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    api_url: String,
}

impl Client {
    pub fn new(api_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(ResendError::Config("api key is empty".into()));
        }
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| ResendError::Config("api key contains invalid characters".into()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    /// `POST /emails`. Returns the id Resend assigned to the message.
    pub async fn send_email(&self, request: &SendEmailRequest) -> Result<SendEmailResponse> {
        let url = format!("{}/emails", self.api_url);
        let response = self.http.post(&url).json(request).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(err) => match err.name {
                    Some(name) => format!("{name}: {}", err.message),
                    None => err.message,
                },
                Err(_) => body,
            };
            tracing::debug!(status = status.as_u16(), %message, "resend rejected email");
            return Err(ResendError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|source| ResendError::Decode { body, source })
    }
}
