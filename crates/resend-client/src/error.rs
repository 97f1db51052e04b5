use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response. `message` is the provider's explanation when the
    /// body could be decoded, otherwise the raw body.
    #[error("Resend API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode Resend response: {source}\n  body: {body}")]
    Decode {
        body: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid client configuration: {0}")]
    Config(String),
}
