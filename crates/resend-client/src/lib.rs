//! `resend-client`: the slice of the Resend HTTP API that sitekick needs.
//!
//! ```rust,ignore
//! use resend_client::{Client, SendEmailRequest};
//!
//! let client = Client::new("https://api.resend.com", &api_key, Duration::from_secs(10))?;
//! let sent = client
//!     .send_email(&SendEmailRequest {
//!         from: "Sitekick <hello@sitekick.dev>".into(),
//!         to: vec!["ada@example.com".into()],
//!         subject: "Hello".into(),
//!         text: Some("Hi Ada".into()),
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("{}", sent.id);
//! ```

pub mod client;
pub mod error;
pub mod types;


pub use client::{Client, DEFAULT_API_URL};
pub use error::ResendError;
pub use types::{SendEmailRequest, SendEmailResponse, Tag};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ResendError>;
