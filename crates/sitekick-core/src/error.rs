use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SitekickError {
    #[error("subject not found: {0}")]
    SubjectNotFound(Uuid),

    #[error("invalid event type '{0}': must be demo_ready or website_launch")]
    InvalidEventType(String),

    #[error("invalid project status: {0}")]
    InvalidProjectStatus(String),

    #[error("invalid payment status: {0}")]
    InvalidPaymentStatus(String),

    #[error("invalid email outcome: {0}")]
    InvalidOutcome(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("email dispatch failed: {0}")]
    Dispatch(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SitekickError>;
