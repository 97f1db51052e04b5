//! Rows read and written by the gate and the reconciler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{EmailOutcome, EventType, PaymentStatus, ProjectStatus};

/// A customer account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

impl Subject {
    /// Name to greet the customer with, falling back to the mailbox part of
    /// their address.
    pub fn display_name(&self) -> &str {
        match self.full_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => self.email.split('@').next().unwrap_or(&self.email),
        }
    }
}

/// The three demo options an admin prepares for a customer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DemoLinks {
    #[serde(default)]
    pub option_1_url: Option<String>,
    #[serde(default)]
    pub option_2_url: Option<String>,
    #[serde(default)]
    pub option_3_url: Option<String>,
}

impl DemoLinks {
    pub fn new(
        option_1_url: impl Into<String>,
        option_2_url: impl Into<String>,
        option_3_url: impl Into<String>,
    ) -> Self {
        Self {
            option_1_url: Some(option_1_url.into()),
            option_2_url: Some(option_2_url.into()),
            option_3_url: Some(option_3_url.into()),
        }
    }

    /// `(field name, value)` pairs in display order.
    pub fn options(&self) -> [(&'static str, Option<&str>); 3] {
        [
            ("option_1_url", self.option_1_url.as_deref()),
            ("option_2_url", self.option_2_url.as_deref()),
            ("option_3_url", self.option_3_url.as_deref()),
        ]
    }
}

/// Build progress of the customer's website.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub final_url: Option<String>,
}

impl Project {
    pub fn live(final_url: impl Into<String>) -> Self {
        Self {
            status: ProjectStatus::Live,
            final_url: Some(final_url.into()),
        }
    }
}

/// Append-only audit entry for one lifecycle email attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEventRecord {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub event_type: EventType,
    pub trigger_snapshot: serde_json::Value,
    pub sent_at: DateTime<Utc>,
    pub outcome: EmailOutcome,
    #[serde(default)]
    pub actor_id: Option<Uuid>,
    #[serde(default)]
    pub provider_message_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Insert payload for [`LifecycleEventRecord`]; the datastore assigns `id`
/// and `sent_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLifecycleEvent {
    pub subject_id: Uuid,
    pub event_type: EventType,
    pub trigger_snapshot: serde_json::Value,
    pub outcome: EmailOutcome,
    pub actor_id: Option<Uuid>,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: String,
    pub subject_id: Uuid,
    pub status: PaymentStatus,
    #[serde(default)]
    pub processor_payment_id: Option<String>,
    #[serde(default)]
    pub processor_customer_id: Option<String>,
    #[serde(default)]
    pub amount_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn pending(id: impl Into<String>, subject_id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            subject_id,
            status: PaymentStatus::Pending,
            processor_payment_id: None,
            processor_customer_id: None,
            amount_cents: None,
            created_at,
            updated_at: created_at,
        }
    }
}

/// Processor identifiers written onto a payment when it completes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PaymentCompletion {
    pub processor_payment_id: Option<String>,
    pub processor_customer_id: Option<String>,
}
