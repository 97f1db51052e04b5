//! Notification gate: decides whether a lifecycle email may go out and
//! refuses to send the same content twice.
//!
//! Flow for [`NotificationGate::send`]:
//!
//! ```text
//! lease(subject, event) ─► load subject + current state ─► eligibility
//!        │                                                     │
//!        │                          last `sent` record ◄───────┘
//!        │                                 │
//!        │             same snapshot? ── yes ─► Duplicate
//!        │                                 │ no
//!        │                        render + dispatch
//!        │                     ok │                │ err
//!        │          append `sent` record     append `failed` record
//!        ▼
//!   lease released
//! ```
//!
//! The snapshot recorded on success is the one the decision was made on,
//! never a re-read.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::config::BrandingConfig;
use crate::error::{Result, SitekickError};
use crate::models::{LifecycleEventRecord, NewLifecycleEvent, Subject};
use crate::sender::NotificationSender;
use crate::snapshot::TriggerSnapshot;
use crate::store::{bounded, Datastore};
use crate::templates;
use crate::types::{EmailOutcome, EventType};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateStatus {
    NoPreviousEmail,
    ValuesChanged,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastEmail {
    pub sent_at: DateTime<Utc>,
    pub trigger_values: Value,
}

/// Read-only answer to "could this email be sent right now?".
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateStatus {
    pub can_send: bool,
    pub reason: String,
    pub current_state: Value,
    pub last_email: Option<LastEmail>,
    pub duplicate_status: DuplicateStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendRequest {
    pub subject_id: Uuid,
    pub event_type: EventType,
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Sent {
        record: LifecycleEventRecord,
        message: String,
    },
    NotEligible {
        reasons: Vec<String>,
        current_state: Value,
    },
    Duplicate {
        last_sent_at: DateTime<Utc>,
        current_state: Value,
    },
}

impl SendOutcome {
    pub fn message(&self, event_type: EventType) -> String {
        match self {
            SendOutcome::Sent { message, .. } => message.clone(),
            SendOutcome::NotEligible { reasons, .. } => format!(
                "{event_type} email cannot be sent yet: {}",
                reasons.join("; ")
            ),
            SendOutcome::Duplicate { last_sent_at, .. } => format!(
                "{event_type} email was already sent on {} with the same content",
                last_sent_at.to_rfc3339()
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

struct Evaluation {
    subject: Subject,
    snapshot: TriggerSnapshot,
    reasons: Vec<String>,
    last_sent: Option<LifecycleEventRecord>,
    duplicate_status: DuplicateStatus,
}

#[derive(Clone)]
pub struct NotificationGate {
    store: Arc<dyn Datastore>,
    sender: Arc<dyn NotificationSender>,
    branding: BrandingConfig,
    store_timeout: Duration,
    lease_timeout: Duration,
}

impl NotificationGate {
    pub fn new(
        store: Arc<dyn Datastore>,
        sender: Arc<dyn NotificationSender>,
        branding: BrandingConfig,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            sender,
            branding,
            store_timeout,
            lease_timeout: store_timeout,
        }
    }

    /// Bound the wait for a concurrent send of the same email. It must cover
    /// the holder's whole check, dispatch and record.
    pub fn with_lease_timeout(mut self, lease_timeout: Duration) -> Self {
        self.lease_timeout = lease_timeout;
        self
    }

    /// Evaluate eligibility and duplicate state without sending anything.
    pub async fn status(&self, subject_id: Uuid, event_type: EventType) -> Result<GateStatus> {
        let eval = self.evaluate(subject_id, event_type).await?;

        let (can_send, reason) = if !eval.reasons.is_empty() {
            (false, eval.reasons.join("; "))
        } else {
            match (eval.duplicate_status, &eval.last_sent) {
                (DuplicateStatus::Duplicate, Some(last)) => (
                    false,
                    format!(
                        "email already sent on {} with the same content",
                        last.sent_at.to_rfc3339()
                    ),
                ),
                (DuplicateStatus::ValuesChanged, _) => {
                    (true, "values changed since last email".to_string())
                }
                _ => (true, "no previous email".to_string()),
            }
        };

        Ok(GateStatus {
            can_send,
            reason,
            current_state: eval.snapshot.to_value(),
            last_email: eval.last_sent.map(|r| LastEmail {
                sent_at: r.sent_at,
                trigger_values: r.trigger_snapshot,
            }),
            duplicate_status: eval.duplicate_status,
        })
    }

    /// Gate, dispatch and record one lifecycle email.
    pub async fn send(&self, request: SendRequest) -> Result<SendOutcome> {
        let SendRequest {
            subject_id,
            event_type,
            actor_id,
        } = request;

        let _lease = bounded(
            self.lease_timeout,
            "acquiring send lease",
            self.store.lock_notification(subject_id, event_type),
        )
        .await?;
        tracing::debug!(%subject_id, %event_type, "send lease acquired");

        let eval = self.evaluate(subject_id, event_type).await?;
        let current_state = eval.snapshot.to_value();

        if !eval.reasons.is_empty() {
            tracing::info!(
                %subject_id,
                %event_type,
                reasons = ?eval.reasons,
                "lifecycle email not eligible"
            );
            return Ok(SendOutcome::NotEligible {
                reasons: eval.reasons,
                current_state,
            });
        }

        if let (DuplicateStatus::Duplicate, Some(last)) = (eval.duplicate_status, &eval.last_sent)
        {
            tracing::info!(
                %subject_id,
                %event_type,
                last_sent_at = %last.sent_at,
                "duplicate lifecycle email blocked"
            );
            return Ok(SendOutcome::Duplicate {
                last_sent_at: last.sent_at,
                current_state,
            });
        }

        let email = templates::render(&eval.subject, &eval.snapshot, &self.branding);
        let provider_message_id = match self.sender.send(&email).await {
            Ok(id) => id,
            Err(e) => {
                let reason = match e {
                    SitekickError::Dispatch(msg) => msg,
                    other => other.to_string(),
                };
                tracing::warn!(
                    %subject_id,
                    %event_type,
                    error = %reason,
                    "lifecycle email dispatch failed"
                );
                self.record_failure(subject_id, event_type, actor_id, current_state, &reason)
                    .await;
                return Err(SitekickError::Dispatch(reason));
            }
        };

        let record = bounded(
            self.store_timeout,
            "recording sent email",
            self.store.append_event(NewLifecycleEvent {
                subject_id,
                event_type,
                trigger_snapshot: current_state,
                outcome: EmailOutcome::Sent,
                actor_id,
                provider_message_id: Some(provider_message_id),
                error: None,
            }),
        )
        .await?;

        tracing::info!(
            %subject_id,
            %event_type,
            record_id = %record.id,
            duplicate_status = ?eval.duplicate_status,
            "lifecycle email sent"
        );

        let message = format!("{event_type} email sent to {}", eval.subject.email);
        Ok(SendOutcome::Sent { record, message })
    }

    /// Audit log for the subject, newest first.
    pub async fn history(
        &self,
        subject_id: Uuid,
        event_type: Option<EventType>,
    ) -> Result<Vec<LifecycleEventRecord>> {
        bounded(
            self.store_timeout,
            "listing lifecycle emails",
            self.store.list_events(subject_id, event_type),
        )
        .await
    }

    async fn evaluate(&self, subject_id: Uuid, event_type: EventType) -> Result<Evaluation> {
        let subject = bounded(
            self.store_timeout,
            "loading subject",
            self.store.find_subject(subject_id),
        )
        .await?
        .ok_or(SitekickError::SubjectNotFound(subject_id))?;

        let snapshot = self.current_snapshot(subject_id, event_type).await?;
        let reasons = snapshot.ineligibility_reasons();

        let last_sent = bounded(
            self.store_timeout,
            "loading last sent email",
            self.store.last_sent_event(subject_id, event_type),
        )
        .await?;

        let duplicate_status = match &last_sent {
            None => DuplicateStatus::NoPreviousEmail,
            Some(last) if snapshot.matches_stored(&last.trigger_snapshot) => {
                DuplicateStatus::Duplicate
            }
            Some(_) => DuplicateStatus::ValuesChanged,
        };

        Ok(Evaluation {
            subject,
            snapshot,
            reasons,
            last_sent,
            duplicate_status,
        })
    }

    async fn current_snapshot(
        &self,
        subject_id: Uuid,
        event_type: EventType,
    ) -> Result<TriggerSnapshot> {
        let snapshot = match event_type {
            EventType::DemoReady => TriggerSnapshot::DemoReady(
                bounded(
                    self.store_timeout,
                    "loading demo links",
                    self.store.demo_links(subject_id),
                )
                .await?
                .unwrap_or_default(),
            ),
            EventType::WebsiteLaunch => TriggerSnapshot::WebsiteLaunch(
                bounded(
                    self.store_timeout,
                    "loading project",
                    self.store.project(subject_id),
                )
                .await?
                .unwrap_or_default(),
            ),
        };
        Ok(snapshot)
    }

    async fn record_failure(
        &self,
        subject_id: Uuid,
        event_type: EventType,
        actor_id: Option<Uuid>,
        trigger_snapshot: Value,
        reason: &str,
    ) {
        let write = bounded(
            self.store_timeout,
            "recording failed email",
            self.store.append_event(NewLifecycleEvent {
                subject_id,
                event_type,
                trigger_snapshot,
                outcome: EmailOutcome::Failed,
                actor_id,
                provider_message_id: None,
                error: Some(reason.to_string()),
            }),
        )
        .await;
        if let Err(e) = write {
            tracing::warn!(%subject_id, %event_type, error = %e, "could not record failed email");
        }
    }
}
