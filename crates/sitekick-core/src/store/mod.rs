//! Datastore seam for the gate and the reconciler.
//!
//! Rows are owned by the hosted database; these procedures only read the
//! customer's current state, append lifecycle audit entries and move payment
//! rows out of `pending`. [`memory::MemoryStore`] backs tests and local runs,
//! the Postgres implementation lives in the server crate.

pub mod memory;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{Result, SitekickError};
use crate::models::{
    DemoLinks, LifecycleEventRecord, NewLifecycleEvent, PaymentCompletion, PaymentRecord, Project,
    Subject,
};
use crate::types::EventType;

pub use memory::MemoryStore;

/// Exclusive right to run check + dispatch + record for one
/// (subject, event type) pair. Released when dropped.
pub struct NotificationLease {
    _guard: Box<dyn Send>,
}

impl NotificationLease {
    pub fn new(guard: impl Send + 'static) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}

impl std::fmt::Debug for NotificationLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("NotificationLease")
    }
}

/// Run one datastore call under `limit`, turning an elapsed timer into a
/// storage error.
pub async fn bounded<T>(
    limit: Duration,
    what: &str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(SitekickError::Storage(format!(
            "{what} timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

#[async_trait]
pub trait Datastore: Send + Sync {
    async fn find_subject(&self, id: Uuid) -> Result<Option<Subject>>;

    /// Case-insensitive lookup by account email.
    async fn find_subject_by_email(&self, email: &str) -> Result<Option<Subject>>;

    async fn demo_links(&self, subject_id: Uuid) -> Result<Option<DemoLinks>>;

    async fn project(&self, subject_id: Uuid) -> Result<Option<Project>>;

    /// Most recent `sent` record for the pair, by `sent_at`.
    async fn last_sent_event(
        &self,
        subject_id: Uuid,
        event_type: EventType,
    ) -> Result<Option<LifecycleEventRecord>>;

    /// Every record for the subject, newest first.
    async fn list_events(
        &self,
        subject_id: Uuid,
        event_type: Option<EventType>,
    ) -> Result<Vec<LifecycleEventRecord>>;

    async fn append_event(&self, event: NewLifecycleEvent) -> Result<LifecycleEventRecord>;

    /// Block until no other send for the pair is in flight.
    async fn lock_notification(
        &self,
        subject_id: Uuid,
        event_type: EventType,
    ) -> Result<NotificationLease>;

    async fn payment(&self, id: &str) -> Result<Option<PaymentRecord>>;

    /// The payment that was completed with this processor payment id.
    async fn payment_by_processor_id(
        &self,
        processor_payment_id: &str,
    ) -> Result<Option<PaymentRecord>>;

    /// Move a `pending` payment to `completed`. An already completed row is
    /// returned untouched; `None` when no pending or completed row has `id`.
    async fn complete_payment(
        &self,
        id: &str,
        completion: &PaymentCompletion,
    ) -> Result<Option<PaymentRecord>>;

    /// Move a `pending` payment to `failed`; `None` when no pending row has `id`.
    async fn fail_payment(&self, id: &str) -> Result<Option<PaymentRecord>>;

    /// The subject's `pending` payment with the latest `created_at`.
    async fn latest_pending_payment(&self, subject_id: Uuid) -> Result<Option<PaymentRecord>>;
}
