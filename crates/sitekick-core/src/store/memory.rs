use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Datastore, NotificationLease};
use crate::error::Result;
use crate::models::{
    DemoLinks, LifecycleEventRecord, NewLifecycleEvent, PaymentCompletion, PaymentRecord, Project,
    Subject,
};
use crate::types::{EmailOutcome, EventType, PaymentStatus};

/// Process-local datastore. Send leases are per-key async mutexes, so they
/// serialize concurrent sends inside one process only.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
    locks: StdMutex<HashMap<(Uuid, EventType), Arc<Mutex<()>>>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    subjects: HashMap<Uuid, Subject>,
    demo_links: HashMap<Uuid, DemoLinks>,
    projects: HashMap<Uuid, Project>,
    events: Vec<LifecycleEventRecord>,
    payments: HashMap<String, PaymentRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_subject(&self, subject: Subject) {
        let mut inner = self.inner.lock().await;
        inner.subjects.insert(subject.id, subject);
    }

    pub async fn set_demo_links(&self, subject_id: Uuid, links: DemoLinks) {
        let mut inner = self.inner.lock().await;
        inner.demo_links.insert(subject_id, links);
    }

    pub async fn set_project(&self, subject_id: Uuid, project: Project) {
        let mut inner = self.inner.lock().await;
        inner.projects.insert(subject_id, project);
    }

    pub async fn insert_payment(&self, payment: PaymentRecord) {
        let mut inner = self.inner.lock().await;
        inner.payments.insert(payment.id.clone(), payment);
    }

    /// Insert an audit record verbatim, keeping its `sent_at`.
    pub async fn insert_event(&self, record: LifecycleEventRecord) {
        let mut inner = self.inner.lock().await;
        inner.events.push(record);
    }

    pub async fn payments(&self) -> Vec<PaymentRecord> {
        let inner = self.inner.lock().await;
        let mut all: Vec<PaymentRecord> = inner.payments.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        all
    }

    fn key_lock(&self, subject_id: Uuid, event_type: EventType) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Entries nobody holds or waits on only have the map's reference.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry((subject_id, event_type))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl Datastore for MemoryStore {
    async fn find_subject(&self, id: Uuid) -> Result<Option<Subject>> {
        let inner = self.inner.lock().await;
        Ok(inner.subjects.get(&id).cloned())
    }

    async fn find_subject_by_email(&self, email: &str) -> Result<Option<Subject>> {
        let needle = email.trim();
        let inner = self.inner.lock().await;
        Ok(inner
            .subjects
            .values()
            .find(|s| s.email.eq_ignore_ascii_case(needle))
            .cloned())
    }

    async fn demo_links(&self, subject_id: Uuid) -> Result<Option<DemoLinks>> {
        let inner = self.inner.lock().await;
        Ok(inner.demo_links.get(&subject_id).cloned())
    }

    async fn project(&self, subject_id: Uuid) -> Result<Option<Project>> {
        let inner = self.inner.lock().await;
        Ok(inner.projects.get(&subject_id).cloned())
    }

    async fn last_sent_event(
        &self,
        subject_id: Uuid,
        event_type: EventType,
    ) -> Result<Option<LifecycleEventRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .events
            .iter()
            .filter(|e| {
                e.subject_id == subject_id
                    && e.event_type == event_type
                    && e.outcome == EmailOutcome::Sent
            })
            .max_by_key(|e| e.sent_at)
            .cloned())
    }

    async fn list_events(
        &self,
        subject_id: Uuid,
        event_type: Option<EventType>,
    ) -> Result<Vec<LifecycleEventRecord>> {
        let inner = self.inner.lock().await;
        let mut out: Vec<LifecycleEventRecord> = inner
            .events
            .iter()
            .filter(|e| e.subject_id == subject_id)
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        Ok(out)
    }

    async fn append_event(&self, event: NewLifecycleEvent) -> Result<LifecycleEventRecord> {
        let record = LifecycleEventRecord {
            id: Uuid::new_v4(),
            subject_id: event.subject_id,
            event_type: event.event_type,
            trigger_snapshot: event.trigger_snapshot,
            sent_at: Utc::now(),
            outcome: event.outcome,
            actor_id: event.actor_id,
            provider_message_id: event.provider_message_id,
            error: event.error,
        };
        let mut inner = self.inner.lock().await;
        inner.events.push(record.clone());
        Ok(record)
    }

    async fn lock_notification(
        &self,
        subject_id: Uuid,
        event_type: EventType,
    ) -> Result<NotificationLease> {
        let guard = self.key_lock(subject_id, event_type).lock_owned().await;
        Ok(NotificationLease::new(guard))
    }

    async fn payment(&self, id: &str) -> Result<Option<PaymentRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.payments.get(id).cloned())
    }

    async fn payment_by_processor_id(
        &self,
        processor_payment_id: &str,
    ) -> Result<Option<PaymentRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .payments
            .values()
            .find(|p| p.processor_payment_id.as_deref() == Some(processor_payment_id))
            .cloned())
    }

    async fn complete_payment(
        &self,
        id: &str,
        completion: &PaymentCompletion,
    ) -> Result<Option<PaymentRecord>> {
        let mut inner = self.inner.lock().await;
        let Some(row) = inner.payments.get_mut(id) else {
            return Ok(None);
        };
        match row.status {
            PaymentStatus::Pending => {
                row.status = PaymentStatus::Completed;
                if let Some(id) = &completion.processor_payment_id {
                    row.processor_payment_id = Some(id.clone());
                }
                if let Some(id) = &completion.processor_customer_id {
                    row.processor_customer_id = Some(id.clone());
                }
                row.updated_at = Utc::now();
                Ok(Some(row.clone()))
            }
            PaymentStatus::Completed => Ok(Some(row.clone())),
            PaymentStatus::Failed
            | PaymentStatus::Cancelled
            | PaymentStatus::ScheduledForCancellation => Ok(None),
        }
    }

    async fn fail_payment(&self, id: &str) -> Result<Option<PaymentRecord>> {
        let mut inner = self.inner.lock().await;
        match inner.payments.get_mut(id) {
            Some(row) if row.status == PaymentStatus::Pending => {
                row.status = PaymentStatus::Failed;
                row.updated_at = Utc::now();
                Ok(Some(row.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn latest_pending_payment(&self, subject_id: Uuid) -> Result<Option<PaymentRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .payments
            .values()
            .filter(|p| p.subject_id == subject_id && p.status == PaymentStatus::Pending)
            .max_by_key(|p| p.created_at)
            .cloned())
    }
}
