//! Match verified payment-processor events to payment rows.
//!
//! A completed checkout is matched by the reference id we handed to the
//! processor, and when that is absent or stale, by the customer's email and
//! their newest pending payment. Failures and expiries are matched by
//! reference id only. Nothing here ever moves a row backwards.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{PaymentCompletion, PaymentRecord};
use crate::store::{bounded, Datastore};
use crate::types::PaymentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEventKind {
    Completed,
    Failed,
    Expired,
}

/// Processor-agnostic view of a verified checkout event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    pub kind: PaymentEventKind,
    pub event_id: String,
    pub client_reference_id: Option<String>,
    pub processor_payment_id: Option<String>,
    pub processor_customer_id: Option<String>,
    pub customer_email: Option<String>,
}

impl PaymentEvent {
    pub fn new(kind: PaymentEventKind, event_id: impl Into<String>) -> Self {
        Self {
            kind,
            event_id: event_id.into(),
            client_reference_id: None,
            processor_payment_id: None,
            processor_customer_id: None,
            customer_email: None,
        }
    }

    fn completion(&self) -> PaymentCompletion {
        PaymentCompletion {
            processor_payment_id: self.processor_payment_id.clone(),
            processor_customer_id: self.processor_customer_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Direct,
    /// The processor payment id was already settled on a row.
    ProcessorPaymentId,
    EmailFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Resolved {
        payment: PaymentRecord,
        strategy: MatchStrategy,
        /// The row was already in its target state; nothing was written.
        already_applied: bool,
    },
    Unresolved {
        reason: String,
    },
}

#[derive(Clone)]
pub struct PaymentReconciler {
    store: Arc<dyn Datastore>,
    store_timeout: Duration,
}

impl PaymentReconciler {
    pub fn new(store: Arc<dyn Datastore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    pub async fn reconcile(&self, event: &PaymentEvent) -> Result<ReconcileOutcome> {
        let outcome = match event.kind {
            PaymentEventKind::Completed => self.reconcile_completed(event).await?,
            PaymentEventKind::Failed | PaymentEventKind::Expired => {
                self.reconcile_failed(event).await?
            }
        };

        match &outcome {
            ReconcileOutcome::Resolved {
                payment,
                strategy,
                already_applied,
            } => tracing::info!(
                event_id = %event.event_id,
                payment_id = %payment.id,
                subject_id = %payment.subject_id,
                status = %payment.status,
                ?strategy,
                already_applied,
                "payment event reconciled"
            ),
            ReconcileOutcome::Unresolved { reason } => tracing::warn!(
                event_id = %event.event_id,
                kind = ?event.kind,
                client_reference_id = ?event.client_reference_id,
                processor_payment_id = ?event.processor_payment_id,
                customer_email = ?event.customer_email,
                %reason,
                "payment event unresolved"
            ),
        }
        Ok(outcome)
    }

    async fn reconcile_completed(&self, event: &PaymentEvent) -> Result<ReconcileOutcome> {
        let completion = event.completion();
        let mut reasons = Vec::new();

        match event.client_reference_id.as_deref() {
            Some(id) => match self.complete(id, &completion).await? {
                Ok((payment, already_applied)) => {
                    return Ok(ReconcileOutcome::Resolved {
                        payment,
                        strategy: MatchStrategy::Direct,
                        already_applied,
                    })
                }
                Err(reason) => reasons.push(reason),
            },
            None => reasons.push("no client_reference_id".to_string()),
        }

        // A redelivered fallback event must not settle a second pending row.
        if let Some(processor_id) = event.processor_payment_id.as_deref() {
            let settled = bounded(
                self.store_timeout,
                "loading payment by processor id",
                self.store.payment_by_processor_id(processor_id),
            )
            .await?;
            if let Some(payment) = settled.filter(|p| p.status == PaymentStatus::Completed) {
                return Ok(ReconcileOutcome::Resolved {
                    payment,
                    strategy: MatchStrategy::ProcessorPaymentId,
                    already_applied: true,
                });
            }
        }

        match event.customer_email.as_deref().map(str::trim) {
            Some(email) if !email.is_empty() => {
                match self.complete_by_email(email, &completion).await? {
                    Ok(payment) => {
                        return Ok(ReconcileOutcome::Resolved {
                            payment,
                            strategy: MatchStrategy::EmailFallback,
                            already_applied: false,
                        })
                    }
                    Err(reason) => reasons.push(reason),
                }
            }
            _ => reasons.push("no customer email".to_string()),
        }

        Ok(ReconcileOutcome::Unresolved {
            reason: reasons.join("; "),
        })
    }

    async fn reconcile_failed(&self, event: &PaymentEvent) -> Result<ReconcileOutcome> {
        let Some(id) = event.client_reference_id.as_deref() else {
            return Ok(ReconcileOutcome::Unresolved {
                reason: "no client_reference_id".to_string(),
            });
        };

        let failed = bounded(
            self.store_timeout,
            "failing payment",
            self.store.fail_payment(id),
        )
        .await?;

        if let Some(payment) = failed {
            return Ok(ReconcileOutcome::Resolved {
                payment,
                strategy: MatchStrategy::Direct,
                already_applied: false,
            });
        }

        let row = bounded(self.store_timeout, "loading payment", self.store.payment(id)).await?;
        Ok(match row {
            Some(payment) if payment.status == PaymentStatus::Failed => {
                ReconcileOutcome::Resolved {
                    payment,
                    strategy: MatchStrategy::Direct,
                    already_applied: true,
                }
            }
            row => ReconcileOutcome::Unresolved {
                reason: miss_reason(id, row),
            },
        })
    }

    /// Complete the row `id`. The inner `Err` carries why it did not match.
    async fn complete(
        &self,
        id: &str,
        completion: &PaymentCompletion,
    ) -> Result<std::result::Result<(PaymentRecord, bool), String>> {
        let before = bounded(self.store_timeout, "loading payment", self.store.payment(id)).await?;
        let already_applied = before
            .as_ref()
            .is_some_and(|p| p.status == PaymentStatus::Completed);

        let completed = bounded(
            self.store_timeout,
            "completing payment",
            self.store.complete_payment(id, completion),
        )
        .await?;

        Ok(match completed {
            Some(payment) => Ok((payment, already_applied)),
            None => Err(self.explain_miss(id).await?),
        })
    }

    async fn complete_by_email(
        &self,
        email: &str,
        completion: &PaymentCompletion,
    ) -> Result<std::result::Result<PaymentRecord, String>> {
        let Some(subject) = bounded(
            self.store_timeout,
            "finding subject by email",
            self.store.find_subject_by_email(email),
        )
        .await?
        else {
            return Ok(Err(format!("no subject with email {email}")));
        };

        let Some(pending) = self.latest_pending(subject.id).await? else {
            return Ok(Err(format!("subject {} has no pending payment", subject.id)));
        };

        let completed = bounded(
            self.store_timeout,
            "completing payment",
            self.store.complete_payment(&pending.id, completion),
        )
        .await?;

        Ok(completed.ok_or_else(|| format!("payment {} changed state concurrently", pending.id)))
    }

    async fn latest_pending(&self, subject_id: Uuid) -> Result<Option<PaymentRecord>> {
        bounded(
            self.store_timeout,
            "loading latest pending payment",
            self.store.latest_pending_payment(subject_id),
        )
        .await
    }

    async fn explain_miss(&self, id: &str) -> Result<String> {
        let row = bounded(self.store_timeout, "loading payment", self.store.payment(id)).await?;
        Ok(miss_reason(id, row))
    }
}

fn miss_reason(id: &str, row: Option<PaymentRecord>) -> String {
    match row {
        None => format!("no payment with id {id}"),
        Some(p) if p.status.is_terminal() => format!("payment {id} is already {}", p.status),
        Some(p) => format!("payment {id} is {}", p.status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Subject;
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn reconciler(store: &Arc<MemoryStore>) -> PaymentReconciler {
        PaymentReconciler::new(store.clone(), Duration::from_secs(1))
    }

    fn completed(reference: Option<&str>, email: Option<&str>) -> PaymentEvent {
        PaymentEvent {
            client_reference_id: reference.map(String::from),
            processor_payment_id: Some("pi_1".into()),
            processor_customer_id: Some("cus_1".into()),
            customer_email: email.map(String::from),
            ..PaymentEvent::new(PaymentEventKind::Completed, "evt_1")
        }
    }

    #[tokio::test]
    async fn direct_match_completes_and_redelivery_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        store
            .insert_payment(PaymentRecord::pending("pay_123", owner, Utc::now()))
            .await;
        let rec = reconciler(&store);

        let first = rec.reconcile(&completed(Some("pay_123"), None)).await.unwrap();
        let ReconcileOutcome::Resolved {
            payment,
            strategy,
            already_applied,
        } = first
        else {
            panic!("expected Resolved");
        };
        assert_eq!(strategy, MatchStrategy::Direct);
        assert!(!already_applied);
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.processor_payment_id.as_deref(), Some("pi_1"));

        let second = rec.reconcile(&completed(Some("pay_123"), None)).await.unwrap();
        assert!(matches!(
            second,
            ReconcileOutcome::Resolved {
                already_applied: true,
                ..
            }
        ));
        let stored = store.payment("pay_123").await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn email_fallback_picks_latest_pending() {
        let store = Arc::new(MemoryStore::new());
        let owner = Subject {
            id: Uuid::new_v4(),
            email: "Ada@Example.com".into(),
            full_name: None,
        };
        store.insert_subject(owner.clone()).await;
        let now = Utc::now();
        store
            .insert_payment(PaymentRecord::pending(
                "older",
                owner.id,
                now - chrono::Duration::hours(3),
            ))
            .await;
        store
            .insert_payment(PaymentRecord::pending(
                "newer",
                owner.id,
                now - chrono::Duration::hours(1),
            ))
            .await;

        let outcome = reconciler(&store)
            .reconcile(&completed(Some("pay_gone"), Some("ada@example.com")))
            .await
            .unwrap();
        let ReconcileOutcome::Resolved {
            payment, strategy, ..
        } = outcome
        else {
            panic!("expected Resolved");
        };
        assert_eq!(strategy, MatchStrategy::EmailFallback);
        assert_eq!(payment.id, "newer");
        assert_eq!(
            store.payment("older").await.unwrap().unwrap().status,
            PaymentStatus::Pending
        );
    }

    #[tokio::test]
    async fn redelivered_fallback_event_settles_only_one_row() {
        let store = Arc::new(MemoryStore::new());
        let owner = Subject {
            id: Uuid::new_v4(),
            email: "ada@example.com".into(),
            full_name: None,
        };
        store.insert_subject(owner.clone()).await;
        let now = Utc::now();
        store
            .insert_payment(PaymentRecord::pending(
                "t1",
                owner.id,
                now - chrono::Duration::hours(2),
            ))
            .await;
        store
            .insert_payment(PaymentRecord::pending(
                "t2",
                owner.id,
                now - chrono::Duration::hours(1),
            ))
            .await;
        let rec = reconciler(&store);
        let event = completed(None, Some("ada@example.com"));

        rec.reconcile(&event).await.unwrap();
        let again = rec.reconcile(&event).await.unwrap();
        let ReconcileOutcome::Resolved {
            payment,
            strategy,
            already_applied,
        } = again
        else {
            panic!("expected Resolved");
        };
        assert_eq!(payment.id, "t2");
        assert_eq!(strategy, MatchStrategy::ProcessorPaymentId);
        assert!(already_applied);

        let t1 = store.payment("t1").await.unwrap().unwrap();
        assert_eq!(t1.status, PaymentStatus::Pending);
        assert!(t1.processor_payment_id.is_none());
    }

    #[tokio::test]
    async fn unmatched_event_changes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        store
            .insert_payment(PaymentRecord::pending("pay_1", owner, Utc::now()))
            .await;

        let outcome = reconciler(&store)
            .reconcile(&completed(Some("pay_unknown"), Some("nobody@example.com")))
            .await
            .unwrap();
        let ReconcileOutcome::Unresolved { reason } = outcome else {
            panic!("expected Unresolved");
        };
        assert!(reason.contains("no payment with id pay_unknown"));
        assert!(reason.contains("no subject with email"));
        assert_eq!(store.payments().await[0].status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn failed_event_only_moves_pending_rows() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        store
            .insert_payment(PaymentRecord::pending("pay_1", owner, Utc::now()))
            .await;
        let rec = reconciler(&store);

        let mut event = PaymentEvent::new(PaymentEventKind::Expired, "evt_2");
        event.client_reference_id = Some("pay_1".into());
        let outcome = rec.reconcile(&event).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Resolved { .. }));
        assert_eq!(
            store.payment("pay_1").await.unwrap().unwrap().status,
            PaymentStatus::Failed
        );

        let again = rec.reconcile(&event).await.unwrap();
        assert!(matches!(
            again,
            ReconcileOutcome::Resolved {
                already_applied: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn failed_event_does_not_touch_completed_row() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_payment(PaymentRecord::pending("pay_1", Uuid::new_v4(), Utc::now()))
            .await;
        let rec = reconciler(&store);
        rec.reconcile(&completed(Some("pay_1"), None)).await.unwrap();

        let mut event = PaymentEvent::new(PaymentEventKind::Failed, "evt_3");
        event.client_reference_id = Some("pay_1".into());
        let ReconcileOutcome::Unresolved { reason } = rec.reconcile(&event).await.unwrap() else {
            panic!("expected Unresolved");
        };
        assert_eq!(reason, "payment pay_1 is already completed");
        assert_eq!(
            store.payment("pay_1").await.unwrap().unwrap().status,
            PaymentStatus::Completed
        );
    }

    #[tokio::test]
    async fn completed_event_never_revives_failed_row() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        store
            .insert_payment(PaymentRecord::pending("pay_1", owner, Utc::now()))
            .await;
        store.fail_payment("pay_1").await.unwrap();

        let outcome = reconciler(&store)
            .reconcile(&completed(Some("pay_1"), None))
            .await
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Unresolved { .. }));
        assert_eq!(
            store.payment("pay_1").await.unwrap().unwrap().status,
            PaymentStatus::Failed
        );
    }
}
